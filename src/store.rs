//! Upload of finished dump artifacts to object storage.

use std::path::Path;

use derive_more::{Display, Error, From};

use crate::exec::{Cmd, Exec, ExecError};

#[derive(Debug, Display, Error, From)]
#[display("upload failed: {_0}")]
/// Failure while uploading an artifact.
pub struct UploadError(ExecError);

/// Seam to the object store; keys are full `bucket/prefix/name` paths.
pub trait ObjectStore {
    fn put(&self, local: &Path, key: &str) -> Result<(), UploadError>;
}

/// [ObjectStore] backed by the aws CLI against an S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct AwsCliStore {
    exec: Exec,
    endpoint: String,
}

impl AwsCliStore {
    pub fn new(exec: Exec, endpoint: impl Into<String>) -> Self {
        Self {
            exec,
            endpoint: endpoint.into(),
        }
    }
}

impl ObjectStore for AwsCliStore {
    fn put(&self, local: &Path, key: &str) -> Result<(), UploadError> {
        log::debug!(target: "store", "Uploading {} to s3://{key}", local.display());
        self.exec.run(
            &Cmd::new("aws")
                .arg("s3")
                .arg("cp")
                .arg(local.display().to_string())
                .arg(format!("s3://{key}"))
                .arg(format!("--endpoint-url=https://{}", self.endpoint)),
        )?;
        Ok(())
    }
}
