//! The deduplicating snapshot repository, driven through the restic CLI.

use std::path::{Path, PathBuf};

use derive_more::{Display, Error, From};

use crate::exec::{Cmd, Exec, ExecError};
use crate::identity::ServerIdentity;

#[derive(Debug, Display, Error, From)]
/// Failure of a snapshot repository operation.
pub enum SnapshotError {
    /// A restic invocation failed.
    #[from]
    Exec(ExecError),

    /// A configured backup path is not present on disk.
    ///
    /// Surfaced as a failure rather than skipped: a configured path that
    /// vanished indicates host misconfiguration.
    #[display("backup path did not exist: {}", _0.display())]
    PathMissing(#[error(ignore)] PathBuf),
}

/// Seam to the snapshot repository.
pub trait SnapshotRepo {
    /// Clears stale locks left behind by an interrupted run.
    ///
    /// Standing precondition of every run, not an error-recovery measure.
    fn unlock(&self) -> Result<(), SnapshotError>;

    /// Creates a snapshot of `path`, skipping cache directories.
    fn backup(&self, path: &Path) -> Result<(), SnapshotError>;

    /// Applies retention and prunes unreferenced data.
    fn forget_and_prune(&self, keep_daily: u32, keep_weekly: u32) -> Result<(), SnapshotError>;

    /// Verifies repository integrity.
    fn check(&self) -> Result<(), SnapshotError>;
}

/// [SnapshotRepo] backed by the restic CLI.
///
/// Repository address and credentials travel as per-invocation environment
/// variables; nothing is exported to the parent process.
#[derive(Debug, Clone)]
pub struct ResticCli {
    exec: Exec,
    repository: String,
    password_file: Option<PathBuf>,
}

impl ResticCli {
    pub fn new(exec: Exec, repository: impl Into<String>) -> Self {
        Self {
            exec,
            repository: repository.into(),
            password_file: None,
        }
    }

    pub fn with_password_file(mut self, password_file: PathBuf) -> Self {
        self.password_file = Some(password_file);
        self
    }

    /// Repository URI for this host: `s3:{endpoint}/{bucket}/restic/{identity}`.
    pub fn repository_uri(endpoint_bucket: &str, identity: &ServerIdentity) -> String {
        format!("s3:{endpoint_bucket}/restic/{identity}")
    }

    fn restic<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Cmd {
        let mut cmd = Cmd::new("restic")
            .args(args)
            .env("RESTIC_REPOSITORY", &self.repository);
        if let Some(password_file) = &self.password_file {
            cmd = cmd.env("RESTIC_PASSWORD_FILE", password_file.display().to_string());
        }
        cmd
    }
}

impl SnapshotRepo for ResticCli {
    fn unlock(&self) -> Result<(), SnapshotError> {
        log::debug!(target: "restic", "Clearing stale repository locks");
        self.exec.run(&self.restic(["unlock"]))?;
        Ok(())
    }

    fn backup(&self, path: &Path) -> Result<(), SnapshotError> {
        log::info!(target: "restic", "Snapshotting {}", path.display());
        let path = path.display().to_string();
        self.exec
            .run(&self.restic(["backup", "--verbose", "--exclude-caches", &path]))?;
        Ok(())
    }

    fn forget_and_prune(&self, keep_daily: u32, keep_weekly: u32) -> Result<(), SnapshotError> {
        log::info!(
            target: "restic",
            "Applying retention: keep-daily {keep_daily}, keep-weekly {keep_weekly}"
        );
        let keep_daily = keep_daily.to_string();
        let keep_weekly = keep_weekly.to_string();
        self.exec.run(&self.restic([
            "forget",
            "--verbose",
            "--keep-daily",
            &keep_daily,
            "--keep-weekly",
            &keep_weekly,
            "--prune",
        ]))?;
        Ok(())
    }

    fn check(&self) -> Result<(), SnapshotError> {
        log::info!(target: "restic", "Checking repository integrity");
        self.exec.run(&self.restic(["check"]))?;
        Ok(())
    }
}
