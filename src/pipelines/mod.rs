//! The two top-level pipelines of a run.
//!
//! Both share the same failure isolation contract: an error for one target
//! (container or path) is caught at target granularity, reported immediately
//! through the notifier, and never stops iteration over the remaining
//! targets.

pub mod databases;
pub mod volumes;

use std::io;

use derive_more::{Display, Error, From};

use crate::docker::RuntimeError;
use crate::providers::DumpError;
use crate::store::UploadError;

#[derive(Debug, Display, Error, From)]
/// Anything that can go wrong for a single database backup target.
pub enum TargetError {
    #[from]
    Runtime(RuntimeError),
    #[from]
    Dump(DumpError),
    #[from]
    Upload(UploadError),
    /// Removing the local scratch copy after upload failed.
    #[display("removing local dump copy failed: {_0}")]
    Cleanup(io::Error),
}

/// Accumulated result of one pipeline.
///
/// `success` stays `true` only if every attempted target succeeded; skipped
/// containers and an empty target list are not failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub success: bool,
    /// Artifact names respectively backed-up paths, in iteration order.
    pub names: Vec<String>,
    /// Human-readable description of each failed target, in iteration order.
    pub failures: Vec<String>,
}

impl PipelineOutcome {
    pub fn new() -> Self {
        Self {
            success: true,
            names: Vec::new(),
            failures: Vec::new(),
        }
    }
}
