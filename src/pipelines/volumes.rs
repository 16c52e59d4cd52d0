//! Snapshot backup of the host's persistent volumes.

use std::path::PathBuf;

use super::PipelineOutcome;
use crate::config::RetentionConfig;
use crate::report::{self, Notifier};
use crate::restic::{SnapshotError, SnapshotRepo};

/// Snapshots every configured path, then maintains the repository.
///
/// Retention pruning and the integrity check run exactly once per run,
/// regardless of per-path outcomes: repository health is independent of what
/// this particular run managed to back up.
pub struct VolumePipeline<'a> {
    repo: &'a dyn SnapshotRepo,
    notifier: &'a dyn Notifier,
    paths: Vec<PathBuf>,
    retention: RetentionConfig,
    dry_run: bool,
}

impl<'a> VolumePipeline<'a> {
    pub fn new(
        repo: &'a dyn SnapshotRepo,
        notifier: &'a dyn Notifier,
        paths: Vec<PathBuf>,
        retention: RetentionConfig,
        dry_run: bool,
    ) -> Self {
        Self {
            repo,
            notifier,
            paths,
            retention,
            dry_run,
        }
    }

    pub fn run(&self) -> PipelineOutcome {
        let mut outcome = PipelineOutcome::new();
        log::info!(
            target: "pipeline::volumes",
            "Backing up paths: {:?}",
            self.paths
        );

        if self.dry_run {
            return self.dry_run_outcome(outcome);
        }

        // stale locks of an interrupted previous run are cleared before any
        // backup attempt, unconditionally
        if let Err(e) = self.repo.unlock() {
            self.record_failure(&mut outcome, format!("restic unlock failed: {e}"));
        }

        for path in &self.paths {
            if !path.exists() {
                self.record_failure(
                    &mut outcome,
                    SnapshotError::PathMissing(path.clone()).to_string(),
                );
                continue;
            }

            match self.repo.backup(path) {
                Ok(()) => outcome.names.push(path.display().to_string()),
                Err(e) => self.record_failure(
                    &mut outcome,
                    format!("Volume backup failed: {}\n{e}", path.display()),
                ),
            }
        }

        let retention = self.retention;
        if let Err(e) = self
            .repo
            .forget_and_prune(retention.keep_daily, retention.keep_weekly)
        {
            self.record_failure(&mut outcome, format!("restic forget/prune failed: {e}"));
        }
        if let Err(e) = self.repo.check() {
            self.record_failure(&mut outcome, format!("restic check failed: {e}"));
        }

        outcome
    }

    /// Existence of the configured paths is still verified on a dry run; the
    /// repository is left untouched.
    fn dry_run_outcome(&self, mut outcome: PipelineOutcome) -> PipelineOutcome {
        for path in &self.paths {
            if path.exists() {
                log::info!(
                    target: "pipeline::volumes",
                    "Dry run, would snapshot {}",
                    path.display()
                );
                outcome.names.push(path.display().to_string());
            } else {
                self.record_failure(
                    &mut outcome,
                    SnapshotError::PathMissing(path.clone()).to_string(),
                );
            }
        }
        outcome
    }

    fn record_failure(&self, outcome: &mut PipelineOutcome, message: String) {
        log::error!(target: "pipeline::volumes", "{message}");
        report::send_failure(self.notifier, &message);
        outcome.failures.push(message);
        outcome.success = false;
    }
}
