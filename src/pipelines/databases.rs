//! Backup of all recognized database containers to the object store.

use std::fs;
use std::path::PathBuf;

use chrono::Local;

use super::{PipelineOutcome, TargetError};
use crate::docker::{Container, ContainerRuntime};
use crate::providers::{classify, BackupDefinition};
use crate::report::{self, Notifier};
use crate::store::ObjectStore;

/// `Discover → (Classify → Dump → Upload → Cleanup)* → Summarize`.
pub struct DatabasePipeline<'a> {
    runtime: &'a dyn ContainerRuntime,
    store: &'a dyn ObjectStore,
    notifier: &'a dyn Notifier,
    /// Scratch directory holding one dump file at a time.
    scratch_dir: PathBuf,
    /// Deterministic upload prefix: `{bucket}/databases/{identity}`.
    bucket_path: String,
    dry_run: bool,
}

impl<'a> DatabasePipeline<'a> {
    pub fn new(
        runtime: &'a dyn ContainerRuntime,
        store: &'a dyn ObjectStore,
        notifier: &'a dyn Notifier,
        scratch_dir: PathBuf,
        bucket_path: String,
        dry_run: bool,
    ) -> Self {
        Self {
            runtime,
            store,
            notifier,
            scratch_dir,
            bucket_path,
            dry_run,
        }
    }

    pub fn run(&self) -> PipelineOutcome {
        let mut outcome = PipelineOutcome::new();
        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();

        let containers = match self.runtime.list_running() {
            Ok(containers) => containers,
            Err(e) => {
                self.record_failure(
                    &mut outcome,
                    "container discovery".to_string(),
                    &TargetError::Runtime(e),
                );
                return outcome;
            }
        };
        if containers.is_empty() {
            log::info!(target: "pipeline::db", "No containers found.");
            return outcome;
        }

        for container in &containers {
            let Some(definition) = classify(self.runtime, container) else {
                log::trace!(
                    target: "pipeline::db",
                    "{} ({}) is not a backup target",
                    container.name,
                    container.image
                );
                continue;
            };

            match self.backup_container(container, definition, &timestamp) {
                Ok(artifact) => outcome.names.push(artifact),
                Err(e) => self.record_failure(&mut outcome, container.name.clone(), &e),
            }
        }

        log::info!(target: "pipeline::db", "Database backups complete.");
        outcome
    }

    /// One failure never stops iteration over the remaining containers, but
    /// it is reported right away.
    fn record_failure(&self, outcome: &mut PipelineOutcome, target: String, error: &TargetError) {
        log::error!(target: "pipeline::db", "Backup of {target} failed: {error}");
        report::send_failure(
            self.notifier,
            &format!("A database backup failed: {target}\n{error}"),
        );
        outcome.failures.push(target);
        outcome.success = false;
    }

    fn backup_container(
        &self,
        container: &Container,
        definition: &BackupDefinition,
        timestamp: &str,
    ) -> Result<String, TargetError> {
        let env = self.runtime.environment(&container.id)?;
        let database = definition.provider.database_name(&env);

        let artifact = format!(
            "{}_{}_{}_{}.{}",
            container.id, container.name, database, timestamp, definition.extension
        );
        let local = self.scratch_dir.join(&artifact);
        let key = format!("{}/{}", self.bucket_path, artifact);

        log::info!(
            target: "pipeline::db",
            "Backing up {} ({}) to {}",
            container.name,
            container.image,
            local.display()
        );
        if self.dry_run {
            log::info!(target: "pipeline::db", "Dry run, would upload {artifact} to {key}");
            return Ok(artifact);
        }

        definition
            .provider
            .dump(self.runtime, &container.id, &env, &local)?;
        self.store.put(&local, &key)?;
        // local copy only lives until the upload finished
        fs::remove_file(&local).map_err(TargetError::Cleanup)?;

        Ok(artifact)
    }
}
