use std::fs;
use std::io;
use std::process::ExitCode;

use clap::Parser;
use derive_more::{Display, Error, From};

use srv_backup_lib::cli::{Cli, MalformedEndpointBucket};
use srv_backup_lib::config::{BackupConfig, ConfigError};
use srv_backup_lib::docker::DockerCli;
use srv_backup_lib::exec::Exec;
use srv_backup_lib::identity::{IdentityError, ServerIdentity};
use srv_backup_lib::pipelines::databases::DatabasePipeline;
use srv_backup_lib::pipelines::volumes::VolumePipeline;
use srv_backup_lib::report::{self, LogNotifier, Notifier, RunContext};
use srv_backup_lib::restic::ResticCli;
use srv_backup_lib::store::AwsCliStore;

#[derive(Debug, Display, Error, From)]
/// Errors that escape the per-target isolation of the pipelines.
enum RunError {
    #[from]
    Config(ConfigError),
    #[from]
    Identity(IdentityError),
    #[from]
    EndpointBucket(MalformedEndpointBucket),
    #[display("creating the scratch directory failed: {_0}")]
    Scratch(io::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // init logger
    let mut env_logger = env_logger::builder();
    if let Some(level) = cli.verbose {
        env_logger.filter_level(level);
    }
    env_logger.try_init().expect("env_logger should not fail");

    let notifier = LogNotifier;
    match run(&cli, &notifier) {
        Ok(true) => ExitCode::SUCCESS,
        // every failure was already reported individually
        Ok(false) => {
            log::error!("Something failed.");
            ExitCode::FAILURE
        }
        Err(e) => {
            // last-resort boundary: report once, exit non-zero for the scheduler
            log::error!("Unhandled error: {e}");
            report::send_failure(&notifier, &format!("Unhandled error:\n{e}"));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, notifier: &dyn Notifier) -> Result<bool, RunError> {
    let config = BackupConfig::load_or_default(&cli.config)?;
    let retention = config.retention.sanitized();
    let exec = Exec::new(config.command_timeout());

    let identity = ServerIdentity::detect(&exec)?;
    let (endpoint, bucket) = cli.split_endpoint_bucket()?;
    let restic_repository = ResticCli::repository_uri(&cli.endpoint_bucket, &identity);
    let db_bucket_path = format!("{bucket}/databases/{identity}");

    fs::create_dir_all(&config.scratch_dir).map_err(RunError::Scratch)?;

    log::info!("Backing up {identity}");
    log::info!(" s3 endpoint {endpoint}");
    log::info!(" s3 bucket {bucket}");
    log::info!(" restic repo {restic_repository}");
    log::info!(" db bucket path {db_bucket_path}");
    if cli.dry_run {
        log::warn!("Running in dry-run mode");
    }

    let docker = DockerCli::new(exec);
    let store = AwsCliStore::new(exec, endpoint);
    let mut restic = ResticCli::new(exec, restic_repository.clone());
    if let Some(password_file) = &cli.restic_password_file {
        restic = restic.with_password_file(password_file.clone());
    }

    let databases = DatabasePipeline::new(
        &docker,
        &store,
        notifier,
        config.scratch_dir.clone(),
        db_bucket_path,
        cli.dry_run,
    )
    .run();

    // the volume pipeline runs regardless of the database outcome
    let mut paths: Vec<_> = config.backup_paths().collect();
    paths.extend(cli.extra_backup_paths.iter().cloned());
    let volumes = VolumePipeline::new(&restic, notifier, paths, retention, cli.dry_run).run();

    let success = databases.success && volumes.success;
    if success {
        let context = RunContext {
            identity,
            endpoint: endpoint.to_string(),
            bucket: bucket.to_string(),
            restic_repository,
        };
        notifier.notify(
            &report::subject(true, chrono::Local::now()),
            &report::render(&databases, &volumes, &context),
        );
    }

    Ok(success)
}
