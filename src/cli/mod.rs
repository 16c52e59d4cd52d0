use std::path::PathBuf;

use clap::Parser;
use derive_more::{Display, Error};
use log::LevelFilter;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Verbosity of the command output.
    #[arg(long)]
    pub verbose: Option<LevelFilter>,

    /// S3 endpoint and bucket in the form `endpoint/bucket[/prefix]`.
    ///
    /// Database dumps land under `{bucket}/databases/{identity}/`, the restic
    /// repository under `{bucket}/restic/{identity}`.
    #[arg(long, env = "AWS_ENDPOINT_BUCKET")]
    pub endpoint_bucket: String,

    /// Additional host paths to snapshot, comma separated.
    ///
    /// Merged with the `extra_backup_paths` of the config file.
    #[arg(long, env = "EXTRA_BACKUP_PATHS", value_delimiter = ',')]
    pub extra_backup_paths: Vec<PathBuf>,

    /// File restic reads the repository password from.
    #[arg(long, env = "RESTIC_PASSWORD_FILE")]
    pub restic_password_file: Option<PathBuf>,

    /// Path of the configuration file.
    #[arg(long, default_value = "srv-backup.toml")]
    pub config: PathBuf,

    /// Discover and classify targets, but do not dump, upload or snapshot.
    #[arg(long)]
    pub dry_run: bool,
}

/// `AWS_ENDPOINT_BUCKET` did not contain a `/` separating endpoint and bucket.
#[derive(Debug, Display, Error)]
#[display("'{_0}' is not of the form endpoint/bucket")]
pub struct MalformedEndpointBucket(#[error(ignore)] pub String);

impl Cli {
    /// Splits `endpoint/bucket[/prefix]` at the first slash.
    pub fn split_endpoint_bucket(&self) -> Result<(&str, &str), MalformedEndpointBucket> {
        self.endpoint_bucket
            .split_once('/')
            .filter(|(endpoint, bucket)| !endpoint.is_empty() && !bucket.is_empty())
            .ok_or_else(|| MalformedEndpointBucket(self.endpoint_bucket.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from([&["srv_backup"], args].concat()).unwrap()
    }

    #[test]
    fn endpoint_bucket_splits_at_first_slash() {
        let cli = cli(&["--endpoint-bucket", "s3.example.com/backups/prod"]);
        assert_eq!(
            cli.split_endpoint_bucket().unwrap(),
            ("s3.example.com", "backups/prod")
        );
    }

    #[test]
    fn endpoint_bucket_without_bucket_is_rejected() {
        assert!(cli(&["--endpoint-bucket", "s3.example.com"])
            .split_endpoint_bucket()
            .is_err());
        assert!(cli(&["--endpoint-bucket", "s3.example.com/"])
            .split_endpoint_bucket()
            .is_err());
    }

    #[test]
    fn extra_backup_paths_are_comma_separated() {
        let cli = cli(&[
            "--endpoint-bucket",
            "s3.example.com/backups",
            "--extra-backup-paths",
            "/srv/a,/srv/b",
        ]);
        assert_eq!(
            cli.extra_backup_paths,
            vec![PathBuf::from("/srv/a"), PathBuf::from("/srv/b")]
        );
    }
}
