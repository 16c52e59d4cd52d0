//! Operator configuration, loaded from a TOML file.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{fs, vec};

use derive_more::{Display, Error, From};

const DEFAULT_VOLUME_ROOT: &str = "/var/lib/docker/volumes";
const DEFAULT_SCRATCH_DIR: &str = "./backups";

#[derive(Debug, Display, Error, From)]
/// Failure while loading the configuration file.
pub enum ConfigError {
    #[display("reading the config file failed: {_0}")]
    Read(io::Error),

    #[display("config file is not valid TOML: {_0}")]
    #[from]
    Parse(toml::de::Error),
}

/// Retention applied to the snapshot repository after every run.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct RetentionConfig {
    /// How many daily snapshots to keep.
    pub keep_daily: u32,

    /// How many weekly snapshots to keep.
    pub keep_weekly: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            keep_daily: 30,
            keep_weekly: 52,
        }
    }
}

impl RetentionConfig {
    /// Keep counts below one would let `forget --prune` delete the snapshot
    /// a run just created; clamp and warn instead.
    pub fn sanitized(self) -> Self {
        if self.keep_daily == 0 || self.keep_weekly == 0 {
            log::warn!(
                target: "config",
                "Retention keep counts must be at least 1, clamping (was daily={}, weekly={})",
                self.keep_daily,
                self.keep_weekly,
            );
        }
        Self {
            keep_daily: self.keep_daily.max(1),
            keep_weekly: self.keep_weekly.max(1),
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
/// Settings of one backup run.
pub struct BackupConfig {
    /// Volume storage root of the container runtime.
    pub volume_root: PathBuf,

    /// Additional host paths to snapshot.
    pub extra_backup_paths: Vec<PathBuf>,

    /// Local scratch directory holding one dump file at a time.
    pub scratch_dir: PathBuf,

    /// Kill any external command running longer than this. Unset means wait
    /// forever.
    pub command_timeout_secs: Option<u64>,

    pub retention: RetentionConfig,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            volume_root: PathBuf::from(DEFAULT_VOLUME_ROOT),
            extra_backup_paths: Vec::new(),
            scratch_dir: PathBuf::from(DEFAULT_SCRATCH_DIR),
            command_timeout_secs: None,
            retention: RetentionConfig::default(),
        }
    }
}

impl BackupConfig {
    /// Loads the config file, writing a default one if it doesn't exist yet
    /// so the operator has a template to edit.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match fs::read_to_string(path) {
            Ok(config_str) => Ok(toml::from_str(&config_str)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!(
                    target: "config",
                    "Writing default config to {} because it doesn't exist yet",
                    path.display()
                );
                let default_config = Self::default();
                let config_str = toml::to_string_pretty(&default_config)
                    .expect("default config should be serializable");
                if let Err(e) = fs::write(path, config_str) {
                    log::warn!(
                        target: "config",
                        "Writing default config to {} failed: {e}",
                        path.display()
                    );
                }
                Ok(default_config)
            }
            Err(e) => Err(ConfigError::Read(e)),
        }
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    /// Volume root plus extras, in the order they will be snapshotted.
    pub fn backup_paths(&self) -> vec::IntoIter<PathBuf> {
        let mut paths = vec![self.volume_root.clone()];
        paths.extend(self.extra_backup_paths.iter().cloned());
        paths.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_default_and_writes_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("srv-backup.toml");

        let config = BackupConfig::load_or_default(&path).unwrap();
        assert_eq!(config.volume_root, PathBuf::from(DEFAULT_VOLUME_ROOT));
        assert_eq!(config.retention.keep_daily, 30);
        assert_eq!(config.retention.keep_weekly, 52);
        assert!(path.exists(), "template should have been written");

        // written template round-trips
        let reloaded = BackupConfig::load_or_default(&path).unwrap();
        assert_eq!(reloaded.scratch_dir, config.scratch_dir);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("srv-backup.toml");
        fs::write(
            &path,
            "extra_backup_paths = [\"/srv/data\"]\ncommand_timeout_secs = 600\n",
        )
        .unwrap();

        let config = BackupConfig::load_or_default(&path).unwrap();
        assert_eq!(config.extra_backup_paths, vec![PathBuf::from("/srv/data")]);
        assert_eq!(config.command_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.volume_root, PathBuf::from(DEFAULT_VOLUME_ROOT));
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("srv-backup.toml");
        fs::write(&path, "retention = \"often\"").unwrap();

        assert!(matches!(
            BackupConfig::load_or_default(&path),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn retention_clamps_to_at_least_one() {
        let retention = RetentionConfig {
            keep_daily: 0,
            keep_weekly: 52,
        }
        .sanitized();
        assert_eq!(retention.keep_daily, 1);
        assert_eq!(retention.keep_weekly, 52);
    }

    #[test]
    fn backup_paths_start_with_the_volume_root() {
        let config = BackupConfig {
            extra_backup_paths: vec![PathBuf::from("/srv/a"), PathBuf::from("/srv/b")],
            ..BackupConfig::default()
        };
        let paths: Vec<_> = config.backup_paths().collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from(DEFAULT_VOLUME_ROOT),
                PathBuf::from("/srv/a"),
                PathBuf::from("/srv/b"),
            ]
        );
    }
}
