//! Classification of containers and extraction of database dumps.
//!
//! A static, ordered catalog maps container identity to a [DumpProvider].
//! Classification is a two-part test: a name/image pattern match alone is
//! too permissive (a container merely *named* `postgres-proxy` is not a
//! database), so the PID-1 command line of the container must additionally
//! carry the expected server binary.

pub mod mysql;
pub mod postgres;
pub mod redis;

pub use mysql::MySqlMariaDbProvider;
pub use postgres::PostgresProvider;
pub use redis::RedisProvider;

use std::path::Path;

use derive_more::{Display, Error, From};

use crate::docker::{Container, ContainerEnv, ContainerRuntime, RuntimeError};

#[derive(Debug, Display, Error, From)]
/// Failure while producing a dump from a container.
pub enum DumpError {
    /// The extraction command inside the container failed.
    #[from]
    Runtime(RuntimeError),

    /// Neither `MARIADB_DATABASE` nor `MYSQL_DATABASE` is set; refusing to
    /// splice an empty database name into the dump command.
    #[display("no MARIADB_DATABASE or MYSQL_DATABASE set on the container")]
    DatabaseNameUnresolved,
}

/// Engine-specific capability to produce a single-file dump.
///
/// Implementations are stateless and shared across all containers of a run.
pub trait DumpProvider: Sync {
    /// Logical database name, resolved from the container environment.
    fn database_name(&self, env: &ContainerEnv) -> String;

    /// Writes a dump of the container's database to `dest`.
    ///
    /// On failure no partial file remains at `dest`.
    fn dump(
        &self,
        runtime: &dyn ContainerRuntime,
        id: &str,
        env: &ContainerEnv,
        dest: &Path,
    ) -> Result<(), DumpError>;
}

/// One entry of the classification catalog.
#[derive(Clone, Copy)]
pub struct BackupDefinition {
    patterns: &'static [&'static str],
    process_signature: &'static str,
    pub provider: &'static dyn DumpProvider,
    pub extension: &'static str,
}

impl BackupDefinition {
    fn matches_identity(&self, container: &Container) -> bool {
        let image = container.image.to_lowercase();
        let name = container.name.to_lowercase();
        self.patterns
            .iter()
            .any(|pattern| image.contains(pattern) || name.contains(pattern))
    }
}

/// Catalog order matters: first definition satisfying both tests wins.
pub const CATALOG: &[BackupDefinition] = &[
    BackupDefinition {
        patterns: &["mariadb"],
        process_signature: "mariadbd",
        provider: &MySqlMariaDbProvider,
        extension: "mariadb.sql.gz",
    },
    BackupDefinition {
        patterns: &["mysql"],
        process_signature: "mysqld",
        provider: &MySqlMariaDbProvider,
        extension: "mysql.sql.gz",
    },
    BackupDefinition {
        patterns: &["postgres"],
        process_signature: "postgres",
        provider: &PostgresProvider,
        extension: "postgres.sql.gz",
    },
    BackupDefinition {
        patterns: &["redis"],
        process_signature: "redis-server",
        provider: &RedisProvider,
        extension: "rdb",
    },
];

/// Decides whether `container` is a backup target.
///
/// Returns the first catalog entry whose pattern matches the container's
/// image or name *and* whose process signature appears in the PID-1 command
/// line. Anything else, including an unreadable PID-1 command line, degrades
/// to "no match" rather than an error.
pub fn classify(
    runtime: &dyn ContainerRuntime,
    container: &Container,
) -> Option<&'static BackupDefinition> {
    // PID 1 is fetched lazily, at most once per container
    let mut cmdline: Option<Option<String>> = None;

    for definition in CATALOG {
        if !definition.matches_identity(container) {
            continue;
        }

        let cmdline = cmdline.get_or_insert_with(|| runtime.main_process(&container.id));
        match cmdline {
            Some(cmdline) if cmdline.contains(definition.process_signature) => {
                return Some(definition);
            }
            _ => {
                log::debug!(
                    target: "classify",
                    "{} ({}) matches pattern of '{}' but PID 1 is {:?}, not a target",
                    container.name,
                    container.image,
                    definition.process_signature,
                    cmdline,
                );
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRuntime;

    fn container(id: &str, image: &str, name: &str) -> Container {
        Container {
            id: id.into(),
            image: image.into(),
            name: name.into(),
        }
    }

    #[test]
    fn classifies_by_image_and_process_signature() {
        let runtime = FakeRuntime::new().with_container(
            container("c1", "postgres:14", "shop-db"),
            Some("/usr/lib/postgresql/14/bin/postgres -D /var/lib/postgresql/data"),
            ContainerEnv::default(),
        );

        let definition = classify(&runtime, &runtime.containers()[0]).unwrap();
        assert_eq!(definition.extension, "postgres.sql.gz");
    }

    #[test]
    fn classifies_by_name_when_image_is_opaque() {
        let runtime = FakeRuntime::new().with_container(
            container("c1", "registry.local/db:1", "prod-MariaDB"),
            Some("/usr/sbin/mariadbd --user=mysql"),
            ContainerEnv::default(),
        );

        let definition = classify(&runtime, &runtime.containers()[0]).unwrap();
        assert_eq!(definition.extension, "mariadb.sql.gz");
    }

    #[test]
    fn rejects_name_match_with_wrong_main_process() {
        // looks like a database by name, is actually a node proxy
        let runtime = FakeRuntime::new().with_container(
            container("c1", "myapp/postgres-proxy", "app-1"),
            Some("/usr/bin/node server.js"),
            ContainerEnv::default(),
        );

        assert!(classify(&runtime, &runtime.containers()[0]).is_none());
    }

    #[test]
    fn unreadable_pid1_degrades_to_no_match() {
        let runtime = FakeRuntime::new().with_container(
            container("c1", "redis:7", "cache"),
            None,
            ContainerEnv::default(),
        );

        assert!(classify(&runtime, &runtime.containers()[0]).is_none());
    }

    #[test]
    fn unrelated_containers_are_not_targets() {
        let runtime = FakeRuntime::new().with_container(
            container("c1", "nginx:latest", "web"),
            Some("nginx: master process"),
            ContainerEnv::default(),
        );

        assert!(classify(&runtime, &runtime.containers()[0]).is_none());
    }
}
