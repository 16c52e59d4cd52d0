use std::path::Path;

use super::{DumpError, DumpProvider};
use crate::docker::{ContainerEnv, ContainerRuntime};

/// Dumps MySQL and MariaDB containers.
///
/// MariaDB images ship `mariadb-dump`, older ones and MySQL images ship
/// `mysqldump`; which one exists is probed per container.
pub struct MySqlMariaDbProvider;

impl DumpProvider for MySqlMariaDbProvider {
    fn database_name(&self, env: &ContainerEnv) -> String {
        env.first_of(&["MARIADB_DATABASE", "MYSQL_DATABASE"], "")
            .to_string()
    }

    fn dump(
        &self,
        runtime: &dyn ContainerRuntime,
        id: &str,
        env: &ContainerEnv,
        dest: &Path,
    ) -> Result<(), DumpError> {
        let database = self.database_name(env);
        if database.is_empty() {
            return Err(DumpError::DatabaseNameUnresolved);
        }

        let user = env.first_of(&["MARIADB_USER", "MYSQL_USER"], "root");
        let password = env.first_of(&["MARIADB_PASSWORD", "MYSQL_PASSWORD"], "");

        let dump_binary = if runtime
            .exec_probe(id, &["which", "mariadb-dump"])
            .is_some()
        {
            "mariadb-dump"
        } else {
            "mysqldump"
        };

        let mut argv = vec![dump_binary, "-u", user];
        // a bare `-p` would make the dump prompt and hang
        let password_arg = format!("-p{password}");
        if !password.is_empty() {
            argv.push(&password_arg);
        }
        argv.push(&database);

        runtime.exec_to_file(id, &argv, &[], dest, true)?;
        Ok(())
    }
}
