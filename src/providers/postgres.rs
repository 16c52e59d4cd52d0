use std::path::Path;

use super::{DumpError, DumpProvider};
use crate::docker::{ContainerEnv, ContainerRuntime};

/// Dumps PostgreSQL containers with `pg_dump`.
pub struct PostgresProvider;

impl DumpProvider for PostgresProvider {
    fn database_name(&self, env: &ContainerEnv) -> String {
        env.first_of(&["POSTGRES_DB"], "postgres").to_string()
    }

    fn dump(
        &self,
        runtime: &dyn ContainerRuntime,
        id: &str,
        env: &ContainerEnv,
        dest: &Path,
    ) -> Result<(), DumpError> {
        let database = self.database_name(env);
        let user = env.first_of(&["POSTGRES_USER"], "postgres");
        // pg_dump insists on taking the password from its environment;
        // scoped to this single exec, never exported process-wide
        let password = env.get("POSTGRES_PASSWORD").unwrap_or_default();

        runtime.exec_to_file(
            id,
            &["pg_dump", "-U", user, "-d", &database],
            &[("PGPASSWORD", password)],
            dest,
            true,
        )?;
        Ok(())
    }
}
