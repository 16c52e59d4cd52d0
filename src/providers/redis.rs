use std::path::Path;

use super::{DumpError, DumpProvider};
use crate::docker::{ContainerEnv, ContainerRuntime};

/// Snapshot path inside official redis images.
const RDB_PATH: &str = "/data/dump.rdb";

/// Dumps Redis containers by forcing a synchronous save and copying the
/// resulting RDB file out of the container.
pub struct RedisProvider;

impl DumpProvider for RedisProvider {
    fn database_name(&self, _env: &ContainerEnv) -> String {
        "redis".to_string()
    }

    fn dump(
        &self,
        runtime: &dyn ContainerRuntime,
        id: &str,
        _env: &ContainerEnv,
        dest: &Path,
    ) -> Result<(), DumpError> {
        runtime.exec(id, &["redis-cli", "save"], &[])?;
        runtime.copy_out(id, RDB_PATH, dest)?;
        Ok(())
    }
}
