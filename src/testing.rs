//! In-memory fakes for the runtime, store, snapshot repository and notifier
//! seams, shared by the unit tests.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use crate::docker::{Container, ContainerEnv, ContainerRuntime, RuntimeError};
use crate::exec::ExecError;
use crate::report::Notifier;
use crate::restic::{SnapshotError, SnapshotRepo};
use crate::store::{ObjectStore, UploadError};

fn command_failed(command: &str) -> ExecError {
    ExecError::Failed {
        command: command.to_string(),
        code: Some(1),
        stderr: "injected failure".to_string(),
    }
}

struct FakeContainer {
    container: Container,
    cmdline: Option<String>,
    env: ContainerEnv,
}

/// Scriptable [ContainerRuntime] recording every invocation.
pub(crate) struct FakeRuntime {
    containers: Vec<FakeContainer>,
    binaries: Vec<String>,
    failing_dumps: Vec<String>,
    calls: RefCell<Vec<String>>,
}

impl FakeRuntime {
    pub(crate) fn new() -> Self {
        Self {
            containers: Vec::new(),
            binaries: Vec::new(),
            failing_dumps: Vec::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn with_container(
        mut self,
        container: Container,
        cmdline: Option<&str>,
        env: ContainerEnv,
    ) -> Self {
        self.containers.push(FakeContainer {
            container,
            cmdline: cmdline.map(str::to_string),
            env,
        });
        self
    }

    /// Makes `which <name>` probes inside any container answer positively.
    pub(crate) fn with_binary(mut self, name: &str) -> Self {
        self.binaries.push(name.to_string());
        self
    }

    /// Any dump-producing command for this container id fails.
    pub(crate) fn failing_dumps_for(mut self, id: &str) -> Self {
        self.failing_dumps.push(id.to_string());
        self
    }

    pub(crate) fn containers(&self) -> Vec<Container> {
        self.containers.iter().map(|c| c.container.clone()).collect()
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    fn find(&self, id: &str) -> Result<&FakeContainer, RuntimeError> {
        self.containers
            .iter()
            .find(|c| c.container.id == id)
            .ok_or_else(|| RuntimeError::Exec(command_failed(&format!("docker exec {id}"))))
    }
}

impl ContainerRuntime for FakeRuntime {
    fn list_running(&self) -> Result<Vec<Container>, RuntimeError> {
        Ok(self.containers())
    }

    fn environment(&self, id: &str) -> Result<ContainerEnv, RuntimeError> {
        Ok(self.find(id)?.env.clone())
    }

    fn main_process(&self, id: &str) -> Option<String> {
        self.find(id).ok()?.cmdline.clone()
    }

    fn exec(
        &self,
        id: &str,
        argv: &[&str],
        _env: &[(&str, &str)],
    ) -> Result<String, RuntimeError> {
        self.record(format!("exec {id} {}", argv.join(" ")));
        if self.failing_dumps.iter().any(|f| f == id) {
            return Err(RuntimeError::Exec(command_failed(&argv.join(" "))));
        }
        Ok(String::new())
    }

    fn exec_probe(&self, id: &str, argv: &[&str]) -> Option<String> {
        self.record(format!("exec_probe {id} {}", argv.join(" ")));
        match argv {
            ["which", binary] if self.binaries.iter().any(|b| b.as_str() == *binary) => {
                Some(format!("/usr/bin/{binary}"))
            }
            _ => None,
        }
    }

    fn exec_to_file(
        &self,
        id: &str,
        argv: &[&str],
        env: &[(&str, &str)],
        dest: &Path,
        gzip: bool,
    ) -> Result<(), RuntimeError> {
        let env_part = if env.is_empty() {
            String::new()
        } else {
            let pairs: Vec<_> = env.iter().map(|(k, v)| format!("{k}={v}")).collect();
            format!("[{}] ", pairs.join(","))
        };
        let gzip_part = if gzip { " (gzip)" } else { "" };
        self.record(format!(
            "exec_to_file {id} {env_part}{}{gzip_part}",
            argv.join(" ")
        ));

        if self.failing_dumps.iter().any(|f| f == id) {
            return Err(RuntimeError::Exec(command_failed(&argv.join(" "))));
        }
        fs::write(dest, b"dump").map_err(ExecError::from)?;
        Ok(())
    }

    fn copy_out(&self, id: &str, container_path: &str, dest: &Path) -> Result<(), RuntimeError> {
        self.record(format!("copy_out {id} {container_path} -> {}", dest.display()));
        if self.failing_dumps.iter().any(|f| f == id) {
            return Err(RuntimeError::Exec(command_failed("docker cp")));
        }
        fs::write(dest, b"rdb").map_err(ExecError::from)?;
        Ok(())
    }
}

/// [ObjectStore] recording uploaded keys.
pub(crate) struct FakeStore {
    uploads: RefCell<Vec<String>>,
    fail: bool,
}

impl FakeStore {
    pub(crate) fn new() -> Self {
        Self {
            uploads: RefCell::new(Vec::new()),
            fail: false,
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub(crate) fn uploads(&self) -> Vec<String> {
        self.uploads.borrow().clone()
    }
}

impl ObjectStore for FakeStore {
    fn put(&self, local: &Path, key: &str) -> Result<(), UploadError> {
        assert!(local.exists(), "upload of a file that was never written");
        if self.fail {
            return Err(UploadError::from(command_failed("aws s3 cp")));
        }
        self.uploads.borrow_mut().push(key.to_string());
        Ok(())
    }
}

/// [SnapshotRepo] recording the exact call order.
pub(crate) struct FakeRepo {
    calls: RefCell<Vec<String>>,
    failing_backup: Option<PathBuf>,
    failing_unlock: bool,
}

impl FakeRepo {
    pub(crate) fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            failing_backup: None,
            failing_unlock: false,
        }
    }

    pub(crate) fn failing_backup_of(mut self, path: &Path) -> Self {
        self.failing_backup = Some(path.to_path_buf());
        self
    }

    pub(crate) fn failing_unlock(mut self) -> Self {
        self.failing_unlock = true;
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl SnapshotRepo for FakeRepo {
    fn unlock(&self) -> Result<(), SnapshotError> {
        self.record("unlock".to_string());
        if self.failing_unlock {
            return Err(SnapshotError::Exec(command_failed("restic unlock")));
        }
        Ok(())
    }

    fn backup(&self, path: &Path) -> Result<(), SnapshotError> {
        self.record(format!("backup {}", path.display()));
        if self.failing_backup.as_deref() == Some(path) {
            return Err(SnapshotError::Exec(command_failed("restic backup")));
        }
        Ok(())
    }

    fn forget_and_prune(&self, keep_daily: u32, keep_weekly: u32) -> Result<(), SnapshotError> {
        self.record(format!(
            "forget --keep-daily {keep_daily} --keep-weekly {keep_weekly} --prune"
        ));
        Ok(())
    }

    fn check(&self) -> Result<(), SnapshotError> {
        self.record("check".to_string());
        Ok(())
    }
}

/// [Notifier] capturing `(subject, body)` pairs.
pub(crate) struct RecordingNotifier {
    notifications: RefCell<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub(crate) fn new() -> Self {
        Self {
            notifications: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn notifications(&self) -> Vec<(String, String)> {
        self.notifications.borrow().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, subject: &str, body: &str) {
        self.notifications
            .borrow_mut()
            .push((subject.to_string(), body.to_string()));
    }
}
