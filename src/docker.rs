//! Interaction with the container runtime through the docker CLI.

use std::collections::BTreeMap;
use std::path::Path;

use derive_more::{Display, Error, From};
use serde::Deserialize;

use crate::exec::{Cmd, Exec, ExecError};

#[derive(Debug, Display, Error, From)]
/// Failure while talking to the container runtime.
pub enum RuntimeError {
    /// A docker invocation failed.
    #[from]
    Exec(ExecError),

    /// `docker ps` returned a line that is not valid JSON.
    #[display("unparsable container listing: {_0}")]
    Listing(serde_json::Error),
}

/// A running container as reported by discovery.
///
/// Transient: only valid for the run in which it was listed.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Container {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "Image")]
    pub image: String,
    #[serde(rename = "Names")]
    pub name: String,
}

/// Environment of one container, normalized so that lookups are explicit.
///
/// Variables with empty values are dropped while parsing: the engine images
/// this tool targets treat an empty `*_DATABASE`/`*_USER` the same as an
/// unset one, so emptiness is folded into absence up front instead of being
/// re-checked at every lookup site.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerEnv(BTreeMap<String, String>);

impl ContainerEnv {
    /// Parses `docker exec <id> env` output.
    pub fn parse(env_output: &str) -> Self {
        let vars = env_output
            .lines()
            .filter_map(|line| line.split_once('='))
            .filter(|(_, value)| !value.is_empty())
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Self(vars)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// First present variable of the fallback chain, else `default`.
    pub fn first_of<'a>(&'a self, keys: &[&str], default: &'a str) -> &'a str {
        keys.iter()
            .find_map(|key| self.get(key))
            .unwrap_or(default)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for ContainerEnv {
    fn from(vars: [(&str, &str); N]) -> Self {
        Self(
            vars.into_iter()
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

/// Seam to the container runtime.
///
/// The dump providers and the database pipeline only ever see this trait;
/// tests substitute an in-memory runtime.
pub trait ContainerRuntime {
    /// Lists all currently running containers.
    fn list_running(&self) -> Result<Vec<Container>, RuntimeError>;

    /// Environment of the container, normalized per [ContainerEnv].
    fn environment(&self, id: &str) -> Result<ContainerEnv, RuntimeError>;

    /// Command line of the container's PID 1, or [None] if it cannot be read.
    fn main_process(&self, id: &str) -> Option<String>;

    /// Runs a command inside the container and returns its stdout.
    ///
    /// `env` pairs are scoped to this single invocation.
    fn exec(
        &self,
        id: &str,
        argv: &[&str],
        env: &[(&str, &str)],
    ) -> Result<String, RuntimeError>;

    /// Existence probe inside the container; failure is an absent result.
    fn exec_probe(&self, id: &str, argv: &[&str]) -> Option<String>;

    /// Runs a command inside the container, streaming its stdout to `dest`.
    fn exec_to_file(
        &self,
        id: &str,
        argv: &[&str],
        env: &[(&str, &str)],
        dest: &Path,
        gzip: bool,
    ) -> Result<(), RuntimeError>;

    /// Copies a file out of the container's filesystem to `dest`.
    fn copy_out(&self, id: &str, container_path: &str, dest: &Path) -> Result<(), RuntimeError>;
}

/// [ContainerRuntime] backed by the `docker` command line client.
#[derive(Debug, Clone, Copy)]
pub struct DockerCli {
    exec: Exec,
}

impl DockerCli {
    pub fn new(exec: Exec) -> Self {
        Self { exec }
    }

    /// `docker exec`, with `env` rendered as `-e` flags.
    fn exec_cmd(id: &str, argv: &[&str], env: &[(&str, &str)]) -> Cmd {
        let mut cmd = Cmd::new("docker").arg("exec");
        for (key, value) in env {
            cmd = cmd.arg("-e").arg(format!("{key}={value}"));
        }
        cmd.arg(id).args(argv.iter().copied())
    }
}

impl ContainerRuntime for DockerCli {
    fn list_running(&self) -> Result<Vec<Container>, RuntimeError> {
        let listing = self.exec.run(
            &Cmd::new("docker")
                .arg("ps")
                .arg("--format")
                .arg("{{json .}}"),
        )?;

        listing
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(RuntimeError::Listing))
            .collect()
    }

    fn environment(&self, id: &str) -> Result<ContainerEnv, RuntimeError> {
        let env_output = self.exec(id, &["env"], &[])?;
        Ok(ContainerEnv::parse(&env_output))
    }

    fn main_process(&self, id: &str) -> Option<String> {
        // argv of PID 1 is NUL separated
        let cmdline = self.exec_probe(id, &["cat", "/proc/1/cmdline"])?;
        Some(cmdline.replace('\0', " ").trim().to_string())
    }

    fn exec(
        &self,
        id: &str,
        argv: &[&str],
        env: &[(&str, &str)],
    ) -> Result<String, RuntimeError> {
        Ok(self.exec.run(&Self::exec_cmd(id, argv, env))?)
    }

    fn exec_probe(&self, id: &str, argv: &[&str]) -> Option<String> {
        self.exec.run_probe(&Self::exec_cmd(id, argv, &[]))
    }

    fn exec_to_file(
        &self,
        id: &str,
        argv: &[&str],
        env: &[(&str, &str)],
        dest: &Path,
        gzip: bool,
    ) -> Result<(), RuntimeError> {
        Ok(self
            .exec
            .run_to_file(&Self::exec_cmd(id, argv, env), dest, gzip)?)
    }

    fn copy_out(&self, id: &str, container_path: &str, dest: &Path) -> Result<(), RuntimeError> {
        self.exec.run(
            &Cmd::new("docker")
                .arg("cp")
                .arg(format!("{id}:{container_path}"))
                .arg(dest.display().to_string()),
        )?;
        Ok(())
    }
}
