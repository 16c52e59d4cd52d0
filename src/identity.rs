//! Stable per-host identity used to namespace all remote paths.

use std::fs;
use std::io;

use derive_more::{Display, Error, From};

use crate::exec::{Cmd, Exec, ExecError};

const MACHINE_ID_PATH: &str = "/etc/machine-id";

#[derive(Debug, Display, Error, From)]
/// Failure while resolving the server identity.
pub enum IdentityError {
    /// Running `hostname` failed.
    #[from]
    Hostname(ExecError),

    /// The machine id file could not be read.
    #[display("unable to read /etc/machine-id: {_0}")]
    MachineId(io::Error),
}

/// `{hostname}-{machine-id}`, detected once per run.
///
/// Both inputs are stable across reboots, so artifact and snapshot addressing
/// stays identical between runs on the same host.
#[derive(Debug, Clone, Display, PartialEq, Eq)]
#[display("{_0}")]
pub struct ServerIdentity(String);

impl ServerIdentity {
    pub fn detect(exec: &Exec) -> Result<Self, IdentityError> {
        let hostname = exec.run(&Cmd::new("hostname"))?;
        let machine_id =
            fs::read_to_string(MACHINE_ID_PATH).map_err(IdentityError::MachineId)?;
        Ok(Self::from_parts(&hostname, machine_id.trim()))
    }

    pub fn from_parts(hostname: &str, machine_id: &str) -> Self {
        Self(format!("{hostname}-{machine_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
