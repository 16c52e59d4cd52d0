//! Library to back up the stateful services of a single container host.
//!
//! Two independent pipelines run per invocation: [`pipelines::databases`]
//! dumps every recognized database container to an object store, and
//! [`pipelines::volumes`] snapshots the host's persistent volumes into a
//! [restic] repository with retention pruning.
//!
//! Every external program is driven through the [`exec`] module; the
//! [`docker`], [`store`] and [`restic`] modules only describe *which*
//! commands to run.
//!
//! [restic]: https://restic.net/

#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod docker;
pub mod exec;
pub mod identity;
pub mod pipelines;
pub mod providers;
pub mod report;
pub mod restic;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
