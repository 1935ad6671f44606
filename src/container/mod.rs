//! Container handle abstraction consumed by wait strategies.
//!
//! A wait strategy never starts or stops containers. It only needs to read a
//! started container's port bookkeeping and run diagnostic commands inside
//! it. [`ContainerHandle`] is that seam. [`docker::DockerContainer`] implements
//! it against a live Docker daemon, and `crate::testing::StubContainer`
//! implements it for tests.

pub mod docker;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::Result;

pub use docker::{DockerContainer, connect_docker};

/// Output of a command executed inside a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Exit code, `None` if the runtime did not report one.
    pub exit_code: Option<i64>,
    /// Standard output.
    pub stdout: String,
    /// Standard error.
    pub stderr: String,
}

impl ExecResult {
    /// Whether the command exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Read-only view of a started container.
#[async_trait]
pub trait ContainerHandle: Send + Sync {
    /// Runtime identifier of the container.
    fn id(&self) -> &str;

    /// Human-readable container name.
    fn name(&self) -> &str;

    /// Host address the mapped ports are reachable on.
    fn host(&self) -> &str;

    /// Every port the container declares, in declaration order.
    fn exposed_ports(&self) -> Vec<u16>;

    /// Host port bound to the given exposed port.
    fn mapped_port(&self, exposed: u16) -> Result<u16>;

    /// Ports (host side) that must accept connections before the container
    /// counts as ready.
    fn liveness_check_ports(&self) -> BTreeSet<u16>;

    /// Execute a command inside the container's namespace.
    ///
    /// A non-zero exit is reported through [`ExecResult`]. `Err` is reserved
    /// for the exec mechanism itself failing.
    async fn exec(&self, cmd: &[&str]) -> Result<ExecResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_result_success() {
        let ok = ExecResult {
            exit_code: Some(0),
            ..Default::default()
        };
        let failed = ExecResult {
            exit_code: Some(1),
            ..Default::default()
        };
        let unknown = ExecResult::default();

        assert!(ok.success());
        assert!(!failed.success());
        assert!(!unknown.success());
    }
}
