//! Error types for port readiness waits.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type for wait operations.
pub type Result<T> = std::result::Result<T, WaitError>;

/// Ports rendered the way launch errors print them: `[80, 8080]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortList(pub BTreeSet<u16>);

impl fmt::Display for PortList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, port) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", port)?;
        }
        write!(f, "]")
    }
}

/// Errors that can abort a readiness wait.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The liveness ports never became reachable within the startup timeout.
    #[error("Timed out waiting for container port to open ({address} ports: {ports} should be listening)")]
    LaunchTimeout {
        /// Address the container is reachable on.
        address: String,
        /// Liveness ports that never became reachable.
        ports: PortList,
    },

    /// An exposed port has no usable host mapping.
    #[error("Port {port} cannot be mapped: {reason}")]
    PortMapping {
        /// Exposed (container-side) port.
        port: u16,
        /// Reason for failure.
        reason: String,
    },

    /// The external check hit a socket error that retrying cannot fix.
    #[error("Cannot connect to {address}:{port}: {source}")]
    Connect {
        /// Host the connection was attempted against.
        address: String,
        /// Mapped port.
        port: u16,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// The exec mechanism itself failed (e.g. the container already exited).
    #[error("Exec in container '{container}' failed: {reason}")]
    Exec {
        /// Container name.
        container: String,
        /// Reason for failure.
        reason: String,
    },

    /// The container was not running when it was inspected.
    #[error("Container '{container}' is not running (status: {status})")]
    NotRunning {
        /// Container id or name as requested.
        container: String,
        /// Docker state, e.g. `exited`.
        status: String,
    },

    /// The wait was cancelled by its owner before the container became ready.
    #[error("Wait for container '{container}' was cancelled")]
    Cancelled {
        /// Container name.
        container: String,
    },

    /// Docker API error outside of exec.
    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),
}

impl WaitError {
    /// Whether this error is the startup timeout rather than a hard failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, WaitError::LaunchTimeout { .. })
    }
}

/// Errors raised while resolving configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Environment variable {key} is not valid unicode")]
    NotUnicode { key: String },
}

/// Errors from the retry controller.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The deadline passed while the predicate was still false.
    #[error("Timed out after {0:?}")]
    TimedOut(Duration),

    /// The cancellation token fired.
    #[error("Cancelled")]
    Cancelled,

    /// The predicate itself failed; not retried.
    #[error("{0}")]
    Check(E),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_timeout_message() {
        let err = WaitError::LaunchTimeout {
            address: "127.0.0.1".to_string(),
            ports: PortList(BTreeSet::from([8080])),
        };

        assert_eq!(
            err.to_string(),
            "Timed out waiting for container port to open (127.0.0.1 ports: [8080] should be listening)"
        );
        assert!(err.is_timeout());
    }

    #[test]
    fn test_port_list_ordering() {
        let ports = PortList(BTreeSet::from([9090, 80, 443]));
        assert_eq!(ports.to_string(), "[80, 443, 9090]");
        assert_eq!(PortList(BTreeSet::new()).to_string(), "[]");
    }

    #[test]
    fn test_not_running_message() {
        let err = WaitError::NotRunning {
            container: "db".to_string(),
            status: "exited".to_string(),
        };
        assert_eq!(err.to_string(), "Container 'db' is not running (status: exited)");
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_exec_error_is_not_timeout() {
        let err = WaitError::Exec {
            container: "db".to_string(),
            reason: "exec instance not found".to_string(),
        };
        assert!(!err.is_timeout());
        assert!(err.to_string().contains("db"));
    }
}
