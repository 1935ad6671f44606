//! Port readiness gate for freshly started containers.
//!
//! A container runtime reports a container as running before the process
//! inside has bound its sockets. [`wait::HostPortWaitStrategy`] closes that
//! gap by checking, from inside the container and from the host, that every
//! liveness port is listening before handing control back to the caller.

pub mod config;
pub mod container;
pub mod error;
pub mod testing;
pub mod wait;

pub use config::WaitConfig;
pub use container::{ContainerHandle, DockerContainer, ExecResult};
pub use error::{ConfigError, WaitError};
pub use wait::{HostPortWaitStrategy, WaitStrategy};
