//! Readiness gates for freshly started containers.
//!
//! A container can report "running" well before its application binds its
//! sockets. A [`WaitStrategy`] blocks the caller until the container is
//! actually usable, or fails with a launch error once the startup timeout
//! passes.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                        HostPortWaitStrategy                                │
//! │                                                                            │
//! │   wait_until_ready(container)                                              │
//! │         │                                                                  │
//! │         ▼                                                                  │
//! │   ┌──────────────┐     ┌──────────────┐     ┌──────────────────────────┐  │
//! │   │ Liveness     │────▶│ Resolve      │────▶│ Build internal/external  │  │
//! │   │ ports (skip  │     │ internal     │     │ checks                   │  │
//! │   │ if empty)    │     │ ports        │     │                          │  │
//! │   └──────────────┘     └──────────────┘     └──────────────────────────┘  │
//! │                                                        │                   │
//! │                                                        ▼                   │
//! │                       ┌──────────────┐     ┌──────────────────────────┐   │
//! │                       │ Launch error │◀────│ retry_until_true         │   │
//! │                       │ (on timeout) │     │  └ RateLimiter           │   │
//! │                       └──────────────┘     │     └ internal && extern │   │
//! │                                            └──────────────────────────┘   │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod external;
pub mod host_port;
pub mod internal;
pub mod ports;
pub mod rate_limiter;
pub mod retry;

use async_trait::async_trait;

use crate::container::ContainerHandle;
use crate::error::Result;

pub use external::ExternalPortListeningCheck;
pub use host_port::HostPortWaitStrategy;
pub use internal::InternalPortListeningCheck;
pub use ports::internal_ports;
pub use rate_limiter::{LimiterKey, RateLimiter, RateLimiterRegistry};
pub use retry::retry_until_true;

/// A way of deciding that a started container is ready for use.
#[async_trait]
pub trait WaitStrategy: Send + Sync {
    /// Block until the container is ready.
    ///
    /// Returns `Ok(())` once ready. A timeout surfaces as
    /// [`crate::error::WaitError::LaunchTimeout`]; any other error aborts the
    /// wait immediately.
    async fn wait_until_ready(&self, container: &dyn ContainerHandle) -> Result<()>;
}
