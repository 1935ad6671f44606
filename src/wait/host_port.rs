//! Wait strategy that gates on container ports accepting connections.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::WaitConfig;
use crate::container::ContainerHandle;
use crate::error::{PortList, Result, RetryError, WaitError};
use crate::wait::WaitStrategy;
use crate::wait::external::ExternalPortListeningCheck;
use crate::wait::internal::InternalPortListeningCheck;
use crate::wait::ports::internal_ports;
use crate::wait::rate_limiter::RateLimiter;
use crate::wait::retry::retry_until_true;

/// Waits until every liveness port listens inside the container and accepts
/// TCP connections from the host.
pub struct HostPortWaitStrategy {
    config: WaitConfig,
    rate_limiter: Option<Arc<RateLimiter>>,
    cancel: CancellationToken,
}

impl HostPortWaitStrategy {
    /// Create a strategy with default timings.
    pub fn new() -> Self {
        Self::with_config(WaitConfig::default())
    }

    /// Create a strategy with explicit timings.
    pub fn with_config(config: WaitConfig) -> Self {
        Self {
            config,
            rate_limiter: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Set the overall startup timeout.
    pub fn with_startup_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.startup_timeout = timeout;
        self
    }

    /// Evaluate through a shared limiter instead of a fresh one per wait.
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Abort the wait when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Get the configuration.
    pub fn config(&self) -> &WaitConfig {
        &self.config
    }
}

impl Default for HostPortWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WaitStrategy for HostPortWaitStrategy {
    async fn wait_until_ready(&self, container: &dyn ContainerHandle) -> Result<()> {
        let liveness: BTreeSet<u16> = container.liveness_check_ports();
        if liveness.is_empty() {
            tracing::debug!(
                "Liveness check ports of {} is empty. Not waiting.",
                container.name()
            );
            return Ok(());
        }

        let exposed = container.exposed_ports();
        let internal = internal_ports(&liveness, &exposed, |p| container.mapped_port(p))?;
        if internal.is_empty() {
            tracing::warn!(
                "No exposed port of {} maps to {}; only host-side connects gate readiness",
                container.name(),
                PortList(liveness.clone())
            );
        }

        tracing::debug!(
            container = container.name(),
            liveness = ?liveness,
            internal = ?internal,
            "Waiting for ports"
        );

        let internal_check = InternalPortListeningCheck::new(container, internal);
        let external_check = ExternalPortListeningCheck::new(
            container.host(),
            liveness.clone(),
            self.config.connect_timeout,
        );
        let limiter = self
            .rate_limiter
            .clone()
            .unwrap_or_else(|| Arc::new(RateLimiter::from_config(&self.config)));

        let internal_check = &internal_check;
        let external_check = &external_check;
        let limiter = limiter.as_ref();

        let result = retry_until_true(self.config.startup_timeout, &self.cancel, move || {
            limiter.get_when_ready(move || async move {
                Ok::<_, WaitError>(internal_check.call().await? && external_check.call().await?)
            })
        })
        .await;

        match result {
            Ok(attempts) => {
                tracing::info!(
                    "Container '{}' listening on {} after {} attempt(s)",
                    container.name(),
                    PortList(liveness),
                    attempts
                );
                Ok(())
            }
            Err(RetryError::TimedOut(_)) => Err(WaitError::LaunchTimeout {
                address: container.host().to_string(),
                ports: PortList(liveness),
            }),
            Err(RetryError::Cancelled) => Err(WaitError::Cancelled {
                container: container.name().to_string(),
            }),
            Err(RetryError::Check(e)) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use tokio::net::TcpListener;
    use tokio::time::Instant;

    use crate::testing::StubContainer;

    fn fast_config() -> WaitConfig {
        WaitConfig {
            startup_timeout: Duration::from_secs(2),
            min_interval: Duration::from_millis(20),
            cache_window: Duration::ZERO,
            connect_timeout: Duration::from_millis(200),
        }
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_liveness_ports_skips_checks() {
        let container = StubContainer::new().with_unmapped_port(80);
        let start = Instant::now();

        HostPortWaitStrategy::new()
            .wait_until_ready(&container)
            .await
            .unwrap();

        assert_eq!(container.exec_calls(), 0);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_ready_on_first_attempt() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let container = StubContainer::new().with_port(80, port).with_listening(&[80]);
        let limiter = Arc::new(RateLimiter::from_config(&fast_config()));

        let strategy =
            HostPortWaitStrategy::with_config(fast_config()).with_rate_limiter(limiter.clone());
        let start = Instant::now();
        strategy.wait_until_ready(&container).await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(limiter.invocations(), 1);
        assert_eq!(container.exec_calls(), 1);
    }

    #[tokio::test]
    async fn test_internal_ready_on_second_attempt() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let container = StubContainer::new()
            .with_port(80, port)
            .with_listening(&[])
            .with_listening(&[80]);

        HostPortWaitStrategy::with_config(fast_config())
            .wait_until_ready(&container)
            .await
            .unwrap();

        assert_eq!(container.exec_calls(), 2);
    }

    #[tokio::test]
    async fn test_internal_only_does_not_succeed() {
        let port = closed_port().await;
        let container = StubContainer::new().with_port(80, port).with_listening(&[80]);
        let config = fast_config().with_startup_timeout(Duration::from_millis(300));

        let err = HostPortWaitStrategy::with_config(config)
            .wait_until_ready(&container)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_external_only_does_not_succeed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let container = StubContainer::new().with_port(80, port).with_listening(&[]);
        let config = fast_config().with_startup_timeout(Duration::from_millis(300));

        let err = HostPortWaitStrategy::with_config(config)
            .wait_until_ready(&container)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(container.exec_calls() > 1);
    }

    #[tokio::test]
    async fn test_succeeds_only_once_both_agree() {
        let port = closed_port().await;
        let container = StubContainer::new().with_port(80, port).with_listening(&[80]);

        let opener = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            TcpListener::bind(("127.0.0.1", port)).await.unwrap()
        });

        let start = Instant::now();
        HostPortWaitStrategy::with_config(fast_config())
            .wait_until_ready(&container)
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(200));
        drop(opener.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_address_and_ports() {
        let container = StubContainer::new().with_port(80, 8080).with_listening(&[]);
        let config = WaitConfig {
            startup_timeout: Duration::from_secs(5),
            min_interval: Duration::from_secs(1),
            cache_window: Duration::ZERO,
            connect_timeout: Duration::from_secs(1),
        };
        let limiter = Arc::new(RateLimiter::from_config(&config));
        let start = Instant::now();

        let err = HostPortWaitStrategy::with_config(config)
            .with_rate_limiter(limiter.clone())
            .wait_until_ready(&container)
            .await
            .unwrap_err();

        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(6));
        let message = err.to_string();
        assert!(message.contains("127.0.0.1"), "{message}");
        assert!(message.contains("8080"), "{message}");
        assert!(limiter.invocations() <= 6, "{} invocations", limiter.invocations());
        assert!(limiter.invocations() >= 4, "{} invocations", limiter.invocations());
    }

    #[tokio::test(start_paused = true)]
    async fn test_exec_failure_aborts_immediately() {
        let container = StubContainer::new()
            .with_port(80, 8080)
            .with_exec_error("container is not running");

        let err = HostPortWaitStrategy::with_config(fast_config())
            .wait_until_ready(&container)
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::Exec { .. }));
        assert_eq!(container.exec_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmapped_exposed_port_is_config_error() {
        let container = StubContainer::new()
            .with_port(80, 8080)
            .with_unmapped_port(9000);

        let err = HostPortWaitStrategy::with_config(fast_config())
            .wait_until_ready(&container)
            .await
            .unwrap_err();

        assert!(matches!(err, WaitError::PortMapping { port: 9000, .. }));
        assert_eq!(container.exec_calls(), 0);
    }

    #[tokio::test]
    async fn test_liveness_port_without_exposed_counterpart() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let container = StubContainer::new()
            .with_port(80, 8080)
            .with_liveness_ports([port])
            .with_listening(&[]);

        HostPortWaitStrategy::with_config(fast_config())
            .wait_until_ready(&container)
            .await
            .unwrap();

        assert_eq!(container.exec_calls(), 0);
    }

    #[tokio::test]
    async fn test_liveness_port_without_exposed_counterpart_still_needs_host() {
        let port = closed_port().await;
        let container = StubContainer::new()
            .with_port(80, 8080)
            .with_liveness_ports([port]);
        let config = fast_config().with_startup_timeout(Duration::from_millis(300));

        let err = HostPortWaitStrategy::with_config(config)
            .wait_until_ready(&container)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(container.exec_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation() {
        let container = StubContainer::new()
            .with_name("slow")
            .with_port(80, 8080)
            .with_listening(&[]);
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let err = HostPortWaitStrategy::with_config(fast_config())
            .with_cancellation(token)
            .wait_until_ready(&container)
            .await
            .unwrap_err();

        match err {
            WaitError::Cancelled { container } => assert_eq!(container, "slow"),
            other => panic!("Expected cancellation, got {:?}", other),
        }
    }
}
