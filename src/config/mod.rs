//! Configuration for readiness waits.
//!
//! Values come from `PORTWAIT_*` environment variables (a `.env` file is
//! honoured by the binary) and fall back to the defaults below.

pub(crate) mod helpers;

use std::time::Duration;

use crate::config::helpers::parse_optional_env;
use crate::error::ConfigError;

/// Timing configuration for a port readiness wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitConfig {
    /// Overall deadline for the container to become reachable.
    pub startup_timeout: Duration,
    /// Minimum spacing between two readiness evaluations.
    pub min_interval: Duration,
    /// How long a negative result may be reused without re-checking.
    /// Zero disables the cache.
    pub cache_window: Duration,
    /// Per-port budget for a single external connect attempt.
    pub connect_timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            startup_timeout: Duration::from_secs(60),
            min_interval: Duration::from_secs(1),
            cache_window: Duration::ZERO,
            connect_timeout: Duration::from_secs(1),
        }
    }
}

impl WaitConfig {
    /// Resolve configuration from the environment.
    pub fn resolve() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            startup_timeout: Duration::from_secs(parse_optional_env(
                "PORTWAIT_STARTUP_TIMEOUT_SECS",
                defaults.startup_timeout.as_secs(),
            )?),
            min_interval: Duration::from_millis(parse_optional_env(
                "PORTWAIT_POLL_INTERVAL_MS",
                defaults.min_interval.as_millis() as u64,
            )?),
            cache_window: Duration::from_millis(parse_optional_env(
                "PORTWAIT_CACHE_WINDOW_MS",
                defaults.cache_window.as_millis() as u64,
            )?),
            connect_timeout: Duration::from_millis(parse_optional_env(
                "PORTWAIT_CONNECT_TIMEOUT_MS",
                defaults.connect_timeout.as_millis() as u64,
            )?),
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the invariants between the individual timings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.startup_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "PORTWAIT_STARTUP_TIMEOUT_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.min_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "PORTWAIT_POLL_INTERVAL_MS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.connect_timeout.is_zero() || self.connect_timeout >= self.startup_timeout {
            return Err(ConfigError::InvalidValue {
                key: "PORTWAIT_CONNECT_TIMEOUT_MS".to_string(),
                message: format!(
                    "must be non-zero and shorter than the startup timeout ({:?})",
                    self.startup_timeout
                ),
            });
        }
        Ok(())
    }

    /// Override the startup timeout.
    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Override the minimum interval between evaluations.
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = WaitConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.startup_timeout, Duration::from_secs(60));
        assert_eq!(config.min_interval, Duration::from_secs(1));
        assert!(config.cache_window.is_zero());
    }

    #[test]
    fn test_connect_timeout_must_be_shorter() {
        let config = WaitConfig {
            startup_timeout: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(2),
            ..Default::default()
        };

        match config.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => {
                assert_eq!(key, "PORTWAIT_CONNECT_TIMEOUT_MS");
            }
            other => panic!("Expected invalid value, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let config = WaitConfig::default().with_min_interval(Duration::ZERO);

        match config.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => {
                assert_eq!(key, "PORTWAIT_POLL_INTERVAL_MS");
            }
            other => panic!("Expected invalid value, got {:?}", other),
        }
        assert!(
            WaitConfig::default()
                .with_min_interval(Duration::from_millis(1))
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_zero_startup_timeout_rejected() {
        let config = WaitConfig::default().with_startup_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
