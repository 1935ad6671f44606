//! Throttling for readiness evaluations.
//!
//! A [`RateLimiter`] hands out at most one answer per `min_interval`. Callers
//! beyond that rate sleep until their slot. Calls go through an async mutex,
//! so several waiters sharing one limiter collapse into a single sequential
//! stream of evaluations.
//!
//! # Negative cache
//!
//! A `false` result younger than `cache_window` is handed back (still on the
//! caller's slot) without running the predicate again. Positive results are
//! never cached: a `true` is returned to exactly one caller. Keep the window
//! short (the default is zero, i.e. disabled) so a container that turns ready
//! is noticed promptly.
//!
//! # Sharing
//!
//! Limiters are created per wait by default. [`RateLimiterRegistry`] hands out
//! shared limiters keyed by `(container id, port set)`, so concurrent waits on
//! different containers never throttle each other.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

use crate::config::WaitConfig;

#[derive(Debug, Default)]
struct LimiterState {
    last_slot: Option<Instant>,
    cached_negative: Option<Instant>,
}

/// Rate limiter guarding a readiness predicate.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    cache_window: Duration,
    state: Mutex<LimiterState>,
    invocations: AtomicU32,
    cache_hits: AtomicU32,
}

impl RateLimiter {
    /// Create a limiter with the given spacing and negative cache window.
    pub fn new(min_interval: Duration, cache_window: Duration) -> Self {
        Self {
            min_interval,
            cache_window,
            state: Mutex::new(LimiterState::default()),
            invocations: AtomicU32::new(0),
            cache_hits: AtomicU32::new(0),
        }
    }

    /// Create a limiter from wait configuration.
    pub fn from_config(config: &WaitConfig) -> Self {
        Self::new(config.min_interval, config.cache_window)
    }

    /// Wait for the next slot, then evaluate `predicate` or serve a cached
    /// negative.
    pub async fn get_when_ready<F, Fut, E>(&self, predicate: F) -> Result<bool, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<bool, E>>,
    {
        let mut state = self.state.lock().await;

        if let Some(last) = state.last_slot {
            tokio::time::sleep_until(last + self.min_interval).await;
        }
        state.last_slot = Some(Instant::now());

        if let Some(at) = state.cached_negative
            && at.elapsed() < self.cache_window
        {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        }

        self.invocations.fetch_add(1, Ordering::Relaxed);

        let ready = predicate().await?;
        state.cached_negative = if ready { None } else { Some(Instant::now()) };
        Ok(ready)
    }

    /// Number of times the predicate actually ran.
    pub fn invocations(&self) -> u32 {
        self.invocations.load(Ordering::Relaxed)
    }

    /// Number of calls answered from the negative cache.
    pub fn cache_hits(&self) -> u32 {
        self.cache_hits.load(Ordering::Relaxed)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::from_config(&WaitConfig::default())
    }
}

/// Identity of a shared limiter: container id plus the ports being awaited.
pub type LimiterKey = (String, BTreeSet<u16>);

/// Keyed store of shared limiters.
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    limiters: RwLock<HashMap<LimiterKey, Arc<RateLimiter>>>,
}

impl RateLimiterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limiter for a (container, ports) pair, created on first use.
    pub async fn limiter_for(
        &self,
        container_id: &str,
        ports: &BTreeSet<u16>,
        config: &WaitConfig,
    ) -> Arc<RateLimiter> {
        let key = (container_id.to_string(), ports.clone());

        if let Some(limiter) = self.limiters.read().await.get(&key) {
            return Arc::clone(limiter);
        }

        let mut limiters = self.limiters.write().await;
        Arc::clone(
            limiters
                .entry(key)
                .or_insert_with(|| Arc::new(RateLimiter::from_config(config))),
        )
    }

    /// Drop the limiter for a (container, ports) pair.
    pub async fn clear(&self, container_id: &str, ports: &BTreeSet<u16>) {
        let key = (container_id.to_string(), ports.clone());
        self.limiters.write().await.remove(&key);
    }

    /// Drop every limiter, e.g. after the containers were removed.
    pub async fn clear_all(&self) {
        self.limiters.write().await.clear();
    }

    /// Check if no limiters are held.
    pub async fn is_empty(&self) -> bool {
        self.limiters.read().await.is_empty()
    }

    /// Number of live limiters.
    pub async fn len(&self) -> usize {
        self.limiters.read().await.len()
    }
}
