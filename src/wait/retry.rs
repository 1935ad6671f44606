//! Retry-until-true loop with a deadline and cooperative cancellation.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::RetryError;

/// Run `attempt` until it yields `true`.
///
/// Each iteration races the attempt against the deadline and `cancel`; an
/// attempt still in flight when the deadline passes is dropped. A `false`
/// result loops straight into the next attempt, so pacing belongs to the
/// attempt itself (see [`super::rate_limiter::RateLimiter`]).
///
/// Returns the number of attempts made on success.
pub async fn retry_until_true<F, Fut, E>(
    timeout: Duration,
    cancel: &CancellationToken,
    mut attempt: F,
) -> Result<u32, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let deadline = Instant::now() + timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            _ = tokio::time::sleep_until(deadline) => return Err(RetryError::TimedOut(timeout)),
            result = attempt() => match result {
                Ok(true) => return Ok(attempts),
                Ok(false) => {
                    tracing::trace!(attempt = attempts, "Not ready yet");
                }
                Err(e) => return Err(RetryError::Check(e)),
            },
        }
    }
}
