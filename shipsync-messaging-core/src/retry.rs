//! Bounded exponential backoff shared by the publisher and broker connects.
//!
//! Five attempts, starting at two seconds and doubling up to a thirty second
//! cap, then the last error is handed back to the caller.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Wait after the first failure; doubles on each retry.
    pub initial_backoff: Duration,
    /// Cap on a single wait.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Wait applied after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .checked_mul(1u32 << exponent)
            .map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }

    /// Sum of all waits when every attempt fails.
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_attempts).map(|a| self.backoff_for(a)).sum()
    }
}

/// Run `operation` until it succeeds, returns a non-retryable error, or the
/// policy is exhausted.
pub async fn retry_with_backoff<F, Fut, T, E, R>(
    mut operation: F,
    policy: &RetryPolicy,
    context: &str,
    is_retryable: R,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    R: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(context = %context, attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) if attempt >= policy.max_attempts => {
                error!(
                    context = %context,
                    attempts = attempt,
                    error = %e,
                    "operation failed after max retries"
                );
                return Err(e);
            }
            Err(e) => {
                let backoff = policy.backoff_for(attempt);
                warn!(
                    context = %context,
                    attempt,
                    max_attempts = policy.max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "operation failed, retrying with backoff"
                );
                sleep(backoff).await;
            }
        }
    }
}
