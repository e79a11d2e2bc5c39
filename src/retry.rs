//! Retry Controller
//!
//! Wraps a single generation attempt with bounded retry. Only transient
//! errors (rate limits, network failures, transient status messages) are
//! retried; a provider-supplied delay hint takes precedence over the
//! exponential backoff schedule.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

/// Retry policy for a single credential's generation attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: usize,
    /// Backoff base; doubles per attempt.
    pub base_delay: Duration,
    /// Cap applied to both computed backoff and provider hints.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Immediate retries, for tests and inline execution paths.
    pub fn immediate(max_attempts: usize) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    fn backoff(&self, attempt: usize) -> Duration {
        // attempt is 1-based; exponent capped to keep the shift sane
        let exponent = (attempt - 1).min(20) as u32;
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run `attempt_fn` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is exhausted. The last error is surfaced unchanged.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut attempt_fn: F) -> Result<T, PipelineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PipelineError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1usize;
    loop {
        match attempt_fn().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if !err.is_transient() || attempt >= max_attempts {
                    return Err(err);
                }
                let delay = err
                    .retry_after()
                    .unwrap_or_else(|| policy.backoff(attempt))
                    .min(policy.max_delay);
                debug!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
