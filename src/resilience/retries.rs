//! Retry logic.
//!
//! # Responsibilities
//! - Re-run a failing async operation up to `max_retries` times in total
//! - Sleep an exponentially growing delay between attempts
//! - Hand back the last error unchanged once attempts are spent
//!
//! # Design Decisions
//! - Non-retryable errors are returned immediately
//! - Per-call timeouts belong to the operation; a timeout is an ordinary failure here

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::DispatchResult;
use crate::observability::metrics;
use crate::resilience::backoff::calculate_backoff;

/// Backoff parameters for [`retry_with_backoff`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, first call included. Zero behaves as one.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            multiplier: config.multiplier,
            jitter_ratio: config.jitter_ratio,
        }
    }
}

/// Run `operation` until it succeeds or the policy's attempts are spent.
///
/// `label` only feeds logs and metrics.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> DispatchResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DispatchResult<T>>,
{
    let max_attempts = policy.max_retries.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(target_key = %label, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if attempt >= max_attempts || !err.is_retryable() {
                    return Err(err);
                }

                let delay = calculate_backoff(attempt - 1, policy);
                tracing::warn!(
                    target_key = %label,
                    attempt,
                    max_attempts,
                    delay = ?delay,
                    error = %err,
                    "Attempt failed, retrying"
                );
                metrics::record_retry(label);
                tokio::time::sleep(delay).await;
            }
        }
    }
}
