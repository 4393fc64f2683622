//! Exponential backoff with optional jitter.

use rand::Rng;
use std::time::Duration;

use crate::resilience::retries::RetryPolicy;

/// Delay to wait after the failed attempt with zero-based index `attempt`.
///
/// `min(initial_delay * multiplier^attempt, max_delay)`, plus up to
/// `jitter_ratio` of that value drawn at random.
pub fn calculate_backoff(attempt: u32, policy: &RetryPolicy) -> Duration {
    if policy.initial_delay.is_zero() {
        return Duration::ZERO;
    }

    let initial_ms = policy.initial_delay.as_millis() as f64;
    let max_ms = policy.max_delay.as_millis() as f64;

    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let delay_ms = (initial_ms * policy.multiplier.powi(exponent)).min(max_ms);
    // powi overflows to inf for large attempts; min() folds that into max_ms.
    let capped_ms = if delay_ms.is_finite() { delay_ms.max(0.0) as u64 } else { max_ms as u64 };

    let jitter_range = (capped_ms as f64 * policy.jitter_ratio) as u64;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_ms + jitter)
}
