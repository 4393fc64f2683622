//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap one outbound call with a deadline
//! - Cancel the in-flight future cleanly when it fires
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - Timeout errors are distinct from other errors
//! - Only the wrapped call is cancelled; surrounding retry loops keep going

use std::future::Future;
use std::time::Duration;

use crate::error::{DispatchError, DispatchResult};

/// Run `future` with a deadline, mapping expiry to [`DispatchError::Timeout`].
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> DispatchResult<T>
where
    F: Future<Output = DispatchResult<T>>,
{
    match tokio::time::timeout(duration, future).await {
        Ok(result) => result,
        Err(_) => Err(DispatchError::Timeout(duration.as_millis() as u64)),
    }
}
