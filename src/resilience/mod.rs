//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Candidate call from the router:
//!     → circuit_breaker.rs (fail fast if OPEN, admit one probe if HALF_OPEN)
//!     → retries.rs (retry retryable errors, delays from backoff.rs)
//!     → timeouts.rs (deadline on every transport call)
//!     → Outcome recorded once per breaker execute, not per attempt
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - A timeout cancels one attempt, not the retry loop
//! - Failure count never decays while CLOSED; only probe success resets it
//! - Breaker state lives in a concurrent map keyed by endpoint key

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use circuit_breaker::{BreakerRegistry, BreakerSettings, CircuitSnapshot, CircuitState};
pub use retries::{retry_with_backoff, RetryPolicy};
pub use timeouts::with_timeout;
