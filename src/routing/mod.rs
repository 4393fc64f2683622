//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! dispatch(operation, action, payload)
//!     → settings (resolve candidates, drop disabled/unconfigured)
//!     → key.rs (cache key) → cache lookup
//!     → router.rs, for each candidate in order:
//!         breaker.execute(endpoint key,
//!             retry_with_backoff(transport.call(candidate, envelope)))
//!         success → cache set, ledger record, return
//!         failure → ledger record, next candidate
//!     → all exhausted: structured failure, final ledger record
//! ```
//!
//! # Design Decisions
//! - First success wins; candidate order is configuration, not heuristics
//! - Breaker sits outside the retry loop: one logical failure per chain step
//! - `HEALTH_CHECK` checks each candidate on its own and never touches the cache
//! - Single-flight is opt-in

pub mod key;
pub mod router;

pub use key::cache_key;
pub use router::{
    DispatchResponse, Dispatched, FallbackRouter, RouterSettings, HEALTH_CHECK_ACTION,
};
