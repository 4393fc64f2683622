//! Response caching subsystem.
//!
//! # Data Flow
//! ```text
//! dispatch(operation, action, payload)
//!     → routing/key.rs (operation-prefixed cache key)
//!     → ResponseCache::get (expired entries evicted on read)
//!     → on miss: fallback chain runs, ResponseCache::set on success
//! ```
//!
//! # Design Decisions
//! - In-memory and process-local, no cross-process consistency
//! - Expiry is checked lazily on read; `purge_expired` is housekeeping only
//! - Keys are prefixed with the operation key so one operation can be invalidated
//! - The router depends on the trait so tests can observe every cache call

pub mod ttl;

use serde_json::Value;
use std::time::Duration;

pub use ttl::{CacheEntry, TtlCache};

/// Cache interface used by the router.
pub trait ResponseCache: Send + Sync {
    /// Return the value for `key`, or `None` if absent or expired.
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` under `key`. `None` uses the cache's default TTL.
    fn set(&self, key: &str, value: Value, ttl: Option<Duration>);

    /// Drop entries whose key starts with `prefix`, or everything for `None`.
    /// Returns the number of removed entries.
    fn invalidate(&self, prefix: Option<&str>) -> usize;

    /// Number of stored entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    fn clear(&self) {
        self.invalidate(None);
    }
}
