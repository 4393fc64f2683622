//! Process-local TTL cache for dispatch responses.

use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::cache::ResponseCache;
use crate::observability::metrics;

/// A cached value with the time it was stored and its time-to-live.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Value,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    /// An entry is expired once `now - stored_at >= ttl`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) >= self.ttl
    }
}

/// Thread-safe TTL cache.
///
/// Cloning shares the underlying map.
#[derive(Clone, Debug)]
pub struct TtlCache {
    inner: Arc<DashMap<String, CacheEntry>>,
    default_ttl: Duration,
}

impl TtlCache {
    /// Create an empty cache with the given default TTL.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            default_ttl,
        }
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.len();
        self.inner.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.inner.len());
        if removed > 0 {
            tracing::debug!(removed, "Purged expired cache entries");
            metrics::record_cache_size(self.inner.len());
        }
        removed
    }

    /// Purge expired entries every `interval` until shutdown.
    pub async fn run_purge(self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.purge_expired();
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Cache purge task stopping");
                    break;
                }
            }
        }
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl ResponseCache for TtlCache {
    fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let expired = match self.inner.get(key) {
            Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            // Re-check under the shard lock so a concurrent fresh `set` survives.
            self.inner.remove_if(key, |_, entry| entry.is_expired(Instant::now()));
            tracing::trace!(key = %key, "Evicted expired cache entry");
            metrics::record_cache_size(self.inner.len());
        }
        None
    }

    fn set(&self, key: &str, value: Value, ttl: Option<Duration>) {
        let entry = CacheEntry {
            value,
            stored_at: Instant::now(),
            ttl: ttl.unwrap_or(self.default_ttl),
        };
        self.inner.insert(key.to_string(), entry);
        metrics::record_cache_size(self.inner.len());
    }

    fn invalidate(&self, prefix: Option<&str>) -> usize {
        let before = self.inner.len();
        match prefix {
            Some(prefix) => self.inner.retain(|key, _| !key.starts_with(prefix)),
            None => self.inner.clear(),
        }
        let removed = before.saturating_sub(self.inner.len());
        tracing::info!(prefix = ?prefix, removed, "Cache invalidated");
        metrics::record_cache_size(self.inner.len());
        removed
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
