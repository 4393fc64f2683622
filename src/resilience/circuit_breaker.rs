//! Circuit breaker for endpoint protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: endpoint assumed down, calls fail fast
//! - Half-Open: one probe call tests whether the endpoint recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= threshold
//! Open → Half-Open: execute() after reset timeout since the last failure
//! Half-Open → Closed: probe succeeds (failure_count reset to 0)
//! Half-Open → Open: probe fails
//! ```
//!
//! # Design Decisions
//! - Per-endpoint-key circuits, created lazily on first execute()
//! - Fail fast in Open state: the wrapped operation is never invoked
//! - Single probe in Half-Open; concurrent callers are rejected meanwhile
//! - No decay of failure_count while Closed; only probe recovery clears it
//! - Errors are tracked, never swallowed or rewritten

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::observability::metrics;

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Failure tracking for one endpoint key.
#[derive(Debug, Clone)]
pub struct CircuitStats {
    pub failure_count: u32,
    pub last_failure: Option<Instant>,
    pub state: CircuitState,
    probe_in_flight: bool,
}

impl CircuitStats {
    fn new() -> Self {
        Self {
            failure_count: 0,
            last_failure: None,
            state: CircuitState::Closed,
            probe_in_flight: false,
        }
    }
}

/// Read-only view of one circuit, for monitoring.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitSnapshot {
    pub key: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_ago_ms: Option<u64>,
}

/// Breaker thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self::from(&CircuitBreakerConfig::default())
    }
}

impl From<&CircuitBreakerConfig> for BreakerSettings {
    fn from(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold.max(1),
            reset_timeout: Duration::from_secs(config.reset_timeout_secs),
        }
    }
}

/// Registry of circuits keyed by endpoint key.
///
/// Cloning shares the underlying circuits.
#[derive(Debug, Clone)]
pub struct BreakerRegistry {
    circuits: Arc<DashMap<String, CircuitStats>>,
    settings: BreakerSettings,
}

impl BreakerRegistry {
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            circuits: Arc::new(DashMap::new()),
            settings,
        }
    }

    /// Run `operation` under the circuit for `key`.
    ///
    /// Returns the operation's result unchanged, or `CircuitOpen` without
    /// invoking it when the circuit rejects the call.
    pub async fn execute<F, Fut, T>(&self, key: &str, operation: F) -> DispatchResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DispatchResult<T>>,
    {
        let mut attempt = self.acquire(key)?;
        let result = operation().await;
        match &result {
            Ok(_) => attempt.succeeded(),
            Err(err) => attempt.failed(err),
        }
        result
    }

    /// Delete the circuit for `key`. Returns true if it existed.
    pub fn reset(&self, key: &str) -> bool {
        let existed = self.circuits.remove(key).is_some();
        if existed {
            tracing::info!(circuit = %key, "Circuit reset");
            metrics::record_breaker_state(key, CircuitState::Closed);
        }
        existed
    }

    /// Current state of `key`, if the circuit exists.
    pub fn state(&self, key: &str) -> Option<CircuitState> {
        self.circuits.get(key).map(|s| s.state)
    }

    /// Copy of the stats for `key`, if the circuit exists.
    pub fn stats(&self, key: &str) -> Option<CircuitStats> {
        self.circuits.get(key).map(|s| s.value().clone())
    }

    /// Snapshot of every circuit, sorted by key.
    pub fn snapshot(&self) -> Vec<CircuitSnapshot> {
        let now = Instant::now();
        let mut circuits: Vec<CircuitSnapshot> = self
            .circuits
            .iter()
            .map(|r| CircuitSnapshot {
                key: r.key().clone(),
                state: r.state,
                failure_count: r.failure_count,
                last_failure_ago_ms: r
                    .last_failure
                    .map(|t| now.saturating_duration_since(t).as_millis() as u64),
            })
            .collect();
        circuits.sort_by(|a, b| a.key.cmp(&b.key));
        circuits
    }

    /// Decide whether a call may proceed, moving Open → Half-Open when due.
    fn acquire<'a>(&'a self, key: &'a str) -> DispatchResult<Attempt<'a>> {
        let now = Instant::now();
        let mut entry = self
            .circuits
            .entry(key.to_string())
            .or_insert_with(CircuitStats::new);
        let stats = entry.value_mut();

        match stats.state {
            CircuitState::Closed => Ok(Attempt::new(self, key, false)),
            CircuitState::Open => {
                let elapsed = stats
                    .last_failure
                    .map(|t| now.saturating_duration_since(t))
                    .unwrap_or(Duration::MAX);

                if elapsed > self.settings.reset_timeout {
                    stats.state = CircuitState::HalfOpen;
                    stats.probe_in_flight = true;
                    drop(entry);
                    self.transitioned(key, CircuitState::Open, CircuitState::HalfOpen);
                    Ok(Attempt::new(self, key, true))
                } else {
                    let remaining = self.settings.reset_timeout.saturating_sub(elapsed);
                    tracing::debug!(
                        circuit = %key,
                        remaining_ms = %remaining.as_millis(),
                        "Circuit open, call rejected"
                    );
                    Err(DispatchError::CircuitOpen {
                        key: key.to_string(),
                        retry_in_ms: remaining.as_millis() as u64,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if stats.probe_in_flight {
                    tracing::debug!(circuit = %key, "Probe in flight, call rejected");
                    Err(DispatchError::CircuitOpen {
                        key: key.to_string(),
                        retry_in_ms: 0,
                    })
                } else {
                    stats.probe_in_flight = true;
                    Ok(Attempt::new(self, key, true))
                }
            }
        }
    }

    fn record_success(&self, key: &str, probe: bool) {
        let transition = match self.circuits.get_mut(key) {
            Some(mut stats) if probe && stats.state == CircuitState::HalfOpen => {
                stats.state = CircuitState::Closed;
                stats.failure_count = 0;
                stats.probe_in_flight = false;
                true
            }
            _ => false,
        };

        if transition {
            self.transitioned(key, CircuitState::HalfOpen, CircuitState::Closed);
        }
    }

    fn record_failure(&self, key: &str, probe: bool, error: &DispatchError) {
        let mut stats = self
            .circuits
            .entry(key.to_string())
            .or_insert_with(CircuitStats::new);
        stats.failure_count = stats.failure_count.saturating_add(1);
        stats.last_failure = Some(Instant::now());
        let failures = stats.failure_count;

        let transition = match stats.state {
            CircuitState::Closed if failures >= self.settings.failure_threshold => {
                stats.state = CircuitState::Open;
                Some(CircuitState::Closed)
            }
            CircuitState::HalfOpen if probe => {
                stats.state = CircuitState::Open;
                stats.probe_in_flight = false;
                Some(CircuitState::HalfOpen)
            }
            _ => None,
        };
        drop(stats);

        tracing::debug!(circuit = %key, failures, error = %error, "Failure recorded");
        if let Some(from) = transition {
            self.transitioned(key, from, CircuitState::Open);
        }
    }

    fn release_probe(&self, key: &str) {
        if let Some(mut stats) = self.circuits.get_mut(key) {
            stats.probe_in_flight = false;
        }
        tracing::debug!(circuit = %key, "Probe abandoned before completion");
    }

    fn transitioned(&self, key: &str, from: CircuitState, to: CircuitState) {
        match to {
            CircuitState::Open => {
                tracing::warn!(circuit = %key, from = %from, to = %to, "Circuit opened")
            }
            _ => tracing::info!(circuit = %key, from = %from, to = %to, "Circuit state changed"),
        }
        metrics::record_breaker_state(key, to);
    }
}

impl Default for BreakerRegistry {
    fn default() -> Self {
        Self::new(BreakerSettings::default())
    }
}

/// One admitted call. Releases the probe slot if dropped without an outcome.
struct Attempt<'a> {
    registry: &'a BreakerRegistry,
    key: &'a str,
    probe: bool,
    settled: bool,
}

impl<'a> Attempt<'a> {
    fn new(registry: &'a BreakerRegistry, key: &'a str, probe: bool) -> Self {
        Self {
            registry,
            key,
            probe,
            settled: false,
        }
    }

    fn succeeded(&mut self) {
        self.settled = true;
        self.registry.record_success(self.key, self.probe);
    }

    fn failed(&mut self, error: &DispatchError) {
        self.settled = true;
        self.registry.record_failure(self.key, self.probe, error);
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            self.registry.release_probe(self.key);
        }
    }
}
