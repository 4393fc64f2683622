//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the dispatch
//! service. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Root configuration for the dispatch service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct DispatchConfig {
    /// Listener for the dispatch/monitoring API.
    pub listener: ListenerConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry configuration.
    pub retries: RetryConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Execution ledger settings.
    pub ledger: LedgerConfig,

    /// Fallback router behavior.
    pub router: RouterConfig,

    /// Periodic candidate health checks.
    pub health_check: HealthCheckConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,

    /// Logical operations and their fallback chains.
    pub operations: Vec<OperationConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
        }
    }
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable response caching globally.
    pub enabled: bool,

    /// TTL used when an operation does not set its own, in seconds.
    pub default_ttl_secs: u64,

    /// Interval of the expired-entry sweep in seconds (0 disables it).
    pub purge_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: 300,
            purge_interval_secs: 60,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures that open the circuit.
    pub failure_threshold: u32,

    /// Time an open circuit waits before letting a probe through, in seconds.
    pub reset_timeout_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_secs: 60,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per candidate, first call included.
    pub max_retries: u32,

    /// Delay after the first failed attempt in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound for any single delay in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor between consecutive delays.
    pub multiplier: f64,

    /// Random jitter added on top of each delay, as a fraction of it.
    /// e.g., 0.1 for up to 10%.
    pub jitter_ratio: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 10_000,
            multiplier: 2.0,
            jitter_ratio: 0.0,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Inbound API request timeout in seconds.
    pub request_secs: u64,

    /// Default timeout of one outbound candidate call in seconds.
    pub call_secs: u64,

    /// Timeout of one health-check call in seconds.
    pub health_check_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 120,
            call_secs: 30,
            health_check_secs: 5,
        }
    }
}

/// Execution ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Maximum number of retained records.
    pub capacity: usize,

    /// Directory for the persisted ledger. `None` keeps it in memory only.
    pub storage_dir: Option<String>,

    /// Storage key (file stem) of the persisted ledger.
    pub storage_key: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            storage_dir: None,
            storage_key: "execution_ledger".to_string(),
        }
    }
}

/// Fallback router configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Caller identifier sent in every envelope.
    pub caller_id: String,

    /// Share one in-flight chain between concurrent identical requests.
    pub single_flight: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            caller_id: "resilient-dispatch".to_string(),
            single_flight: false,
        }
    }
}

/// Health check configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Enable periodic health checks of every candidate.
    pub enabled: bool,

    /// Health check interval in seconds.
    pub interval_secs: u64,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 300,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format ("pretty" or "json").
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// API key for mutating endpoints (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}

/// A logical operation and its ordered fallback chain.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct OperationConfig {
    /// Operation key (e.g., "invoice_summary").
    pub key: String,

    /// Disabled operations have no candidates.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Whether successful responses may be cached.
    #[serde(default = "default_true")]
    pub cacheable: bool,

    /// Per-operation cache TTL in seconds.
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,

    /// Candidates in fallback order.
    #[serde(default)]
    pub candidates: Vec<CandidateConfig>,
}

impl OperationConfig {
    /// Per-operation TTL, if any.
    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }

    /// Look up a candidate by name.
    pub fn candidate(&self, name: &str) -> Option<&CandidateConfig> {
        self.candidates.iter().find(|c| c.name == name)
    }
}

/// Kind of transport a candidate uses.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    /// Configurable workflow webhook.
    Webhook,
    /// Direct provider API.
    DirectApi,
    /// Static last-resort response, no network I/O.
    Static,
}

impl CandidateKind {
    /// Name as written in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateKind::Webhook => "webhook",
            CandidateKind::DirectApi => "direct_api",
            CandidateKind::Static => "static",
        }
    }
}

/// One transport option in a fallback chain.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CandidateConfig {
    /// Candidate name, unique within its operation.
    pub name: String,

    /// Transport kind.
    pub kind: CandidateKind,

    /// Endpoint URL for webhook and direct API candidates.
    #[serde(default)]
    pub url: String,

    /// Disabled candidates are skipped.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Optional bearer token sent as `Authorization`.
    #[serde(default)]
    pub bearer_token: Option<String>,

    /// Per-candidate call timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Response returned by static candidates.
    #[serde(default)]
    pub response: Option<Value>,
}

impl CandidateConfig {
    /// True if the candidate has what it needs to be invoked.
    pub fn is_configured(&self) -> bool {
        match self.kind {
            CandidateKind::Static => self.response.is_some(),
            CandidateKind::Webhook | CandidateKind::DirectApi => !self.url.trim().is_empty(),
        }
    }

    /// Breaker key of this candidate within `operation_key`.
    pub fn endpoint_key(&self, operation_key: &str) -> String {
        format!("{}:{}", operation_key, self.name)
    }
}

fn default_true() -> bool {
    true
}
