//! Service configuration.
//!
//! # Data Flow
//! ```text
//! TOML file
//!     → loader.rs (toml + serde, every section defaulted)
//!     → validation.rs (collects all semantic errors at once)
//!     → DispatchConfig, split into per-subsystem settings at startup
//!
//! File edited:
//!     watcher.rs (notify) → reload → operation table diff
//!     → HttpServer forwards it to ConfigSettings::replace
//! ```
//!
//! # Design Decisions
//! - Breaker, retry, cache and timeout tuning is read once; only operations reload
//! - A candidate with an empty URL is valid config and simply never dispatched

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, CacheConfig, CandidateConfig, CandidateKind, CircuitBreakerConfig,
    DispatchConfig, HealthCheckConfig, LedgerConfig, ListenerConfig, ObservabilityConfig,
    OperationConfig, RetryConfig, RouterConfig, TimeoutConfig,
};
