//! Logs and metrics.
//!
//! # Data Flow
//! ```text
//! router / breaker / retry / cache / ledger
//!     → tracing events (logging.rs installs the subscriber)
//!     → metrics facade (metrics.rs names every series)
//!     → Prometheus listener on observability.metrics_address
//! ```
//!
//! The execution ledger (crate::ledger) is the per-dispatch audit trail;
//! metrics here are aggregate only.
//!
//! # Design Decisions
//! - JSON log output is a config switch, not a build feature
//! - Metric names live in one file so dashboards have a single source

pub mod logging;
pub mod metrics;
