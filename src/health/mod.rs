//! Candidate health checking.
//!
//! # Data Flow
//! ```text
//! Periodic timer (active.rs):
//!     → every operation, every enabled candidate
//!     → FallbackRouter::health_check (breaker + retry, no cache)
//!     → test result written back to the settings provider
//!     → ledger record per check
//!
//! On demand:
//!     POST /v1/health/{operation}/{candidate} → same path
//! ```
//!
//! # Design Decisions
//! - Checks run through the breaker, so a dead candidate fails fast
//! - Candidates are checked one at a time to keep probe load flat

pub mod active;

pub use active::{HealthMonitor, HealthSummary};
