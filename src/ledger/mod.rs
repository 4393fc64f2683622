//! Execution ledger subsystem.
//!
//! # Data Flow
//! ```text
//! Router terminal outcome (per candidate failure, final success/failure):
//!     → record.rs (RecordEntry → ExecutionRecord, id + timestamp)
//!     → history.rs (prepend, enforce cap, newest first)
//!     → store.rs (persist truncated list, JSON file or memory)
//!
//! Monitoring API:
//!     → history.rs (history / latest / stats / clear)
//! ```
//!
//! # Design Decisions
//! - Writes are awaited, never fire-and-forget
//! - Hard cap, oldest record evicted on overflow
//! - Startup load merges persisted records behind new ones

pub mod history;
pub mod record;
pub mod store;

pub use history::{ExecutionLedger, DEFAULT_CAPACITY};
pub use record::{ExecutionRecord, ExecutionStats, ExecutionStatus, RecordEntry};
pub use store::{JsonFileStore, LedgerStore, MemoryStore};
