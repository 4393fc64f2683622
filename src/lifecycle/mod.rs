//! Process lifecycle.
//!
//! # Data Flow
//! ```text
//! startup.rs:  config → Services::build → ledger load → background tasks → bind
//! signals.rs:  SIGINT / SIGTERM → Shutdown::trigger
//! shutdown.rs: broadcast → server drains → monitor and purge loops exit
//! main:        Services::flush persists the ledger last
//! ```
//!
//! # Design Decisions
//! - A ledger that exists but cannot be read aborts startup
//! - Every background task owns its own shutdown receiver

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Services, StartupError};
