//! Resilient integration dispatch service library.

pub mod admin;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod health;
pub mod http;
pub mod ledger;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod routing;
pub mod settings;
pub mod transport;

pub use config::schema::DispatchConfig;
pub use context::DispatchContext;
pub use error::{DispatchError, DispatchResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use routing::FallbackRouter;
