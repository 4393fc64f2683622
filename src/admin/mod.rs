//! Admin API: bearer-protected mutating endpoints.

pub mod auth;
pub mod handlers;

use axum::{
    routing::{delete, post},
    Router,
};

use self::handlers::*;
use crate::http::server::AppState;

pub use self::auth::{admin_auth_middleware, requires_admin};

/// Admin-only routes. `DELETE /v1/monitoring/metrics` lives next to its GET.
pub fn setup_admin_router() -> Router<AppState> {
    Router::new()
        .route("/v1/health/{operation}/{candidate}", post(run_health_check))
        .route("/v1/breakers/{key}/reset", post(reset_breaker))
        .route("/v1/cache", delete(clear_cache))
}
