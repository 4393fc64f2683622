use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::http::handlers::status_for;
use crate::http::server::AppState;
use crate::routing::DispatchResponse;

#[derive(Debug, Deserialize)]
pub struct CacheQuery {
    pub prefix: Option<String>,
}

pub async fn run_health_check(
    State(state): State<AppState>,
    Path((operation, candidate)): Path<(String, String)>,
) -> (StatusCode, Json<DispatchResponse>) {
    let result = state.router.health_check(&operation, &candidate).await;
    (status_for(&result), Json(DispatchResponse::from(result)))
}

pub async fn clear_metrics(State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    match state.router.context().ledger.clear().await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => {
            tracing::error!(error = %e, "Failed to persist cleared ledger");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn reset_breaker(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> (StatusCode, Json<Value>) {
    let reset = state.router.context().breakers.reset(&key);
    let status = if reset { StatusCode::OK } else { StatusCode::NOT_FOUND };
    (status, Json(json!({ "key": key, "reset": reset })))
}

pub async fn clear_cache(
    State(state): State<AppState>,
    Query(query): Query<CacheQuery>,
) -> Json<Value> {
    let removed = state
        .router
        .context()
        .cache
        .invalidate(query.prefix.as_deref());
    Json(json!({ "removed": removed }))
}
