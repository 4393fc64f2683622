//! Dispatch and monitoring handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DispatchError, DispatchResult};
use crate::http::server::AppState;
use crate::ledger::{ExecutionRecord, ExecutionStats};
use crate::resilience::{CircuitSnapshot, CircuitState};
use crate::routing::{DispatchResponse, Dispatched};
use crate::settings::{CandidateTestResult, SettingsProvider};

/// Records returned by `/v1/monitoring/metrics` without a limit.
const DEFAULT_METRICS_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    pub action: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(rename = "type")]
    pub operation_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub operations: usize,
    pub cache_entries: usize,
    pub ledger_records: usize,
    pub open_circuits: usize,
    pub test_results: Vec<CandidateTestResult>,
}

/// HTTP status for a dispatch outcome. The body always carries the details.
pub fn status_for(result: &DispatchResult<Dispatched>) -> StatusCode {
    match result {
        Ok(_) => StatusCode::OK,
        Err(DispatchError::NoCandidateConfigured(_)) => StatusCode::NOT_FOUND,
        Err(DispatchError::CircuitOpen { .. }) => StatusCode::SERVICE_UNAVAILABLE,
        Err(DispatchError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
        Err(DispatchError::Parse(_)) => StatusCode::BAD_REQUEST,
        Err(_) => StatusCode::BAD_GATEWAY,
    }
}

pub async fn dispatch(
    State(state): State<AppState>,
    Path(operation): Path<String>,
    request: Result<Json<DispatchRequest>, JsonRejection>,
) -> (StatusCode, Json<DispatchResponse>) {
    let request = match request {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::debug!(operation = %operation, error = %rejection, "Rejected dispatch body");
            let result: DispatchResult<Dispatched> =
                Err(DispatchError::Parse(rejection.body_text()));
            return (status_for(&result), Json(DispatchResponse::from(result)));
        }
    };
    let result = state
        .router
        .dispatch(&operation, &request.action, request.payload)
        .await;
    (status_for(&result), Json(DispatchResponse::from(result)))
}

pub async fn stats(State(state): State<AppState>) -> Json<ExecutionStats> {
    Json(state.router.context().ledger.stats().await)
}

pub async fn latest_metrics(
    State(state): State<AppState>,
    Query(query): Query<MetricsQuery>,
) -> Json<Vec<ExecutionRecord>> {
    let limit = query.limit.unwrap_or(DEFAULT_METRICS_LIMIT);
    Json(state.router.context().ledger.latest(limit).await)
}

pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<Vec<ExecutionRecord>> {
    Json(
        state
            .router
            .context()
            .ledger
            .history(query.operation_type.as_deref())
            .await,
    )
}

pub async fn breakers(State(state): State<AppState>) -> Json<Vec<CircuitSnapshot>> {
    Json(state.router.context().breakers.snapshot())
}

pub async fn status(State(state): State<AppState>) -> Json<SystemStatus> {
    let context = state.router.context();
    let open_circuits = context
        .breakers
        .snapshot()
        .iter()
        .filter(|c| c.state != CircuitState::Closed)
        .count();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        operations: state.settings.operations().len(),
        cache_entries: context.cache.len(),
        ledger_records: context.ledger.len().await,
        open_circuits,
        test_results: state.settings.test_results().await,
    })
}
