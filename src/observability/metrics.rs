//! Metrics collection and exposition.
//!
//! # Metrics
//! - `dispatch_requests_total` (counter): dispatch outcomes by operation, status
//! - `dispatch_request_duration_seconds` (histogram): dispatch latency
//! - `dispatch_cache_hits_total` (counter): cache hits by operation
//! - `dispatch_retries_total` (counter): retry sleeps by endpoint key
//! - `circuit_breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `response_cache_entries` (gauge): stored cache entries
//! - `ledger_records` (gauge): retained ledger records
//!
//! Without an installed recorder every call is a no-op.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record one terminal dispatch outcome.
pub fn record_dispatch(operation: &str, status: &'static str, cached: bool, latency: Duration) {
    counter!(
        "dispatch_requests_total",
        "operation" => operation.to_string(),
        "status" => status,
    )
    .increment(1);
    histogram!("dispatch_request_duration_seconds", "operation" => operation.to_string())
        .record(latency.as_secs_f64());
    if cached {
        counter!("dispatch_cache_hits_total", "operation" => operation.to_string()).increment(1);
    }
}

pub fn record_retry(endpoint_key: &str) {
    counter!("dispatch_retries_total", "endpoint" => endpoint_key.to_string()).increment(1);
}

pub fn record_breaker_state(endpoint_key: &str, state: CircuitState) {
    let value = match state {
        CircuitState::Closed => 0.0,
        CircuitState::HalfOpen => 1.0,
        CircuitState::Open => 2.0,
    };
    gauge!("circuit_breaker_state", "endpoint" => endpoint_key.to_string()).set(value);
}

pub fn record_cache_size(entries: usize) {
    gauge!("response_cache_entries").set(entries as f64);
}

pub fn record_ledger_size(records: usize) {
    gauge!("ledger_records").set(records as f64);
}
