//! Ledger record types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Terminal status of a dispatch or candidate attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
}

/// One entry of the execution history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: Uuid,
    /// Operation key the record belongs to.
    pub operation_type: String,
    /// Candidate that produced the outcome, `None` for dispatch-level records.
    #[serde(default)]
    pub candidate: Option<String>,
    #[serde(default)]
    pub action: String,
    pub status: ExecutionStatus,
    pub input_payload: Value,
    pub output_payload: Value,
    pub timestamp_ms: u64,
    pub latency_ms: u64,
    pub cached: bool,
    /// Failed candidate inside a fallback chain. The dispatch that contained it
    /// has its own record, so stats skip these.
    #[serde(default)]
    pub candidate_attempt: bool,
}

/// Input to [`ExecutionLedger::record`](crate::ledger::ExecutionLedger::record).
#[derive(Debug, Clone)]
pub struct RecordEntry {
    pub operation_type: String,
    pub candidate: Option<String>,
    pub action: String,
    pub status: ExecutionStatus,
    pub input: Value,
    pub output: Value,
    pub latency: Duration,
    pub cached: bool,
    pub candidate_attempt: bool,
}

impl ExecutionRecord {
    /// Stamp an entry with a fresh id and the current wall-clock time.
    pub fn from_entry(entry: RecordEntry) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation_type: entry.operation_type,
            candidate: entry.candidate,
            action: entry.action,
            status: entry.status,
            input_payload: entry.input,
            output_payload: entry.output,
            timestamp_ms: now_ms(),
            latency_ms: entry.latency.as_millis() as u64,
            cached: entry.cached,
            candidate_attempt: entry.candidate_attempt,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == ExecutionStatus::Error
    }
}

/// Aggregate view over the retained dispatch-level records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub total_requests: usize,
    pub total_errors: usize,
    /// Fraction of error records, 0.0 to 1.0.
    pub error_rate: f64,
    /// Mean latency in milliseconds.
    pub avg_latency: f64,
    /// Records stamped within the last 60 seconds.
    pub requests_per_minute: usize,
}

impl ExecutionStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a ExecutionRecord>) -> Self {
        let window_start = now_ms().saturating_sub(60_000);
        let mut total = 0usize;
        let mut errors = 0usize;
        let mut latency_sum = 0u128;
        let mut recent = 0usize;

        for record in records.into_iter().filter(|r| !r.candidate_attempt) {
            total += 1;
            if record.is_error() {
                errors += 1;
            }
            latency_sum += u128::from(record.latency_ms);
            if record.timestamp_ms >= window_start {
                recent += 1;
            }
        }

        let (error_rate, avg_latency) = if total == 0 {
            (0.0, 0.0)
        } else {
            (errors as f64 / total as f64, latency_sum as f64 / total as f64)
        };

        Self {
            total_requests: total,
            total_errors: errors,
            error_rate,
            avg_latency,
            requests_per_minute: recent,
        }
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
