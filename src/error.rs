//! Dispatch error taxonomy.
//!
//! Every failure a caller can observe from the dispatch path is a
//! [`DispatchError`]. Errors are `Clone` so a single in-flight result can be
//! handed to several waiters.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure of one candidate inside an aggregate failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFailure {
    /// Candidate name.
    pub candidate: String,
    /// Error code of the candidate's final error.
    pub code: String,
    /// Human readable message.
    pub message: String,
}

/// Errors surfaced by the dispatch layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// No enabled and configured candidate exists for the operation.
    #[error("No enabled candidate configured for operation '{0}'")]
    NoCandidateConfigured(String),

    /// The breaker for this endpoint is open; the call was not attempted.
    #[error("Circuit open for '{key}', next probe in {retry_in_ms} ms")]
    CircuitOpen { key: String, retry_in_ms: u64 },

    /// The endpoint answered with a non-2xx status.
    #[error("Endpoint returned HTTP {status}: {body}")]
    Transport { status: u16, body: String },

    /// The request never produced a response (connect/reset/DNS).
    #[error("Request failed: {0}")]
    Request(String),

    /// The per-call deadline fired.
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// A request body could not be interpreted.
    #[error("Unparseable body: {0}")]
    Parse(String),

    /// Every candidate in the fallback chain failed.
    #[error("All {} candidates failed", .0.len())]
    AggregateFailure(Vec<CandidateFailure>),
}

impl DispatchError {
    /// Stable, machine readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::NoCandidateConfigured(_) => "NO_CANDIDATE_CONFIGURED",
            DispatchError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            DispatchError::Transport { .. } | DispatchError::Request(_) => "TRANSPORT_ERROR",
            DispatchError::Timeout(_) => "TIMEOUT",
            DispatchError::Parse(_) => "PARSE_ERROR",
            DispatchError::AggregateFailure(_) => "AGGREGATE_FAILURE",
        }
    }

    /// Whether a caller may reasonably try again later.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DispatchError::NoCandidateConfigured(_))
    }

    /// Serializable view of the error for responses and ledger records.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code().to_string(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        }
    }

    pub(crate) fn as_candidate_failure(&self, candidate: &str) -> CandidateFailure {
        CandidateFailure {
            candidate: candidate.to_string(),
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

/// `{code, message, retryable}` as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

/// Result type for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
