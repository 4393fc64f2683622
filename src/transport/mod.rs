//! Outbound transport subsystem.
//!
//! # Data Flow
//! ```text
//! Router (per candidate attempt):
//!     → Envelope {action, payload, callerId, timestampMs}
//!     → Transport::call(candidate, envelope, timeout)
//!         webhook / direct_api → http.rs (POST JSON, bearer auth)
//!         static               → configured response, no I/O
//!     → response.rs rules (2xx, empty body, non-JSON body)
//! ```
//!
//! # Design Decisions
//! - Every call carries its own deadline
//! - Non-JSON success bodies degrade to `{"text": raw}` instead of failing
//! - Error bodies are truncated before they reach logs and the ledger

pub mod http;
pub mod response;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::config::CandidateConfig;
use crate::error::DispatchResult;
use crate::ledger::record::now_ms;

pub use http::HttpTransport;

/// JSON body posted to every HTTP candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub action: String,
    pub payload: Value,
    pub caller_id: String,
    pub timestamp_ms: u64,
}

impl Envelope {
    /// Envelope stamped with the current time.
    pub fn new(action: &str, payload: Value, caller_id: &str) -> Self {
        Self {
            action: action.to_string(),
            payload,
            caller_id: caller_id.to_string(),
            timestamp_ms: now_ms(),
        }
    }
}

/// One call to one candidate.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(
        &self,
        candidate: &CandidateConfig,
        envelope: &Envelope,
        timeout: Duration,
    ) -> DispatchResult<Value>;
}
