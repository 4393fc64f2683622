//! Response body interpretation.

use serde_json::{json, Value};

use crate::error::{DispatchError, DispatchResult};

/// Characters of an error body kept in `TRANSPORT_ERROR`.
pub const ERROR_BODY_LIMIT: usize = 100;

/// Map a status code and raw body to the dispatch result.
pub fn interpret(status: u16, body: &str) -> DispatchResult<Value> {
    if !(200..300).contains(&status) {
        return Err(DispatchError::Transport {
            status,
            body: truncate(body, ERROR_BODY_LIMIT),
        });
    }

    if body.trim().is_empty() {
        return Ok(json!({}));
    }

    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(e) => {
            tracing::debug!(error = %e, "Non-JSON success body, returning raw text");
            Ok(json!({ "text": body }))
        }
    }
}

/// First `limit` characters of `body`.
pub fn truncate(body: &str, limit: usize) -> String {
    body.chars().take(limit).collect()
}
