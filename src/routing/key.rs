//! Cache key derivation.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// `"{operation_key}:{sha256(action, payload)}"`.
///
/// The operation prefix lets one operation's entries be invalidated together.
pub fn cache_key(operation_key: &str, action: &str, payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(action.as_bytes());
    hasher.update([0u8]);
    hasher.update(payload.to_string().as_bytes());
    let digest = hasher.finalize();

    let mut key = String::with_capacity(operation_key.len() + 1 + digest.len() * 2);
    key.push_str(operation_key);
    key.push(':');
    for byte in digest {
        let _ = write!(key, "{:02x}", byte);
    }
    key
}
