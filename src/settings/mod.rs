//! Settings provider subsystem.
//!
//! # Data Flow
//! ```text
//! Router:
//!     → SettingsProvider::endpoint_config(operation) (read-mostly)
//!     → candidates in fallback order
//!
//! Health checks:
//!     → SettingsProvider::record_test_result(operation, candidate, result)
//!
//! Config reload:
//!     watcher → ConfigSettings::replace(operations)
//! ```
//!
//! # Design Decisions
//! - The durable settings store is a collaborator behind a narrow trait
//! - The in-process implementation is backed by the TOML operation table

pub mod config;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::OperationConfig;

pub use config::ConfigSettings;

/// Outcome of the most recent health check of one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Ok,
    Error,
}

/// Health check result written back after `HEALTH_CHECK` dispatches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    /// Wall-clock time of the check, unix milliseconds.
    pub last_tested_at: u64,
    pub last_test_status: TestStatus,
    /// Error message of a failed check.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Test result of one candidate, for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTestResult {
    pub operation: String,
    pub candidate: String,
    #[serde(flatten)]
    pub result: TestResult,
}

/// Read-mostly access to endpoint configuration.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    /// Configuration of `operation_key`, candidates in fallback order.
    async fn endpoint_config(&self, operation_key: &str) -> Option<OperationConfig>;

    /// Every known operation key.
    async fn operation_keys(&self) -> Vec<String>;

    /// Store the result of a candidate health check.
    async fn record_test_result(&self, operation_key: &str, candidate: &str, result: TestResult);

    /// All stored health check results.
    async fn test_results(&self) -> Vec<CandidateTestResult>;
}
