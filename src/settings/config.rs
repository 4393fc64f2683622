//! Settings backed by the `[[operations]]` table of the config file.

use arc_swap::ArcSwap;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use crate::config::OperationConfig;
use crate::settings::{CandidateTestResult, SettingsProvider, TestResult};

/// In-process settings provider.
///
/// Reads are lock-free; a config reload swaps the whole operation table.
#[derive(Debug, Default)]
pub struct ConfigSettings {
    operations: ArcSwap<Vec<OperationConfig>>,
    /// Keyed by `(operation, candidate)`.
    test_results: DashMap<(String, String), TestResult>,
}

impl ConfigSettings {
    pub fn new(operations: Vec<OperationConfig>) -> Self {
        Self {
            operations: ArcSwap::from_pointee(operations),
            test_results: DashMap::new(),
        }
    }

    /// Atomically replace the operation table.
    ///
    /// Test results of candidates that no longer exist are dropped.
    pub fn replace(&self, operations: Vec<OperationConfig>) {
        self.test_results.retain(|(op, candidate), _| {
            operations
                .iter()
                .any(|o| &o.key == op && o.candidate(candidate).is_some())
        });
        tracing::info!(operations = operations.len(), "Operation table replaced");
        self.operations.store(Arc::new(operations));
    }

    /// Snapshot of the current operation table.
    pub fn operations(&self) -> Arc<Vec<OperationConfig>> {
        self.operations.load_full()
    }
}

#[async_trait]
impl SettingsProvider for ConfigSettings {
    async fn endpoint_config(&self, operation_key: &str) -> Option<OperationConfig> {
        self.operations
            .load()
            .iter()
            .find(|op| op.key == operation_key)
            .cloned()
    }

    async fn operation_keys(&self) -> Vec<String> {
        self.operations.load().iter().map(|op| op.key.clone()).collect()
    }

    async fn record_test_result(&self, operation_key: &str, candidate: &str, result: TestResult) {
        tracing::debug!(
            operation = %operation_key,
            candidate = %candidate,
            status = ?result.last_test_status,
            "Recorded health check result"
        );
        self.test_results
            .insert((operation_key.to_string(), candidate.to_string()), result);
    }

    async fn test_results(&self) -> Vec<CandidateTestResult> {
        let mut results: Vec<_> = self
            .test_results
            .iter()
            .map(|entry| {
                let (operation, candidate) = entry.key().clone();
                CandidateTestResult {
                    operation,
                    candidate,
                    result: entry.value().clone(),
                }
            })
            .collect();
        results.sort_by(|a, b| (&a.operation, &a.candidate).cmp(&(&b.operation, &b.candidate)));
        results
    }
}
