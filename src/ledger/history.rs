//! Bounded, newest-first execution history.

use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::ledger::record::{ExecutionRecord, ExecutionStats, RecordEntry};
use crate::ledger::store::{LedgerStore, MemoryStore};
use crate::observability::metrics;

/// Default number of retained records.
pub const DEFAULT_CAPACITY: usize = 100;

/// Execution ledger with a hard cap and durable persistence.
pub struct ExecutionLedger {
    /// Newest record at the front.
    records: Mutex<VecDeque<ExecutionRecord>>,
    capacity: usize,
    store: Arc<dyn LedgerStore>,
}

impl ExecutionLedger {
    pub fn new(capacity: usize, store: Arc<dyn LedgerStore>) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            store,
        }
    }

    /// Ledger backed by a [`MemoryStore`].
    pub fn in_memory(capacity: usize) -> Self {
        Self::new(capacity, Arc::new(MemoryStore::default()))
    }

    /// Merge persisted records behind any records already in memory.
    ///
    /// Returns the number of records retained after the merge.
    pub async fn load(&self) -> io::Result<usize> {
        let persisted = self.store.load().await?;
        let mut records = self.records.lock().await;

        let mut seen: HashSet<_> = records.iter().map(|r| r.id).collect();
        for record in persisted {
            if records.len() >= self.capacity {
                break;
            }
            if seen.insert(record.id) {
                records.push_back(record);
            }
        }

        tracing::info!(records = records.len(), "Execution ledger loaded");
        metrics::record_ledger_size(records.len());
        Ok(records.len())
    }

    /// Prepend a record, enforce the cap and persist the result.
    ///
    /// Persistence failures are logged; the in-memory record is kept.
    pub async fn record(&self, entry: RecordEntry) -> ExecutionRecord {
        let record = ExecutionRecord::from_entry(entry);
        let mut records = self.records.lock().await;

        records.push_front(record.clone());
        records.truncate(self.capacity);
        metrics::record_ledger_size(records.len());

        // The lock is held across the write so snapshots land in record order.
        if let Err(e) = self.store.save(records.make_contiguous()).await {
            tracing::warn!(error = %e, "Failed to persist execution ledger");
        }
        record
    }

    /// Records newest first, optionally restricted to one operation type.
    pub async fn history(&self, filter: Option<&str>) -> Vec<ExecutionRecord> {
        let records = self.records.lock().await;
        records
            .iter()
            .filter(|r| filter.map_or(true, |op| r.operation_type == op))
            .cloned()
            .collect()
    }

    /// The `limit` most recent records.
    pub async fn latest(&self, limit: usize) -> Vec<ExecutionRecord> {
        let records = self.records.lock().await;
        records.iter().take(limit).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    pub async fn stats(&self) -> ExecutionStats {
        let records = self.records.lock().await;
        ExecutionStats::from_records(records.iter())
    }

    /// Drop all history, in memory and in storage.
    pub async fn clear(&self) -> io::Result<()> {
        let mut records = self.records.lock().await;
        records.clear();
        metrics::record_ledger_size(0);
        tracing::info!("Execution ledger cleared");
        self.store.save(&[]).await
    }

    /// Persist the current records.
    pub async fn flush(&self) -> io::Result<()> {
        let mut records = self.records.lock().await;
        self.store.save(records.make_contiguous()).await?;
        tracing::info!(records = records.len(), "Execution ledger flushed");
        Ok(())
    }
}

impl std::fmt::Debug for ExecutionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionLedger")
            .field("capacity", &self.capacity)
            .finish()
    }
}
