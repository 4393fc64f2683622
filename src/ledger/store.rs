//! Durable storage for the execution ledger.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::ledger::record::ExecutionRecord;

/// Narrow persistence interface for the ledger.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Load persisted records, newest first. Missing storage is an empty list.
    async fn load(&self) -> io::Result<Vec<ExecutionRecord>>;

    /// Replace the persisted records.
    async fn save(&self, records: &[ExecutionRecord]) -> io::Result<()>;
}

/// Stores the ledger as one JSON array in `<dir>/<storage_key>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl AsRef<Path>, storage_key: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{}.json", storage_key)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl LedgerStore for JsonFileStore {
    async fn load(&self) -> io::Result<Vec<ExecutionRecord>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    async fn save(&self, records: &[ExecutionRecord]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_vec(records)?;

        // Write then rename so a crash never leaves a truncated file behind.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await
    }
}

/// In-memory store, used when no storage directory is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<Vec<ExecutionRecord>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn with_records(records: Vec<ExecutionRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            saves: AtomicUsize::new(0),
        }
    }

    /// Number of `save` calls so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }

    pub async fn snapshot(&self) -> Vec<ExecutionRecord> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn load(&self) -> io::Result<Vec<ExecutionRecord>> {
        Ok(self.records.lock().await.clone())
    }

    async fn save(&self, records: &[ExecutionRecord]) -> io::Result<()> {
        *self.records.lock().await = records.to_vec();
        self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
