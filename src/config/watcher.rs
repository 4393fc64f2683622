//! Hot reload of the operation table.
//!
//! Only `[[operations]]` is applied at runtime. A file event that parses and
//! validates but leaves the operation table untouched is dropped here, so
//! editors that write a file several times per save trigger one swap.

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::loader::{load_config, ConfigError};
use crate::config::schema::{DispatchConfig, OperationConfig};

pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<DispatchConfig>,
    applied: Arc<Mutex<Vec<OperationConfig>>>,
}

impl ConfigWatcher {
    /// `initial` is the config the service started with.
    ///
    /// Returns the watcher and a receiver for configs whose operation table changed.
    pub fn new(
        path: &Path,
        initial: &DispatchConfig,
    ) -> (Self, mpsc::UnboundedReceiver<DispatchConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
            applied: Arc::new(Mutex::new(initial.operations.clone())),
        };
        (watcher, update_rx)
    }

    /// Start watching the file. The returned watcher must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self {
            path,
            update_tx,
            applied,
        } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    let Ok(mut applied) = applied.lock() else {
                        return;
                    };
                    match reload(&path, &mut applied) {
                        Ok(Some(config)) => {
                            tracing::info!(
                                operations = config.operations.len(),
                                "Operation table changed, applying"
                            );
                            let _ = update_tx.send(config);
                        }
                        Ok(None) => tracing::debug!("Config rewritten without operation changes"),
                        Err(e) => tracing::error!(
                            error = %e,
                            "Failed to reload config, keeping current operations"
                        ),
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&watched, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?watched, "Config watcher started");
        Ok(watcher)
    }
}

/// Load `path` and return the config if its operation table differs from `applied`.
fn reload(
    path: &Path,
    applied: &mut Vec<OperationConfig>,
) -> Result<Option<DispatchConfig>, ConfigError> {
    let config = load_config(path)?;
    if config.operations == *applied {
        return Ok(None);
    }
    *applied = config.operations.clone();
    Ok(Some(config))
}
