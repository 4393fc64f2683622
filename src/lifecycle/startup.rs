//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the dispatch context from a validated configuration
//! - Load the persisted ledger before any dispatch is accepted
//! - Start background tasks (health checks, cache purge)
//! - Bind the listener last
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::cache::TtlCache;
use crate::config::{ConfigError, DispatchConfig};
use crate::context::DispatchContext;
use crate::health::HealthMonitor;
use crate::ledger::{ExecutionLedger, JsonFileStore, LedgerStore, MemoryStore};
use crate::lifecycle::Shutdown;
use crate::resilience::{BreakerRegistry, BreakerSettings};
use crate::routing::{FallbackRouter, RouterSettings};
use crate::settings::ConfigSettings;
use crate::transport::HttpTransport;

/// Fatal startup failures.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to load execution ledger: {0}")]
    Ledger(#[source] io::Error),

    #[error("Failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
}

/// Every long-lived component, wired together.
pub struct Services {
    pub config: DispatchConfig,
    pub cache: TtlCache,
    pub settings: Arc<ConfigSettings>,
    pub router: FallbackRouter,
}

impl Services {
    /// Wire the components. The ledger starts empty; see [`Services::start`].
    pub fn build(config: DispatchConfig) -> Self {
        let cache = TtlCache::new(Duration::from_secs(config.cache.default_ttl_secs));
        let settings = Arc::new(ConfigSettings::new(config.operations.clone()));
        let breakers = BreakerRegistry::new(BreakerSettings::from(&config.circuit_breaker));

        let store: Arc<dyn LedgerStore> = match &config.ledger.storage_dir {
            Some(dir) => Arc::new(JsonFileStore::new(PathBuf::from(dir), &config.ledger.storage_key)),
            None => Arc::new(MemoryStore::default()),
        };
        let ledger = Arc::new(ExecutionLedger::new(config.ledger.capacity, store));

        let context = DispatchContext::new(Arc::new(cache.clone()), breakers, ledger, settings.clone());
        let router = FallbackRouter::new(
            context,
            Arc::new(HttpTransport::default()),
            RouterSettings::from(&config),
        );

        Self {
            config,
            cache,
            settings,
            router,
        }
    }

    /// Build the services and load the persisted ledger.
    pub async fn start(config: DispatchConfig) -> Result<Self, StartupError> {
        if config.admin.api_key == crate::config::AdminConfig::default().api_key {
            tracing::warn!("Admin API key is the built-in placeholder; change admin.api_key");
        }

        let services = Self::build(config);
        let loaded = services
            .context()
            .ledger
            .load()
            .await
            .map_err(StartupError::Ledger)?;

        tracing::info!(
            operations = services.config.operations.len(),
            ledger_records = loaded,
            single_flight = services.config.router.single_flight,
            "Dispatch services initialized"
        );
        Ok(services)
    }

    pub fn context(&self) -> &DispatchContext {
        self.router.context()
    }

    /// Spawn the health monitor and the cache purge task.
    pub fn spawn_background(&self, shutdown: &Shutdown) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();

        if self.config.health_check.enabled {
            let monitor = HealthMonitor::new(self.router.clone(), self.config.health_check.clone());
            tasks.push(tokio::spawn(monitor.run(shutdown.subscribe())));
        }

        if self.config.cache.enabled && self.config.cache.purge_interval_secs > 0 {
            let interval = Duration::from_secs(self.config.cache.purge_interval_secs);
            tasks.push(tokio::spawn(self.cache.clone().run_purge(interval, shutdown.subscribe())));
        }

        tasks
    }

    /// Persist the ledger. Called last during shutdown.
    pub async fn flush(&self) {
        if let Err(e) = self.context().ledger.flush().await {
            tracing::error!(error = %e, "Failed to flush execution ledger");
        }
    }
}

/// Bind the API listener.
pub async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })
}
