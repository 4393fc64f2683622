//! Active health checking.
//!
//! # Responsibilities
//! - Periodically check every enabled candidate of every operation
//! - Stop cleanly on shutdown

use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;

use crate::config::HealthCheckConfig;
use crate::routing::FallbackRouter;

/// Counts of one sweep over all candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthSummary {
    pub passed: usize,
    pub failed: usize,
}

pub struct HealthMonitor {
    router: FallbackRouter,
    config: HealthCheckConfig,
}

impl HealthMonitor {
    pub fn new(router: FallbackRouter, config: HealthCheckConfig) -> Self {
        Self { router, config }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            tracing::info!("Active health checks disabled");
            return;
        }

        tracing::info!(interval = self.config.interval_secs, "Health monitor starting");

        let interval = Duration::from_secs(self.config.interval_secs.max(1));
        let mut ticker = time::interval(interval);
        // The first tick completes immediately; wait a full interval instead.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let summary = self.check_all().await;
                    tracing::info!(
                        passed = summary.passed,
                        failed = summary.failed,
                        "Health check sweep finished"
                    );
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// Check every enabled, configured candidate once.
    pub async fn check_all(&self) -> HealthSummary {
        let settings = &self.router.context().settings;
        let mut summary = HealthSummary::default();

        for operation_key in settings.operation_keys().await {
            let Some(operation) = settings.endpoint_config(&operation_key).await else {
                continue;
            };
            if !operation.enabled {
                continue;
            }

            for candidate in operation
                .candidates
                .iter()
                .filter(|c| c.enabled && c.is_configured())
            {
                match self.router.health_check(&operation_key, &candidate.name).await {
                    Ok(_) => summary.passed += 1,
                    Err(_) => summary.failed += 1,
                }
            }
        }
        summary
    }
}
