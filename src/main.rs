//! Resilient integration dispatch service.
//!
//! # Architecture Overview
//!
//! ```text
//!                     ┌──────────────────────────────────────────────────────┐
//!                     │                 DISPATCH SERVICE                      │
//!                     │                                                       │
//!   POST /v1/dispatch │  ┌─────────┐   ┌──────────────┐   ┌──────────────┐   │
//!   ──────────────────┼─▶│  http   │──▶│   routing    │──▶│  transport   │───┼──▶ webhook
//!                     │  │ server  │   │ fallback     │   │ http/static  │───┼──▶ direct API
//!                     │  └─────────┘   │ chain        │   └──────────────┘   │
//!                     │                └──────┬───────┘                      │
//!                     │          ┌────────────┼─────────────┐                │
//!                     │          ▼            ▼             ▼                │
//!                     │     ┌────────┐  ┌────────────┐  ┌────────┐           │
//!                     │     │ cache  │  │ resilience │  │ ledger │           │
//!                     │     │  ttl   │  │ cb/retry   │  │ history│           │
//!                     │     └────────┘  └────────────┘  └────────┘           │
//!                     │                                                       │
//!                     │  config · settings · health · observability · lifecycle│
//!                     └──────────────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use resilient_dispatch::config::{load_config, watcher::ConfigWatcher, DispatchConfig};
use resilient_dispatch::lifecycle::{signals, startup, Services, Shutdown};
use resilient_dispatch::observability::{logging, metrics};
use resilient_dispatch::HttpServer;

#[derive(Parser)]
#[command(name = "resilient-dispatch")]
#[command(about = "Resilient integration dispatch service", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => DispatchConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "resilient-dispatch starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        operations = config.operations.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let services = Services::start(config).await?;
    let shutdown = Shutdown::new();
    let background = services.spawn_background(&shutdown);

    // Keep the watcher alive for the lifetime of the server.
    let (config_updates, _watcher) = match &cli.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path, &services.config);
            (updates, Some(watcher.run()?))
        }
        None => (tokio::sync::mpsc::unbounded_channel().1, None),
    };

    let listener = startup::bind(&services.config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(&services);
    let server_shutdown = shutdown.subscribe();
    let server_task = tokio::spawn(server.run(listener, config_updates, server_shutdown));

    signals::wait_for_shutdown_signal().await;
    shutdown.trigger();

    match server_task.await {
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server error"),
        Err(e) => tracing::error!(error = %e, "HTTP server task panicked"),
        Ok(Ok(())) => {}
    }
    for task in background {
        let _ = task.await;
    }

    services.flush().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
