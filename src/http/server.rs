//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, timeout, request ID)
//! - Apply operation table updates from the config watcher
//! - Serve until the shutdown signal fires

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::config::DispatchConfig;
use crate::http::handlers;
use crate::lifecycle::Services;
use crate::routing::FallbackRouter;
use crate::settings::ConfigSettings;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: FallbackRouter,
    pub settings: Arc<ConfigSettings>,
    pub admin_key: Arc<str>,
    pub started_at: Instant,
}

/// HTTP server for the dispatch API.
pub struct HttpServer {
    router: Router,
    settings: Arc<ConfigSettings>,
}

impl HttpServer {
    pub fn new(services: &Services) -> Self {
        let state = AppState {
            router: services.router.clone(),
            settings: services.settings.clone(),
            admin_key: Arc::from(services.config.admin.api_key.as_str()),
            started_at: Instant::now(),
        };

        let router = Self::build_router(&services.config, state);
        Self {
            router,
            settings: services.settings.clone(),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &DispatchConfig, state: AppState) -> Router {
        Router::new()
            .route("/v1/dispatch/{operation}", post(handlers::dispatch))
            .route("/v1/monitoring/stats", get(handlers::stats))
            .route(
                "/v1/monitoring/metrics",
                get(handlers::latest_metrics).delete(admin::handlers::clear_metrics),
            )
            .route("/v1/monitoring/history", get(handlers::history))
            .route("/v1/breakers", get(handlers::breakers))
            .route("/v1/status", get(handlers::status))
            .merge(admin::setup_admin_router())
            .layer(middleware::from_fn_with_state(
                state.clone(),
                admin::admin_auth_middleware,
            ))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// Axum router, for in-process tests.
    pub fn into_router(self) -> Router {
        self.router
    }

    /// Serve on `listener`, applying config updates, until shutdown.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<DispatchConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let settings = self.settings.clone();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                settings.replace(config.operations);
            }
        });

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!(address = %addr, "HTTP server stopped");
        Ok(())
    }
}
