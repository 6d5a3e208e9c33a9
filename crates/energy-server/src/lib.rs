// energy-server - HTTP API for renewable-energy shares with webhook notifications
//
// Startup order:
// - Dataset (CSV) and neighbour lookup
// - Durable store, then counters and registrations loaded from it
// - Update aggregator task
// - Axum router with graceful shutdown
//
// On shutdown the aggregator drains its queues and flushes once more.

use anyhow::{Context, Result};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use energy_batch::{persistence_channel, AggregatorConfig, CacheGateway, UpdateAggregator};
use energy_config::RuntimeConfig;
use energy_core::{DatasetProvider, NeighbourLookup, RenewableDb};
use energy_store::DocumentStore;
use energy_webhook::{HttpNotifier, WebhookService};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

mod handlers;
mod init;
mod notifications;

pub use init::init_tracing;
use init::{init_neighbours, init_store};

pub const API_BASE: &str = "/energy/v1";
pub const API_VERSION: &str = "v1";

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    pub dataset: Arc<dyn DatasetProvider>,
    pub neighbours: Arc<dyn NeighbourLookup>,
    pub store: Arc<dyn DocumentStore>,
    pub webhooks: Arc<WebhookService>,
    pub cache: CacheGateway,
    pub started: Instant,
}

/// Error type that implements IntoResponse
pub(crate) struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Request error: {:?}", self.error);
        } else {
            warn!(status = self.status.as_u16(), "Rejected request: {}", self.error);
        }
        (
            self.status,
            Json(json!({
                "error": self.error.to_string(),
            })),
        )
            .into_response()
    }
}

impl AppError {
    pub fn bad_request<E>(error: E) -> Self
    where
        E: Into<anyhow::Error>,
    {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: error.into(),
        }
    }
}

/// Running application: request state plus the persistence worker.
pub struct App {
    pub state: AppState,
    shutdown: CancellationToken,
    aggregator: JoinHandle<()>,
}

impl App {
    /// Load the dataset, connect collaborators, restore webhook state and
    /// spawn the update aggregator.
    pub async fn start(config: &RuntimeConfig) -> Result<Self> {
        let dataset: Arc<dyn DatasetProvider> = Arc::new(
            RenewableDb::load(&config.dataset.csv_path).with_context(|| {
                format!("Failed to load dataset from {}", config.dataset.csv_path)
            })?,
        );
        let neighbours = init_neighbours(&config.countries)?;
        let store = init_store(&config.store)?;

        // Store outages degrade to an empty start, never a failed boot
        let counters = store.get_all_counters().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not load invocation counters, starting from zero");
            HashMap::new()
        });
        let registrations = store.get_all_registrations().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not load webhook registrations, starting empty");
            HashMap::new()
        });

        let aggregator_config = AggregatorConfig {
            flush_interval: config.persistence.flush_interval(),
            counter_queue_capacity: config.persistence.counter_queue_capacity,
            registration_queue_capacity: config.persistence.registration_queue_capacity,
            cache_queue_capacity: config.persistence.cache_queue_capacity,
            max_pending_cache_entries: config.persistence.max_pending_cache_entries,
        };
        info!(
            "Persistence enabled (backend={} flush_interval={}s)",
            config.store.backend,
            aggregator_config.flush_interval.as_secs()
        );

        let (persistence, queues) = persistence_channel(&aggregator_config);
        let shutdown = CancellationToken::new();
        let aggregator = UpdateAggregator::new(Arc::clone(&store), queues, aggregator_config)
            .spawn(shutdown.clone());

        let notifier = HttpNotifier::new(config.webhook.timeout(), config.webhook.max_in_flight)
            .context("Failed to build webhook HTTP client")?;
        let webhooks = Arc::new(WebhookService::with_state(
            Arc::clone(&dataset),
            persistence.clone(),
            Arc::new(notifier),
            counters,
            registrations,
        ));
        let cache = CacheGateway::new(Arc::clone(&store), persistence, config.cache.retention());

        Ok(Self {
            state: AppState {
                dataset,
                neighbours,
                store,
                webhooks,
                cache,
                started: Instant::now(),
            },
            shutdown,
            aggregator,
        })
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Stop the aggregator and wait for its final flush.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.aggregator.await {
            error!(error = %e, "Update aggregator panicked");
        }
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    let current = get(handlers::renewables_current);
    let current_rest = get(handlers::renewables_current_path);
    let history = get(handlers::renewables_history);
    let history_rest = get(handlers::renewables_history_path);
    let notifications = get(notifications::list)
        .post(notifications::register)
        .delete(notifications::delete_missing_id);
    let notifications_rest = get(notifications::get_by_path)
        .post(notifications::post_with_path)
        .delete(notifications::delete_by_path);
    let status = get(handlers::status);

    Router::new()
        .route("/", get(handlers::usage))
        .route(API_BASE, get(handlers::usage))
        .route("/energy/v1/", get(handlers::usage))
        .route("/energy/v1/renewables/current", current.clone())
        .route("/energy/v1/renewables/current/", current)
        .route("/energy/v1/renewables/current/*rest", current_rest)
        .route("/energy/v1/renewables/history", history.clone())
        .route("/energy/v1/renewables/history/", history)
        .route("/energy/v1/renewables/history/*rest", history_rest)
        .route("/energy/v1/notifications", notifications.clone())
        .route("/energy/v1/notifications/", notifications)
        .route("/energy/v1/notifications/*rest", notifications_rest)
        .route("/energy/v1/status", status.clone())
        .route("/energy/v1/status/", status)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

/// Entry point for server mode (loads config automatically)
pub async fn run() -> Result<()> {
    let config = RuntimeConfig::load().context("Failed to load configuration")?;
    run_with_config(config).await
}

/// Entry point for server mode with pre-loaded configuration (for CLI usage)
pub async fn run_with_config(config: RuntimeConfig) -> Result<()> {
    init_tracing(&config);

    let addr = config.server.listen_addr.clone();
    let app = App::start(&config).await?;
    let router = app.router();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind to {}", addr))?;

    info!("Energy API listening on http://{}", addr);
    info!("Routes:");
    info!("  GET    http://{}{}/renewables/current/{{country?}}", addr, API_BASE);
    info!("  GET    http://{}{}/renewables/history/{{country?}}", addr, API_BASE);
    info!("  GET    http://{}{}/notifications/{{id?}}", addr, API_BASE);
    info!("  POST   http://{}{}/notifications", addr, API_BASE);
    info!("  DELETE http://{}{}/notifications/{{id}}", addr, API_BASE);
    info!("  GET    http://{}{}/status", addr, API_BASE);
    info!("Press Ctrl+C or send SIGTERM to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    app.shutdown().await;

    info!("Server shutdown complete");

    Ok(())
}
