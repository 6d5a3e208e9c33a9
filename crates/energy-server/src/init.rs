// Initialization utilities for server mode
//
// Durable store, neighbour lookup and logging/tracing setup

use anyhow::{Context, Result};
use energy_config::{
    CountriesConfig, CountriesMode, LogFormat, RuntimeConfig, StoreBackend, StoreConfig,
};
use energy_core::{NeighbourLookup, RestCountriesClient, StaticNeighbours};
use energy_store::{DisabledStore, DocumentStore, OpenDalStore};
use std::sync::Arc;
use tracing::info;

/// Initialize the durable document store from StoreConfig
pub(crate) fn init_store(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>> {
    info!("Initializing document store with backend: {}", config.backend);

    let store: Arc<dyn DocumentStore> = match config.backend {
        StoreBackend::None => {
            info!("No durable store configured, webhook state will not survive restarts");
            Arc::new(DisabledStore)
        }
        StoreBackend::Memory => Arc::new(OpenDalStore::new_memory()?),
        StoreBackend::Fs => {
            let fs = config.fs.clone().unwrap_or_default();
            info!("Using filesystem store at: {}", fs.path);
            Arc::new(
                OpenDalStore::new_fs(&fs.path)
                    .with_context(|| format!("Failed to open filesystem store at {}", fs.path))?,
            )
        }
        StoreBackend::S3 => {
            let s3 = config
                .s3
                .as_ref()
                .context("s3 config required for S3 backend")?;
            info!(
                "Using S3 store: bucket={}, region={}",
                s3.bucket, s3.region
            );
            Arc::new(OpenDalStore::new_s3(
                &s3.bucket,
                &s3.region,
                s3.endpoint.as_deref(),
            )?)
        }
    };

    Ok(store)
}

/// Initialize the neighbour lookup from CountriesConfig
pub(crate) fn init_neighbours(config: &CountriesConfig) -> Result<Arc<dyn NeighbourLookup>> {
    match config.mode {
        CountriesMode::Live => {
            info!("Using REST Countries service at: {}", config.base_url);
            let client = RestCountriesClient::new(config.base_url.clone(), config.timeout())
                .context("Failed to build countries HTTP client")?;
            Ok(Arc::new(client))
        }
        CountriesMode::Static => {
            info!("Using static neighbour table from: {}", config.static_path);
            let table = StaticNeighbours::load(&config.static_path).with_context(|| {
                format!("Failed to load neighbour table from {}", config.static_path)
            })?;
            Ok(Arc::new(table))
        }
    }
}

/// Initialize tracing/logging from RuntimeConfig
pub fn init_tracing(config: &RuntimeConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // A subscriber may already be installed when embedded
    let _ = match config.server.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
        LogFormat::Text => registry.with(fmt::layer()).try_init(),
    };
}
