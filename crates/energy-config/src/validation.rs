// Configuration validation
//
// Validates that required fields are present and values are sensible

use crate::*;
use anyhow::{bail, Result};
use tracing::warn;

pub fn validate_config(config: &RuntimeConfig) -> Result<()> {
    validate_server_config(&config.server)?;

    if config.dataset.csv_path.is_empty() {
        bail!("dataset.csv_path must not be empty");
    }

    validate_countries_config(&config.countries)?;
    validate_store_config(&config.store)?;
    validate_persistence_config(&config.persistence)?;

    if config.cache.retention_secs == 0 {
        warn!("cache.retention_secs is 0; every cached response will be treated as stale");
    }

    if config.webhook.timeout_secs == 0 {
        bail!("webhook.timeout_secs must be greater than 0");
    }
    if config.webhook.max_in_flight == 0 {
        bail!("webhook.max_in_flight must be greater than 0");
    }

    Ok(())
}

fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.listen_addr.is_empty() {
        bail!("server.listen_addr must not be empty");
    }
    Ok(())
}

fn validate_countries_config(config: &CountriesConfig) -> Result<()> {
    match config.mode {
        CountriesMode::Live => {
            if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://")
            {
                bail!("countries.base_url must start with http:// or https://");
            }
            if config.timeout_secs == 0 {
                bail!("countries.timeout_secs must be greater than 0");
            }
        }
        CountriesMode::Static => {
            if config.static_path.is_empty() {
                bail!("countries.static_path must not be empty in static mode");
            }
        }
    }
    Ok(())
}

fn validate_store_config(config: &StoreConfig) -> Result<()> {
    match config.backend {
        StoreBackend::None | StoreBackend::Memory => {}
        StoreBackend::Fs => {
            if let Some(fs) = config.fs.as_ref() {
                if fs.path.is_empty() {
                    bail!("store.fs.path must not be empty");
                }
            }
        }
        StoreBackend::S3 => {
            let s3 = config
                .s3
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("s3 store backend requires 's3' configuration"))?;

            if s3.bucket.is_empty() {
                bail!("store.s3.bucket is required for S3 backend");
            }

            if s3.region.is_empty() {
                bail!("store.s3.region is required for S3 backend");
            }
        }
    }
    Ok(())
}

fn validate_persistence_config(config: &PersistenceConfig) -> Result<()> {
    if config.flush_interval_secs == 0 {
        bail!("persistence.flush_interval_secs must be greater than 0");
    }

    if config.counter_queue_capacity == 0
        || config.registration_queue_capacity == 0
        || config.cache_queue_capacity == 0
    {
        bail!("persistence queue capacities must be greater than 0");
    }

    if config.flush_interval_secs > 300 {
        warn!(
            flush_interval_secs = config.flush_interval_secs,
            "persistence.flush_interval_secs is very large; updates may be lost on crash"
        );
    }

    Ok(())
}
