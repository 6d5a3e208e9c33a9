// energy-config - Runtime configuration for the energy API
//
// Supports configuration from multiple sources:
// 1. Environment variables (highest priority, ENERGY_* prefix plus bare PORT)
// 2. Config file path from ENERGY_CONFIG env var
// 3. Config file contents from ENERGY_CONFIG_CONTENT env var
// 4. Default config file locations (./config.toml, ./.energy.toml)
// 5. Built-in defaults (lowest priority)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

mod env_overrides;
mod sources;
mod validation;

pub use env_overrides::{EnvSource, ENV_PREFIX};

/// Main runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub dataset: DatasetConfig,

    #[serde(default)]
    pub countries: CountriesConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub persistence: PersistenceConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

/// Location of the renewable-share CSV file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub csv_path: String,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            csv_path: "./res/renewable-share-energy.csv".to_string(),
        }
    }
}

/// Neighbour lookup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountriesConfig {
    #[serde(default)]
    pub mode: CountriesMode,
    #[serde(default = "default_countries_base_url")]
    pub base_url: String,
    #[serde(default = "default_countries_static_path")]
    pub static_path: String,
    #[serde(default = "default_countries_timeout_secs")]
    pub timeout_secs: u64,
}

impl CountriesConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CountriesConfig {
    fn default() -> Self {
        Self {
            mode: CountriesMode::default(),
            base_url: default_countries_base_url(),
            static_path: default_countries_static_path(),
            timeout_secs: default_countries_timeout_secs(),
        }
    }
}

fn default_countries_base_url() -> String {
    "https://restcountries.com/".to_string()
}

fn default_countries_static_path() -> String {
    "./res/countries.json".to_string()
}

fn default_countries_timeout_secs() -> u64 {
    10
}

/// Where neighbour information comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountriesMode {
    /// REST Countries compatible HTTP service
    #[default]
    Live,
    /// Local JSON file, no network
    Static,
}

impl std::fmt::Display for CountriesMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CountriesMode::Live => write!(f, "live"),
            CountriesMode::Static => write!(f, "static"),
        }
    }
}

impl std::str::FromStr for CountriesMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "live" | "rest" => Ok(CountriesMode::Live),
            "static" | "stub" => Ok(CountriesMode::Static),
            _ => anyhow::bail!("Unsupported countries mode: {}. Supported: live, static", s),
        }
    }
}

/// Durable store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs: Option<FsConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Config>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// No durable store; persistence is discarded
    #[default]
    None,
    Memory,
    Fs,
    S3,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::None => write!(f, "none"),
            StoreBackend::Memory => write!(f, "memory"),
            StoreBackend::Fs => write!(f, "fs"),
            StoreBackend::S3 => write!(f, "s3"),
        }
    }
}

impl std::str::FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "none" | "disabled" => Ok(StoreBackend::None),
            "memory" => Ok(StoreBackend::Memory),
            "fs" | "filesystem" => Ok(StoreBackend::Fs),
            "s3" | "aws" => Ok(StoreBackend::S3),
            _ => anyhow::bail!(
                "Unsupported store backend: {}. Supported: none, memory, fs, s3",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsConfig {
    pub path: String,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            path: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

/// Update aggregator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub flush_interval_secs: u64,
    pub counter_queue_capacity: usize,
    pub registration_queue_capacity: usize,
    pub cache_queue_capacity: usize,
    /// Cache writes retained across failed flushes are shed above this size
    pub max_pending_cache_entries: usize,
}

impl PersistenceConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            flush_interval_secs: 5,
            counter_queue_capacity: 1000,
            registration_queue_capacity: 64,
            cache_queue_capacity: 100,
            max_pending_cache_entries: 1000,
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub retention_secs: u64,
}

impl CacheConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            retention_secs: 7 * 24 * 60 * 60,
        }
    }
}

/// Outbound webhook delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub timeout_secs: u64,
    pub max_in_flight: usize,
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_in_flight: 64,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config()
    }

    /// Load configuration from a specific file path (for CLI usage).
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        sources::load_from_file_path(path)
    }

    /// Load configuration with graceful fallback to defaults.
    /// Does not fail if config file is missing.
    pub fn load_or_default() -> Result<Self> {
        sources::load_or_default()
    }

    /// Parse a TOML document on top of the built-in defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse TOML configuration")
    }

    /// Apply environment overrides from a custom source (tests, embedders).
    pub fn apply_env_overrides_from<E: EnvSource>(&mut self, env: &E) -> Result<()> {
        env_overrides::apply_env_overrides(self, env)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_backend_from_str() {
        assert_eq!(
            "none".parse::<StoreBackend>().unwrap(),
            StoreBackend::None
        );
        assert_eq!(
            "memory".parse::<StoreBackend>().unwrap(),
            StoreBackend::Memory
        );
        assert_eq!(
            "filesystem".parse::<StoreBackend>().unwrap(),
            StoreBackend::Fs
        );
        assert_eq!("S3".parse::<StoreBackend>().unwrap(), StoreBackend::S3);
        assert!("firestore".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_countries_mode_from_str() {
        assert_eq!(
            "stub".parse::<CountriesMode>().unwrap(),
            CountriesMode::Static
        );
        assert_eq!(
            "live".parse::<CountriesMode>().unwrap(),
            CountriesMode::Live
        );
        assert!("carrier-pigeon".parse::<CountriesMode>().is_err());
    }

    #[test]
    fn test_default_configs() {
        let config = RuntimeConfig::default();
        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.server.log_format, LogFormat::Text);
        assert_eq!(config.store.backend, StoreBackend::None);
        assert_eq!(config.persistence.flush_interval(), Duration::from_secs(5));
        assert_eq!(
            config.cache.retention(),
            Duration::from_secs(7 * 24 * 60 * 60)
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RuntimeConfig::from_toml_str(
            r#"
            [store]
            backend = "fs"

            [store.fs]
            path = "/var/lib/energy"

            [persistence]
            flush_interval_secs = 2
            counter_queue_capacity = 10
            registration_queue_capacity = 10
            cache_queue_capacity = 10
            max_pending_cache_entries = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.store.backend, StoreBackend::Fs);
        assert_eq!(config.store.fs.unwrap().path, "/var/lib/energy");
        assert_eq!(config.persistence.flush_interval_secs, 2);
        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.countries.mode, CountriesMode::Live);
    }
}
