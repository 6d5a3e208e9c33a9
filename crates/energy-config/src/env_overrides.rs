use super::{FsConfig, LogFormat, RuntimeConfig, S3Config, StoreBackend};
use anyhow::{anyhow, Context, Result};

pub const ENV_PREFIX: &str = "ENERGY_";

/// Abstraction over environment-variable lookups so tests can supply
/// a fixed map instead of the process environment.
pub trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;

    /// Get an environment variable WITHOUT the ENERGY_ prefix
    /// Used for platform variables such as PORT
    fn get_raw(&self, key: &str) -> Option<String>;
}

/// Apply environment-variable overrides (highest priority) to the runtime config.
pub fn apply_env_overrides<E: EnvSource>(config: &mut RuntimeConfig, env: &E) -> Result<()> {
    // Hosting platforms hand out the port through a bare PORT variable
    if let Some(port) = env.get_raw("PORT") {
        let port = port
            .parse::<u16>()
            .map_err(|e| anyhow!("Failed to parse PORT: {}", e))?;
        config.server.listen_addr = format!("0.0.0.0:{}", port);
    }

    // Server configuration (listen addr, log level/format)
    if let Some(addr) = env.get("LISTEN_ADDR") {
        config.server.listen_addr = addr;
    }
    if let Some(level) = env.get("LOG_LEVEL") {
        config.server.log_level = level;
    }
    if let Some(format) = env.get("LOG_FORMAT") {
        config.server.log_format = match format.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };
    }

    // Dataset
    if let Some(path) = env.get("CSV_PATH") {
        config.dataset.csv_path = path;
    }

    // Countries lookup
    if let Some(mode) = env.get("COUNTRIES_MODE") {
        config.countries.mode = mode
            .parse()
            .context("Invalid ENERGY_COUNTRIES_MODE value")?;
    }
    if let Some(base_url) = env.get("COUNTRIES_BASE_URL") {
        config.countries.base_url = base_url;
    }
    if let Some(path) = env.get("COUNTRIES_STATIC_PATH") {
        config.countries.static_path = path;
    }
    if let Some(val) = get_env_u64(env, "COUNTRIES_TIMEOUT_SECS")? {
        config.countries.timeout_secs = val;
    }

    // Store backend
    if let Some(backend) = env.get("STORE_BACKEND") {
        config.store.backend = backend
            .parse::<StoreBackend>()
            .context("Invalid ENERGY_STORE_BACKEND value")?;
    }
    if let Some(path) = env.get("STORE_PATH") {
        config.store.fs.get_or_insert_with(FsConfig::default).path = path;
    }
    if let Some(bucket) = env.get("S3_BUCKET") {
        ensure_s3(config).bucket = bucket;
    }
    if let Some(region) = env.get("S3_REGION") {
        ensure_s3(config).region = region;
    }
    if let Some(endpoint) = env.get("S3_ENDPOINT") {
        ensure_s3(config).endpoint = Some(endpoint);
    }

    // Persistence
    if let Some(val) = get_env_u64(env, "FLUSH_INTERVAL_SECS")? {
        config.persistence.flush_interval_secs = val;
    }
    if let Some(val) = get_env_usize(env, "COUNTER_QUEUE_CAPACITY")? {
        config.persistence.counter_queue_capacity = val;
    }
    if let Some(val) = get_env_usize(env, "REGISTRATION_QUEUE_CAPACITY")? {
        config.persistence.registration_queue_capacity = val;
    }
    if let Some(val) = get_env_usize(env, "CACHE_QUEUE_CAPACITY")? {
        config.persistence.cache_queue_capacity = val;
    }
    if let Some(val) = get_env_usize(env, "MAX_PENDING_CACHE_ENTRIES")? {
        config.persistence.max_pending_cache_entries = val;
    }

    // Cache and webhooks
    if let Some(val) = get_env_u64(env, "CACHE_RETENTION_SECS")? {
        config.cache.retention_secs = val;
    }
    if let Some(val) = get_env_u64(env, "WEBHOOK_TIMEOUT_SECS")? {
        config.webhook.timeout_secs = val;
    }
    if let Some(val) = get_env_usize(env, "WEBHOOK_MAX_IN_FLIGHT")? {
        config.webhook.max_in_flight = val;
    }

    Ok(())
}

fn ensure_s3(config: &mut RuntimeConfig) -> &mut S3Config {
    config.store.s3.get_or_insert_with(S3Config::default)
}

fn get_env_usize<E: EnvSource>(env: &E, key: &str) -> Result<Option<usize>> {
    match env.get(key) {
        Some(val) => {
            let parsed = val
                .parse::<usize>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

fn get_env_u64<E: EnvSource>(env: &E, key: &str) -> Result<Option<u64>> {
    match env.get(key) {
        Some(val) => {
            let parsed = val
                .parse::<u64>()
                .map_err(|e| anyhow!("Failed to parse {}{}: {}", ENV_PREFIX, key, e))?;
            Ok(Some(parsed))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CountriesMode;
    use std::collections::HashMap;

    struct MapEnv(HashMap<&'static str, &'static str>);

    impl EnvSource for MapEnv {
        fn get(&self, key: &str) -> Option<String> {
            self.get_raw(&format!("{}{}", ENV_PREFIX, key))
        }

        fn get_raw(&self, key: &str) -> Option<String> {
            self.0.get(key).map(|v| v.to_string())
        }
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let env = MapEnv(HashMap::from([
            ("ENERGY_STORE_BACKEND", "fs"),
            ("ENERGY_STORE_PATH", "/tmp/energy"),
            ("ENERGY_COUNTRIES_MODE", "static"),
            ("ENERGY_FLUSH_INTERVAL_SECS", "1"),
            ("ENERGY_LOG_FORMAT", "JSON"),
        ]));
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();

        assert_eq!(config.store.backend, StoreBackend::Fs);
        assert_eq!(config.store.fs.as_ref().unwrap().path, "/tmp/energy");
        assert_eq!(config.countries.mode, CountriesMode::Static);
        assert_eq!(config.persistence.flush_interval_secs, 1);
        assert_eq!(config.server.log_format, LogFormat::Json);
    }

    #[test]
    fn listen_addr_wins_over_port() {
        let env = MapEnv(HashMap::from([
            ("PORT", "9000"),
            ("ENERGY_LISTEN_ADDR", "127.0.0.1:7000"),
        ]));
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();
        assert_eq!(config.server.listen_addr, "127.0.0.1:7000");

        let env = MapEnv(HashMap::from([("PORT", "9000")]));
        let mut config = RuntimeConfig::default();
        apply_env_overrides(&mut config, &env).unwrap();
        assert_eq!(config.server.listen_addr, "0.0.0.0:9000");
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let env = MapEnv(HashMap::from([("ENERGY_CACHE_RETENTION_SECS", "a week")]));
        let mut config = RuntimeConfig::default();
        let err = apply_env_overrides(&mut config, &env).unwrap_err();
        assert!(err.to_string().contains("ENERGY_CACHE_RETENTION_SECS"));
    }
}
