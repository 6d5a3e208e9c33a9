use crate::PersistenceHandle;
use chrono::Utc;
use energy_core::YearRecord;
use energy_store::{DocumentStore, StoreError};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Read-through / write-behind access to cached responses.
///
/// Lookups hit the durable store directly; stores go through the
/// persistence queue and never wait on I/O. Any store failure reads as a miss.
#[derive(Clone)]
pub struct CacheGateway {
    store: Arc<dyn DocumentStore>,
    persistence: PersistenceHandle,
    retention: Duration,
}

impl CacheGateway {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        persistence: PersistenceHandle,
        retention: Duration,
    ) -> Self {
        Self {
            store,
            persistence,
            retention,
        }
    }

    pub async fn lookup(&self, key: &str) -> Option<Vec<YearRecord>> {
        let entry = match self.store.get_cache_entry(key).await {
            Ok(entry) => entry,
            Err(StoreError::NotFound(_)) | Err(StoreError::Disabled) => {
                counter!("energy.cache.misses", 1);
                return None;
            }
            Err(e) => {
                counter!("energy.cache.misses", 1);
                warn!(key, error = %e, "Cache lookup failed, treating as miss");
                return None;
            }
        };

        let stale = Utc::now()
            .signed_duration_since(entry.created_at)
            .to_std()
            .map_or(false, |age| age > self.retention);

        if stale {
            counter!("energy.cache.misses", 1);
            debug!(key, created_at = %entry.created_at, "Evicting stale cache entry");
            let store = Arc::clone(&self.store);
            let key = key.to_string();
            tokio::spawn(async move {
                if let Err(e) = store.delete_cache_entry(&key).await {
                    warn!(key = %key, error = %e, "Failed to delete stale cache entry");
                }
            });
            return None;
        }

        counter!("energy.cache.hits", 1);
        Some(entry.records)
    }

    pub fn store(&self, key: String, records: Vec<YearRecord>) {
        self.persistence.record_cache(key, records);
    }
}
