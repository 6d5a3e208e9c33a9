use crate::{CacheEntry, DocumentStore, PendingBatch, StoreError};
use async_trait::async_trait;
use energy_core::Registration;
use std::collections::HashMap;
use tracing::trace;

/// Store used when no backend is configured. Writes are discarded and
/// every lookup misses.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledStore;

#[async_trait]
impl DocumentStore for DisabledStore {
    async fn bulk_apply(&self, batch: &PendingBatch) -> Result<(), StoreError> {
        trace!(entries = batch.len(), "Discarding batch, store disabled");
        Ok(())
    }

    async fn get_cache_entry(&self, _key: &str) -> Result<CacheEntry, StoreError> {
        Err(StoreError::Disabled)
    }

    async fn delete_cache_entry(&self, _key: &str) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get_all_counters(&self) -> Result<HashMap<String, u64>, StoreError> {
        Ok(HashMap::new())
    }

    async fn get_all_registrations(&self) -> Result<HashMap<String, Registration>, StoreError> {
        Ok(HashMap::new())
    }

    async fn status(&self) -> u16 {
        503
    }
}
