// energy-store - Durable document store for counters, registrations and cached responses
//
// The rest of the workspace only sees the `DocumentStore` trait; the concrete
// backend is chosen once at startup.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use energy_core::{Registration, YearRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

mod batch;
mod disabled;
mod opendal_store;

pub use batch::PendingBatch;
pub use disabled::DisabledStore;
pub use opendal_store::{cache_document_key, OpenDalStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found: {0}")]
    NotFound(String),

    #[error("failed to decode document {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode document {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage backend error: {0}")]
    Backend(#[from] opendal::Error),

    #[error("durable store is disabled")]
    Disabled,
}

/// A cached response as stored durably.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub records: Vec<YearRecord>,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Write one coalesced batch: upsert counters and cache documents,
    /// upsert or delete registrations.
    async fn bulk_apply(&self, batch: &PendingBatch) -> Result<(), StoreError>;

    async fn get_cache_entry(&self, key: &str) -> Result<CacheEntry, StoreError>;

    async fn delete_cache_entry(&self, key: &str) -> Result<(), StoreError>;

    async fn get_all_counters(&self) -> Result<HashMap<String, u64>, StoreError>;

    async fn get_all_registrations(&self) -> Result<HashMap<String, Registration>, StoreError>;

    /// HTTP-style availability of the backend.
    async fn status(&self) -> u16;
}
