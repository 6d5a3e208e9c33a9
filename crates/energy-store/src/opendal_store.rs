// OpenDAL-backed document store
//
// Layout:
//   counters/{CODE}.json        {"count": n}
//   registrations/{id}.json     registration document
//   cache/{key}.json            {"records": [...], "created_at": "..."}

use crate::{CacheEntry, DocumentStore, PendingBatch, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use energy_core::{Registration, RegistrationAction};
use opendal::{services, ErrorKind, Operator};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

const COUNTERS_DIR: &str = "counters/";
const REGISTRATIONS_DIR: &str = "registrations/";
const CACHE_DIR: &str = "cache/";

#[derive(Debug, Serialize, Deserialize)]
struct CounterDoc {
    count: u64,
}

/// Map a normalised request key to a slash-free document name.
pub fn cache_document_key(key: &str) -> String {
    key.replace('/', "_")
}

#[derive(Clone)]
pub struct OpenDalStore {
    operator: Operator,
}

impl OpenDalStore {
    pub fn new_fs(root: &str) -> Result<Self, StoreError> {
        let builder = services::Fs::default().root(root);
        Ok(Self::from_operator(Operator::new(builder)?.finish()))
    }

    pub fn new_s3(bucket: &str, region: &str, endpoint: Option<&str>) -> Result<Self, StoreError> {
        let mut builder = services::S3::default().bucket(bucket).region(region);
        if let Some(ep) = endpoint {
            builder = builder.endpoint(ep);
        }
        Ok(Self::from_operator(Operator::new(builder)?.finish()))
    }

    /// Process-local store, lost on exit.
    pub fn new_memory() -> Result<Self, StoreError> {
        Ok(Self::from_operator(
            Operator::new(services::Memory::default())?.finish(),
        ))
    }

    pub fn from_operator(operator: Operator) -> Self {
        Self { operator }
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    async fn write_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value).map_err(|source| StoreError::Encode {
            path: path.to_string(),
            source,
        })?;
        self.operator.write(path, bytes).await?;
        Ok(())
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, StoreError> {
        let buffer = match self.operator.read(path).await {
            Ok(buffer) => buffer,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(path.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_slice(&buffer.to_vec()).map_err(|source| StoreError::Decode {
            path: path.to_string(),
            source,
        })
    }

    /// Names (without `.json`) of the documents under `dir`.
    async fn list_ids(&self, dir: &str) -> Result<Vec<String>, StoreError> {
        let entries = match self.operator.list(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(entries
            .iter()
            .filter_map(|entry| entry.name().strip_suffix(".json"))
            .map(str::to_string)
            .collect())
    }
}

fn counter_path(code: &str) -> String {
    format!("{COUNTERS_DIR}{code}.json")
}

fn registration_path(id: &str) -> String {
    format!("{REGISTRATIONS_DIR}{id}.json")
}

fn cache_path(key: &str) -> String {
    format!("{CACHE_DIR}{}.json", cache_document_key(key))
}

#[async_trait]
impl DocumentStore for OpenDalStore {
    async fn bulk_apply(&self, batch: &PendingBatch) -> Result<(), StoreError> {
        for (code, count) in &batch.counters {
            self.write_json(&counter_path(code), &CounterDoc { count: *count })
                .await?;
        }

        for action in batch.registrations.values() {
            match action {
                RegistrationAction::Add(reg) => {
                    self.write_json(&registration_path(&reg.webhook_id), reg)
                        .await?;
                }
                RegistrationAction::Delete(reg) => {
                    self.operator
                        .delete(&registration_path(&reg.webhook_id))
                        .await?;
                }
            }
        }

        let created_at = Utc::now();
        for (key, records) in &batch.cache {
            let entry = CacheEntry {
                records: records.clone(),
                created_at,
            };
            self.write_json(&cache_path(key), &entry).await?;
        }

        debug!(
            counters = batch.counters.len(),
            registrations = batch.registrations.len(),
            cache = batch.cache.len(),
            "Applied batch"
        );
        Ok(())
    }

    async fn get_cache_entry(&self, key: &str) -> Result<CacheEntry, StoreError> {
        self.read_json(&cache_path(key)).await
    }

    async fn delete_cache_entry(&self, key: &str) -> Result<(), StoreError> {
        self.operator.delete(&cache_path(key)).await?;
        Ok(())
    }

    async fn get_all_counters(&self) -> Result<HashMap<String, u64>, StoreError> {
        let mut counters = HashMap::new();
        for code in self.list_ids(COUNTERS_DIR).await? {
            match self.read_json::<CounterDoc>(&counter_path(&code)).await {
                Ok(doc) => {
                    counters.insert(code, doc.count);
                }
                Err(e) => warn!(country = %code, error = %e, "Skipping unreadable counter"),
            }
        }
        Ok(counters)
    }

    async fn get_all_registrations(&self) -> Result<HashMap<String, Registration>, StoreError> {
        let mut registrations = HashMap::new();
        for id in self.list_ids(REGISTRATIONS_DIR).await? {
            match self.read_json::<Registration>(&registration_path(&id)).await {
                Ok(reg) => {
                    registrations.insert(id, reg);
                }
                Err(e) => warn!(webhook_id = %id, error = %e, "Skipping unreadable registration"),
            }
        }
        Ok(registrations)
    }

    async fn status(&self) -> u16 {
        match self.operator.check().await {
            Ok(()) => 200,
            Err(e) => {
                warn!(error = %e, "Durable store check failed");
                500
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use energy_core::YearRecord;

    fn registration(id: &str) -> Registration {
        Registration {
            webhook_id: id.to_string(),
            url: "https://example.com/hook".to_string(),
            country: "SWE".to_string(),
            calls: 3,
        }
    }

    fn record() -> YearRecord {
        YearRecord {
            name: "Sweden".to_string(),
            iso_code: "SWE".to_string(),
            year: Some(2021),
            percentage: 50.9,
        }
    }

    #[tokio::test]
    async fn bulk_apply_round_trips_through_memory() {
        let store = OpenDalStore::new_memory().unwrap();

        let mut batch = PendingBatch::new();
        batch.record_count("SWE", 7);
        batch.record_registration(RegistrationAction::Add(registration("keep")));
        batch.record_registration(RegistrationAction::Add(registration("drop")));
        batch.record_cache("/energy/v1/renewables/current/swe".to_string(), vec![record()]);
        store.bulk_apply(&batch).await.unwrap();

        let mut batch = PendingBatch::new();
        batch.record_registration(RegistrationAction::Delete(registration("drop")));
        store.bulk_apply(&batch).await.unwrap();

        assert_eq!(store.get_all_counters().await.unwrap().get("SWE"), Some(&7));

        let regs = store.get_all_registrations().await.unwrap();
        assert_eq!(regs.len(), 1);
        assert_eq!(regs.get("keep"), Some(&registration("keep")));

        let entry = store
            .get_cache_entry("/energy/v1/renewables/current/swe")
            .await
            .unwrap();
        assert_eq!(entry.records, vec![record()]);
    }

    #[tokio::test]
    async fn missing_cache_entry_is_not_found() {
        let store = OpenDalStore::new_memory().unwrap();
        let err = store.get_cache_entry("/nothing").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        store.delete_cache_entry("/nothing").await.unwrap();
        assert!(store.get_all_counters().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn filesystem_store_uses_slash_free_names() {
        let dir = tempfile::tempdir().unwrap();
        let store = OpenDalStore::new_fs(dir.path().to_str().unwrap()).unwrap();

        let mut batch = PendingBatch::new();
        batch.record_cache("/energy/v1/renewables/history".to_string(), vec![record()]);
        store.bulk_apply(&batch).await.unwrap();

        assert!(dir
            .path()
            .join("cache")
            .join("_energy_v1_renewables_history.json")
            .exists());
        assert_eq!(store.status().await, 200);
    }
}
