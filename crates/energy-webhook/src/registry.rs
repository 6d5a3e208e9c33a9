use crate::id::generate_webhook_id;
use energy_core::Registration;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Webhook registrations keyed by id.
///
/// Every operation takes the lock once and does no I/O while holding it.
#[derive(Debug, Default)]
pub struct RegistrationStore {
    inner: RwLock<HashMap<String, Registration>>,
}

impl RegistrationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(registrations: HashMap<String, Registration>) -> Self {
        Self {
            inner: RwLock::new(registrations),
        }
    }

    /// Allocate a fresh id and insert the registration under one write lock,
    /// so two concurrent registrations can never receive the same id.
    pub fn create(&self, url: String, country: String, calls: u64) -> Registration {
        let mut map = self.inner.write();
        let webhook_id = generate_webhook_id(|candidate| map.contains_key(candidate));
        let registration = Registration {
            webhook_id: webhook_id.clone(),
            url,
            country,
            calls,
        };
        map.insert(webhook_id, registration.clone());
        registration
    }

    /// Insert or replace a registration under its existing id.
    pub fn put(&self, registration: Registration) {
        self.inner
            .write()
            .insert(registration.webhook_id.clone(), registration);
    }

    pub fn get(&self, id: &str) -> Option<Registration> {
        self.inner.read().get(id).cloned()
    }

    /// Remove and return the registration so the caller can persist the delete.
    pub fn delete(&self, id: &str) -> Option<Registration> {
        self.inner.write().remove(id)
    }

    /// All registrations, ordered by id for stable output.
    pub fn list(&self) -> Vec<Registration> {
        let mut list: Vec<Registration> = self.inner.read().values().cloned().collect();
        list.sort_by(|a, b| a.webhook_id.cmp(&b.webhook_id));
        list
    }

    pub fn count(&self) -> usize {
        self.inner.read().len()
    }

    pub fn for_country(&self, country: &str) -> Vec<Registration> {
        self.inner
            .read()
            .values()
            .filter(|reg| reg.country == country)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn create_get_delete() {
        let store = RegistrationStore::new();
        let reg = store.create("http://localhost/a".into(), "NOR".into(), 3);

        assert_eq!(reg.webhook_id.len(), 13);
        assert_eq!(store.get(&reg.webhook_id), Some(reg.clone()));
        assert_eq!(store.count(), 1);
        assert_eq!(store.for_country("NOR").len(), 1);
        assert!(store.for_country("SWE").is_empty());

        assert_eq!(store.delete(&reg.webhook_id), Some(reg.clone()));
        assert_eq!(store.get(&reg.webhook_id), None);
        assert_eq!(store.count(), 0);
    }

    #[test]
    fn deleting_unknown_id_leaves_store_untouched() {
        let store = RegistrationStore::new();
        let reg = store.create("http://localhost/a".into(), "NOR".into(), 1);

        assert_eq!(store.delete("does-not-exist"), None);
        assert_eq!(store.list(), vec![reg]);
    }

    #[test]
    fn put_inserts_and_replaces_by_id() {
        let store = RegistrationStore::new();
        let mut reg = Registration {
            webhook_id: "restoredhook1".to_string(),
            url: "http://localhost/a".to_string(),
            country: "SWE".to_string(),
            calls: 2,
        };

        store.put(reg.clone());
        assert_eq!(store.get("restoredhook1"), Some(reg.clone()));

        reg.calls = 7;
        store.put(reg.clone());
        assert_eq!(store.count(), 1);
        assert_eq!(store.for_country("SWE"), vec![reg]);
    }

    #[test]
    fn concurrent_creates_get_distinct_ids() {
        let store = Arc::new(RegistrationStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..50)
                        .map(|_| {
                            store
                                .create("https://example.com".into(), "DEU".into(), 1)
                                .webhook_id
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let ids: HashSet<String> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        assert_eq!(ids.len(), 400);
        assert_eq!(store.count(), 400);
    }
}
