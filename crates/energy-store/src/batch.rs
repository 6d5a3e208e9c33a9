use energy_core::{RegistrationAction, YearRecord};
use std::collections::HashMap;

/// Coalesced updates waiting for the next flush.
///
/// Every map is keyed so that a later update for the same key replaces the
/// earlier one; applying the same batch twice leaves the store unchanged.
#[derive(Debug, Default, Clone)]
pub struct PendingBatch {
    pub counters: HashMap<String, u64>,
    pub registrations: HashMap<String, RegistrationAction>,
    pub cache: HashMap<String, Vec<YearRecord>>,
    dirty: bool,
}

impl PendingBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the highest counter value seen for `country`.
    pub fn record_count(&mut self, country: &str, count: u64) {
        let entry = self.counters.entry(country.to_string()).or_insert(count);
        if count > *entry {
            *entry = count;
        }
        self.dirty = true;
    }

    /// Last action for a webhook id wins.
    pub fn record_registration(&mut self, action: RegistrationAction) {
        self.registrations
            .insert(action.webhook_id().to_string(), action);
        self.dirty = true;
    }

    pub fn record_cache(&mut self, key: String, records: Vec<YearRecord>) {
        self.cache.insert(key, records);
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn len(&self) -> usize {
        self.counters.len() + self.registrations.len() + self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop cache writes beyond `max` entries, returning how many were shed.
    pub fn shed_cache(&mut self, max: usize) -> usize {
        if self.cache.len() <= max {
            return 0;
        }
        let excess = self.cache.len() - max;
        let victims: Vec<String> = self.cache.keys().take(excess).cloned().collect();
        for key in &victims {
            self.cache.remove(key);
        }
        victims.len()
    }
}
