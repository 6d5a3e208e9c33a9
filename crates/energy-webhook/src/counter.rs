use parking_lot::RwLock;
use std::collections::HashMap;

/// Per-country invocation counters. Values only ever grow.
#[derive(Debug, Default)]
pub struct InvocationCounter {
    counts: RwLock<HashMap<String, u64>>,
}

impl InvocationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(counts: HashMap<String, u64>) -> Self {
        Self {
            counts: RwLock::new(counts),
        }
    }

    /// Increment and return the post-increment value.
    pub fn increment(&self, country: &str) -> u64 {
        let mut counts = self.counts.write();
        let count = counts.entry(country.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn get(&self, country: &str) -> u64 {
        self.counts.read().get(country).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counts.read().clone()
    }
}
