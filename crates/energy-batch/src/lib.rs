// energy-batch - Write-behind persistence for the energy API
//
// Request handlers never write to the durable store directly. They push
// updates onto bounded queues through a `PersistenceHandle`; a single
// `UpdateAggregator` task coalesces them into one `PendingBatch` and flushes
// it on a fixed interval.

use std::time::Duration;

mod aggregator;
mod cache;
mod queue;

pub use aggregator::UpdateAggregator;
pub use cache::CacheGateway;
pub use queue::{persistence_channel, CacheWrite, CounterUpdate, PersistenceHandle, PersistenceQueues};

/// Tuning for the persistence queues and the aggregator
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub flush_interval: Duration,
    pub counter_queue_capacity: usize,
    pub registration_queue_capacity: usize,
    pub cache_queue_capacity: usize,
    /// Cache writes kept across failed flushes are shed above this count
    pub max_pending_cache_entries: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_secs(5),
            counter_queue_capacity: 1000,
            registration_queue_capacity: 64,
            cache_queue_capacity: 100,
            max_pending_cache_entries: 1000,
        }
    }
}
