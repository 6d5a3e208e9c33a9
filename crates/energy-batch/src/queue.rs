use crate::AggregatorConfig;
use energy_core::{RegistrationAction, YearRecord};
use metrics::counter;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

/// Latest value of a country's invocation counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterUpdate {
    pub country: String,
    pub count: u64,
}

/// A computed response to be cached under `key`.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheWrite {
    pub key: String,
    pub records: Vec<YearRecord>,
}

/// Producer side of the persistence queues. Cheap to clone.
///
/// Every method returns immediately; when a queue is full the update is
/// dropped and logged.
#[derive(Debug, Clone)]
pub struct PersistenceHandle {
    counters: mpsc::Sender<CounterUpdate>,
    registrations: mpsc::Sender<RegistrationAction>,
    cache: mpsc::Sender<CacheWrite>,
}

/// Consumer side, owned by the `UpdateAggregator`.
#[derive(Debug)]
pub struct PersistenceQueues {
    pub(crate) counters: mpsc::Receiver<CounterUpdate>,
    pub(crate) registrations: mpsc::Receiver<RegistrationAction>,
    pub(crate) cache: mpsc::Receiver<CacheWrite>,
}

pub fn persistence_channel(config: &AggregatorConfig) -> (PersistenceHandle, PersistenceQueues) {
    let (counters_tx, counters_rx) = mpsc::channel(config.counter_queue_capacity.max(1));
    let (registrations_tx, registrations_rx) =
        mpsc::channel(config.registration_queue_capacity.max(1));
    let (cache_tx, cache_rx) = mpsc::channel(config.cache_queue_capacity.max(1));

    (
        PersistenceHandle {
            counters: counters_tx,
            registrations: registrations_tx,
            cache: cache_tx,
        },
        PersistenceQueues {
            counters: counters_rx,
            registrations: registrations_rx,
            cache: cache_rx,
        },
    )
}

impl PersistenceHandle {
    pub fn record_count(&self, country: &str, count: u64) {
        offer(
            &self.counters,
            CounterUpdate {
                country: country.to_string(),
                count,
            },
            "counters",
        );
    }

    pub fn record_registration(&self, action: RegistrationAction) {
        offer(&self.registrations, action, "registrations");
    }

    pub fn record_cache(&self, key: String, records: Vec<YearRecord>) {
        offer(&self.cache, CacheWrite { key, records }, "cache");
    }
}

fn offer<T>(sender: &mpsc::Sender<T>, item: T, queue: &'static str) {
    match sender.try_send(item) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            counter!("energy.persist.dropped", 1, "queue" => queue);
            warn!(queue, "Persistence queue full, dropping update");
        }
        Err(TrySendError::Closed(_)) => {
            counter!("energy.persist.dropped", 1, "queue" => queue);
            debug!(queue, "Persistence worker stopped, dropping update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_drops_instead_of_blocking() {
        let config = AggregatorConfig {
            counter_queue_capacity: 2,
            ..AggregatorConfig::default()
        };
        let (handle, mut queues) = persistence_channel(&config);

        for count in 1..=5 {
            handle.record_count("NOR", count);
        }

        assert_eq!(queues.counters.try_recv().unwrap().count, 1);
        assert_eq!(queues.counters.try_recv().unwrap().count, 2);
        assert!(queues.counters.try_recv().is_err());
    }

    #[test]
    fn closed_queue_is_silent() {
        let (handle, queues) = persistence_channel(&AggregatorConfig::default());
        drop(queues);
        handle.record_cache("/energy/v1/status".to_string(), Vec::new());
    }
}
