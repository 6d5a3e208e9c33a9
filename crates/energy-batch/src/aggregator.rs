// Update aggregator
//
// Single consumer of the persistence queues. Owns the pending batch, so no
// lock is needed around it.

use crate::queue::PersistenceQueues;
use crate::AggregatorConfig;
use energy_store::{DocumentStore, PendingBatch};
use metrics::counter;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct UpdateAggregator {
    store: Arc<dyn DocumentStore>,
    queues: PersistenceQueues,
    batch: PendingBatch,
    config: AggregatorConfig,
}

impl UpdateAggregator {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        queues: PersistenceQueues,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            store,
            queues,
            batch: PendingBatch::new(),
            config,
        }
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// Consume updates until `shutdown` is cancelled, then drain whatever is
    /// still queued and flush once more.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let interval = self.config.flush_interval;
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!(
            "Update aggregator started (interval={}ms)",
            interval.as_millis()
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(update) = self.queues.counters.recv() => {
                    self.batch.record_count(&update.country, update.count);
                }
                Some(action) = self.queues.registrations.recv() => {
                    self.batch.record_registration(action);
                }
                Some(write) = self.queues.cache.recv() => {
                    self.batch.record_cache(write.key, write.records);
                }
                _ = ticker.tick() => {
                    self.flush().await;
                }
            }
        }

        self.drain();
        if self.batch.is_dirty() {
            info!(
                entries = self.batch.len(),
                "Flushing pending updates before shutdown"
            );
            self.flush().await;
        }
        debug!("Update aggregator stopped");
    }

    fn drain(&mut self) {
        while let Ok(update) = self.queues.counters.try_recv() {
            self.batch.record_count(&update.country, update.count);
        }
        while let Ok(action) = self.queues.registrations.try_recv() {
            self.batch.record_registration(action);
        }
        while let Ok(write) = self.queues.cache.try_recv() {
            self.batch.record_cache(write.key, write.records);
        }
    }

    /// Write the pending batch if it has changes. A failed batch is kept for
    /// the next tick; only its cache writes are capped.
    async fn flush(&mut self) {
        if !self.batch.is_dirty() {
            return;
        }

        match self.store.bulk_apply(&self.batch).await {
            Ok(()) => {
                counter!("energy.persist.flushes", 1);
                debug!(
                    counters = self.batch.counters.len(),
                    registrations = self.batch.registrations.len(),
                    cache = self.batch.cache.len(),
                    "Flushed pending batch"
                );
                self.batch = PendingBatch::new();
            }
            Err(e) => {
                counter!("energy.persist.flush_failures", 1);
                warn!(
                    error = %e,
                    entries = self.batch.len(),
                    "Failed to flush batch, retrying on next tick"
                );
                let shed = self
                    .batch
                    .shed_cache(self.config.max_pending_cache_entries);
                if shed > 0 {
                    counter!("energy.persist.dropped", shed as u64, "queue" => "cache");
                    warn!(shed, "Dropped retained cache writes");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence_channel;
    use async_trait::async_trait;
    use energy_core::{Registration, RegistrationAction};
    use energy_store::{CacheEntry, StoreError};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Records every applied batch; fails while `failing` is set.
    #[derive(Default)]
    struct Recorder {
        batches: Mutex<Vec<PendingBatch>>,
        failing: AtomicBool,
    }

    #[async_trait]
    impl DocumentStore for Recorder {
        async fn bulk_apply(&self, batch: &PendingBatch) -> Result<(), StoreError> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Disabled);
            }
            self.batches.lock().unwrap().push(batch.clone());
            Ok(())
        }

        async fn get_cache_entry(&self, key: &str) -> Result<CacheEntry, StoreError> {
            Err(StoreError::NotFound(key.to_string()))
        }

        async fn delete_cache_entry(&self, _key: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn get_all_counters(&self) -> Result<HashMap<String, u64>, StoreError> {
            Ok(HashMap::new())
        }

        async fn get_all_registrations(
            &self,
        ) -> Result<HashMap<String, Registration>, StoreError> {
            Ok(HashMap::new())
        }

        async fn status(&self) -> u16 {
            200
        }
    }

    fn registration(id: &str) -> Registration {
        Registration {
            webhook_id: id.to_string(),
            url: "http://localhost/hook".to_string(),
            country: "FIN".to_string(),
            calls: 1,
        }
    }

    fn config(flush_interval: Duration) -> AggregatorConfig {
        AggregatorConfig {
            flush_interval,
            max_pending_cache_entries: 1,
            ..AggregatorConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn coalesces_updates_into_one_flush_per_tick() {
        let store = Arc::new(Recorder::default());
        let config = config(Duration::from_secs(5));
        let (handle, queues) = persistence_channel(&config);
        let shutdown = CancellationToken::new();
        let task = UpdateAggregator::new(store.clone(), queues, config).spawn(shutdown.clone());

        handle.record_count("FIN", 1);
        handle.record_count("FIN", 2);
        handle.record_count("SWE", 1);
        handle.record_registration(RegistrationAction::Add(registration("a")));
        handle.record_registration(RegistrationAction::Delete(registration("a")));

        time::sleep(Duration::from_secs(6)).await;

        {
            let batches = store.batches.lock().unwrap();
            assert_eq!(batches.len(), 1);
            assert_eq!(batches[0].counters.get("FIN"), Some(&2));
            assert_eq!(batches[0].counters.get("SWE"), Some(&1));
            assert!(matches!(
                batches[0].registrations.get("a"),
                Some(RegistrationAction::Delete(_))
            ));
        }

        // Nothing new arrived, so the next tick writes nothing.
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.batches.lock().unwrap().len(), 1);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_flush_is_retried_with_cache_shed() {
        let store = Arc::new(Recorder::default());
        store.failing.store(true, Ordering::SeqCst);
        let config = config(Duration::from_secs(5));
        let (handle, queues) = persistence_channel(&config);
        let shutdown = CancellationToken::new();
        let task = UpdateAggregator::new(store.clone(), queues, config).spawn(shutdown.clone());

        handle.record_count("NOR", 10);
        handle.record_cache("/a".to_string(), Vec::new());
        handle.record_cache("/b".to_string(), Vec::new());

        time::sleep(Duration::from_secs(6)).await;
        assert!(store.batches.lock().unwrap().is_empty());

        store.failing.store(false, Ordering::SeqCst);
        time::sleep(Duration::from_secs(5)).await;

        {
            let batches = store.batches.lock().unwrap();
            assert_eq!(batches.len(), 1);
            assert_eq!(batches[0].counters.get("NOR"), Some(&10));
            assert_eq!(batches[0].cache.len(), 1);
        }

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_flushes_queued_updates() {
        let store = Arc::new(Recorder::default());
        let config = config(Duration::from_secs(3600));
        let (handle, queues) = persistence_channel(&config);
        let shutdown = CancellationToken::new();

        handle.record_count("DEU", 5);
        handle.record_cache("/energy/v1/renewables/current/deu".to_string(), Vec::new());

        shutdown.cancel();
        UpdateAggregator::new(store.clone(), queues, config)
            .run(shutdown)
            .await;

        let batches = store.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].counters.get("DEU"), Some(&5));
        assert_eq!(batches[0].cache.len(), 1);
    }
}
