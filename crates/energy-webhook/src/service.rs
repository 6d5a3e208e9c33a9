use crate::counter::InvocationCounter;
use crate::notifier::Notifier;
use crate::registry::RegistrationStore;
use crate::trigger::{Trigger, TriggerEngine};
use crate::validation::{validate, ValidationError};
use energy_batch::PersistenceHandle;
use energy_core::{DatasetProvider, Registration, RegistrationAction, RegistrationRequest};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Registrations, counters and trigger evaluation behind one handle.
///
/// Every mutation is mirrored to the persistence queue; nothing here waits
/// on the durable store.
pub struct WebhookService {
    registrations: Arc<RegistrationStore>,
    counter: Arc<InvocationCounter>,
    dataset: Arc<dyn DatasetProvider>,
    persistence: PersistenceHandle,
    trigger: TriggerEngine,
}

impl WebhookService {
    pub fn new(
        dataset: Arc<dyn DatasetProvider>,
        persistence: PersistenceHandle,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::with_state(
            dataset,
            persistence,
            notifier,
            HashMap::new(),
            HashMap::new(),
        )
    }

    /// Start from counters and registrations loaded from the durable store.
    /// Registrations for countries missing from the dataset are skipped.
    pub fn with_state(
        dataset: Arc<dyn DatasetProvider>,
        persistence: PersistenceHandle,
        notifier: Arc<dyn Notifier>,
        counters: HashMap<String, u64>,
        registrations: HashMap<String, Registration>,
    ) -> Self {
        let total = registrations.len();
        let registrations: HashMap<String, Registration> = registrations
            .into_iter()
            .filter(|(id, reg)| {
                let known = dataset.contains(&reg.country) && reg.calls > 0;
                if !known {
                    warn!(webhook_id = %id, country = %reg.country, "Ignoring stored registration");
                }
                known
            })
            .collect();

        info!(
            counters = counters.len(),
            registrations = registrations.len(),
            skipped = total - registrations.len(),
            "Webhook state loaded"
        );

        let registrations = Arc::new(RegistrationStore::from_map(registrations));
        let counter = Arc::new(InvocationCounter::from_map(counters));
        let trigger = TriggerEngine::new(
            Arc::clone(&counter),
            Arc::clone(&registrations),
            Arc::clone(&dataset),
            persistence.clone(),
            notifier,
        );

        Self {
            registrations,
            counter,
            dataset,
            persistence,
            trigger,
        }
    }

    pub fn register(&self, request: &RegistrationRequest) -> Result<Registration, ValidationError> {
        let valid = validate(request, self.dataset.as_ref())?;
        let registration = self
            .registrations
            .create(valid.url, valid.country, valid.calls);
        self.persistence
            .record_registration(RegistrationAction::Add(registration.clone()));
        info!(
            webhook_id = %registration.webhook_id,
            country = %registration.country,
            calls = registration.calls,
            "Registered webhook"
        );
        Ok(registration)
    }

    pub fn get(&self, id: &str) -> Option<Registration> {
        self.registrations.get(id)
    }

    pub fn list(&self) -> Vec<Registration> {
        self.registrations.list()
    }

    pub fn delete(&self, id: &str) -> Option<Registration> {
        let removed = self.registrations.delete(id)?;
        self.persistence
            .record_registration(RegistrationAction::Delete(removed.clone()));
        info!(webhook_id = %id, "Deleted webhook");
        Some(removed)
    }

    pub fn count(&self) -> usize {
        self.registrations.count()
    }

    pub fn invocation_count(&self, country: &str) -> u64 {
        self.counter.get(country)
    }

    /// Record an access to every touched country and fire due webhooks.
    pub fn invocate(&self, touched: &[String]) -> Vec<Trigger> {
        self.trigger.invocate(touched)
    }
}
