// Trigger evaluation
//
// For every touched country: bump its counter, mirror the new value to the
// persistence queue, then fire each registration whose interval divides the
// new count. Countries are handled one after another, independently.

use crate::counter::InvocationCounter;
use crate::notifier::{Notifier, WebhookPayload};
use crate::registry::RegistrationStore;
use energy_batch::PersistenceHandle;
use energy_core::DatasetProvider;
use std::sync::Arc;
use tracing::{debug, info};

/// A registration whose threshold was met by an access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub webhook_id: String,
    pub url: String,
    pub country: String,
    pub calls: u64,
}

pub struct TriggerEngine {
    counter: Arc<InvocationCounter>,
    registrations: Arc<RegistrationStore>,
    dataset: Arc<dyn DatasetProvider>,
    persistence: PersistenceHandle,
    notifier: Arc<dyn Notifier>,
}

impl TriggerEngine {
    pub fn new(
        counter: Arc<InvocationCounter>,
        registrations: Arc<RegistrationStore>,
        dataset: Arc<dyn DatasetProvider>,
        persistence: PersistenceHandle,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            counter,
            registrations,
            dataset,
            persistence,
            notifier,
        }
    }

    pub fn invocate(&self, touched: &[String]) -> Vec<Trigger> {
        let mut fired = Vec::new();

        for code in touched {
            let count = self.counter.increment(code);
            self.persistence.record_count(code, count);

            let candidates = self.registrations.for_country(code);
            if candidates.is_empty() {
                continue;
            }

            let name = self.dataset.name(code).unwrap_or_else(|| code.clone());
            for registration in candidates {
                if registration.calls == 0 || count % registration.calls != 0 {
                    continue;
                }

                info!(
                    webhook_id = %registration.webhook_id,
                    country = %code,
                    calls = count,
                    "Webhook threshold reached"
                );
                self.notifier.notify(
                    &registration.url,
                    WebhookPayload {
                        webhook_id: registration.webhook_id.clone(),
                        country: name.clone(),
                        calls: count,
                    },
                );
                fired.push(Trigger {
                    webhook_id: registration.webhook_id,
                    url: registration.url,
                    country: code.clone(),
                    calls: count,
                });
            }
        }

        debug!(
            touched = touched.len(),
            fired = fired.len(),
            "Evaluated webhook triggers"
        );
        fired
    }
}
