// Outbound webhook delivery
//
// Best effort: one POST attempt per trigger, no retries. Delivery runs on a
// detached task so a slow receiver never holds up the request that fired it.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// JSON body POSTed to a registered webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub webhook_id: String,
    /// Human-readable country name
    pub country: String,
    pub calls: u64,
}

pub trait Notifier: Send + Sync {
    /// Start delivery and return immediately.
    fn notify(&self, url: &str, payload: WebhookPayload);
}

/// Delivers callbacks with reqwest, capped at `max_in_flight` concurrent
/// requests. Callbacks over the cap are dropped.
pub struct HttpNotifier {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl HttpNotifier {
    pub fn new(timeout: Duration, max_in_flight: usize) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
        })
    }
}

impl Notifier for HttpNotifier {
    fn notify(&self, url: &str, payload: WebhookPayload) {
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                counter!("energy.webhook.failed", 1, "reason" => "saturated");
                warn!(
                    webhook_id = %payload.webhook_id,
                    "Too many webhook deliveries in flight, dropping callback"
                );
                return;
            }
        };

        let client = self.client.clone();
        let url = url.to_string();
        tokio::spawn(async move {
            let _permit = permit;
            match client.post(&url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    counter!("energy.webhook.dispatched", 1);
                    debug!(
                        webhook_id = %payload.webhook_id,
                        calls = payload.calls,
                        "Delivered webhook"
                    );
                }
                Ok(response) => {
                    counter!("energy.webhook.failed", 1, "reason" => "status");
                    warn!(
                        webhook_id = %payload.webhook_id,
                        url = %url,
                        status = response.status().as_u16(),
                        "Webhook receiver rejected callback"
                    );
                }
                Err(e) => {
                    counter!("energy.webhook.failed", 1, "reason" => "transport");
                    warn!(
                        webhook_id = %payload.webhook_id,
                        url = %url,
                        error = %e,
                        "Webhook delivery failed"
                    );
                }
            }
        });
    }
}
