// energy-webhook - Webhook registrations and threshold notifications
//
// Clients register a URL for a country and an interval N; every Nth access
// to that country's data POSTs a notification to the URL.

mod counter;
mod id;
mod notifier;
mod registry;
mod service;
mod trigger;
mod validation;

pub use counter::InvocationCounter;
pub use id::{generate_webhook_id, WEBHOOK_ID_LEN};
pub use notifier::{HttpNotifier, Notifier, WebhookPayload};
pub use registry::RegistrationStore;
pub use service::WebhookService;
pub use trigger::{Trigger, TriggerEngine};
pub use validation::{validate, ValidRegistration, ValidationError};
