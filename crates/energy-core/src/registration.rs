use serde::{Deserialize, Serialize};

/// Body of `POST /notifications`.
///
/// `calls` is signed so that zero and negative intervals reach validation
/// instead of failing JSON decoding.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistrationRequest {
    pub url: String,
    pub country: String,
    pub calls: i64,
}

/// A stored webhook registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub webhook_id: String,
    pub url: String,
    pub country: String,
    pub calls: u64,
}

/// A pending change to the registrations collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationAction {
    Add(Registration),
    Delete(Registration),
}

impl RegistrationAction {
    pub fn webhook_id(&self) -> &str {
        match self {
            RegistrationAction::Add(reg) | RegistrationAction::Delete(reg) => &reg.webhook_id,
        }
    }
}
