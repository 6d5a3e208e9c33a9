use energy_core::{DatasetProvider, RegistrationRequest};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("number of calls must be 1 or higher, got {0}")]
    InvalidCalls(i64),

    #[error("URL must be prefixed by http:// or https://")]
    InvalidUrl(String),

    #[error("country not recognized: {0}")]
    UnknownCountry(String),
}

/// A registration request that passed validation, with the country code
/// upper-cased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidRegistration {
    pub url: String,
    pub country: String,
    pub calls: u64,
}

pub fn validate(
    request: &RegistrationRequest,
    dataset: &dyn DatasetProvider,
) -> Result<ValidRegistration, ValidationError> {
    if request.calls < 1 {
        return Err(ValidationError::InvalidCalls(request.calls));
    }

    if !request.url.starts_with("http://") && !request.url.starts_with("https://") {
        return Err(ValidationError::InvalidUrl(request.url.clone()));
    }

    let country = request.country.trim().to_uppercase();
    if !dataset.contains(&country) {
        return Err(ValidationError::UnknownCountry(request.country.clone()));
    }

    Ok(ValidRegistration {
        url: request.url.clone(),
        country,
        calls: request.calls as u64,
    })
}
