// Webhook registration endpoints
//
//   GET    /energy/v1/notifications        list all registrations
//   GET    /energy/v1/notifications/{id}   one registration, 400 if unknown
//   POST   /energy/v1/notifications        register, 201 {"webhook_id"}
//   DELETE /energy/v1/notifications/{id}  204, 400 if unknown

use anyhow::anyhow;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use energy_core::{path_segments, Registration, RegistrationRequest};
use serde_json::json;

use crate::{AppError, AppState};

const ID_USAGE: &str = "Usage: /energy/v1/notifications/{id}";

pub(crate) async fn list(State(state): State<AppState>) -> Json<Vec<Registration>> {
    Json(state.webhooks.list())
}

/// Malformed JSON and failed validation both answer 400.
pub(crate) async fn register(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let request: RegistrationRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::bad_request(anyhow!("Invalid registration body: {}", e)))?;

    let registration = state
        .webhooks
        .register(&request)
        .map_err(AppError::bad_request)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "webhook_id": registration.webhook_id })),
    ))
}

pub(crate) async fn get_by_path(
    State(state): State<AppState>,
    Path(rest): Path<String>,
) -> Result<Json<Registration>, AppError> {
    let id = single_id(&rest)?;
    state
        .webhooks
        .get(id)
        .map(Json)
        .ok_or_else(|| AppError::bad_request(anyhow!("Could not find the webhook ID: {}", id)))
}

pub(crate) async fn delete_by_path(
    State(state): State<AppState>,
    Path(rest): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = single_id(&rest)?;
    match state.webhooks.delete(id) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(AppError::bad_request(anyhow!(
            "Could not find the webhook ID: {}",
            id
        ))),
    }
}

pub(crate) async fn delete_missing_id() -> AppError {
    AppError::bad_request(anyhow!(ID_USAGE))
}

pub(crate) async fn post_with_path() -> AppError {
    AppError::bad_request(anyhow!(
        "Expected POST in JSON on /energy/v1/notifications"
    ))
}

fn single_id(rest: &str) -> Result<&str, AppError> {
    match path_segments(rest).as_slice() {
        [id] => Ok(*id),
        _ => Err(AppError::bad_request(anyhow!(ID_USAGE))),
    }
}
