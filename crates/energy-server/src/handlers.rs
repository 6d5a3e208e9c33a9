// HTTP request handlers for the dataset and status endpoints
//
// Both dataset endpoints read through the response cache and feed every
// country in the response to the webhook trigger engine, cached or not.

use anyhow::anyhow;
use axum::{
    extract::{Path, Query, State},
    http::{StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use energy_core::{normalize_request_key, path_segments, RecordSet, YearRange, YearRecord};
use metrics::counter;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::{AppError, AppState, API_VERSION};

const USAGE: &str = "Usage:\n\
/energy/v1/renewables/current/{country?}{?neighbours=bool?}\n\
/energy/v1/renewables/history/{country?}{?begin=year&end=year?}{?sortByValue=bool?}\n\
/energy/v1/notifications/{id?}\n\
/energy/v1/status\n";

const CURRENT_USAGE: &str = "Usage: /energy/v1/renewables/current/{country?}{?neighbours=bool?}";
const HISTORY_USAGE: &str =
    "Usage: /energy/v1/renewables/history/{country?}{?begin=year&end=year?}{?sortByValue=bool?}";

type Params = Query<HashMap<String, String>>;

/// GET / - Plain-text usage
pub(crate) async fn usage() -> impl IntoResponse {
    (StatusCode::OK, USAGE)
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    countries_api: u16,
    notification_db: u16,
    webhooks: usize,
    version: &'static str,
    uptime: u64,
}

/// GET /energy/v1/status - Availability of collaborators and service uptime
pub(crate) async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let (countries_api, notification_db) =
        tokio::join!(state.neighbours.status(), state.store.status());

    Json(StatusResponse {
        countries_api,
        notification_db,
        webhooks: state.webhooks.count(),
        version: API_VERSION,
        uptime: state.started.elapsed().as_secs(),
    })
}

/// GET /energy/v1/renewables/current - Newest record of every country
pub(crate) async fn renewables_current(
    State(state): State<AppState>,
    uri: Uri,
    Query(params): Params,
) -> Result<Json<Vec<YearRecord>>, AppError> {
    current(&state, &uri, &[], &params).await
}

/// GET /energy/v1/renewables/current/{country}
pub(crate) async fn renewables_current_path(
    State(state): State<AppState>,
    uri: Uri,
    Path(rest): Path<String>,
    Query(params): Params,
) -> Result<Json<Vec<YearRecord>>, AppError> {
    current(&state, &uri, &path_segments(&rest), &params).await
}

/// GET /energy/v1/renewables/history - Per-country averages
pub(crate) async fn renewables_history(
    State(state): State<AppState>,
    uri: Uri,
    Query(params): Params,
) -> Result<Json<Vec<YearRecord>>, AppError> {
    history(&state, &uri, &[], &params).await
}

/// GET /energy/v1/renewables/history/{country}
pub(crate) async fn renewables_history_path(
    State(state): State<AppState>,
    uri: Uri,
    Path(rest): Path<String>,
    Query(params): Params,
) -> Result<Json<Vec<YearRecord>>, AppError> {
    history(&state, &uri, &path_segments(&rest), &params).await
}

async fn current(
    state: &AppState,
    uri: &Uri,
    segments: &[&str],
    params: &HashMap<String, String>,
) -> Result<Json<Vec<YearRecord>>, AppError> {
    counter!("energy.requests", 1, "endpoint" => "current");

    let code = match segments {
        [] => None,
        [code] => Some(code.to_uppercase()),
        _ => return Err(AppError::bad_request(anyhow!(CURRENT_USAGE))),
    };

    let key = normalize_request_key(uri.path(), uri.query());
    if let Some(records) = cached(state, &key).await {
        return Ok(Json(records));
    }

    let set = match code {
        None => state.dataset.latest_all(),
        Some(code) => {
            let set = state.dataset.latest(&code);
            if set.is_empty() {
                return Err(unknown_country());
            }
            if flag(params, "neighbours") {
                match with_neighbours(state, &code, &set).await {
                    Some(full) => full,
                    None => {
                        // Degraded response, not cached
                        state.webhooks.invocate(&set.touched);
                        return Ok(Json(set.records));
                    }
                }
            } else {
                set
            }
        }
    };

    Ok(Json(respond(state, key, set)))
}

async fn history(
    state: &AppState,
    uri: &Uri,
    segments: &[&str],
    params: &HashMap<String, String>,
) -> Result<Json<Vec<YearRecord>>, AppError> {
    counter!("energy.requests", 1, "endpoint" => "history");

    let code = match segments {
        [] => None,
        [code] => Some(code.to_uppercase()),
        _ => return Err(AppError::bad_request(anyhow!(HISTORY_USAGE))),
    };

    let key = normalize_request_key(uri.path(), uri.query());
    if let Some(records) = cached(state, &key).await {
        return Ok(Json(records));
    }

    let range = YearRange::new(year(params, "begin"), year(params, "end"));
    let sort_by_value = flag(params, "sortByValue");

    let set = match code {
        None => state.dataset.historic_average(range, sort_by_value),
        Some(code) => {
            let set = state.dataset.historic(&code, range, sort_by_value);
            if set.is_empty() {
                return Err(unknown_country());
            }
            set
        }
    };

    Ok(Json(respond(state, key, set)))
}

/// Serve from the cache when possible. Cached responses still count as
/// accesses for webhook purposes.
async fn cached(state: &AppState, key: &str) -> Option<Vec<YearRecord>> {
    let records = state.cache.lookup(key).await?;
    debug!(key, "Serving cached response");
    let set = RecordSet::new(records);
    state.webhooks.invocate(&set.touched);
    Some(set.records)
}

fn respond(state: &AppState, key: String, set: RecordSet) -> Vec<YearRecord> {
    state.webhooks.invocate(&set.touched);
    state.cache.store(key, set.records.clone());
    set.records
}

/// The country's record followed by its neighbours'. `None` when the
/// neighbour lookup fails.
async fn with_neighbours(state: &AppState, code: &str, set: &RecordSet) -> Option<RecordSet> {
    let neighbours = match state.neighbours.neighbours(code).await {
        Ok(neighbours) => neighbours,
        Err(e) => {
            warn!(country = %code, error = %e, "Neighbour lookup failed, returning country only");
            return None;
        }
    };

    let mut records = set.records.clone();
    for neighbour in neighbours {
        records.extend(state.dataset.latest(&neighbour).records);
    }
    Some(RecordSet::new(records))
}

fn unknown_country() -> AppError {
    AppError::bad_request(anyhow!("Could not find specified country code"))
}

fn flag(params: &HashMap<String, String>, name: &str) -> bool {
    params
        .get(name)
        .map_or(false, |value| value.eq_ignore_ascii_case("true"))
}

/// Non-numeric years are treated as absent.
fn year(params: &HashMap<String, String>, name: &str) -> Option<i32> {
    params.get(name).and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn flags_and_years_are_lenient() {
        let p = params(&[("neighbours", "TRUE"), ("begin", "20x0"), ("end", "2020")]);
        assert!(flag(&p, "neighbours"));
        assert!(!flag(&p, "sortByValue"));
        assert_eq!(year(&p, "begin"), None);
        assert_eq!(year(&p, "end"), Some(2020));
    }
}
