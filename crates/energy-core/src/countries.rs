// Neighbour lookup
//
// Bordering countries come either from a REST Countries compatible service
// or from a static JSON file shipped in res/.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CountriesError {
    #[error("countries request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("countries API returned status {0}")]
    Status(u16),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid countries document: {0}")]
    Decode(#[from] serde_json::Error),
}

#[async_trait]
pub trait NeighbourLookup: Send + Sync {
    /// ISO 3166-1 alpha-3 codes bordering `code`.
    async fn neighbours(&self, code: &str) -> Result<Vec<String>, CountriesError>;

    /// HTTP-style availability of the lookup backend.
    async fn status(&self) -> u16;
}

#[derive(Debug, Deserialize)]
struct BordersDoc {
    #[serde(default)]
    borders: Vec<String>,
}

/// The alpha endpoint answers with an object when `fields` is set and with
/// a one-element array otherwise.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BordersResponse {
    One(BordersDoc),
    Many(Vec<BordersDoc>),
}

impl BordersResponse {
    fn into_borders(self) -> Vec<String> {
        match self {
            BordersResponse::One(doc) => doc.borders,
            BordersResponse::Many(docs) => docs.into_iter().flat_map(|doc| doc.borders).collect(),
        }
    }
}

pub struct RestCountriesClient {
    client: reqwest::Client,
    base_url: String,
}

impl RestCountriesClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, CountriesError> {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn alpha_url(&self, code: &str) -> String {
        format!("{}v3.1/alpha/{}", self.base_url, code.to_lowercase())
    }
}

#[async_trait]
impl NeighbourLookup for RestCountriesClient {
    async fn neighbours(&self, code: &str) -> Result<Vec<String>, CountriesError> {
        let url = self.alpha_url(code);
        debug!(%url, "Looking up neighbours");

        let response = self
            .client
            .get(&url)
            .query(&[("fields", "borders")])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CountriesError::Status(status.as_u16()));
        }

        let body: BordersResponse = response.json().await?;
        Ok(body
            .into_borders()
            .into_iter()
            .map(|border| border.to_uppercase())
            .collect())
    }

    async fn status(&self) -> u16 {
        match self.client.get(self.alpha_url("nor")).send().await {
            Ok(response) => response.status().as_u16(),
            Err(e) => {
                debug!(error = %e, "Countries API unreachable");
                503
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct StaticCountry {
    cca3: String,
    #[serde(default)]
    borders: Vec<String>,
}

/// Offline neighbour table, `[{"cca3": "NOR", "borders": ["FIN", ...]}]`.
#[derive(Debug, Default)]
pub struct StaticNeighbours {
    borders: HashMap<String, Vec<String>>,
}

impl StaticNeighbours {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CountriesError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| CountriesError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, CountriesError> {
        let countries: Vec<StaticCountry> = serde_json::from_str(content)?;
        let borders = countries
            .into_iter()
            .map(|country| {
                let borders = country
                    .borders
                    .into_iter()
                    .map(|b| b.to_uppercase())
                    .collect();
                (country.cca3.to_uppercase(), borders)
            })
            .collect();
        Ok(Self { borders })
    }
}

#[async_trait]
impl NeighbourLookup for StaticNeighbours {
    async fn neighbours(&self, code: &str) -> Result<Vec<String>, CountriesError> {
        Ok(self
            .borders
            .get(&code.to_uppercase())
            .cloned()
            .unwrap_or_default())
    }

    async fn status(&self) -> u16 {
        if self.borders.is_empty() {
            503
        } else {
            200
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path as UrlPath, routing::get, Json, Router};

    #[tokio::test]
    async fn static_table_is_case_insensitive() {
        let lookup = StaticNeighbours::from_json(
            r#"[{"cca3": "NOR", "borders": ["fin", "RUS", "SWE"]}, {"cca3": "ISL"}]"#,
        )
        .unwrap();

        assert_eq!(
            lookup.neighbours("nor").await.unwrap(),
            vec!["FIN", "RUS", "SWE"]
        );
        assert!(lookup.neighbours("ISL").await.unwrap().is_empty());
        assert!(lookup.neighbours("XXX").await.unwrap().is_empty());
        assert_eq!(lookup.status().await, 200);
    }

    #[tokio::test]
    async fn rest_client_accepts_object_and_array_bodies() {
        let app = Router::new().route(
            "/v3.1/alpha/:code",
            get(|UrlPath(code): UrlPath<String>| async move {
                match code.as_str() {
                    "nor" => Json(serde_json::json!({"borders": ["FIN", "RUS", "SWE"]})),
                    _ => Json(serde_json::json!([{"borders": ["DNK"]}])),
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client =
            RestCountriesClient::new(format!("http://{}", addr), Duration::from_secs(5)).unwrap();

        assert_eq!(
            client.neighbours("NOR").await.unwrap(),
            vec!["FIN", "RUS", "SWE"]
        );
        assert_eq!(client.neighbours("deu").await.unwrap(), vec!["DNK"]);
        assert_eq!(client.status().await, 200);
    }

    #[tokio::test]
    async fn unreachable_service_reports_unavailable() {
        let client =
            RestCountriesClient::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
        assert!(client.neighbours("NOR").await.is_err());
        assert_eq!(client.status().await, 503);
    }
}
