//! Index client over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use batcher_pipeline::{IndexClient, SubmitError, WireAction};
use batcher_types::{ActionResult, ServiceSettings};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::ClientError;

/// Response body characters kept in transport error messages.
const BODY_SNIPPET_LEN: usize = 200;

/// Configuration for [`HttpIndexClient`].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Service base URL (e.g., "https://my-service.search.windows.net")
    pub endpoint: String,

    /// Target index name
    pub index_name: String,

    /// API version query parameter
    pub api_version: String,

    /// API key sent in the `api-key` header
    pub api_key: SecretString,

    /// Request timeout
    pub timeout: Duration,
}

impl HttpClientConfig {
    /// Create a config with the default API version and timeout.
    pub fn new(
        endpoint: impl Into<String>,
        index_name: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let defaults = ServiceSettings::default();
        Self {
            endpoint: endpoint.into(),
            index_name: index_name.into(),
            api_version: defaults.api_version,
            api_key: SecretString::from(api_key.into()),
            timeout: Duration::from_secs(defaults.timeout_secs),
        }
    }

    /// Build from loaded service settings.
    pub fn from_settings(settings: &ServiceSettings) -> Result<Self, ClientError> {
        if settings.endpoint.trim().is_empty() {
            return Err(ClientError::Config("service.endpoint is required".to_string()));
        }
        if settings.index_name.trim().is_empty() {
            return Err(ClientError::Config("service.index_name is required".to_string()));
        }
        let api_key = settings
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ClientError::Config("service.api_key is required".to_string()))?;

        Ok(Self {
            endpoint: settings.endpoint.clone(),
            index_name: settings.index_name.clone(),
            api_version: settings.api_version.clone(),
            api_key: SecretString::from(api_key),
            timeout: Duration::from_secs(settings.timeout_secs),
        })
    }

    /// Full URL of the batch indexing endpoint.
    pub fn index_url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/index?api-version={}",
            self.endpoint.trim_end_matches('/'),
            self.index_name,
            self.api_version
        )
    }
}

/// Submits batches to the service's document indexing endpoint.
///
/// Performs no retries of its own; retry policy belongs to the pipeline.
pub struct HttpIndexClient {
    client: Client,
    config: HttpClientConfig,
    url: String,
}

impl HttpIndexClient {
    /// Create a new HTTP index client.
    pub fn new(config: HttpClientConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;
        let url = config.index_url();

        Ok(Self {
            client,
            config,
            url,
        })
    }
}

#[async_trait]
impl IndexClient for HttpIndexClient {
    async fn submit(&self, actions: &[WireAction]) -> Result<Vec<ActionResult>, SubmitError> {
        let body = build_request_body(actions);

        let response = self
            .client
            .post(&self.url)
            .header("api-key", self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, index = %self.config.index_name, "Index request failed");
                SubmitError::Transport(e.to_string())
            })?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| SubmitError::Transport(format!("HTTP {status}: failed to read body: {e}")))?;

        debug!(
            status = status,
            actions = actions.len(),
            index = %self.config.index_name,
            "Index request completed"
        );
        classify_response(status, &text)
    }
}

/// Request body: `{"value": [{"@search.action": kind, ...document}]}`.
pub fn build_request_body(actions: &[WireAction]) -> Value {
    let value = actions
        .iter()
        .map(|action| {
            let mut entry = Map::new();
            entry.insert(
                "@search.action".to_string(),
                Value::String(action.kind.as_str().to_string()),
            );
            if let Value::Object(fields) = &action.document {
                for (name, field) in fields {
                    entry.entry(name.clone()).or_insert_with(|| field.clone());
                }
            }
            Value::Object(entry)
        })
        .collect();

    let mut body = Map::new();
    body.insert("value".to_string(), Value::Array(value));
    Value::Object(body)
}

#[derive(Deserialize)]
struct IndexResponse {
    value: Vec<ActionResult>,
}

/// Map an HTTP status and body onto the tri-state submit outcome.
///
/// 200 and 207 carry per-action results; 413 means the payload was too
/// large; anything else is a transport failure.
pub fn classify_response(status: u16, body: &str) -> Result<Vec<ActionResult>, SubmitError> {
    match status {
        200 | 207 => serde_json::from_str::<IndexResponse>(body)
            .map(|response| response.value)
            .map_err(|e| {
                SubmitError::Transport(format!(
                    "HTTP {status}: unparsable response body ({e}): {}",
                    snippet(body)
                ))
            }),
        413 => Err(SubmitError::PayloadTooLarge),
        _ => Err(SubmitError::Transport(format!("HTTP {status}: {}", snippet(body)))),
    }
}

fn snippet(body: &str) -> &str {
    match body.char_indices().nth(BODY_SNIPPET_LEN) {
        Some((end, _)) => &body[..end],
        None => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batcher_types::ActionKind;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn wire(key: &str, kind: ActionKind) -> WireAction {
        WireAction {
            kind,
            key: key.to_string(),
            document: json!({ "id": key, "rating": 4 }),
        }
    }

    #[test]
    fn test_from_settings_requires_fields() {
        let mut settings = ServiceSettings::default();
        assert!(HttpClientConfig::from_settings(&settings).is_err());

        settings.endpoint = "https://search.example.net".to_string();
        settings.index_name = "hotels".to_string();
        assert!(matches!(
            HttpClientConfig::from_settings(&settings),
            Err(ClientError::Config(msg)) if msg.contains("api_key")
        ));

        settings.api_key = Some("secret".to_string());
        let config = HttpClientConfig::from_settings(&settings).unwrap();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(
            config.index_url(),
            "https://search.example.net/indexes/hotels/docs/index?api-version=2024-07-01"
        );
    }

    #[test]
    fn test_api_key_not_in_debug_output() {
        let config = HttpClientConfig::new("https://search.example.net/", "hotels", "top-secret");
        assert!(!format!("{:?}", config).contains("top-secret"));
        assert!(config.index_url().starts_with("https://search.example.net/indexes/"));
    }

    #[test]
    fn test_build_request_body() {
        let body = build_request_body(&[
            wire("1", ActionKind::Upload),
            wire("2", ActionKind::MergeOrUpload),
        ]);
        assert_eq!(
            body,
            json!({
                "value": [
                    {"@search.action": "upload", "id": "1", "rating": 4},
                    {"@search.action": "mergeOrUpload", "id": "2", "rating": 4}
                ]
            })
        );
    }

    #[test]
    fn test_classify_response() {
        let body = r#"{"value":[
            {"key":"1","status":true,"errorMessage":null,"statusCode":201},
            {"key":"2","status":false,"errorMessage":"conflict","statusCode":409}
        ]}"#;
        let results = classify_response(207, body).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].succeeded);
        assert_eq!(results[1].status_code, 409);
        assert_eq!(results[1].error_message.as_deref(), Some("conflict"));

        assert_eq!(classify_response(413, ""), Err(SubmitError::PayloadTooLarge));
        assert!(matches!(
            classify_response(503, "busy"),
            Err(SubmitError::Transport(msg)) if msg == "HTTP 503: busy"
        ));
        assert!(matches!(
            classify_response(200, "<html>"),
            Err(SubmitError::Transport(msg)) if msg.contains("unparsable")
        ));
    }

    #[test]
    fn test_snippet_truncates_on_char_boundary() {
        let long = "é".repeat(BODY_SNIPPET_LEN + 10);
        assert_eq!(snippet(&long).chars().count(), BODY_SNIPPET_LEN);
        assert_eq!(snippet("short"), "short");
    }

    #[tokio::test]
    async fn test_submit_against_mock_server() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/indexes/hotels/docs/index"))
            .and(query_param("api-version", "2024-07-01"))
            .and(header("api-key", "secret"))
            .respond_with(ResponseTemplate::new(207).set_body_json(json!({
                "value": [
                    {"key": "1", "status": true, "errorMessage": null, "statusCode": 201},
                    {"key": "2", "status": false, "errorMessage": "bad field", "statusCode": 400}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = HttpIndexClient::new(HttpClientConfig::new(server.uri(), "hotels", "secret")).unwrap();
        let results = client
            .submit(&[wire("1", ActionKind::Upload), wire("2", ActionKind::Merge)])
            .await
            .unwrap();

        assert_eq!(results[0], ActionResult::success("1", 201));
        assert_eq!(results[1], ActionResult::failure("2", 400, "bad field"));
    }

    #[tokio::test]
    async fn test_submit_payload_too_large() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(413))
            .mount(&server)
            .await;

        let client = HttpIndexClient::new(HttpClientConfig::new(server.uri(), "hotels", "secret")).unwrap();
        let result = client.submit(&[wire("1", ActionKind::Upload)]).await;
        assert_eq!(result, Err(SubmitError::PayloadTooLarge));
    }

    #[tokio::test]
    async fn test_submit_connection_refused() {
        let config = HttpClientConfig::new("http://127.0.0.1:9", "hotels", "secret");
        let client = HttpIndexClient::new(config).unwrap();
        let result = client.submit(&[wire("1", ActionKind::Delete)]).await;
        assert!(matches!(result, Err(SubmitError::Transport(_))));
    }
}
