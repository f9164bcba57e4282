//! Query Service Client
//!
//! HTTP transport for the query endpoint. Sends a compiled query for one
//! project and hands back the raw CRDB payload.

use crate::config::ServiceConfig;
use crate::crdb::RawResponse;
use crate::query::QueryRequest;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;

/// Query service client
pub struct ServiceClient {
    client: Client,
    config: ServiceConfig,
}

impl ServiceClient {
    /// Create a client for the configured endpoint
    pub fn new(config: ServiceConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(ClientError::Request)?;

        Ok(Self { client, config })
    }

    /// Get the current configuration
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// URL of the query endpoint
    pub fn query_url(&self) -> String {
        format!("{}/api/query", self.config.endpoint.trim_end_matches('/'))
    }

    /// Tenant parameters sent alongside every query
    fn query_params<'a>(&'a self, project: &'a str) -> Vec<(&'static str, &'a str)> {
        let mut params = vec![("universe", self.config.universe.as_str()), ("project", project)];
        if let Some(token) = self.config.token.as_deref() {
            params.push(("token", token));
        }
        params
    }

    /// Run a query against `project`
    pub async fn query(&self, project: &str, request: &QueryRequest) -> Result<RawResponse, ClientError> {
        let url = self.query_url();
        tracing::debug!(%url, project, "sending query");

        let response = self
            .client
            .post(&url)
            .query(&self.query_params(project))
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClientError::Timeout
                } else if e.is_connect() {
                    ClientError::Unavailable(self.config.endpoint.clone())
                } else {
                    ClientError::Request(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ClientError::ApiError {
                status: status.as_u16(),
                message: text,
            });
        }

        let body: Value = response.json().await.map_err(ClientError::Request)?;
        parse_envelope(body)
    }
}

/// Unwrap the optional `response` envelope and surface `error.message`
pub fn parse_envelope(body: Value) -> Result<RawResponse, ClientError> {
    if let Some(message) = error_message(&body) {
        return Err(ClientError::Service(message));
    }

    let payload = match body {
        Value::Object(mut map) if map.contains_key("response") => {
            map.remove("response").unwrap_or(Value::Null)
        }
        other => other,
    };
    if let Some(message) = error_message(&payload) {
        return Err(ClientError::Service(message));
    }

    serde_json::from_value(payload).map_err(ClientError::Decode)
}

fn error_message(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    if error.is_null() {
        return None;
    }
    Some(
        error
            .get("message")
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| error.to_string()),
    )
}

/// Errors that can occur when talking to the query service
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Query service unavailable at {0}")]
    Unavailable(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Service error: {0}")]
    Service(String),

    #[error("Invalid response: {0}")]
    Decode(serde_json::Error),

    #[error("Request timeout")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client(token: Option<&str>) -> ServiceClient {
        ServiceClient::new(ServiceConfig {
            endpoint: "https://crash.example.com/".to_string(),
            universe: "acme".to_string(),
            token: token.map(String::from),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_query_url() {
        assert_eq!(client(None).query_url(), "https://crash.example.com/api/query");
    }

    #[test]
    fn test_query_params() {
        let client = client(Some("secret"));
        assert_eq!(
            client.query_params("mobile"),
            vec![("universe", "acme"), ("project", "mobile"), ("token", "secret")]
        );
        assert_eq!(client.config().universe, "acme");
    }

    #[test]
    fn test_envelope_unwrapping() {
        let raw = parse_envelope(json!({
            "response": {"columns": ["a"], "values": [["*", [1], 1]]},
            "_": {"runtime": 3}
        }))
        .unwrap();
        assert_eq!(raw.columns, vec!["a".to_string()]);
        assert_eq!(raw.values.len(), 1);

        let raw = parse_envelope(json!({"columns": [], "values": []})).unwrap();
        assert!(raw.values.is_empty());
    }

    #[test]
    fn test_envelope_errors() {
        let err = parse_envelope(json!({"error": {"message": "unknown project"}})).unwrap_err();
        assert!(matches!(err, ClientError::Service(msg) if msg == "unknown project"));

        let err = parse_envelope(json!({"response": {"error": {"code": 9}}})).unwrap_err();
        assert!(matches!(err, ClientError::Service(msg) if msg.contains("9")));

        let err = parse_envelope(json!({"response": {"values": 3}})).unwrap_err();
        assert!(matches!(err, ClientError::Decode(_)));
    }
}
