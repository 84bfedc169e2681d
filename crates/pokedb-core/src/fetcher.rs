use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::FetchConfig;
use crate::{Error, Result};

/// Failure of a single request attempt.
///
/// Classification drives the retry loop in [`crate::FetchCache`]: rate limits,
/// server errors and connection problems are worth another attempt, other
/// statuses and undecodable bodies are not.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Non-success HTTP status
    #[error("HTTP {status}")]
    Status {
        /// Response status code
        status: u16,
    },
    /// Request exceeded the configured timeout
    #[error("timed out: {0}")]
    Timeout(String),
    /// Connection could not be established
    #[error("connection failed: {0}")]
    Connect(String),
    /// Body was not valid JSON
    #[error("invalid response body: {0}")]
    Decode(String),
    /// Any other request failure
    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    /// Whether another attempt might succeed.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status } => *status == 429 || *status >= 500,
            Self::Decode(_) => false,
            Self::Timeout(_) | Self::Connect(_) | Self::Request(_) => true,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::Status {
                status: status.as_u16(),
            }
        } else {
            Self::Request(err.to_string())
        }
    }
}

/// Source of raw JSON documents keyed by absolute URL.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform one GET and decode the body as JSON.
    async fn get_json(&self, url: &str) -> std::result::Result<Value, TransportError>;
}

/// HTTP transport for the canonical REST source
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Creates a fetcher from the fetch configuration
    pub fn new(config: &FetchConfig) -> Result<Self> {
        Self::with_timeout(
            Duration::from_secs(config.timeout_secs),
            &config.user_agent,
        )
    }

    /// Creates a fetcher with a custom request timeout (primarily for tests)
    pub fn with_timeout(timeout: Duration, user_agent: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpFetcher {
    async fn get_json(&self, url: &str) -> std::result::Result<Value, TransportError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();

        if !status.is_success() {
            debug!("GET {} returned {}", url, status);
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await?;
        let value = serde_json::from_slice(&bytes)
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        debug!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(value)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::expect_used
)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(timeout: Duration) -> HttpFetcher {
        HttpFetcher::with_timeout(timeout, "pokedb-tests").expect("client")
    }

    #[tokio::test]
    async fn test_get_json_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v2/move/33/"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"id": 33, "name": "tackle"})),
            )
            .mount(&server)
            .await;

        let url = format!("{}/api/v2/move/33/", server.uri());
        let value = fetcher(Duration::from_secs(5)).get_json(&url).await.unwrap();
        assert_eq!(value["name"], "tackle");
    }

    #[tokio::test]
    async fn test_status_errors_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let http = fetcher(Duration::from_secs(5));

        let missing = http
            .get_json(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert_eq!(missing, TransportError::Status { status: 404 });
        assert!(!missing.is_retryable());

        let busy = http
            .get_json(&format!("{}/busy", server.uri()))
            .await
            .unwrap_err();
        assert!(busy.is_retryable());
    }

    #[tokio::test]
    async fn test_invalid_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/garbage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = fetcher(Duration::from_secs(5))
            .get_json(&format!("{}/garbage", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_slow_response_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/slow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let err = fetcher(Duration::from_millis(50))
            .get_json(&format!("{}/slow", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)));
        assert!(err.is_retryable());
    }
}
