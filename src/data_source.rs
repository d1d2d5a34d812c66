//! Read-only access to the router's status tree.
//!
//! Every value lives under a path-like key (the same strings are used as MQTT
//! topics) and is returned wrapped as `{"data": <value>}`.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("Request for '{key}' failed: {source}")]
    Request {
        key: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Data source returned status {status} for '{key}'")]
    Status { key: String, status: u16 },
    #[error("Data source is unavailable: {0}")]
    Unavailable(String),
}

/// Source of current device state.
#[async_trait]
pub trait DeviceDataSource: Send + Sync {
    /// Returns the current value for `key`, or `None` when the key carries no data.
    async fn get(&self, key: &str) -> Result<Option<Value>, DataSourceError>;
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    data: Option<Value>,
}

/// Data source backed by the router's local HTTP status API.
pub struct HttpDataSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDataSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DataSourceError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DataSourceError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }
}

#[async_trait]
impl DeviceDataSource for HttpDataSource {
    async fn get(&self, key: &str) -> Result<Option<Value>, DataSourceError> {
        let url = self.url_for(key);
        debug!("Reading '{}' from {}", key, url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| DataSourceError::Request {
                key: key.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DataSourceError::Status {
                key: key.to_string(),
                status: status.as_u16(),
            });
        }

        let envelope: Envelope =
            response
                .json()
                .await
                .map_err(|source| DataSourceError::Request {
                    key: key.to_string(),
                    source,
                })?;

        Ok(envelope.data.filter(|value| !value.is_null()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_key_with_single_slash() {
        let source = HttpDataSource::new("http://127.0.0.1/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            source.url_for("/status/gps/lastpos"),
            "http://127.0.0.1/api/status/gps/lastpos"
        );
        assert_eq!(
            source.url_for("status/wan/connection_state"),
            "http://127.0.0.1/api/status/wan/connection_state"
        );
    }

    #[test]
    fn envelope_without_data_is_none() {
        let envelope: Envelope = serde_json::from_str(r#"{"success": true}"#).unwrap();
        assert!(envelope.data.is_none());

        let envelope: Envelope = serde_json::from_str(r#"{"data": 42.5}"#).unwrap();
        assert_eq!(envelope.data, Some(serde_json::json!(42.5)));
    }

    #[tokio::test]
    async fn unreachable_source_is_an_error() {
        // Port 9 (discard) is not expected to serve HTTP locally.
        let source = HttpDataSource::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        assert!(source.get("/status/gps/lastpos").await.is_err());
    }
}
