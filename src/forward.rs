//! Forwarder for pushing emitted snapshots to a downstream collector.
//!
//! Emissions stay authoritative in-process; forwarding is a best-effort
//! mirror to an HTTP collector. A failed push is reported and the caller
//! keeps the batch for retry.

use crate::session::SessionSnapshot;
use serde::{Deserialize, Serialize};

/// Forwarder configuration.
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Collector host (default: 127.0.0.1)
    pub host: String,
    /// Collector port
    pub port: u16,
    /// Bearer authentication token
    pub token: String,
}

impl ForwarderConfig {
    /// Create a new forwarder configuration.
    pub fn new(host: impl Into<String>, port: u16, token: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            token: token.into(),
        }
    }

    /// Get the full collector URL.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Get the session ingest endpoint URL.
    pub fn ingest_url(&self) -> String {
        format!("{}/v1/sessions", self.url())
    }

    /// Get the health check endpoint URL.
    pub fn health_url(&self) -> String {
        format!("{}/health", self.url())
    }
}

/// Forwarder error types.
#[derive(Debug)]
pub enum ForwarderError {
    /// Configuration error
    Config(String),
    /// Network/HTTP error
    Network(String),
    /// Collector returned an error response
    Server { status: u16, message: String },
    /// JSON serialization error
    Serialization(String),
}

impl std::fmt::Display for ForwarderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwarderError::Config(msg) => write!(f, "Forwarder config error: {msg}"),
            ForwarderError::Network(msg) => write!(f, "Forwarder network error: {msg}"),
            ForwarderError::Server { status, message } => {
                write!(f, "Forwarder server error ({status}): {message}")
            }
            ForwarderError::Serialization(msg) => {
                write!(f, "Forwarder serialization error: {msg}")
            }
        }
    }
}

impl std::error::Error for ForwarderError {}

/// Batch payload for the session ingest endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionBatch {
    /// Batch of emitted snapshots
    pub batch: BatchPayload,
}

/// Batch structure matching collector expectations.
#[derive(Debug, Clone, Serialize)]
pub struct BatchPayload {
    /// Identifier of the forwarding host
    pub origin_id: String,
    /// Timestamp of the first snapshot in the batch (epoch ms)
    pub first_timestamp: u64,
    /// Timestamp of the last snapshot in the batch (epoch ms)
    pub last_timestamp: u64,
    /// Emitted snapshots, in emission order
    pub snapshots: Vec<SessionSnapshot>,
    /// Metadata
    pub meta: BatchMeta,
}

/// Batch metadata.
#[derive(Debug, Clone, Serialize)]
pub struct BatchMeta {
    /// Source identifier
    pub source: String,
    /// Version
    pub version: String,
    /// Snapshot count
    pub snapshot_count: usize,
}

/// Collector response from the session ingest endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ForwardResponse {
    /// Snapshots accepted by the collector
    pub accepted: Option<u64>,
    /// Optional collector message
    pub message: Option<String>,
}

/// Async client for pushing snapshots to a collector.
#[cfg(feature = "forward")]
pub struct Forwarder {
    config: ForwarderConfig,
    client: reqwest::Client,
    origin_id: String,
}

#[cfg(feature = "forward")]
impl Forwarder {
    /// Create a new forwarder.
    pub fn new(config: ForwarderConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        // Origin ID from hostname + run instance
        let host = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let origin_id = format!(
            "presence-{}-{}",
            host,
            &uuid::Uuid::new_v4().to_string()[..8]
        );

        Self {
            config,
            client,
            origin_id,
        }
    }

    /// Test connection to the collector.
    pub async fn test_connection(&self) -> Result<bool, ForwarderError> {
        let response = self
            .client
            .get(self.config.health_url())
            .send()
            .await
            .map_err(|e| ForwarderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }

    /// Push a batch of emitted snapshots to the collector.
    pub async fn forward_snapshots(
        &self,
        snapshots: &[SessionSnapshot],
    ) -> Result<ForwardResponse, ForwarderError> {
        if snapshots.is_empty() {
            return Err(ForwarderError::Config(
                "No snapshots to forward".to_string(),
            ));
        }

        let first_timestamp = snapshots.first().map(|s| s.timestamp).unwrap_or_default();
        let last_timestamp = snapshots.last().map(|s| s.timestamp).unwrap_or_default();

        let batch = SessionBatch {
            batch: BatchPayload {
                origin_id: self.origin_id.clone(),
                first_timestamp,
                last_timestamp,
                snapshots: snapshots.to_vec(),
                meta: BatchMeta {
                    source: "presence-session-agent".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    snapshot_count: snapshots.len(),
                },
            },
        };

        let response = self
            .client
            .post(self.config.ingest_url())
            .header("Authorization", format!("Bearer {}", self.config.token))
            .header("Content-Type", "application/json")
            .json(&batch)
            .send()
            .await
            .map_err(|e| ForwarderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ForwarderError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let forward_response: ForwardResponse = response
            .json()
            .await
            .map_err(|e| ForwarderError::Serialization(e.to_string()))?;

        Ok(forward_response)
    }

    /// Get the origin ID.
    pub fn origin_id(&self) -> &str {
        &self.origin_id
    }
}

/// Blocking forwarder for use in synchronous contexts.
#[cfg(feature = "forward")]
pub struct BlockingForwarder {
    inner: Forwarder,
    runtime: tokio::runtime::Runtime,
}

#[cfg(feature = "forward")]
impl BlockingForwarder {
    /// Create a new blocking forwarder.
    pub fn new(config: ForwarderConfig) -> Result<Self, ForwarderError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| ForwarderError::Config(format!("Failed to create runtime: {e}")))?;

        Ok(Self {
            inner: Forwarder::new(config),
            runtime,
        })
    }

    /// Test connection to the collector.
    pub fn test_connection(&self) -> Result<bool, ForwarderError> {
        self.runtime.block_on(self.inner.test_connection())
    }

    /// Push a batch of emitted snapshots to the collector.
    pub fn forward_snapshots(
        &self,
        snapshots: &[SessionSnapshot],
    ) -> Result<ForwardResponse, ForwarderError> {
        self.runtime
            .block_on(self.inner.forward_snapshots(snapshots))
    }

    /// Get the origin ID.
    pub fn origin_id(&self) -> &str {
        self.inner.origin_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarder_config_urls() {
        let config = ForwarderConfig::new("127.0.0.1", 8080, "test-token");
        assert_eq!(config.url(), "http://127.0.0.1:8080");
        assert_eq!(config.ingest_url(), "http://127.0.0.1:8080/v1/sessions");
        assert_eq!(config.health_url(), "http://127.0.0.1:8080/health");
    }

    #[test]
    fn test_batch_serialization_shape() {
        let batch = SessionBatch {
            batch: BatchPayload {
                origin_id: "presence-host-12345678".to_string(),
                first_timestamp: 1000,
                last_timestamp: 2000,
                snapshots: Vec::new(),
                meta: BatchMeta {
                    source: "presence-session-agent".to_string(),
                    version: "0.1.0".to_string(),
                    snapshot_count: 0,
                },
            },
        };

        let value = serde_json::to_value(&batch).expect("serializable batch");
        assert_eq!(value["batch"]["meta"]["snapshot_count"], 0);
        assert_eq!(value["batch"]["first_timestamp"], 1000);
    }
}
