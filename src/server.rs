//! HTTP server for receiving radio decodings from upstream transports.
//!
//! This module provides an HTTP server that:
//! - Accepts one merged radio decoding per POST /raddec
//! - Runs it through the session pipeline (state machine, stats, log sink)
//! - Responds with the emitted snapshot, or an explicit no-op
//!
//! # Architecture
//!
//! ```text
//! Transport/mixer ──→ POST /raddec ──→ session pipeline ──→ subscribers
//!                                           ↓
//!                                    [per-session CSV log]
//! ```
//!
//! The pipeline sits behind a mutex, so records are processed strictly one
//! at a time; the state machine's no-re-entrancy contract survives the
//! concurrent HTTP surface.

use crate::config::Config;
use crate::decoding::RadioDecoding;
use crate::pipeline::SessionPipeline;
use crate::session::SessionSnapshot;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Agent configuration for the pipeline behind the server
    pub agent_config: Config,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(port: u16, agent_config: Config) -> Self {
        Self { port, agent_config }
    }
}

/// Shared server state
pub struct ServerState {
    /// Session pipeline; the mutex serializes event processing
    pipeline: Mutex<SessionPipeline>,
}

/// Response from the raddec ingest endpoint
#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SessionSnapshot>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /raddec
///
/// Accepts one merged radio decoding and runs it through the pipeline.
async fn ingest_raddec(
    State(state): State<Arc<ServerState>>,
    Json(raddec): Json<RadioDecoding>,
) -> Result<Json<IngestResponse>, (StatusCode, Json<ErrorResponse>)> {
    let snapshot = {
        let mut pipeline = state.pipeline.lock().await;
        pipeline.process(raddec)
    };

    let status = if snapshot.is_some() { "emitted" } else { "dropped" };
    Ok(Json(IngestResponse {
        status: status.to_string(),
        snapshot,
    }))
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let pipeline = SessionPipeline::new(&config.agent_config)
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;
    let state = Arc::new(ServerState {
        pipeline: Mutex::new(pipeline),
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/raddec", post(ingest_raddec))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Session agent server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
