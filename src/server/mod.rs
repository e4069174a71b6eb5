//! Axum HTTP front end: download the two source images, stylize, respond.

mod fetch;
mod handlers;

pub use fetch::{fetch_image, file_name_for, request_dir};

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Deserializer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::config::{Config, ImageConfig, ServerConfig};
use crate::error::Result;
use crate::image::OutputFormat;
use crate::pipeline::{BlendingRatio, Pipeline};

use handlers::{handle_images, handle_root, handle_transfer_style};

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    /// Inference is serialized through this lock.
    pub pipeline: Arc<Mutex<Pipeline>>,
    pub http: reqwest::Client,
    pub images: Arc<ImageConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(pipeline: Pipeline, images: ImageConfig) -> Self {
        Self {
            pipeline: Arc::new(Mutex::new(pipeline)),
            http: reqwest::Client::new(),
            images: Arc::new(images),
        }
    }
}

/// One source image to download.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageSource {
    pub url: String,
    /// Name to store the download under; defaults to the URL's last path segment
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Body of `POST /transfer-style/` and `POST /images/`.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferRequest {
    pub content: ImageSource,
    pub style: ImageSource,
    #[serde(default, deserialize_with = "deserialize_ratio")]
    pub content_blending_ratio: BlendingRatio,
    /// Overrides the configured output format
    #[serde(default)]
    pub output_format: Option<OutputFormat>,
}

/// Accepts either `0.3` or `{"value": 0.3}`.
fn deserialize_ratio<'de, D>(deserializer: D) -> std::result::Result<BlendingRatio, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Bare(f32),
        Wrapped {
            #[serde(default)]
            value: f32,
        },
    }

    let (Repr::Bare(value) | Repr::Wrapped { value }) = Repr::deserialize(deserializer)?;
    Ok(BlendingRatio::new(value))
}

/// Build the router with body limit and timeout layers.
pub fn router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/transfer-style/", post(handle_transfer_style))
        .route("/images/", post(handle_images))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(server.max_body_bytes))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(server.request_timeout_secs),
        ))
}

/// Bind to the configured address and serve until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address is invalid or the socket cannot be bound.
pub async fn run(config: &Config, pipeline: Pipeline) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e: std::net::AddrParseError| {
            crate::Error::invalid_parameter("host", e.to_string())
        })?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let state = AppState::new(pipeline, config.images.clone());
    run_with_listener(listener, state, &config.server).await
}

/// Serve on a pre-bound listener.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn run_with_listener(
    listener: tokio::net::TcpListener,
    state: AppState,
    server: &ServerConfig,
) -> Result<()> {
    let local_addr = listener.local_addr()?;
    tracing::info!("Pastiche listening on http://{local_addr}");

    axum::serve(listener, router(state, server))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
