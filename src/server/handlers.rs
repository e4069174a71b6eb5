use axum::{
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::error::Error;
use crate::image::{self, OutputFormat};
use crate::pipeline::Stylized;

use super::fetch::{fetch_image, release_request_dir, request_dir};
use super::{AppState, TransferRequest};

/// Error body returned to clients as `{"error": "..."}`.
pub(super) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::InvalidParameter { .. }
            | Error::UnsupportedDimensions { .. }
            | Error::ImageLoad { .. }
            | Error::ImageDecode { .. } => StatusCode::BAD_REQUEST,
            Error::Fetch { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!("Request failed: {err}");
        } else {
            tracing::warn!("Rejected request: {err}");
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// GET /: welcome message
pub(super) async fn handle_root() -> impl IntoResponse {
    Json(json!({ "message": "Welcome to Pastiche 🖼️" }))
}

/// POST /transfer-style/: stylized image bytes
pub(super) async fn handle_transfer_style(
    State(state): State<AppState>,
    body: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let request = parse_body(body)?;
    let format = request
        .output_format
        .unwrap_or(state.images.output_format);
    let quality = state.images.jpeg_quality;

    let stylized = stylize_request(&state, &request).await?;

    let bytes = tokio::task::spawn_blocking(move || {
        image::encode_image(&stylized.image, format, quality)
    })
    .await
    .map_err(|e| ApiError::internal(format!("encoder task failed: {e}")))??;

    Ok(image_response(bytes, format))
}

/// POST /images/: shape metadata of the same run
pub(super) async fn handle_images(
    State(state): State<AppState>,
    body: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let request = parse_body(body)?;
    let stylized = stylize_request(&state, &request).await?;

    Ok(Json(json!({
        "content_shape": stylized.content_shape,
        "style_shape": stylized.style_shape,
        "bottleneck_shape": stylized.bottleneck_shape,
        "stylized_shape": stylized.image.shape(),
        "content_blending_ratio": stylized.ratio.value(),
    })))
}

fn parse_body(
    body: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<TransferRequest, ApiError> {
    body.map(|Json(request)| request).map_err(|e| ApiError {
        status: StatusCode::BAD_REQUEST,
        message: format!("Invalid JSON: {e}"),
    })
}

fn image_response(bytes: Vec<u8>, format: OutputFormat) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, format.mime_type())],
        bytes,
    )
        .into_response()
}

/// Download both images into a fresh scratch directory, then decode and
/// stylize on the blocking pool.
///
/// The scratch directory moves into the blocking task once the downloads
/// finish, so it is released after decoding even if this future is dropped
/// by the timeout layer first.
async fn stylize_request(
    state: &AppState,
    request: &TransferRequest,
) -> Result<Stylized, ApiError> {
    let scratch = request_dir(&state.images.download_dir)?;
    let max_bytes = state.images.max_image_bytes;

    let (content_path, style_path) = tokio::try_join!(
        fetch_image(&state.http, &request.content, "content", scratch.path(), max_bytes),
        fetch_image(&state.http, &request.style, "style", scratch.path(), max_bytes),
    )?;

    let pipeline = state.pipeline.clone();
    let ratio = request.content_blending_ratio;
    let max_dimension = state.images.max_image_dimension;
    let keep = !state.images.cleanup_downloads;

    tokio::task::spawn_blocking(move || -> Result<Stylized, ApiError> {
        let content = image::load_image_within(&content_path, max_dimension);
        let style = image::load_image_within(&style_path, max_dimension);
        release_request_dir(scratch, keep);
        let (content, style) = (content?, style?);

        let mut pipeline = pipeline
            .lock()
            .map_err(|_| ApiError::internal("pipeline lock poisoned"))?;
        Ok(pipeline.stylize(&content, &style, ratio)?)
    })
    .await
    .map_err(|e| ApiError::internal(format!("inference task failed: {e}")))?
}
