// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::Json;
use image::DynamicImage;
use tracing::debug;

use super::response::{ErrorResponse, HealthResponse, InfoResponse, PredictResponse, RootResponse};
use super::state::AppState;
use crate::error::{InferenceError, Result};
use crate::labels::LABELS;
use crate::pipeline::run_prediction;

/// Multipart field carrying the image.
pub const UPLOAD_FIELD: &str = "file";
/// Alternative field name accepted for the image.
const ALT_UPLOAD_FIELD: &str = "image";

/// Service status
///
/// Reports whether the API is up and the model is loaded.
#[utoipa::path(
    get,
    path = "/",
    tag = "health",
    responses(
        (status = 200, description = "Service status", body = RootResponse)
    )
)]
pub async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    Json(RootResponse {
        status: "ok".to_string(),
        message: "Dentalogic caries detection API".to_string(),
        model_loaded: state.model.is_loaded(),
    })
}

/// Health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is healthy", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let path = state.model.path();
    Json(HealthResponse {
        status: "healthy".to_string(),
        model_loaded: state.model.is_loaded(),
        model_path: path.exists().then(|| path.display().to_string()),
    })
}

/// Service configuration
///
/// Returns the model path, label set, font tier and thresholds in use.
#[utoipa::path(
    get,
    path = "/info",
    tag = "health",
    responses(
        (status = 200, description = "Service configuration", body = InfoResponse)
    )
)]
pub async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    Json(InfoResponse {
        version: crate::VERSION.to_string(),
        model_path: state.model.path().display().to_string(),
        model_loaded: state.model.is_loaded(),
        labels: LABELS.to_vec(),
        font: state.font.kind().to_string(),
        min_confidence: state.postprocess.min_confidence,
        nms_iou: state.postprocess.nms_iou,
    })
}

/// Detect caries in an image
///
/// Upload an image in the `file` field of a multipart form. The response holds
/// the top grade, per-grade evidence, every detection and an annotated JPEG.
#[utoipa::path(
    post,
    path = "/predict",
    tag = "inference",
    request_body(content_type = "multipart/form-data", description = "Image file to analyze"),
    responses(
        (status = 200, description = "Inference successful", body = PredictResponse),
        (status = 400, description = "Not an image or missing field", body = ErrorResponse),
        (status = 413, description = "Upload exceeds the size limit", body = ErrorResponse),
        (status = 500, description = "Model unavailable or inference failed", body = ErrorResponse)
    )
)]
pub async fn predict(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<PredictResponse>> {
    let image = read_upload(&mut multipart).await?;
    let detector = state.model.get().await?;

    let font = Arc::clone(&state.font);
    let config = state.postprocess;

    let response = tokio::task::spawn_blocking(move || {
        let prediction = run_prediction(detector.as_ref(), &image, &config, &font)?;
        PredictResponse::from_prediction(&prediction)
    })
    .await
    .map_err(|e| InferenceError::InferenceError(format!("Prediction task failed: {e}")))??;

    Ok(Json(response))
}

/// Read and decode the uploaded image.
async fn read_upload(multipart: &mut Multipart) -> Result<DynamicImage> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| upload_error("Malformed multipart body", &e))?
    {
        if !matches!(field.name(), Some(UPLOAD_FIELD | ALT_UPLOAD_FIELD)) {
            continue;
        }

        let is_image = field
            .content_type()
            .is_some_and(|content_type| content_type.starts_with("image/"));
        if !is_image {
            return Err(InferenceError::InvalidUpload("File must be an image".to_string()));
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| upload_error("Failed to read upload", &e))?;
        debug!(file = %file_name, bytes = data.len(), "Received upload");

        return image::load_from_memory(&data)
            .map_err(|e| InferenceError::InvalidUpload(format!("Invalid image: {e}")));
    }

    Err(InferenceError::InvalidUpload(format!(
        "Missing multipart field '{UPLOAD_FIELD}'"
    )))
}

/// Keep the body limit distinct from other multipart failures.
fn upload_error(context: &str, err: &MultipartError) -> InferenceError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        InferenceError::UploadTooLarge(err.body_text())
    } else {
        InferenceError::InvalidUpload(format!("{context}: {}", err.body_text()))
    }
}
