// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! JSON bodies returned by the HTTP API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use tracing::{error, warn};
use utoipa::ToSchema;

use crate::detection::Detection;
use crate::error::{InferenceError, Result};
use crate::io::jpeg_data_uri;
use crate::labels::Label;
use crate::pipeline::Prediction;
use crate::results::PredictionResult;

/// Best evidence for one grade, in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClassProbabilityResponse {
    /// Caries grade.
    pub class: Label,
    /// Highest confidence among detections of this grade (0.0 - 100.0).
    pub probability: f64,
}

/// Prediction for one uploaded image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PredictResponse {
    /// Grade of the most confident detection.
    pub class: Label,
    /// Confidence of the top grade (0.0 - 100.0).
    pub confidence: f64,
    /// One entry per grade, D0 through D6. Not a probability distribution.
    pub all_probabilities: Vec<ClassProbabilityResponse>,
    /// Model call duration in milliseconds, rounded to 2 decimals.
    pub inference_time: f64,
    /// Detections that survived post-processing.
    pub detections: Vec<Detection>,
    /// Boxes of `detections`, in the same order.
    #[schema(value_type = Vec<Vec<f64>>)]
    pub bounding_boxes: Vec<[f64; 4]>,
    /// Annotated image as a `data:image/jpeg;base64,...` URI.
    pub annotated_image: String,
}

impl PredictResponse {
    /// Build a response from a result and an already encoded image.
    #[must_use]
    pub fn from_result(result: &PredictionResult, annotated_image: String) -> Self {
        Self {
            class: result.top_class,
            confidence: result.top_confidence,
            all_probabilities: result
                .per_class_probability
                .iter()
                .map(|p| ClassProbabilityResponse {
                    class: p.class,
                    probability: p.probability * 100.0,
                })
                .collect(),
            inference_time: round2(result.inference_time_ms),
            detections: result.detections.clone(),
            bounding_boxes: result.bounding_boxes.clone(),
            annotated_image,
        }
    }

    /// Build a response, encoding the annotated image as a JPEG data URI.
    ///
    /// # Errors
    ///
    /// Returns an error if JPEG encoding fails.
    pub fn from_prediction(prediction: &Prediction) -> Result<Self> {
        let uri = jpeg_data_uri(&prediction.annotated)?;
        Ok(Self::from_result(&prediction.result, uri))
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Error body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub detail: String,
}

/// Body of `GET /`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RootResponse {
    /// Always `"ok"`.
    pub status: String,
    /// Service description.
    pub message: String,
    /// Whether the model is loaded.
    pub model_loaded: bool,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Always `"healthy"`.
    pub status: String,
    /// Whether the model is loaded.
    pub model_loaded: bool,
    /// Configured model path, if the file exists.
    pub model_path: Option<String>,
}

/// Body of `GET /info`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InfoResponse {
    /// Server version.
    pub version: String,
    /// Configured model path.
    pub model_path: String,
    /// Whether the model is loaded.
    pub model_loaded: bool,
    /// Grades the service reports, in order.
    pub labels: Vec<Label>,
    /// Resolved label font tier.
    pub font: String,
    /// Confidence floor as a fraction.
    pub min_confidence: f64,
    /// IoU threshold of the service NMS.
    pub nms_iou: f64,
}

impl IntoResponse for InferenceError {
    fn into_response(self) -> Response {
        let status = match &self {
            InferenceError::UploadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            err if err.is_client_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_client_error() {
            warn!("Rejected request: {self}");
        } else {
            error!("Request failed: {self}");
        }

        (status, Json(ErrorResponse { detail: self.to_string() })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::PredictionResult;

    fn detection(class: Label, confidence: f64) -> Detection {
        Detection {
            bbox: [10.0, 10.0, 50.0, 50.0],
            class,
            confidence,
        }
    }

    #[test]
    fn test_probabilities_in_percent() {
        let result = PredictionResult::new(vec![detection(Label::D3, 95.5)], 12.3456);
        let response = PredictResponse::from_result(&result, String::new());

        assert_eq!(response.class, Label::D3);
        assert_eq!(response.all_probabilities.len(), 7);
        assert!((response.all_probabilities[3].probability - 95.5).abs() < 1e-9);
        assert!((response.inference_time - 12.35).abs() < 1e-9);
    }

    #[test]
    fn test_json_field_names() {
        let result = PredictionResult::new(vec![detection(Label::D1, 40.0)], 1.0);
        let json = serde_json::to_value(PredictResponse::from_result(&result, "data:".to_string())).unwrap();

        for key in [
            "class",
            "confidence",
            "allProbabilities",
            "inferenceTime",
            "detections",
            "boundingBoxes",
            "annotatedImage",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["class"], "D1");
        assert_eq!(json["detections"][0]["class"], "D1");
        assert_eq!(json["detections"][0]["bbox"][2], 50.0);
    }

    #[test]
    fn test_json_round_trip_preserves_boxes_and_labels() {
        let mut a = detection(Label::D6, 77.7);
        a.bbox = [0.5, 1.25, 300.125, 401.75];
        let result = PredictionResult::new(vec![a, detection(Label::D2, 33.3)], 5.0);
        let response = PredictResponse::from_result(&result, "data:image/jpeg;base64,AA==".to_string());

        let json = serde_json::to_string(&response).unwrap();
        let decoded: PredictResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, response);
    }

    #[test]
    fn test_error_status_codes() {
        let response = InferenceError::InvalidUpload("bad".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = InferenceError::UploadTooLarge("limit".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let response = InferenceError::ModelLoadError("missing".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
