// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Integration tests for the HTTP API and the prediction pipeline.
//!
//! Every test uses an in-memory detector, so no model file is needed.

use std::io::Cursor;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use serde_json::Value;
use tower::ServiceExt;

use dentalogic_inference::io::decode_data_uri;
use dentalogic_inference::{
    router, AppState, Detector, InferenceConfig, InferenceError, Label, LabelFont, ModelHandle,
    PredictResponse, RawDetection, Result,
};

const BOUNDARY: &str = "dentalogic-test-boundary";
const BODY_LIMIT: usize = 4 * 1024 * 1024;

struct StubDetector(Vec<RawDetection>);

impl Detector for StubDetector {
    fn predict(&self, _image: &DynamicImage) -> Result<Vec<RawDetection>> {
        Ok(self.0.clone())
    }
}

fn app_with(detections: Vec<RawDetection>) -> Router {
    let model = ModelHandle::preloaded("stub.onnx", Arc::new(StubDetector(detections)));
    router(AppState::new(model, LabelFont::Unavailable), BODY_LIMIT)
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([120, 120, 120])));
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, ImageFormat::Png).unwrap();
    buffer.into_inner()
}

fn multipart_request(field: &str, content_type: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"xray.png\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_predict_single_detection() {
    let app = app_with(vec![RawDetection::new([10.0, 10.0, 50.0, 50.0], 3, 0.955)]);
    let (status, json) = send(app, multipart_request("file", "image/png", &png_bytes(100, 100))).await;

    assert_eq!(status, StatusCode::OK);
    let response: PredictResponse = serde_json::from_value(json).unwrap();

    assert_eq!(response.class, Label::D3);
    assert!((response.confidence - 95.5).abs() < 1e-9);
    assert_eq!(response.detections.len(), 1);
    assert_eq!(response.bounding_boxes, vec![[10.0, 10.0, 50.0, 50.0]]);

    assert_eq!(response.all_probabilities.len(), 7);
    for (i, entry) in response.all_probabilities.iter().enumerate() {
        assert_eq!(entry.class.index(), i);
        if entry.class == Label::D3 {
            assert!((entry.probability - 95.5).abs() < 1e-9);
        } else {
            assert!(entry.probability.abs() < f64::EPSILON);
        }
    }

    assert!(response.annotated_image.starts_with("data:image/jpeg;base64,"));
    let jpeg = decode_data_uri(&response.annotated_image).unwrap();
    let annotated = image::load_from_memory(&jpeg).unwrap();
    assert_eq!(annotated.dimensions(), (100, 100));
}

#[tokio::test]
async fn test_predict_no_detections() {
    let (status, json) = send(app_with(vec![]), multipart_request("file", "image/png", &png_bytes(32, 32))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["class"], "D0");
    assert_eq!(json["confidence"], 0.0);
    assert_eq!(json["detections"].as_array().unwrap().len(), 0);
    assert_eq!(json["allProbabilities"].as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn test_predict_drops_malformed_detections() {
    let app = app_with(vec![
        RawDetection::new([f64::NAN, 0.0, 10.0, 10.0], 1, 0.9),
        RawDetection::new([5.0, 5.0, 30.0, 30.0], 12, 0.8).with_name("D2"),
        RawDetection::new([60.0, 60.0, 90.0, 90.0], 99, 0.7),
    ]);
    let (status, json) = send(app, multipart_request("image", "image/png", &png_bytes(100, 100))).await;

    assert_eq!(status, StatusCode::OK);
    let classes: Vec<&str> = json["detections"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["class"].as_str().unwrap())
        .collect();
    assert_eq!(classes, vec!["D2", "D0"]);
    assert_eq!(json["class"], "D2");
}

#[tokio::test]
async fn test_predict_suppresses_overlapping_boxes() {
    let app = app_with(vec![
        RawDetection::new([10.0, 10.0, 50.0, 50.0], 1, 0.6),
        RawDetection::new([11.0, 11.0, 51.0, 51.0], 4, 0.9),
    ]);
    let (status, json) = send(app, multipart_request("file", "image/jpeg", &png_bytes(64, 64))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["detections"].as_array().unwrap().len(), 1);
    assert_eq!(json["class"], "D4");
}

#[tokio::test]
async fn test_predict_rejects_non_image_content_type() {
    let (status, json) = send(
        app_with(vec![]),
        multipart_request("file", "text/plain", b"definitely not an image"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["detail"].as_str().unwrap().contains("must be an image"));
}

#[tokio::test]
async fn test_predict_rejects_undecodable_image() {
    let (status, json) = send(app_with(vec![]), multipart_request("file", "image/png", b"garbage")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["detail"].is_string());
}

#[tokio::test]
async fn test_predict_missing_field() {
    let (status, _) = send(app_with(vec![]), multipart_request("other", "image/png", &png_bytes(8, 8))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_predict_rejects_oversized_upload() {
    let model = ModelHandle::preloaded("stub.onnx", Arc::new(StubDetector(vec![])));
    let app = router(AppState::new(model, LabelFont::Unavailable), 1024);

    let (status, json) = send(app, multipart_request("file", "image/png", &vec![7u8; 8192])).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(json["detail"].as_str().unwrap().contains("Upload too large"));
}

#[tokio::test]
async fn test_predict_model_unavailable() {
    let model = ModelHandle::onnx("/nonexistent/best.onnx", InferenceConfig::default());
    let app = router(AppState::new(model, LabelFont::Unavailable), BODY_LIMIT);

    let (status, json) = send(app, multipart_request("file", "image/png", &png_bytes(8, 8))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["detail"].as_str().unwrap().contains("Model load error"));
}

#[tokio::test]
async fn test_predict_detector_failure() {
    struct Failing;
    impl Detector for Failing {
        fn predict(&self, _image: &DynamicImage) -> Result<Vec<RawDetection>> {
            Err(InferenceError::InferenceError("runtime exploded".to_string()))
        }
    }

    let model = ModelHandle::preloaded("failing.onnx", Arc::new(Failing));
    let app = router(AppState::new(model, LabelFont::Unavailable), BODY_LIMIT);

    let (status, json) = send(app, multipart_request("file", "image/png", &png_bytes(8, 8))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["detail"].as_str().unwrap().contains("runtime exploded"));
}

#[tokio::test]
async fn test_root_and_health() {
    let (status, json) = send(app_with(vec![]), get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["model_loaded"], true);

    let (status, json) = send(app_with(vec![]), get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["model_loaded"], true);
    // The stub's path does not exist on disk
    assert!(json["model_path"].is_null());
}

#[tokio::test]
async fn test_health_before_load() {
    let model = ModelHandle::onnx("/nonexistent/best.onnx", InferenceConfig::default());
    let app = router(AppState::new(model, LabelFont::Unavailable), BODY_LIMIT);

    let (_, json) = send(app, get("/health")).await;
    assert_eq!(json["model_loaded"], false);
}

#[tokio::test]
async fn test_info_and_openapi() {
    let (status, json) = send(app_with(vec![]), get("/info")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["labels"].as_array().unwrap().len(), 7);
    assert_eq!(json["font"], "none");

    let (status, json) = send(app_with(vec![]), get("/api-docs/openapi.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["paths"]["/predict"].is_object());
}
