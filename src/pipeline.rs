// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! End-to-end prediction for a single decoded image.

use std::time::Instant;

use image::DynamicImage;
use tracing::info;

use crate::annotate::{annotate_image, LabelFont};
use crate::error::Result;
use crate::inference::PostprocessConfig;
use crate::model::Detector;
use crate::postprocessing::refine;
use crate::results::PredictionResult;

/// Output of [`run_prediction`].
#[derive(Debug, Clone)]
pub struct Prediction {
    /// Aggregated result.
    pub result: PredictionResult,
    /// The input image with detections drawn on it, or a plain copy if
    /// nothing was detected.
    pub annotated: DynamicImage,
}

/// Run the detector on `image` and post-process its output.
///
/// Only the detector call is timed. `image` is never modified.
///
/// # Errors
///
/// Returns an error if the detector fails. Individual malformed detections
/// are dropped instead.
pub fn run_prediction(
    detector: &dyn Detector,
    image: &DynamicImage,
    config: &PostprocessConfig,
    font: &LabelFont,
) -> Result<Prediction> {
    let start = Instant::now();
    let raw = detector.predict(image)?;
    let inference_time_ms = start.elapsed().as_secs_f64() * 1000.0;

    let detections = refine(&raw, config)?;
    let result = PredictionResult::new(detections, inference_time_ms);

    let annotated = if result.is_empty() {
        image.clone()
    } else {
        annotate_image(image, &result.detections, font)
    };

    info!(
        detections = result.len(),
        top_class = %result.top_class,
        inference_ms = format!("{inference_time_ms:.1}"),
        "{}",
        result.summary()
    );

    Ok(Prediction { result, annotated })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::RawDetection;
    use crate::error::InferenceError;
    use crate::labels::Label;
    use image::{Rgb, RgbImage};

    struct StubDetector(Vec<RawDetection>);

    impl Detector for StubDetector {
        fn predict(&self, _image: &DynamicImage) -> Result<Vec<RawDetection>> {
            Ok(self.0.clone())
        }
    }

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn predict(&self, _image: &DynamicImage) -> Result<Vec<RawDetection>> {
            Err(InferenceError::InferenceError("boom".to_string()))
        }
    }

    fn image() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(100, 100, Rgb([40, 40, 40])))
    }

    #[test]
    fn test_single_detection() {
        let detector = StubDetector(vec![RawDetection::new([10.0, 10.0, 50.0, 50.0], 3, 0.955)]);
        let input = image();
        let prediction =
            run_prediction(&detector, &input, &PostprocessConfig::default(), &LabelFont::Unavailable).unwrap();

        assert_eq!(prediction.result.top_class, Label::D3);
        assert!((prediction.result.top_confidence - 95.5).abs() < 1e-9);
        assert_eq!(prediction.result.bounding_boxes, vec![[10.0, 10.0, 50.0, 50.0]]);
        assert_ne!(prediction.annotated.as_bytes(), input.as_bytes());
    }

    #[test]
    fn test_no_detections_returns_plain_copy() {
        let input = image();
        let prediction = run_prediction(
            &StubDetector(vec![]),
            &input,
            &PostprocessConfig::default(),
            &LabelFont::Unavailable,
        )
        .unwrap();

        assert!(prediction.result.is_empty());
        assert_eq!(prediction.result.top_class, Label::D0);
        assert_eq!(prediction.annotated.as_bytes(), input.as_bytes());
    }

    #[test]
    fn test_detector_failure_propagates() {
        let err = run_prediction(
            &FailingDetector,
            &image(),
            &PostprocessConfig::default(),
            &LabelFont::Unavailable,
        )
        .unwrap_err();
        assert!(matches!(err, InferenceError::InferenceError(_)));
    }
}
