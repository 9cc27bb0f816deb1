// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Inference configuration.
//!
//! Two layers of thresholds exist. [`InferenceConfig`] controls the ONNX
//! detector itself (what the model reports), while [`PostprocessConfig`]
//! controls the service's own filtering applied to every detector's output.

/// Configuration for the ONNX detector.
///
/// # Example
///
/// ```rust
/// use dentalogic_inference::InferenceConfig;
///
/// let config = InferenceConfig::new()
///     .with_confidence(0.3)
///     .with_iou(0.5)
///     .with_imgsz(640, 640);
/// ```
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Model confidence threshold (0.0 to 1.0).
    pub confidence_threshold: f32,
    /// IoU threshold for the model's per-class NMS (0.0 to 1.0).
    pub iou_threshold: f32,
    /// Maximum number of detections the model returns per image.
    pub max_detections: usize,
    /// Explicit input image size (height, width).
    /// If `None`, the model's metadata determines the input size.
    pub imgsz: Option<(usize, usize)>,
    /// Number of intra-op threads for ONNX Runtime, `0` lets it decide.
    pub num_threads: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            iou_threshold: 0.5,
            max_detections: 300,
            imgsz: None,
            num_threads: 0,
        }
    }
}

impl InferenceConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the model confidence threshold.
    #[must_use]
    pub const fn with_confidence(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold;
        self
    }

    /// Set the IoU threshold for the model's NMS.
    #[must_use]
    pub const fn with_iou(mut self, threshold: f32) -> Self {
        self.iou_threshold = threshold;
        self
    }

    /// Set the maximum number of detections to return.
    #[must_use]
    pub const fn with_max_detections(mut self, max: usize) -> Self {
        self.max_detections = max;
        self
    }

    /// Set the input image size.
    #[must_use]
    pub const fn with_imgsz(mut self, height: usize, width: usize) -> Self {
        self.imgsz = Some((height, width));
        self
    }

    /// Set the number of threads for inference.
    #[must_use]
    pub const fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = threads;
        self
    }
}

/// Service-side filtering applied after normalization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PostprocessConfig {
    /// Detections below this confidence (fraction, 0.0 to 1.0) are dropped.
    pub min_confidence: f64,
    /// IoU above which the lower-scored of two boxes is suppressed.
    pub nms_iou: f64,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.25,
            nms_iou: 0.5,
        }
    }
}

impl PostprocessConfig {
    /// Set the minimum confidence.
    #[must_use]
    pub const fn with_min_confidence(mut self, threshold: f64) -> Self {
        self.min_confidence = threshold;
        self
    }

    /// Set the NMS IoU threshold.
    #[must_use]
    pub const fn with_nms_iou(mut self, threshold: f64) -> Self {
        self.nms_iou = threshold;
        self
    }

    /// Whether a confidence (fraction) clears the floor. The floor itself passes.
    #[must_use]
    pub fn passes(&self, confidence: f64) -> bool {
        confidence >= self.min_confidence
    }
}
