// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Raw model detections and their canonical, labeled form.

use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use crate::error::{InferenceError, Result};
use crate::labels::Label;

/// A single unprocessed detection as produced by a [`Detector`](crate::model::Detector).
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    /// Bounding box [x1, y1, x2, y2] in original image pixels.
    pub bbox: [f64; 4],
    /// Class index reported by the model.
    pub class_id: usize,
    /// Model confidence (0.0 - 1.0).
    pub confidence: f64,
    /// Class name the model associates with `class_id`, if it carries one.
    pub name: Option<String>,
}

impl RawDetection {
    /// Create a raw detection without a model-provided class name.
    #[must_use]
    pub const fn new(bbox: [f64; 4], class_id: usize, confidence: f64) -> Self {
        Self {
            bbox,
            class_id,
            confidence,
            name: None,
        }
    }

    /// Attach the model-provided class name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A detection resolved to the fixed label set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Detection {
    /// Bounding box [x1, y1, x2, y2] in pixels, with x2 >= x1 and y2 >= y1.
    #[schema(value_type = Vec<f64>)]
    pub bbox: [f64; 4],
    /// Resolved caries grade.
    pub class: Label,
    /// Confidence in percent (0.0 - 100.0).
    pub confidence: f64,
}

impl Detection {
    /// Confidence as a fraction in [0, 1].
    #[must_use]
    pub fn probability(&self) -> f64 {
        self.confidence / 100.0
    }
}

/// How a raw class was mapped onto the label set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The model's own class name is a known label.
    ModelName,
    /// The class id is a valid position in the label set.
    ClassIndex,
    /// Neither matched; the first label was used.
    Fallback,
}

impl Resolution {
    const fn as_str(self) -> &'static str {
        match self {
            Self::ModelName => "model_name",
            Self::ClassIndex => "class_index",
            Self::Fallback => "fallback",
        }
    }
}

/// Resolve a model class to a label.
///
/// The model-provided name wins if it is a known label, then the class id is
/// tried as an ordinal index, and finally [`Label::FALLBACK`] is used.
#[must_use]
pub fn resolve_label(class_id: usize, name: Option<&str>) -> (Label, Resolution) {
    if let Some(label) = name.and_then(Label::from_name) {
        return (label, Resolution::ModelName);
    }
    match Label::from_index(class_id) {
        Some(label) => (label, Resolution::ClassIndex),
        None => (Label::FALLBACK, Resolution::Fallback),
    }
}

/// Normalize a raw detection into a [`Detection`].
///
/// Confidence is clamped to [0, 1] and rescaled to percent. Corners are
/// reordered so that x1 <= x2 and y1 <= y2.
///
/// # Errors
///
/// Returns [`InferenceError::InvalidDetection`] if any box coordinate or the
/// confidence is not finite.
pub fn normalize(raw: &RawDetection) -> Result<Detection> {
    if raw.bbox.iter().any(|v| !v.is_finite()) {
        return Err(InferenceError::InvalidDetection(format!(
            "non-finite bounding box {:?} for class id {}",
            raw.bbox, raw.class_id
        )));
    }
    if !raw.confidence.is_finite() {
        return Err(InferenceError::InvalidDetection(format!(
            "non-finite confidence for class id {}",
            raw.class_id
        )));
    }

    let [x1, y1, x2, y2] = raw.bbox;
    let bbox = [x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2)];
    let confidence = raw.confidence.clamp(0.0, 1.0) * 100.0;

    let (class, resolution) = resolve_label(raw.class_id, raw.name.as_deref());
    debug!(
        class_id = raw.class_id,
        model_name = raw.name.as_deref().unwrap_or("-"),
        label = %class,
        resolution = resolution.as_str(),
        confidence,
        "normalized detection at [{:.1}, {:.1}, {:.1}, {:.1}]",
        bbox[0],
        bbox[1],
        bbox[2],
        bbox[3]
    );

    Ok(Detection {
        bbox,
        class,
        confidence,
    })
}
