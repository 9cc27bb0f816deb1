// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Post-processing of detector output.
//!
//! [`decode_detections`] turns a raw YOLO output tensor into [`RawDetection`]s
//! in original image coordinates. [`refine`] is the service-side stage that
//! every detector's output goes through: normalization, a confidence floor and
//! class-agnostic NMS.

use std::collections::HashMap;

use ndarray::{s, Array2, ArrayView2};
use tracing::{debug, warn};

use crate::detection::{normalize, Detection, RawDetection};
use crate::error::Result;
use crate::inference::{InferenceConfig, PostprocessConfig};
use crate::preprocessing::{clip_coords, scale_coords, PreprocessResult};
use crate::utils::{nms, nms_per_class};

/// Decode a YOLO detection output tensor.
///
/// The output is `[1, 4 + nc, N]` or its transpose `[1, N, 4 + nc]`, each
/// prediction holding a center-format box followed by per-class scores.
/// Returned detections are ordered by descending confidence.
#[must_use]
pub fn decode_detections(
    output: &[f32],
    output_shape: &[usize],
    preprocess: &PreprocessResult,
    config: &InferenceConfig,
    names: &HashMap<usize, String>,
) -> Vec<RawDetection> {
    let (num_classes, num_predictions, is_transposed) = parse_detect_shape(output_shape, names.len());

    if output.is_empty() || num_predictions == 0 {
        return Vec::new();
    }

    let Some(output_2d) = to_prediction_rows(output, num_classes, num_predictions, is_transposed)
    else {
        warn!(shape = ?output_shape, len = output.len(), "Output tensor does not match its shape");
        return Vec::new();
    };

    extract_detect_boxes(output_2d.view(), preprocess, config)
        .into_iter()
        .map(|(bbox, score, class_id)| {
            let raw = RawDetection::new(bbox.map(f64::from), class_id, f64::from(score));
            match names.get(&class_id) {
                Some(name) => raw.with_name(name.clone()),
                None => raw,
            }
        })
        .collect()
}

/// Reshape the flat output into one row per prediction.
fn to_prediction_rows(
    output: &[f32],
    num_classes: usize,
    num_predictions: usize,
    is_transposed: bool,
) -> Option<Array2<f32>> {
    let features = 4 + num_classes;
    if is_transposed {
        Array2::from_shape_vec((num_predictions, features), output.to_vec()).ok()
    } else {
        Array2::from_shape_vec((features, num_predictions), output.to_vec())
            .ok()
            .map(|arr| arr.t().to_owned())
    }
}

/// Parse detection output shape to determine format.
///
/// Returns `(num_classes, num_predictions, is_transposed)`. The class count is
/// derived from the shape when the model carries no class names.
fn parse_detect_shape(shape: &[usize], expected_classes: usize) -> (usize, usize, bool) {
    let (a, b) = match shape {
        [a, b] | [_, a, b] => (*a, *b),
        _ => return (expected_classes.max(1), 0, false),
    };

    if a.max(b) < 5 || a.min(b) == 0 {
        return (expected_classes.max(1), 0, false);
    }

    if expected_classes == 0 {
        // Typically num_features < num_preds (e.g. 11 < 8400)
        let (num_features, num_preds, transposed) = if a < b { (a, b, false) } else { (b, a, true) };
        return (num_features.saturating_sub(4).max(1), num_preds, transposed);
    }

    if a == 4 + expected_classes {
        (expected_classes, b, false)
    } else if b == 4 + expected_classes {
        (expected_classes, a, true)
    } else if a < b {
        (a.saturating_sub(4).max(1), b, false)
    } else {
        (b.saturating_sub(4).max(1), a, true)
    }
}

/// Extract thresholded, per-class NMS filtered boxes from prediction rows.
fn extract_detect_boxes(
    output: ArrayView2<f32>,
    preprocess: &PreprocessResult,
    config: &InferenceConfig,
) -> Vec<([f32; 4], f32, usize)> {
    let mut candidates = Vec::new();

    for row in output.rows() {
        // Find best class (treat NaN as lowest to avoid panic)
        let (best_class, best_score) = row
            .slice(s![4..])
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Less))
            .map_or((0, 0.0), |(idx, &score)| (idx, if score.is_nan() { 0.0 } else { score }));

        if best_score < config.confidence_threshold {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        let xyxy = [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0];

        let scaled = scale_coords(&xyxy, preprocess.scale, preprocess.padding);
        let clipped = clip_coords(&scaled, preprocess.orig_shape);

        candidates.push((clipped, best_score, best_class));
    }

    nms_per_class(&candidates, config.iou_threshold)
        .into_iter()
        .take(config.max_detections)
        .map(|i| candidates[i])
        .collect()
}

/// Normalize, threshold and suppress raw detections.
///
/// Detections that fail normalization are logged and dropped without
/// affecting the others. Survivors keep the detector's original order.
///
/// # Errors
///
/// Returns an error only if suppression itself fails.
pub fn refine(raw: &[RawDetection], config: &PostprocessConfig) -> Result<Vec<Detection>> {
    let normalized: Vec<Detection> = raw
        .iter()
        .filter_map(|det| match normalize(det) {
            Ok(det) => Some(det),
            Err(e) => {
                warn!("Dropping detection: {e}");
                None
            }
        })
        .filter(|det| config.passes(det.probability()))
        .collect();

    let boxes: Vec<[f64; 4]> = normalized.iter().map(|d| d.bbox).collect();
    let scores: Vec<f64> = normalized.iter().map(Detection::probability).collect();

    let mut keep = nms(&boxes, &scores, config.nms_iou)?;
    keep.sort_unstable();

    debug!(
        raw = raw.len(),
        normalized = normalized.len(),
        kept = keep.len(),
        "Refined detections"
    );

    let mut slots: Vec<Option<Detection>> = normalized.into_iter().map(Some).collect();
    Ok(keep.into_iter().filter_map(|i| slots[i].take()).collect())
}
