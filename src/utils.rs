// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Box geometry and Non-Maximum Suppression.
//!
//! Two overlap conventions live here:
//!
//! - [`calculate_iou`] / [`nms_per_class`] treat boxes as continuous regions and are
//!   used inside the ONNX detector, mirroring what the exported YOLO pipeline does.
//! - [`pixel_iou`] / [`nms`] treat coordinates as inclusive pixel indices
//!   (`area = (x2 - x1 + 1) * (y2 - y1 + 1)`) and implement the service's own
//!   suppression policy, applied after normalization regardless of what the model did.

use crate::error::{InferenceError, Result};

/// Calculate `IoU` (Intersection over Union) between two bounding boxes
///
/// # Arguments
///
/// * `box1` - First bounding box [x1, y1, x2, y2]
/// * `box2` - Second bounding box [x1, y1, x2, y2]
///
/// # Returns
///
/// `IoU` value between 0.0 and 1.0
#[must_use]
pub fn calculate_iou(box1: &[f32; 4], box2: &[f32; 4]) -> f32 {
    let x1 = box1[0].max(box2[0]);
    let y1 = box1[1].max(box2[1]);
    let x2 = box1[2].min(box2[2]);
    let y2 = box1[3].min(box2[3]);

    let intersection = ((x2 - x1).max(0.0)) * ((y2 - y1).max(0.0));

    let area1 = (box1[2] - box1[0]) * (box1[3] - box1[1]);
    let area2 = (box2[2] - box2[0]) * (box2[3] - box2[1]);
    let union = area1 + area2 - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Per-class Non-Maximum Suppression (NMS) for filtering overlapping detections
///
/// Only suppresses boxes within the same class, matching Ultralytics behavior.
/// NaN scores sort last instead of panicking.
///
/// # Arguments
///
/// * `boxes` - Vector of bounding boxes with scores and class IDs [(bbox, score, `class_id`)]
/// * `iou_threshold` - `IoU` threshold for suppression
///
/// # Returns
///
/// Indices of boxes to keep, highest score first
#[must_use]
pub fn nms_per_class(boxes: &[([f32; 4], f32, usize)], iou_threshold: f32) -> Vec<usize> {
    if boxes.is_empty() {
        return vec![];
    }

    // Sort by score (descending)
    let mut indices: Vec<usize> = (0..boxes.len()).collect();
    indices.sort_by(|&a, &b| {
        boxes[b]
            .1
            .partial_cmp(&boxes[a].1)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = vec![];
    let mut suppressed = vec![false; boxes.len()];

    for &i in &indices {
        if suppressed[i] {
            continue;
        }
        keep.push(i);

        let class_i = boxes[i].2;

        for &j in &indices {
            if !suppressed[j] && i != j && boxes[j].2 == class_i {
                let iou = calculate_iou(&boxes[i].0, &boxes[j].0);
                if iou > iou_threshold {
                    suppressed[j] = true;
                }
            }
        }
    }

    keep
}

/// Area of a box whose corners are inclusive pixel indices.
#[inline]
fn pixel_area(b: &[f64; 4]) -> f64 {
    (b[2] - b[0] + 1.0) * (b[3] - b[1] + 1.0)
}

/// `IoU` between two boxes using the pixel-inclusive "+1" convention.
///
/// Touching boxes (`x2 == x1'`) share one pixel column and therefore overlap.
#[must_use]
pub fn pixel_iou(box1: &[f64; 4], box2: &[f64; 4]) -> f64 {
    let xx1 = box1[0].max(box2[0]);
    let yy1 = box1[1].max(box2[1]);
    let xx2 = box1[2].min(box2[2]);
    let yy2 = box1[3].min(box2[3]);

    let w = (xx2 - xx1 + 1.0).max(0.0);
    let h = (yy2 - yy1 + 1.0).max(0.0);
    let intersection = w * h;

    let union = pixel_area(box1) + pixel_area(box2) - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Class-agnostic Non-Maximum Suppression over pixel-space boxes.
///
/// Indices are ordered by descending score; equal scores keep their original
/// relative order, so the lower index wins a tie. The highest remaining box is
/// kept and every remaining box whose [`pixel_iou`] with it exceeds
/// `iou_threshold` is discarded, until nothing remains.
///
/// # Returns
///
/// Indices of the kept boxes, in the order they were selected.
///
/// # Errors
///
/// Returns an error if `boxes` and `scores` differ in length.
pub fn nms(boxes: &[[f64; 4]], scores: &[f64], iou_threshold: f64) -> Result<Vec<usize>> {
    if boxes.len() != scores.len() {
        return Err(InferenceError::InferenceError(format!(
            "NMS received {} boxes but {} scores",
            boxes.len(),
            scores.len()
        )));
    }

    // `sort_by` is stable, which fixes the tiebreak to the original index
    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut keep = Vec::with_capacity(order.len());
    while let Some((&best, rest)) = order.split_first() {
        keep.push(best);
        order = rest
            .iter()
            .copied()
            .filter(|&j| pixel_iou(&boxes[best], &boxes[j]) <= iou_threshold)
            .collect();
    }

    Ok(keep)
}
