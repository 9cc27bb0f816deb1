// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Prediction results and class aggregation.
//!
//! A [`PredictionResult`] is built once per request from the normalized
//! detections and is not modified afterwards.
//!
//! The per-class vector is **not** a probability distribution. Each entry is
//! the best confidence seen for that class across all detections ("best
//! evidence per class"), so the entries need not sum to one and several
//! classes can be close to one at the same time.

use crate::detection::Detection;
use crate::labels::{Label, LABELS};

/// Best evidence for one label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassProbability {
    /// The label.
    pub class: Label,
    /// Maximum confidence among detections of this label, as a fraction in [0, 1].
    pub probability: f64,
}

/// Output of [`aggregate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregation {
    /// Label of the most confident detection.
    pub top_class: Label,
    /// Confidence of the most confident detection, in percent.
    pub top_confidence: f64,
    /// One entry per label, in [`LABELS`] order.
    pub per_class: Vec<ClassProbability>,
}

/// Reduce detections to a top prediction and a per-class summary.
///
/// With no detections the top class is the first label at confidence 0 and
/// every class scores 0. Otherwise the most confident detection wins, ties
/// going to the earliest one in `detections`.
#[must_use]
pub fn aggregate(detections: &[Detection]) -> Aggregation {
    let mut best: Option<&Detection> = None;
    let mut per_class = [0.0_f64; LABELS.len()];

    for det in detections {
        if best.map_or(true, |b| det.confidence > b.confidence) {
            best = Some(det);
        }
        let slot = &mut per_class[det.class.index()];
        *slot = slot.max(det.probability());
    }

    let (top_class, top_confidence) =
        best.map_or((Label::FALLBACK, 0.0), |b| (b.class, b.confidence));

    Aggregation {
        top_class,
        top_confidence,
        per_class: LABELS
            .iter()
            .map(|&class| ClassProbability {
                class,
                probability: per_class[class.index()],
            })
            .collect(),
    }
}

/// Complete result for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionResult {
    /// Label of the most confident detection.
    pub top_class: Label,
    /// Confidence of the top class, in percent.
    pub top_confidence: f64,
    /// Best evidence per label, in [`LABELS`] order.
    pub per_class_probability: Vec<ClassProbability>,
    /// Wall-clock time of the model call in milliseconds.
    pub inference_time_ms: f64,
    /// Normalized detections that survived post-processing.
    pub detections: Vec<Detection>,
    /// The detections' boxes, in the same order.
    pub bounding_boxes: Vec<[f64; 4]>,
}

impl PredictionResult {
    /// Aggregate `detections` into a result.
    #[must_use]
    pub fn new(detections: Vec<Detection>, inference_time_ms: f64) -> Self {
        let Aggregation {
            top_class,
            top_confidence,
            per_class,
        } = aggregate(&detections);
        let bounding_boxes = detections.iter().map(|d| d.bbox).collect();

        Self {
            top_class,
            top_confidence,
            per_class_probability: per_class,
            inference_time_ms,
            detections,
            bounding_boxes,
        }
    }

    /// Number of detections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    /// Whether nothing was detected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    /// Short human-readable summary, e.g. `"2 D1, 1 D3"`.
    #[must_use]
    pub fn summary(&self) -> String {
        if self.is_empty() {
            return "(no detections)".to_string();
        }
        let mut counts = [0usize; LABELS.len()];
        for det in &self.detections {
            counts[det.class.index()] += 1;
        }
        LABELS
            .iter()
            .filter(|l| counts[l.index()] > 0)
            .map(|l| format!("{} {l}", counts[l.index()]))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(class: Label, confidence: f64) -> Detection {
        Detection {
            bbox: [0.0, 0.0, 10.0, 10.0],
            class,
            confidence,
        }
    }

    #[test]
    fn test_aggregate_empty() {
        let agg = aggregate(&[]);
        assert_eq!(agg.top_class, Label::D0);
        assert!(agg.top_confidence.abs() < f64::EPSILON);
        assert_eq!(agg.per_class.len(), 7);
        assert!(agg.per_class.iter().all(|p| p.probability == 0.0));
    }

    #[test]
    fn test_aggregate_uses_max_not_mean() {
        let agg = aggregate(&[
            det(Label::D1, 90.0),
            det(Label::D1, 60.0),
            det(Label::D3, 70.0),
        ]);
        assert_eq!(agg.top_class, Label::D1);
        assert!((agg.top_confidence - 90.0).abs() < 1e-9);
        assert!((agg.per_class[1].probability - 0.90).abs() < 1e-9);
        assert!((agg.per_class[3].probability - 0.70).abs() < 1e-9);
        assert!(agg.per_class[0].probability.abs() < f64::EPSILON);
    }

    #[test]
    fn test_aggregate_is_not_a_distribution() {
        let agg = aggregate(&[det(Label::D2, 95.0), det(Label::D4, 92.0)]);
        let total: f64 = agg.per_class.iter().map(|p| p.probability).sum();
        assert!(total > 1.0);
    }

    #[test]
    fn test_aggregate_tie_prefers_first() {
        let agg = aggregate(&[det(Label::D4, 80.0), det(Label::D2, 80.0)]);
        assert_eq!(agg.top_class, Label::D4);
    }

    #[test]
    fn test_per_class_in_label_order() {
        let agg = aggregate(&[det(Label::D6, 10.0)]);
        let order: Vec<Label> = agg.per_class.iter().map(|p| p.class).collect();
        assert_eq!(order, LABELS.to_vec());
    }

    #[test]
    fn test_prediction_result_boxes_follow_detections() {
        let mut a = det(Label::D1, 50.0);
        a.bbox = [1.0, 2.0, 3.0, 4.0];
        let b = det(Label::D2, 40.0);
        let result = PredictionResult::new(vec![a, b], 12.5);
        assert_eq!(result.bounding_boxes, vec![[1.0, 2.0, 3.0, 4.0], [0.0, 0.0, 10.0, 10.0]]);
        assert_eq!(result.len(), 2);
        assert_eq!(result.summary(), "1 D1, 1 D2");
    }

    #[test]
    fn test_summary_empty() {
        assert_eq!(PredictionResult::new(vec![], 0.0).summary(), "(no detections)");
    }
}
