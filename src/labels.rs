// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Caries severity label set.
//!
//! The model predicts one of seven fixed grades, `D0` through `D6`. The set,
//! its order and the color used to draw each grade never change while the
//! process runs, so they live in this enum rather than in string tables.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Caries severity grade predicted by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
pub enum Label {
    /// Sound tooth surface.
    D0,
    /// First visual change in enamel.
    D1,
    /// Distinct visual change in enamel.
    D2,
    /// Localized enamel breakdown.
    D3,
    /// Underlying dark shadow from dentin.
    D4,
    /// Distinct cavity with visible dentin.
    D5,
    /// Extensive cavity with visible dentin.
    D6,
}

/// Every label, in model output order.
pub const LABELS: [Label; 7] = [
    Label::D0,
    Label::D1,
    Label::D2,
    Label::D3,
    Label::D4,
    Label::D5,
    Label::D6,
];

/// Box colors per label, indexed by [`Label::index`].
const LABEL_COLORS: [[u8; 3]; 7] = [
    [0, 255, 0],   // green
    [255, 255, 0], // yellow
    [255, 165, 0], // orange
    [255, 0, 0],   // red
    [255, 0, 255], // magenta
    [128, 0, 128], // purple
    [0, 0, 255],   // blue
];

impl Label {
    /// The label used when nothing else applies.
    pub const FALLBACK: Self = Self::D0;

    /// Returns the label name as emitted in responses.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::D0 => "D0",
            Self::D1 => "D1",
            Self::D2 => "D2",
            Self::D3 => "D3",
            Self::D4 => "D4",
            Self::D5 => "D5",
            Self::D6 => "D6",
        }
    }

    /// Ordinal position in [`LABELS`].
    #[must_use]
    pub const fn index(&self) -> usize {
        *self as usize
    }

    /// Look up a label by ordinal position.
    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        LABELS.get(index).copied()
    }

    /// Look up a label by its exact name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        LABELS.iter().copied().find(|label| label.as_str() == name)
    }

    /// RGB color used to draw this label.
    #[must_use]
    pub const fn color(&self) -> [u8; 3] {
        LABEL_COLORS[self.index()]
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Label {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("Unknown label: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_order_matches_index() {
        for (i, label) in LABELS.iter().enumerate() {
            assert_eq!(label.index(), i);
            assert_eq!(Label::from_index(i), Some(*label));
        }
        assert_eq!(Label::from_index(LABELS.len()), None);
    }

    #[test]
    fn test_label_from_str() {
        assert_eq!("D3".parse::<Label>().unwrap(), Label::D3);
        assert!("d3".parse::<Label>().is_err());
        assert!("D7".parse::<Label>().is_err());
    }

    #[test]
    fn test_label_colors_are_distinct() {
        for (i, a) in LABELS.iter().enumerate() {
            for b in &LABELS[i + 1..] {
                assert_ne!(a.color(), b.color());
            }
        }
    }

    #[test]
    fn test_label_serializes_as_name() {
        let json = serde_json::to_string(&Label::D5).unwrap();
        assert_eq!(json, "\"D5\"");
        let back: Label = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Label::D5);
    }
}
