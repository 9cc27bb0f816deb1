// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ONNX model metadata parsing.
//!
//! Ultralytics exports store their configuration as YAML-ish strings in the
//! ONNX custom metadata. Only the fields the detector needs are read here.

use std::collections::HashMap;

use crate::error::{InferenceError, Result};

/// Metadata keys read from the ONNX model.
pub const METADATA_KEYS: [&str; 5] = ["description", "task", "stride", "imgsz", "names"];

/// Metadata extracted from an Ultralytics YOLO ONNX model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMetadata {
    /// Model description.
    pub description: String,
    /// Task the model was exported for (e.g. "detect").
    pub task: String,
    /// Model stride (typically 32 for YOLO).
    pub stride: u32,
    /// Input image size as (height, width).
    pub imgsz: (usize, usize),
    /// Class ID to class name mapping.
    pub names: HashMap<usize, String>,
}

impl ModelMetadata {
    /// Build metadata from individual custom metadata entries.
    ///
    /// # Errors
    ///
    /// Returns an error if a present field is malformed.
    pub fn from_entries(entries: &HashMap<String, String>) -> Result<Self> {
        if entries.is_empty() {
            return Ok(Self::default());
        }
        let yaml = entries
            .iter()
            .map(|(key, value)| format!("{key}: {value}"))
            .collect::<Vec<_>>()
            .join("\n");
        Self::from_yaml_str(&yaml)
    }

    /// Parse metadata from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the stride is not a number.
    pub fn from_yaml_str(yaml_str: &str) -> Result<Self> {
        let mut metadata = Self::default();

        for line in yaml_str.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once(':') {
                let key = key.trim();
                let value = value.trim().trim_matches('\'').trim_matches('"');

                match key {
                    "description" => metadata.description = value.to_string(),
                    "task" => metadata.task = value.to_string(),
                    "stride" => {
                        metadata.stride = value.parse().map_err(|_| {
                            InferenceError::ModelLoadError(format!("Invalid stride value: {value}"))
                        })?;
                    }
                    _ => {
                        // Class entries of a YAML names block ("0: D0")
                        if let Ok(class_id) = key.parse::<usize>() {
                            metadata.names.insert(class_id, value.to_string());
                        }
                    }
                }
            }
        }

        if let Some(imgsz_line) = yaml_str.lines().find(|l| l.contains("imgsz:")) {
            metadata.imgsz = Self::parse_imgsz(yaml_str, imgsz_line);
        }

        if metadata.names.is_empty() {
            metadata.names = Self::parse_names_dict(yaml_str);
        }

        Ok(metadata)
    }

    /// Parse `imgsz`, either inline (`[640, 640]`) or as a YAML list.
    fn parse_imgsz(yaml_str: &str, imgsz_line: &str) -> (usize, usize) {
        if let (Some(start), Some(end)) = (imgsz_line.find('['), imgsz_line.find(']')) {
            let values: Vec<usize> = imgsz_line[start + 1..end]
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if values.len() >= 2 {
                return (values[0], values[1]);
            }
        }

        let values: Vec<usize> = yaml_str
            .lines()
            .skip_while(|l| !l.contains("imgsz:"))
            .skip(1)
            .map(str::trim)
            .take_while(|l| l.starts_with('-'))
            .filter_map(|l| l.trim_start_matches('-').trim().parse().ok())
            .take(2)
            .collect();

        if values.len() == 2 {
            (values[0], values[1])
        } else {
            (640, 640)
        }
    }

    /// Parse a Python dict names value like `names: {0: 'D0', 1: 'D1'}`.
    fn parse_names_dict(yaml_str: &str) -> HashMap<usize, String> {
        let mut names = HashMap::new();

        let Some(start) = yaml_str.find("names:") else {
            return names;
        };
        let after = yaml_str[start + 6..].trim_start();
        let Some(body) = after.strip_prefix('{').and_then(|s| s.split_once('}')).map(|(b, _)| b)
        else {
            return names;
        };

        for entry in body.split(',') {
            if let Some((key, value)) = entry.split_once(':') {
                let value = value.trim().trim_matches('\'').trim_matches('"');
                if let Ok(class_id) = key.trim().parse::<usize>() {
                    names.insert(class_id, value.to_string());
                }
            }
        }

        names
    }

    /// Get the number of classes in this model.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.names.len()
    }
}

impl Default for ModelMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            task: "detect".to_string(),
            stride: 32,
            imgsz: (640, 640),
            names: HashMap::new(),
        }
    }
}
