// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

#![allow(clippy::multiple_crate_versions)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! # Dentalogic Inference
//!
//! Dental caries detection service built on an Ultralytics YOLO model exported
//! to ONNX. An uploaded image goes through the detector, then through the
//! service's own post-processing, and comes back as a graded result with an
//! annotated JPEG.
//!
//! ## Pipeline
//!
//! 1. **Detect** - a [`Detector`] returns [`RawDetection`]s in image pixels.
//! 2. **Normalize** - each raw class is resolved onto the fixed [`Label`] set
//!    `D0`..`D6` and confidence is rescaled to percent. Malformed detections
//!    are dropped.
//! 3. **Filter** - a confidence floor and class-agnostic [`nms`].
//! 4. **Aggregate** - the top grade plus, for every grade, the best confidence
//!    seen for it. This per-grade vector is not a probability distribution.
//! 5. **Annotate** - boxes and labels drawn on a copy of the image.
//!
//! ## Quick Start (Library)
//!
//! ```no_run
//! use dentalogic_inference::{run_prediction, InferenceConfig, LabelFont, ModelHandle, PostprocessConfig};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let model = ModelHandle::onnx("model/best.onnx", InferenceConfig::default());
//! let detector = model.get().await?;
//!
//! let image = image::open("xray.jpg")?;
//! let prediction = run_prediction(
//!     detector.as_ref(),
//!     &image,
//!     &PostprocessConfig::default(),
//!     &LabelFont::Unavailable,
//! )?;
//! println!("{} ({:.1}%)", prediction.result.top_class, prediction.result.top_confidence);
//! # Ok(())
//! # }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! # Serve the HTTP API
//! dentalogic-inference serve --model model/best.onnx --port 8000
//!
//! # One image, JSON to stdout
//! dentalogic-inference predict --model model/best.onnx --source xray.jpg --save annotated.jpg
//! ```
//!
//! ## HTTP API
//!
//! `POST /predict` with a multipart `file` field returns:
//!
//! ```json
//! {
//!   "class": "D3",
//!   "confidence": 95.5,
//!   "allProbabilities": [{"class": "D0", "probability": 0.0}, "..."],
//!   "inferenceTime": 41.27,
//!   "detections": [{"bbox": [10.0, 10.0, 50.0, 50.0], "class": "D3", "confidence": 95.5}],
//!   "boundingBoxes": [[10.0, 10.0, 50.0, 50.0]],
//!   "annotatedImage": "data:image/jpeg;base64,..."
//! }
//! ```
//!
//! Errors come back as `{"detail": "..."}` with status 400 for bad uploads and
//! 500 otherwise.
//!
//! ## Features
//!
//! - `onnx` (default) - the ONNX Runtime backed [`YoloDetector`]. Without it
//!   the crate still builds, and any [`Detector`] can be plugged in.

pub mod annotate;
pub mod cli;
pub mod detection;
pub mod error;
pub mod inference;
pub mod io;
pub mod labels;
pub mod metadata;
pub mod model;
pub mod pipeline;
pub mod postprocessing;
pub mod preprocessing;
pub mod results;
pub mod server;
pub mod utils;

// Re-exports for convenience
pub use annotate::{annotate_image, FontConfig, LabelFont};
pub use detection::{normalize, Detection, RawDetection};
pub use error::{InferenceError, Result};
pub use inference::{InferenceConfig, PostprocessConfig};
pub use labels::{Label, LABELS};
pub use metadata::ModelMetadata;
pub use model::{Detector, DetectorLoader, ModelHandle};
#[cfg(feature = "onnx")]
pub use model::YoloDetector;
pub use pipeline::{run_prediction, Prediction};
pub use results::{aggregate, Aggregation, ClassProbability, PredictionResult};
pub use server::{router, AppState, PredictResponse};
pub use utils::nms;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
