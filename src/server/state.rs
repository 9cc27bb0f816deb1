// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::sync::Arc;

use crate::annotate::LabelFont;
use crate::inference::PostprocessConfig;
use crate::model::ModelHandle;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Lazily loaded detector.
    pub model: Arc<ModelHandle>,
    /// Label font, resolved once at startup.
    pub font: Arc<LabelFont>,
    /// Service-side filtering.
    pub postprocess: PostprocessConfig,
}

impl AppState {
    /// Create the state with default post-processing.
    #[must_use]
    pub fn new(model: ModelHandle, font: LabelFont) -> Self {
        Self {
            model: Arc::new(model),
            font: Arc::new(font),
            postprocess: PostprocessConfig::default(),
        }
    }

    /// Replace the post-processing configuration.
    #[must_use]
    pub const fn with_postprocess(mut self, postprocess: PostprocessConfig) -> Self {
        self.postprocess = postprocess;
        self
    }
}
