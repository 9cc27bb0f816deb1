// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Error types for the inference service.

use thiserror::Error;

/// Result type alias for inference operations.
pub type Result<T> = std::result::Result<T, InferenceError>;

/// Main error type for the inference service.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// The model file is missing or the runtime failed to initialize it.
    #[error("Model load error: {0}")]
    ModelLoadError(String),
    /// The uploaded payload is not a decodable image.
    #[error("Invalid upload: {0}")]
    InvalidUpload(String),
    /// The request body exceeded the upload size limit.
    #[error("Upload too large: {0}")]
    UploadTooLarge(String),
    /// A single raw detection could not be normalized.
    #[error("Invalid detection: {0}")]
    InvalidDetection(String),
    /// Error during model inference or post-processing.
    #[error("Inference error: {0}")]
    InferenceError(String),
    /// Error processing images.
    #[error("Image error: {0}")]
    ImageError(String),
    /// Wrapped `std::io::Error`
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InferenceError {
    /// Whether the error was caused by the client rather than the server.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidUpload(_) | Self::UploadTooLarge(_))
    }
}

impl From<image::ImageError> for InferenceError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageError(err.to_string())
    }
}
