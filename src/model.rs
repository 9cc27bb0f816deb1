// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Detector abstraction, the ONNX YOLO detector and lazy model loading.
//!
//! The service talks to any [`Detector`]. In production that is a
//! [`YoloDetector`] wrapping an ONNX Runtime session, held by a [`ModelHandle`]
//! which loads it at most once and retries on the next request if loading fails.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use image::DynamicImage;
use tokio::sync::OnceCell;
use tracing::info;

use crate::detection::RawDetection;
use crate::error::{InferenceError, Result};
use crate::inference::InferenceConfig;

#[cfg(feature = "onnx")]
pub use yolo::YoloDetector;

/// Anything that can turn an image into raw detections.
///
/// Implementations must be shareable across request handlers.
pub trait Detector: Send + Sync {
    /// Run detection on a decoded image.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying model fails.
    fn predict(&self, image: &DynamicImage) -> Result<Vec<RawDetection>>;
}

/// Blocking constructor for a detector.
pub type DetectorLoader = Arc<dyn Fn() -> Result<Arc<dyn Detector>> + Send + Sync>;

/// Build a loader for the ONNX detector at `path`.
#[must_use]
pub fn onnx_loader(path: PathBuf, config: InferenceConfig) -> DetectorLoader {
    Arc::new(move || {
        #[cfg(feature = "onnx")]
        {
            let detector: Arc<dyn Detector> = Arc::new(YoloDetector::load_with_config(&path, config.clone())?);
            Ok(detector)
        }
        #[cfg(not(feature = "onnx"))]
        {
            let _ = &config;
            Err(InferenceError::ModelLoadError(format!(
                "Cannot load {}: built without the `onnx` feature",
                path.display()
            )))
        }
    })
}

/// A detector that is loaded on first use.
///
/// Concurrent callers share a single load. A failed load leaves the handle
/// empty so the next call tries again. The load runs on its own task, so a
/// caller that gives up waiting does not let a second load start.
pub struct ModelHandle {
    path: PathBuf,
    loader: DetectorLoader,
    cell: Arc<OnceCell<Arc<dyn Detector>>>,
}

impl ModelHandle {
    /// Create a handle that calls `loader` on first use.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, loader: DetectorLoader) -> Self {
        Self {
            path: path.into(),
            loader,
            cell: Arc::new(OnceCell::new()),
        }
    }

    /// Create a handle for the ONNX model at `path`.
    #[must_use]
    pub fn onnx(path: impl Into<PathBuf>, config: InferenceConfig) -> Self {
        let path = path.into();
        let loader = onnx_loader(path.clone(), config);
        Self::new(path, loader)
    }

    /// Create a handle around an already constructed detector.
    #[must_use]
    pub fn preloaded(path: impl Into<PathBuf>, detector: Arc<dyn Detector>) -> Self {
        let path = path.into();
        let missing = path.display().to_string();
        Self {
            path,
            loader: Arc::new(move || {
                Err(InferenceError::ModelLoadError(format!("No loader for {missing}")))
            }),
            cell: Arc::new(OnceCell::new_with(Some(detector))),
        }
    }

    /// Get the detector, loading it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`InferenceError::ModelLoadError`] if loading fails.
    pub async fn get(&self) -> Result<Arc<dyn Detector>> {
        if let Some(detector) = self.cell.get() {
            return Ok(Arc::clone(detector));
        }

        // The init guard is held by this task, not by the caller's future
        let cell = Arc::clone(&self.cell);
        let loader = Arc::clone(&self.loader);
        let path = self.path.clone();
        tokio::spawn(async move {
            cell.get_or_try_init(|| load(loader, path))
                .await
                .map(Arc::clone)
        })
        .await
        .map_err(|e| InferenceError::ModelLoadError(format!("Model load task failed: {e}")))?
    }

    /// Whether the detector has been loaded.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// Configured model path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn load(loader: DetectorLoader, path: PathBuf) -> Result<Arc<dyn Detector>> {
    info!(path = %path.display(), "Loading model");
    let start = Instant::now();

    let detector = tokio::task::spawn_blocking(move || loader())
        .await
        .map_err(|e| InferenceError::ModelLoadError(format!("Model loader task failed: {e}")))??;

    info!(
        path = %path.display(),
        elapsed_ms = start.elapsed().as_millis(),
        "Model loaded"
    );
    Ok(detector)
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("path", &self.path)
            .field("loaded", &self.is_loaded())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "onnx")]
mod yolo {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use image::DynamicImage;
    use ndarray::Array4;
    use ort::session::builder::GraphOptimizationLevel;
    use ort::session::Session;
    use ort::value::TensorRef;
    use tracing::{debug, info};

    use super::Detector;
    use crate::detection::RawDetection;
    use crate::error::{InferenceError, Result};
    use crate::inference::InferenceConfig;
    use crate::metadata::{ModelMetadata, METADATA_KEYS};
    use crate::postprocessing::decode_detections;
    use crate::preprocessing::preprocess_image;

    /// YOLO detection model running on ONNX Runtime.
    pub struct YoloDetector {
        /// Runs need exclusive access to the session.
        session: Mutex<Session>,
        metadata: ModelMetadata,
        input_name: String,
        output_name: String,
        config: InferenceConfig,
        path: PathBuf,
    }

    impl YoloDetector {
        /// Load a model with the default configuration.
        ///
        /// # Errors
        ///
        /// Returns an error if the model file doesn't exist or can't be loaded.
        pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
            Self::load_with_config(path, InferenceConfig::default())
        }

        /// Load a model with custom configuration.
        ///
        /// Class names, input size and stride come from the ONNX custom
        /// metadata. The model is warmed up once before it is returned.
        ///
        /// # Errors
        ///
        /// Returns an error if the file is missing, the session cannot be
        /// created, or the model is not a detection model.
        pub fn load_with_config<P: AsRef<Path>>(path: P, config: InferenceConfig) -> Result<Self> {
            let path = path.as_ref();

            if !path.exists() {
                return Err(InferenceError::ModelLoadError(format!(
                    "Model file not found: {}",
                    path.display()
                )));
            }

            let session = Session::builder()
                .map_err(|e| InferenceError::ModelLoadError(format!("Failed to create session builder: {e}")))?
                .with_optimization_level(GraphOptimizationLevel::Level3)
                .map_err(|e| InferenceError::ModelLoadError(format!("Failed to set optimization level: {e}")))?
                .with_intra_threads(config.num_threads)
                .map_err(|e| InferenceError::ModelLoadError(format!("Failed to set intra-thread count: {e}")))?
                .commit_from_file(path)
                .map_err(|e| InferenceError::ModelLoadError(format!("Failed to load model: {e}")))?;

            let metadata = Self::extract_metadata(&session)?;
            if metadata.task != "detect" {
                return Err(InferenceError::ModelLoadError(format!(
                    "Expected a detection model, got task '{}'",
                    metadata.task
                )));
            }

            let input_name = session
                .inputs
                .first()
                .map_or_else(|| "images".to_string(), |i| i.name.clone());
            let output_name = session
                .outputs
                .first()
                .map(|o| o.name.clone())
                .ok_or_else(|| InferenceError::ModelLoadError("Model has no outputs".to_string()))?;

            let detector = Self {
                session: Mutex::new(session),
                metadata,
                input_name,
                output_name,
                config,
                path: path.to_path_buf(),
            };

            detector.warmup()?;
            info!(
                classes = detector.metadata.num_classes(),
                imgsz = ?detector.input_size(),
                "ONNX session ready"
            );
            Ok(detector)
        }

        /// Extract metadata from the ONNX model session.
        fn extract_metadata(session: &Session) -> Result<ModelMetadata> {
            let model_metadata = session
                .metadata()
                .map_err(|e| InferenceError::ModelLoadError(format!("Failed to get model metadata: {e}")))?;

            let entries: HashMap<String, String> = METADATA_KEYS
                .iter()
                .filter_map(|key| match model_metadata.custom(key) {
                    Ok(Some(value)) => Some(((*key).to_string(), value)),
                    _ => None,
                })
                .collect();

            ModelMetadata::from_entries(&entries)
        }

        /// Run one inference on zeros so the first request is not slowed down.
        fn warmup(&self) -> Result<()> {
            let (h, w) = self.input_size();
            let dummy = Array4::<f32>::zeros((1, 3, h, w));
            let _ = self.run_inference(&dummy)?;
            debug!("Warmup finished");
            Ok(())
        }

        /// Input size used for inference, (height, width).
        #[must_use]
        pub fn input_size(&self) -> (usize, usize) {
            self.config.imgsz.unwrap_or(self.metadata.imgsz)
        }

        fn run_inference(&self, input: &Array4<f32>) -> Result<(Vec<f32>, Vec<usize>)> {
            let input_contiguous = input.as_standard_layout();
            let input_tensor = TensorRef::from_array_view(&input_contiguous)
                .map_err(|e| InferenceError::InferenceError(format!("Failed to create input tensor: {e}")))?;

            let mut session = self
                .session
                .lock()
                .map_err(|_| InferenceError::InferenceError("ONNX session lock poisoned".to_string()))?;

            let outputs = session
                .run(ort::inputs![self.input_name.as_str() => input_tensor])
                .map_err(|e| InferenceError::InferenceError(format!("Inference failed: {e}")))?;

            let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
                InferenceError::InferenceError(format!("Output '{}' not found", self.output_name))
            })?;

            let (shape, data) = output
                .try_extract_tensor::<f32>()
                .map_err(|e| InferenceError::InferenceError(format!("Failed to extract output: {e}")))?;

            #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
            let shape_vec: Vec<usize> = shape.iter().map(|&d| d as usize).collect();
            Ok((data.to_vec(), shape_vec))
        }
    }

    impl Detector for YoloDetector {
        fn predict(&self, image: &DynamicImage) -> Result<Vec<RawDetection>> {
            let preprocess = preprocess_image(image, self.input_size());
            let (output, shape) = self.run_inference(&preprocess.tensor)?;
            Ok(decode_detections(
                &output,
                &shape,
                &preprocess,
                &self.config,
                &self.metadata.names,
            ))
        }
    }

    impl std::fmt::Debug for YoloDetector {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("YoloDetector")
                .field("path", &self.path)
                .field("num_classes", &self.metadata.num_classes())
                .field("imgsz", &self.input_size())
                .finish_non_exhaustive()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_model_not_found() {
            let result = YoloDetector::load("nonexistent.onnx");
            assert!(matches!(result, Err(InferenceError::ModelLoadError(_))));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct FixedDetector;

    impl Detector for FixedDetector {
        fn predict(&self, _image: &DynamicImage) -> Result<Vec<RawDetection>> {
            Ok(vec![RawDetection::new([0.0, 0.0, 1.0, 1.0], 0, 0.5)])
        }
    }

    fn counting_loader(calls: Arc<AtomicUsize>, fail_first: usize) -> DetectorLoader {
        Arc::new(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            if n < fail_first {
                return Err(InferenceError::ModelLoadError("not yet".to_string()));
            }
            let detector: Arc<dyn Detector> = Arc::new(FixedDetector);
            Ok(detector)
        })
    }

    #[tokio::test]
    async fn test_missing_model_file() {
        let handle = ModelHandle::onnx("/nonexistent/best.onnx", InferenceConfig::default());
        let err = handle.get().await.err();
        assert!(matches!(err, Some(InferenceError::ModelLoadError(_))));
        assert!(!handle.is_loaded());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_use_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = Arc::new(ModelHandle::new("stub", counting_loader(Arc::clone(&calls), 0)));
        assert!(!handle.is_loaded());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let handle = Arc::clone(&handle);
                tokio::spawn(async move { handle.get().await.is_ok() })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handle.is_loaded());
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = ModelHandle::new("stub", counting_loader(Arc::clone(&calls), 1));

        assert!(handle.get().await.is_err());
        assert!(!handle.is_loaded());

        let detector = handle.get().await.unwrap();
        assert_eq!(detector.predict(&DynamicImage::new_rgb8(1, 1)).unwrap().len(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(handle.is_loaded());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_abandoned_get_does_not_start_second_load() {
        let calls = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let loader: DetectorLoader = {
            let (calls, active, peak) = (Arc::clone(&calls), Arc::clone(&active), Arc::clone(&peak));
            Arc::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(300));
                active.fetch_sub(1, Ordering::SeqCst);
                let detector: Arc<dyn Detector> = Arc::new(FixedDetector);
                Ok(detector)
            })
        };
        let handle = ModelHandle::new("slow", loader);

        // The first caller gives up while the load is still running
        let abandoned = tokio::time::timeout(Duration::from_millis(50), handle.get()).await;
        assert!(abandoned.is_err());
        assert!(!handle.is_loaded());

        assert!(handle.get().await.is_ok());
        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handle.is_loaded());
    }

    #[tokio::test]
    async fn test_preloaded_handle() {
        let handle = ModelHandle::preloaded("memory", Arc::new(FixedDetector));
        assert!(handle.is_loaded());
        assert!(handle.get().await.is_ok());
        assert_eq!(handle.path(), Path::new("memory"));
    }
}
