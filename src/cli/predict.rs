// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use anyhow::{Context, Result};
use tracing::info;

use crate::annotate::LabelFont;
use crate::cli::args::PredictArgs;
use crate::io::save_jpeg;
use crate::model::onnx_loader;
use crate::pipeline::run_prediction;
use crate::server::PredictResponse;

/// Run detection on a single image and print the response JSON.
///
/// Blocks for the whole model load and inference.
///
/// # Errors
///
/// Returns an error if the model or image cannot be loaded, inference fails,
/// or the annotated image cannot be written.
pub fn run(args: &PredictArgs) -> Result<()> {
    let common = &args.common;

    let image = image::open(&args.source)
        .with_context(|| format!("Failed to read image {}", args.source.display()))?;

    let loader = onnx_loader(common.model.clone(), common.inference_config());
    let detector = loader().with_context(|| format!("Failed to load model {}", common.model.display()))?;
    let font = LabelFont::load(&common.font_config());

    let prediction = run_prediction(detector.as_ref(), &image, &common.postprocess_config(), &font)?;

    if let Some(path) = &args.save {
        save_jpeg(&prediction.annotated, path)?;
        info!("Annotated image saved to {}", path.display());
    }

    let response = if args.include_image {
        PredictResponse::from_prediction(&prediction)?
    } else {
        PredictResponse::from_result(&prediction.result, String::new())
    };
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}
