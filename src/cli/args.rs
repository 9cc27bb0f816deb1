// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::annotate::FontConfig;
use crate::inference::{InferenceConfig, PostprocessConfig};
use crate::server::ServerConfig;

/// Default model location, relative to the working directory.
pub const DEFAULT_MODEL: &str = "model/best.onnx";

/// CLI arguments parser.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = r#"Examples:
    dentalogic-inference serve --model model/best.onnx --port 8000
    dentalogic-inference predict --model model/best.onnx --source xray.jpg --save annotated.jpg
    RUST_LOG=debug dentalogic-inference serve"#)]
pub struct Cli {
    #[command(subcommand)]
    /// Subcommand to execute.
    pub command: Commands,

    /// Default log level, overridden by `RUST_LOG`
    #[arg(
        long,
        global = true,
        default_value = "info",
        value_parser = ["error", "warn", "info", "debug", "trace"]
    )]
    pub log_level: String,
}

/// Commands for the CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API
    Serve(ServeArgs),
    /// Run detection on one image and print the result as JSON
    Predict(PredictArgs),
}

/// Model, threshold and font options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Path to ONNX model file
    #[arg(short, long, env = "MODEL_PATH", default_value = DEFAULT_MODEL)]
    pub model: PathBuf,

    /// Model confidence threshold
    #[arg(long, default_value_t = 0.25, value_parser = parse_fraction)]
    pub conf: f64,

    /// `IoU` threshold for the model's per-class NMS
    #[arg(long, default_value_t = 0.5, value_parser = parse_fraction)]
    pub iou: f64,

    /// `IoU` threshold for the class-agnostic NMS applied to every result
    #[arg(long, default_value_t = 0.5, value_parser = parse_fraction)]
    pub nms_iou: f64,

    /// Drop detections below this confidence (0.0 - 1.0)
    #[arg(long, default_value_t = 0.25, value_parser = parse_fraction)]
    pub min_confidence: f64,

    /// Inference image size, defaults to the model's own
    #[arg(long)]
    pub imgsz: Option<usize>,

    /// ONNX Runtime intra-op threads, 0 for automatic
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    /// Preferred label font
    #[arg(long, env = "FONT_PATH")]
    pub font: Option<PathBuf>,

    /// Label font used when the preferred one is unusable
    #[arg(long, env = "FALLBACK_FONT_PATH")]
    pub fallback_font: Option<PathBuf>,
}

impl ModelArgs {
    /// Detector configuration.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn inference_config(&self) -> InferenceConfig {
        let config = InferenceConfig::new()
            .with_confidence(self.conf as f32)
            .with_iou(self.iou as f32)
            .with_threads(self.threads);
        match self.imgsz {
            Some(sz) => config.with_imgsz(sz, sz),
            None => config,
        }
    }

    /// Service-side filtering configuration.
    #[must_use]
    pub fn postprocess_config(&self) -> PostprocessConfig {
        PostprocessConfig::default()
            .with_min_confidence(self.min_confidence)
            .with_nms_iou(self.nms_iou)
    }

    /// Font search configuration.
    #[must_use]
    pub fn font_config(&self) -> FontConfig {
        let defaults = FontConfig::default();
        FontConfig {
            primary: self.font.clone().unwrap_or(defaults.primary),
            fallback: self.fallback_font.clone().unwrap_or(defaults.fallback),
            basic_candidates: defaults.basic_candidates,
        }
    }
}

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    /// Model options.
    pub common: ModelArgs,

    /// Bind address
    #[arg(long, env = "HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Bind port
    #[arg(short, long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Maximum upload size in megabytes
    #[arg(long, default_value_t = 20)]
    pub max_upload_mb: usize,

    /// Exit if the model cannot be loaded at startup instead of retrying on the first request
    #[arg(long, default_value_t = false)]
    pub require_model: bool,
}

impl ServeArgs {
    /// Server configuration.
    #[must_use]
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            addr: SocketAddr::new(self.host, self.port),
            max_upload_bytes: self.max_upload_mb.saturating_mul(1024 * 1024),
            require_model: self.require_model,
        }
    }
}

/// Arguments for the predict command.
#[derive(Args, Debug)]
pub struct PredictArgs {
    #[command(flatten)]
    /// Model options.
    pub common: ModelArgs,

    /// Input image
    #[arg(short, long)]
    pub source: PathBuf,

    /// Write the annotated image to this path
    #[arg(long)]
    pub save: Option<PathBuf>,

    /// Include the annotated image data URI in the printed JSON
    #[arg(long, default_value_t = false)]
    pub include_image: bool,
}

fn parse_fraction(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|_| format!("'{s}' is not a number"))?;
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(format!("{value} is not between 0.0 and 1.0"))
    }
}
