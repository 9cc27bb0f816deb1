// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use dentalogic_inference::cli::args::{Cli, Commands, ServeArgs};
use dentalogic_inference::cli::logging::init_tracing;
use dentalogic_inference::cli::predict;
use dentalogic_inference::server::{self, AppState};
use dentalogic_inference::{LabelFont, ModelHandle, VERSION};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_tracing(&cli.log_level) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    let result = match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Predict(args) => tokio::task::spawn_blocking(move || predict::run(&args))
            .await
            .context("Prediction task failed")
            .and_then(|r| r),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    info!("Dentalogic inference server v{VERSION}");

    let font = LabelFont::load(&args.common.font_config());
    let model = ModelHandle::onnx(args.common.model.clone(), args.common.inference_config());
    let state = AppState::new(model, font).with_postprocess(args.common.postprocess_config());

    server::serve(state, &args.server_config()).await?;
    Ok(())
}
