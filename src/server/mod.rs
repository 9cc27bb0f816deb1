// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! HTTP API.
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /` | service status |
//! | `GET /health` | health check |
//! | `GET /info` | service configuration |
//! | `POST /predict` | caries detection on an uploaded image |
//! | `GET /api-docs/openapi.json` | `OpenAPI` document |

mod handlers;
mod response;
mod state;

use std::net::SocketAddr;

use axum::extract::DefaultBodyLimit;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use utoipa::OpenApi;

pub use handlers::UPLOAD_FIELD;
pub use response::{
    ClassProbabilityResponse, ErrorResponse, HealthResponse, InfoResponse, PredictResponse, RootResponse,
};
pub use state::AppState;

use crate::error::Result;

/// `OpenAPI` documentation for the service.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Dentalogic Inference Server",
        description = "Dental caries detection API. Upload an image to `/predict` to get D0-D6 grades, boxes and an annotated image.",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    paths(handlers::root, handlers::health, handlers::info, handlers::predict),
    components(schemas(
        crate::labels::Label,
        crate::detection::Detection,
        ClassProbabilityResponse,
        PredictResponse,
        ErrorResponse,
        RootResponse,
        HealthResponse,
        InfoResponse
    )),
    tags(
        (name = "inference", description = "Caries detection endpoints"),
        (name = "health", description = "Health check endpoints")
    )
)]
pub struct ApiDoc;

/// Network and startup settings for [`serve`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub addr: SocketAddr,
    /// Maximum request body size in bytes.
    pub max_upload_bytes: usize,
    /// Fail startup instead of warning when the model cannot be loaded.
    pub require_model: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 8000)),
            max_upload_bytes: 20 * 1024 * 1024,
            require_model: false,
        }
    }
}

/// Build the application router.
pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/info", get(handlers::info))
        .route("/predict", post(handlers::predict))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Load the model and serve the API until Ctrl+C.
///
/// The model load shares the handle's lazy cell with requests, so a request
/// arriving mid-load waits for it instead of loading a second copy.
///
/// # Errors
///
/// Returns an error if the address cannot be bound, or if `require_model` is
/// set and the model fails to load.
pub async fn serve(state: AppState, config: &ServerConfig) -> Result<()> {
    if config.require_model {
        state.model.get().await?;
    } else {
        let model = state.model.clone();
        tokio::spawn(async move {
            if let Err(e) = model.get().await {
                warn!("Model not loaded at startup, will retry on first request: {e}");
            }
        });
    }

    let app = router(state, config.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
