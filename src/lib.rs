pub mod api;
pub mod client;
pub mod config;
pub mod models;
pub mod server;
pub mod services;
pub mod utils;

use crate::api::handlers;
use crate::config::ServerConfig;
use crate::services::codec::{Codec, ZlibCodec};
use crate::services::receiver::ReceiverService;
use crate::services::registry::TransferRegistry;
use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;

pub use crate::client::{Sender, send_batch, send_file};
pub use crate::server::serve;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::upload::upload,
        handlers::status::transfer_status,
    ),
    components(
        schemas(
            models::HealthResponse,
            models::UploadResponse,
            models::TransferRecord,
            models::TransferState,
            models::ErrorDetail,
            models::ErrorKind,
            models::Format,
        )
    ),
    tags(
        (name = "system", description = "Service endpoints"),
        (name = "transfers", description = "Upload and status endpoints")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TransferRegistry>,
    pub receiver: Arc<ReceiverService>,
    pub config: ServerConfig,
}

impl AppState {
    /// Builds the receiver with the zlib codec and a fresh registry,
    /// creating `output_dir` if needed.
    pub fn new(config: ServerConfig) -> std::io::Result<Self> {
        Self::with_codec(config, Arc::new(ZlibCodec::default()))
    }

    pub fn with_codec(config: ServerConfig, codec: Arc<dyn Codec>) -> std::io::Result<Self> {
        std::fs::create_dir_all(&config.output_dir)?;
        let registry = Arc::new(TransferRegistry::new());
        let receiver = Arc::new(ReceiverService::new(&config, registry.clone(), codec));

        Ok(Self {
            registry,
            receiver,
            config,
        })
    }
}

pub fn create_app(state: AppState) -> Router {
    let v1 = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route(
            "/upload",
            post(handlers::upload::upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/transfer/:id/status", get(handlers::status::transfer_status))
        .route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }));

    Router::new().nest("/v1", v1).with_state(state)
}
