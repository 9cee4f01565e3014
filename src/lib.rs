pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::ServerConfig;
use crate::services::upload_service::UploadService;
use axum::{
    Router,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::upload::upload_files,
        api::handlers::files::download_file,
        api::handlers::files::file_data,
        api::handlers::files::list_files,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::upload::UploadedFile,
            api::handlers::files::FileDataResponse,
            api::handlers::files::ListEntry,
            api::handlers::health::HealthResponse,
        )
    ),
    tags(
        (name = "files", description = "Upload, download and metadata endpoints"),
        (name = "system", description = "Health and diagnostics")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub uploads: Arc<UploadService>,
    pub config: ServerConfig,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/file/:app/*rest", get(api::handlers::files::download_file))
        .route("/data/:app/*rest", get(api::handlers::files::file_data))
        .route("/list/:app/*key", get(api::handlers::files::list_files))
        .route("/:app", post(api::handlers::upload::missing_key))
        .route("/:app/*key", post(api::handlers::upload::upload_files))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .layer(axum::extract::DefaultBodyLimit::max(
            // multipart overhead headroom
            state.config.max_file_size.saturating_add(10 * 1024 * 1024),
        ))
        .with_state(state)
}
