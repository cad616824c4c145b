//! HTTP API.
//!
//! Routes:
//! - `GET /health` (public)
//! - `GET /` index of resource collections
//! - `/tasks/`, `/comments/`, `/files/` and their `/{id}/` item routes
//! - `GET /media/task_files/{name}` stored upload bytes
//!
//! Everything except `/health` requires a token.

pub mod auth;
pub mod comments;
pub mod extract;
pub mod files;
pub mod resource;
pub mod tasks;

use axum::extract::DefaultBodyLimit;
use axum::http::Method;
use axum::middleware::from_fn_with_state;
use axum::response::Json;
use axum::Router;
use axum::routing::get;
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::db::Database;
use crate::error::ApiError;
use crate::media::MediaStore;
use crate::query::DEFAULT_PAGE_SIZE;
use comments::CommentResource;
use files::FileResource;
use resource::{Resource, collection_path, resource_routes};
use tasks::TaskResource;

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub media: Arc<MediaStore>,
    /// Results per list page.
    pub page_size: u64,
}

impl AppState {
    pub fn new(db: Arc<Database>, media: Arc<MediaStore>) -> Self {
        Self {
            db,
            media,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Index of the resource collections.
async fn api_root() -> Json<Value> {
    Json(json!({
        (TaskResource::NAME): collection_path::<TaskResource>(),
        (CommentResource::NAME): collection_path::<CommentResource>(),
        (FileResource::NAME): collection_path::<FileResource>(),
    }))
}

pub(crate) async fn method_not_allowed(method: Method) -> ApiError {
    ApiError::MethodNotAllowed(method)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Build the application router.
pub fn router(state: AppState, server: &ServerConfig) -> Router {
    let protected = Router::new()
        .route("/", get(api_root).fallback(method_not_allowed))
        .merge(resource_routes::<TaskResource>())
        .merge(resource_routes::<CommentResource>())
        .merge(resource_routes::<FileResource>())
        .route(
            "/media/task_files/{name}",
            get(files::download).fallback(method_not_allowed),
        )
        .route_layer(from_fn_with_state(state.clone(), auth::require_token));

    let mut app = Router::new()
        .route("/health", get(health))
        .merge(protected)
        .fallback(not_found)
        .layer(DefaultBodyLimit::max(server.max_upload_bytes));

    if server.cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app.layer(TraceLayer::new_for_http()).with_state(state)
}
