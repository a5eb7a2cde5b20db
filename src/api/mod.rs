pub mod error;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::shared::state::AppState;

pub use error::ApiError;
pub use handlers::*;

pub fn configure_api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/api/cross_db", post(handle_cross_db))
        .route("/api/health", get(handle_health))
        .route("/api/switch_db", post(handle_switch_db))
        .route("/api/test_db_connections", get(handle_test_db_connections))
        .route("/api/models/status", get(handle_models_status))
        .route("/api/models/switch", post(handle_models_switch))
}

/// API routes plus the static frontend, with tracing and CORS.
pub fn create_router(state: Arc<AppState>, static_dir: &str) -> Router {
    Router::new()
        .merge(configure_api_routes().with_state(state))
        .route_service("/", ServeFile::new(Path::new(static_dir).join("index.html")))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
