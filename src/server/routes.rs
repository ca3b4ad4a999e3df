//! Axum router configuration for the gallery server

use crate::server::handlers::{self, SharedGallery};
use axum::{
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Create the main application router
pub fn create_router(state: SharedGallery) -> Router {
    Router::new()
        // Single page UI
        .route("/", get(handlers::index))
        // JSON API
        .route("/api/images", get(handlers::list_images))
        .route("/api/mark", post(handlers::mark))
        .route("/api/rename", post(handlers::rename))
        .route("/api/convert", post(handlers::convert))
        // Raw image bytes
        .route("/img/:name", get(handlers::image))
        .fallback(handlers::not_found)
        .with_state(state)
        // Folder contents change under the client, never let it cache
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(TraceLayer::new_for_http())
}
