//! Router construction.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::{Json, Router};
use http::header::HeaderValue;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::api_doc::ApiDoc;
use crate::constants::API_PREFIX;
use crate::handlers::{health, quota, uploads};
use crate::state::AppState;

/// Build the application router with all routes and layers.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = cors_layer(&state.config.cors_origins);
    // Chunk submissions carry up to one chunk plus multipart framing; direct
    // uploads up to the chunk size threshold.
    let body_limit = state.config.chunk_size_bytes as usize + 1024 * 1024;

    let api = Router::new()
        .route(
            "/uploads",
            post(uploads::begin_upload).get(uploads::list_uploads),
        )
        .route(
            "/uploads/{upload_id}",
            get(uploads::get_upload).delete(uploads::delete_upload),
        )
        .route("/uploads/{upload_id}/chunks", post(uploads::submit_chunk))
        .route("/quota", get(quota::get_quota))
        .route("/quota/stats", get(quota::upload_stats));

    Router::new()
        .route("/health", get(health::health))
        .route(
            "/api-docs/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .nest(API_PREFIX, api)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(parsed))
        .allow_methods(tower_http::cors::Any)
        .allow_headers(tower_http::cors::Any)
}
