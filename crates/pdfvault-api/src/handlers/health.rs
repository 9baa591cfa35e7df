use axum::{response::IntoResponse, Json};
use serde_json::json;

/// Liveness probe.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
