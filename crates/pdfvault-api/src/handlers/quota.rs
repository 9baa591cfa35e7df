//! Quota inspection endpoints.

use axum::{extract::State, response::IntoResponse, Json};
use pdfvault_core::models::{QuotaResponse, UploadStats};
use std::sync::Arc;

use crate::auth::UserContext;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

/// The acting user's storage quota and usage figures.
#[utoipa::path(
    get,
    path = "/api/v1/quota",
    tag = "quota",
    responses(
        (status = 200, description = "Quota and usage", body = QuotaResponse),
        (status = 401, description = "Missing user context", body = ErrorResponse)
    )
)]
pub async fn get_quota(
    user: UserContext,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpAppError> {
    let usage = state.quota.usage(user.user_id).await?;
    Ok(Json(usage))
}

/// Per-user upload counters.
#[utoipa::path(
    get,
    path = "/api/v1/quota/stats",
    tag = "quota",
    responses(
        (status = 200, description = "Upload statistics", body = UploadStats),
        (status = 401, description = "Missing user context", body = ErrorResponse)
    )
)]
pub async fn upload_stats(
    user: UserContext,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, HttpAppError> {
    let stats = state.quota.upload_stats(user.user_id).await?;
    Ok(Json(stats))
}
