//! Upload endpoints: intake, chunk submission, listing, detail, deletion.
//!
//! Intake and chunk submission are multipart: metadata fields plus an
//! optional/required file part. Everything of substance happens in
//! `UploadService`; these handlers only parse, validate, and shape responses.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use pdfvault_core::models::{
    BeginUploadResponse, ChunkResponse, NewUploadRequest, SubmitChunkResponse, UploadListResponse,
    UploadResponse,
};
use pdfvault_core::AppError;
use pdfvault_services::BeginUploadOutcome;
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::auth::UserContext;
use crate::error::{ErrorResponse, HttpAppError};
use crate::state::AppState;

/// Upload with its chunk records.
#[derive(Debug, serde::Serialize, ToSchema)]
pub struct UploadDetailResponse {
    pub upload: UploadResponse,
    pub chunks: Vec<ChunkResponse>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Begin an upload.
///
/// Multipart fields: `filename`, `size_bytes`, `content_hash` (hex SHA-256),
/// optional `mime_type`, and a `file` part (required for files at or below
/// the chunk size, rejected above it).
#[utoipa::path(
    post,
    path = "/api/v1/uploads",
    tag = "uploads",
    responses(
        (status = 201, description = "File stored and queued for processing", body = BeginUploadResponse),
        (status = 202, description = "Chunked upload initialized; submit chunks next", body = BeginUploadResponse),
        (status = 400, description = "Invalid input", body = ErrorResponse),
        (status = 403, description = "Storage quota exceeded", body = ErrorResponse),
        (status = 409, description = "File already uploaded", body = ErrorResponse),
        (status = 413, description = "File too large", body = ErrorResponse)
    )
)]
pub async fn begin_upload(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpAppError> {
    let mut fields = UploadFields::default();
    fields.collect(multipart).await?;

    let request = NewUploadRequest {
        filename: fields.text("filename")?,
        size_bytes: fields.text("size_bytes")?.parse().map_err(|_| {
            AppError::InvalidInput("size_bytes must be an integer".to_string())
        })?,
        content_hash: fields.text("content_hash")?,
        mime_type: fields.optional_text("mime_type"),
    };
    request.validate().map_err(HttpAppError::from)?;

    let outcome = state
        .uploads
        .begin_upload(user.user_id, request, fields.file.take())
        .await?;

    let response = match outcome {
        BeginUploadOutcome::Direct(upload) => (
            StatusCode::CREATED,
            Json(BeginUploadResponse {
                upload: upload.into(),
                chunk_size_bytes: None,
            }),
        ),
        BeginUploadOutcome::Chunked {
            upload,
            chunk_size_bytes,
        } => (
            StatusCode::ACCEPTED,
            Json(BeginUploadResponse {
                upload: upload.into(),
                chunk_size_bytes: Some(chunk_size_bytes),
            }),
        ),
    };

    Ok(response)
}

/// Submit one chunk of a chunked upload.
///
/// Multipart fields: `chunk_number` (1-based), `chunk_hash` (hex SHA-256 of
/// the chunk payload), and the `chunk` file part.
#[utoipa::path(
    post,
    path = "/api/v1/uploads/{upload_id}/chunks",
    tag = "uploads",
    params(("upload_id" = Uuid, Path, description = "Upload ID")),
    responses(
        (status = 201, description = "Chunk stored", body = SubmitChunkResponse),
        (status = 400, description = "Invalid chunk number or hash mismatch", body = ErrorResponse),
        (status = 403, description = "Upload belongs to a different user", body = ErrorResponse),
        (status = 404, description = "Upload not found", body = ErrorResponse),
        (status = 409, description = "Chunk already uploaded", body = ErrorResponse)
    )
)]
pub async fn submit_chunk(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpAppError> {
    let mut fields = UploadFields::default();
    fields.collect(multipart).await?;

    let chunk_number: i32 = fields.text("chunk_number")?.parse().map_err(|_| {
        AppError::InvalidInput("chunk_number must be an integer".to_string())
    })?;
    let chunk_hash = fields.text("chunk_hash")?;
    let data = fields
        .file
        .take()
        .ok_or_else(|| AppError::InvalidInput("Missing chunk payload".to_string()))?;

    let response = state
        .uploads
        .submit_chunk(user.user_id, upload_id, chunk_number, &chunk_hash, data)
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// List the user's uploads, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/uploads",
    tag = "uploads",
    params(
        ("limit" = Option<i64>, Query, description = "Page size (max 100)"),
        ("offset" = Option<i64>, Query, description = "Offset into the listing")
    ),
    responses(
        (status = 200, description = "Uploads", body = UploadListResponse)
    )
)]
pub async fn list_uploads(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<impl IntoResponse, HttpAppError> {
    let limit = query
        .limit
        .unwrap_or(crate::constants::DEFAULT_PAGE_SIZE)
        .clamp(1, crate::constants::MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0).max(0);

    let (uploads, total) = state.uploads.list_uploads(user.user_id, limit, offset).await?;

    Ok(Json(UploadListResponse {
        uploads: uploads.into_iter().map(UploadResponse::from).collect(),
        total,
        limit,
        offset,
    }))
}

/// Fetch one upload with its chunk records.
#[utoipa::path(
    get,
    path = "/api/v1/uploads/{upload_id}",
    tag = "uploads",
    params(("upload_id" = Uuid, Path, description = "Upload ID")),
    responses(
        (status = 200, description = "Upload detail", body = UploadDetailResponse),
        (status = 403, description = "Upload belongs to a different user", body = ErrorResponse),
        (status = 404, description = "Upload not found", body = ErrorResponse)
    )
)]
pub async fn get_upload(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    let (upload, chunks) = state.uploads.get_upload(user.user_id, upload_id).await?;

    Ok(Json(UploadDetailResponse {
        upload: upload.into(),
        chunks: chunks.into_iter().map(ChunkResponse::from).collect(),
    }))
}

/// Delete an upload, releasing quota iff it was completed.
#[utoipa::path(
    delete,
    path = "/api/v1/uploads/{upload_id}",
    tag = "uploads",
    params(("upload_id" = Uuid, Path, description = "Upload ID")),
    responses(
        (status = 204, description = "Upload deleted"),
        (status = 403, description = "Upload belongs to a different user", body = ErrorResponse),
        (status = 404, description = "Upload not found", body = ErrorResponse)
    )
)]
pub async fn delete_upload(
    user: UserContext,
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpAppError> {
    state.uploads.delete_upload(user.user_id, upload_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Collected multipart fields. Text fields are stored by name; the single
/// file part (named `file` or `chunk`) lands in `file`.
#[derive(Default)]
struct UploadFields {
    texts: std::collections::HashMap<String, String>,
    file: Option<Bytes>,
}

impl UploadFields {
    async fn collect(&mut self, mut multipart: Multipart) -> Result<(), HttpAppError> {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::InvalidInput(format!("Malformed multipart body: {}", e)))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match name.as_str() {
                "file" | "chunk" => {
                    let bytes = field.bytes().await.map_err(|e| {
                        AppError::InvalidInput(format!("Failed to read file part: {}", e))
                    })?;
                    self.file = Some(bytes);
                }
                _ => {
                    let value = field.text().await.map_err(|e| {
                        AppError::InvalidInput(format!("Failed to read field {}: {}", name, e))
                    })?;
                    self.texts.insert(name, value);
                }
            }
        }
        Ok(())
    }

    fn text(&self, name: &str) -> Result<String, HttpAppError> {
        self.texts
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::InvalidInput(format!("Missing field: {}", name)).into())
    }

    fn optional_text(&self, name: &str) -> Option<String> {
        self.texts.get(name).cloned()
    }
}
