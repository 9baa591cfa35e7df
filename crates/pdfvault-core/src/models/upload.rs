//! Upload records and their request/response DTOs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Lifecycle of an upload.
///
/// `uploading -> processing -> completed`, with `failed` reachable from
/// `uploading` or `processing`. `completed` and `failed` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "upload_status", rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Uploading,
    Processing,
    Completed,
    Failed,
}

impl UploadStatus {
    /// Terminal states admit no further transitions except external deletion.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Failed)
    }
}

impl Display for UploadStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            UploadStatus::Uploading => write!(f, "uploading"),
            UploadStatus::Processing => write!(f, "processing"),
            UploadStatus::Completed => write!(f, "completed"),
            UploadStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for UploadStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploading" => Ok(UploadStatus::Uploading),
            "processing" => Ok(UploadStatus::Processing),
            "completed" => Ok(UploadStatus::Completed),
            "failed" => Ok(UploadStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid upload status: {}", s)),
        }
    }
}

/// One logical file upload, direct or chunked.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Upload {
    pub id: Uuid,
    pub user_id: Uuid,
    pub original_filename: String,
    /// Final artifact key in durable storage (`pdfs/{uuid}.pdf`).
    pub stored_key: String,
    /// Whole-file SHA-256, hex-encoded. Client-declared and verified, never trusted.
    pub content_hash: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub status: UploadStatus,
    pub is_chunked: bool,
    pub total_chunks: i32,
    /// Monotonically incremented as chunks arrive; never decremented.
    pub uploaded_chunks: i32,
    pub upload_session_id: Option<Uuid>,
    pub extracted_text: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Upload {
    pub fn is_completed(&self) -> bool {
        self.status == UploadStatus::Completed
    }

    pub fn is_failed(&self) -> bool {
        self.status == UploadStatus::Failed
    }

    /// Upload progress percentage, rounded to two decimals.
    pub fn progress(&self) -> f64 {
        if !self.is_chunked || self.total_chunks == 0 {
            return if self.is_completed() { 100.0 } else { 0.0 };
        }
        let ratio = self.uploaded_chunks as f64 / self.total_chunks as f64;
        (ratio * 100.0 * 100.0).round() / 100.0
    }
}

/// Request to begin an upload (direct or chunked).
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct NewUploadRequest {
    /// Original filename
    #[validate(length(
        min = 1,
        max = 255,
        message = "Filename must be between 1 and 255 characters"
    ))]
    pub filename: String,
    /// Declared file size in bytes
    #[validate(range(min = 1, message = "File size must be at least 1 byte"))]
    pub size_bytes: i64,
    /// Hex-encoded SHA-256 of the whole file
    #[validate(length(equal = 64, message = "content_hash must be a hex SHA-256 digest"))]
    pub content_hash: String,
    /// MIME type; defaults to application/pdf
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// Upload as returned by the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadResponse {
    pub id: Uuid,
    pub original_filename: String,
    pub content_hash: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub status: UploadStatus,
    pub is_chunked: bool,
    pub total_chunks: i32,
    pub uploaded_chunks: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_session_id: Option<Uuid>,
    /// Upload progress percentage (0-100)
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<Upload> for UploadResponse {
    fn from(upload: Upload) -> Self {
        let progress = upload.progress();
        Self {
            id: upload.id,
            original_filename: upload.original_filename,
            content_hash: upload.content_hash,
            size_bytes: upload.size_bytes,
            mime_type: upload.mime_type,
            status: upload.status,
            is_chunked: upload.is_chunked,
            total_chunks: upload.total_chunks,
            uploaded_chunks: upload.uploaded_chunks,
            upload_session_id: upload.upload_session_id,
            progress,
            metadata: upload.metadata,
            error_message: upload.error_message,
            completed_at: upload.completed_at,
            created_at: upload.created_at,
        }
    }
}

/// Response for a begun upload. `chunk_size_bytes` is present when the client
/// must continue with chunked submissions.
#[derive(Debug, Serialize, ToSchema)]
pub struct BeginUploadResponse {
    pub upload: UploadResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_size_bytes: Option<u64>,
}

/// Paginated upload listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadListResponse {
    pub uploads: Vec<UploadResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}
