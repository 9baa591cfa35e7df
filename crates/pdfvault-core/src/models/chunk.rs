//! Chunk records for chunked uploads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle of a single chunk. A row is created as a `pending` claim when a
/// submission wins the uniqueness race, moves to `uploaded` once the bytes are
/// persisted, and to `processed` after successful reassembly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "chunk_status", rename_all = "lowercase")]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Pending,
    Uploaded,
    Processed,
    Failed,
}

impl Display for ChunkStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            ChunkStatus::Pending => write!(f, "pending"),
            ChunkStatus::Uploaded => write!(f, "uploaded"),
            ChunkStatus::Processed => write!(f, "processed"),
            ChunkStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for ChunkStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ChunkStatus::Pending),
            "uploaded" => Ok(ChunkStatus::Uploaded),
            "processed" => Ok(ChunkStatus::Processed),
            "failed" => Ok(ChunkStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid chunk status: {}", s)),
        }
    }
}

/// One chunk of a chunked upload. At most one row exists per
/// (upload_id, chunk_number); duplicates are rejected, not overwritten.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Chunk {
    pub id: Uuid,
    pub upload_id: Uuid,
    /// 1-based position within the upload.
    pub chunk_number: i32,
    pub size_bytes: i64,
    /// Hex-encoded SHA-256 of the chunk payload.
    pub content_hash: String,
    /// Transient storage key (`chunks/{session}/chunk_{n}`); bytes are deleted
    /// once reassembly succeeds.
    pub stored_key: String,
    pub status: ChunkStatus,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Chunk as returned by the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct ChunkResponse {
    pub id: Uuid,
    pub chunk_number: i32,
    pub size_bytes: i64,
    pub status: ChunkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
}

impl From<Chunk> for ChunkResponse {
    fn from(chunk: Chunk) -> Self {
        Self {
            id: chunk.id,
            chunk_number: chunk.chunk_number,
            size_bytes: chunk.size_bytes,
            status: chunk.status,
            uploaded_at: chunk.uploaded_at,
        }
    }
}

/// Response after a successful chunk submission.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitChunkResponse {
    pub chunk: ChunkResponse,
    pub uploaded_chunks: i32,
    pub total_chunks: i32,
    /// Upload progress percentage (0-100)
    pub progress: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_and_parse() {
        for status in [
            ChunkStatus::Pending,
            ChunkStatus::Uploaded,
            ChunkStatus::Processed,
            ChunkStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<ChunkStatus>().unwrap(), status);
        }
        assert!("completed".parse::<ChunkStatus>().is_err());
    }
}
