//! Domain models shared across Pdfvault components.

pub mod chunk;
pub mod quota;
pub mod task;
pub mod upload;

pub use chunk::{Chunk, ChunkResponse, ChunkStatus, SubmitChunkResponse};
pub use quota::{QuotaResponse, UploadStats, UserQuota};
pub use task::{
    AssembleUploadPayload, Priority, ProcessDocumentPayload, Task, TaskPayload, TaskStatus,
    TaskType,
};
pub use upload::{
    BeginUploadResponse, NewUploadRequest, Upload, UploadListResponse, UploadResponse,
    UploadStatus,
};

/// Bytes rendered as MB with two decimals, as exposed by the quota endpoints.
pub fn bytes_to_mb(bytes: i64) -> f64 {
    ((bytes as f64 / crate::constants::BYTES_PER_MB as f64) * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_to_mb_rounds_to_two_decimals() {
        assert_eq!(bytes_to_mb(104_857_600), 100.0);
        assert_eq!(bytes_to_mb(1_572_864), 1.5);
        assert_eq!(bytes_to_mb(0), 0.0);
    }
}
