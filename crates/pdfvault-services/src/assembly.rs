//! Reassembly engine for chunked uploads.
//!
//! Streams uploaded chunks in order into a staging file while tracking a
//! running byte count and SHA-256, verifies both against the upload's
//! declared values, then promotes the artifact to its final key. Peak memory
//! is one stream buffer regardless of file size.
//!
//! Re-entry is idempotent: the `uploading -> processing` compare-and-set
//! decides the winner of a duplicate dispatch, and a task redelivered after
//! completion finds a terminal status and backs off. Transient IO failures
//! surface as errors so the task queue can retry the whole run; verification
//! failures are terminal and leave chunk bytes in place for diagnosis.

use futures::StreamExt;
use pdfvault_core::models::{
    Chunk, Priority, ProcessDocumentPayload, Task, TaskType, Upload, UploadStatus,
};
use pdfvault_core::AppError;
use pdfvault_db::{ChunkRepository, UploadRepository};
use pdfvault_storage::{keys, Storage};
use pdfvault_worker::TaskQueue;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::retry::retry_io;

#[derive(Clone)]
pub struct AssemblyService {
    uploads: UploadRepository,
    chunks: ChunkRepository,
    storage: Arc<dyn Storage>,
    queue: TaskQueue,
    work_dir: PathBuf,
    io_retry_attempts: u32,
    io_retry_backoff_ms: u64,
}

impl AssemblyService {
    pub fn new(
        uploads: UploadRepository,
        chunks: ChunkRepository,
        storage: Arc<dyn Storage>,
        queue: TaskQueue,
        work_dir: PathBuf,
        io_retry_attempts: u32,
        io_retry_backoff_ms: u64,
    ) -> Self {
        Self {
            uploads,
            chunks,
            storage,
            queue,
            work_dir,
            io_retry_attempts,
            io_retry_backoff_ms,
        }
    }

    /// Reassemble a chunked upload. No-op for uploads already past
    /// `uploading`.
    pub async fn assemble(&self, upload_id: Uuid) -> Result<(), AppError> {
        let upload = self
            .uploads
            .get_by_id(upload_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Upload not found: {}", upload_id)))?;

        if !upload.is_chunked {
            return Err(AppError::BadRequest(format!(
                "Upload {} is not chunked",
                upload_id
            )));
        }

        match upload.status {
            UploadStatus::Uploading => {}
            UploadStatus::Processing | UploadStatus::Completed => {
                tracing::info!(
                    upload_id = %upload_id,
                    status = %upload.status,
                    "Reassembly already done, nothing to do"
                );
                return Ok(());
            }
            UploadStatus::Failed => {
                tracing::warn!(upload_id = %upload_id, "Ignoring reassembly of a failed upload");
                return Ok(());
            }
        }

        let upload_session_id = upload.upload_session_id.ok_or_else(|| {
            AppError::Internal(format!("Chunked upload {} has no session id", upload_id))
        })?;

        let chunks = self.chunks.list_uploaded(upload_id).await?;
        if chunks.len() as i32 != upload.total_chunks {
            let err = AppError::IncompleteChunks {
                expected: upload.total_chunks,
                found: chunks.len() as i32,
            };
            self.uploads.mark_failed(upload_id, &err.to_string()).await?;
            return Err(err);
        }

        fs::create_dir_all(&self.work_dir).await?;
        let staging = self
            .work_dir
            .join(format!("merged_{}_{}", upload_session_id, Uuid::new_v4()));

        let start = std::time::Instant::now();
        let merged = self.merge_chunks(&upload, &chunks, &staging).await;

        let (total_bytes, digest) = match merged {
            Ok(result) => result,
            Err(e) => {
                remove_staging(&staging).await;
                return Err(e);
            }
        };

        // Whole-file verification. Failures are terminal and keep the chunk
        // bytes around for diagnosis.
        if total_bytes != upload.size_bytes as u64 {
            let err = AppError::SizeMismatch {
                expected: upload.size_bytes,
                actual: total_bytes as i64,
            };
            self.uploads.mark_failed(upload_id, &err.to_string()).await?;
            remove_staging(&staging).await;
            return Err(err);
        }
        if digest != upload.content_hash {
            let err = AppError::IntegrityMismatch {
                expected: upload.content_hash.clone(),
                actual: digest,
            };
            self.uploads.mark_failed(upload_id, &err.to_string()).await?;
            remove_staging(&staging).await;
            return Err(err);
        }

        // Promote the verified artifact to its final key. The backend makes
        // the object visible atomically, so a crash here leaves either no
        // artifact or a complete one.
        let put_result = retry_io(
            self.io_retry_attempts,
            self.io_retry_backoff_ms,
            "promote artifact",
            || {
                let storage = self.storage.clone();
                let key = upload.stored_key.clone();
                let mime = upload.mime_type.clone();
                let path = staging.clone();
                async move { storage.put_file(&key, &path, &mime).await }
            },
        )
        .await;

        if let Err(e) = put_result {
            remove_staging(&staging).await;
            return Err(AppError::Storage(format!(
                "Failed to promote assembled artifact: {}",
                e
            )));
        }

        // Exactly one assembler wins this transition; losers of a duplicate
        // dispatch clean up their staging copy and stop.
        if !self.uploads.begin_processing(upload_id).await? {
            tracing::info!(
                upload_id = %upload_id,
                "Another reassembly run already promoted this upload"
            );
            remove_staging(&staging).await;
            return Ok(());
        }

        if let Err(e) = self.chunks.mark_all_processed(upload_id).await {
            let message = format!("Failed to mark chunks processed: {}", e);
            self.uploads.mark_failed(upload_id, &message).await?;
            remove_staging(&staging).await;
            return Err(e);
        }

        // Release chunk storage; the working area is gone once this succeeds.
        for chunk in &chunks {
            if let Err(e) = self.storage.delete(&chunk.stored_key).await {
                tracing::warn!(
                    error = %e,
                    storage_key = %chunk.stored_key,
                    "Failed to delete chunk during cleanup"
                );
            }
        }
        if let Err(e) = self
            .storage
            .delete_prefix(&keys::session_prefix(upload_session_id))
            .await
        {
            tracing::warn!(
                error = %e,
                upload_session_id = %upload_session_id,
                "Failed to delete chunk working area"
            );
        }
        remove_staging(&staging).await;

        let payload = Task::payload_from(&ProcessDocumentPayload { upload_id });
        if let Err(e) = self
            .queue
            .submit_task(TaskType::ProcessDocument, payload, Priority::Normal, None)
            .await
        {
            tracing::error!(error = %e, upload_id = %upload_id, "Failed to dispatch processing");
            let message = "Failed to schedule document processing".to_string();
            self.uploads.mark_failed(upload_id, &message).await?;
            return Err(AppError::Internal(message));
        }

        tracing::info!(
            upload_id = %upload_id,
            total_bytes = total_bytes,
            parts = chunks.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Upload reassembled and handed to processing"
        );

        Ok(())
    }

    /// Stream chunks in ascending chunk-number order into `staging`,
    /// returning the byte count and hex digest of the concatenation.
    async fn merge_chunks(
        &self,
        upload: &Upload,
        chunks: &[Chunk],
        staging: &Path,
    ) -> Result<(u64, String), AppError> {
        let mut file = fs::File::create(staging).await?;
        let mut hasher = Sha256::new();
        let mut total_bytes: u64 = 0;

        for chunk in chunks {
            let mut stream = self
                .storage
                .get_stream(&chunk.stored_key)
                .await
                .map_err(|e| {
                    AppError::Storage(format!(
                        "Failed to open chunk {} for upload {}: {}",
                        chunk.chunk_number, upload.id, e
                    ))
                })?;

            while let Some(part) = stream.next().await {
                let bytes = part.map_err(|e| {
                    AppError::Storage(format!(
                        "Failed to read chunk {} for upload {}: {}",
                        chunk.chunk_number, upload.id, e
                    ))
                })?;
                hasher.update(&bytes);
                total_bytes += bytes.len() as u64;
                file.write_all(&bytes).await?;
            }
        }

        file.flush().await?;
        file.sync_all().await?;

        Ok((total_bytes, hex::encode(hasher.finalize())))
    }
}

async fn remove_staging(staging: &Path) {
    if let Err(e) = fs::remove_file(staging).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(error = %e, path = %staging.display(), "Failed to remove staging file");
        }
    }
}
