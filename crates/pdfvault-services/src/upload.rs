//! Upload ingestion and the chunk store.
//!
//! `begin_upload` decides between direct and chunked intake; `submit_chunk`
//! verifies and persists individual chunks and dispatches reassembly when the
//! last one lands. Concurrency safety rests on two repository primitives: the
//! unique chunk insert (no read-then-write window) and the atomic
//! increment-and-return of `uploaded_chunks` (exactly one submitter observes
//! completeness).

use bytes::Bytes;
use pdfvault_core::models::{
    AssembleUploadPayload, Chunk, NewUploadRequest, Priority, ProcessDocumentPayload,
    SubmitChunkResponse, Task, Upload, UploadStatus,
};
use pdfvault_core::{sha256_hex, AppError, Config};
use pdfvault_db::{ChunkRepository, NewUploadRecord, UploadRepository};
use pdfvault_storage::{keys, Storage};
use pdfvault_worker::TaskQueue;
use std::sync::Arc;
use uuid::Uuid;

use crate::quota::QuotaService;
use crate::retry::retry_io;

const DEFAULT_MIME_TYPE: &str = "application/pdf";
const CHUNK_MIME_TYPE: &str = "application/octet-stream";

/// Upload pipeline tuning, extracted from [`Config`].
#[derive(Debug, Clone)]
pub struct UploadServiceConfig {
    pub chunk_size_bytes: u64,
    pub max_file_size_bytes: u64,
    pub io_retry_attempts: u32,
    pub io_retry_backoff_ms: u64,
}

impl From<&Config> for UploadServiceConfig {
    fn from(config: &Config) -> Self {
        Self {
            chunk_size_bytes: config.chunk_size_bytes,
            max_file_size_bytes: config.max_file_size_bytes,
            io_retry_attempts: config.io_retry_attempts,
            io_retry_backoff_ms: config.io_retry_backoff_ms,
        }
    }
}

/// Outcome of `begin_upload`.
#[derive(Debug)]
pub enum BeginUploadOutcome {
    /// Stored and queued for processing in this call.
    Direct(Upload),
    /// A chunk plan: the client uploads `upload.total_chunks` chunks of
    /// `chunk_size_bytes` each (last one short).
    Chunked {
        upload: Upload,
        chunk_size_bytes: u64,
    },
}

/// Ingestion orchestrator and chunk store.
#[derive(Clone)]
pub struct UploadService {
    uploads: UploadRepository,
    chunks: ChunkRepository,
    quota: QuotaService,
    storage: Arc<dyn Storage>,
    queue: TaskQueue,
    config: UploadServiceConfig,
}

impl UploadService {
    pub fn new(
        uploads: UploadRepository,
        chunks: ChunkRepository,
        quota: QuotaService,
        storage: Arc<dyn Storage>,
        queue: TaskQueue,
        config: UploadServiceConfig,
    ) -> Self {
        Self {
            uploads,
            chunks,
            quota,
            storage,
            queue,
            config,
        }
    }

    /// Begin an upload.
    ///
    /// Files at or below the chunk size are stored in this call (`payload`
    /// required) and queued for processing. Larger files get an upload row in
    /// `uploading` status plus a chunk plan; no bytes are accepted here.
    ///
    /// The declared `content_hash` is client-supplied: it is verified against
    /// the payload for direct uploads and against the reassembled file for
    /// chunked ones, never trusted.
    pub async fn begin_upload(
        &self,
        user_id: Uuid,
        request: NewUploadRequest,
        payload: Option<Bytes>,
    ) -> Result<BeginUploadOutcome, AppError> {
        let size_bytes = request.size_bytes;
        if size_bytes as u64 > self.config.max_file_size_bytes {
            return Err(AppError::PayloadTooLarge(format!(
                "{} bytes exceeds the maximum of {} bytes",
                size_bytes, self.config.max_file_size_bytes
            )));
        }

        let content_hash = request.content_hash.to_lowercase();

        // Advisory gate; the binding check is the charge at completion.
        self.quota.ensure_can_accept(user_id, size_bytes).await?;

        // Friendly duplicate check before the insert; the partial unique
        // index still decides under race.
        if let Some(existing) = self.uploads.find_duplicate(user_id, &content_hash).await? {
            return Err(AppError::DuplicateUpload(existing.original_filename));
        }

        let mime_type = request
            .mime_type
            .clone()
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string());
        let file_id = Uuid::new_v4();
        let stored_key = keys::final_key(file_id);
        let is_chunked = size_bytes as u64 > self.config.chunk_size_bytes;

        if !is_chunked {
            let Some(payload) = payload else {
                return Err(AppError::InvalidInput(
                    "File payload is required for direct uploads".to_string(),
                ));
            };
            if payload.len() as i64 != size_bytes {
                return Err(AppError::InvalidInput(format!(
                    "Declared size {} does not match payload size {}",
                    size_bytes,
                    payload.len()
                )));
            }
            let actual_hash = sha256_hex(&payload);
            if actual_hash != content_hash {
                return Err(AppError::IntegrityMismatch {
                    expected: content_hash,
                    actual: actual_hash,
                });
            }

            let upload = self
                .uploads
                .create(NewUploadRecord {
                    user_id,
                    original_filename: request.filename,
                    stored_key: stored_key.clone(),
                    content_hash,
                    size_bytes,
                    mime_type: mime_type.clone(),
                    is_chunked: false,
                    total_chunks: 1,
                    upload_session_id: None,
                })
                .await?;

            let attempts = self.config.io_retry_attempts;
            let backoff = self.config.io_retry_backoff_ms;
            let put_result = retry_io(attempts, backoff, "put upload", || {
                let data = payload.to_vec();
                let storage = self.storage.clone();
                let key = stored_key.clone();
                let mime = mime_type.clone();
                async move { storage.put(&key, data, &mime).await }
            })
            .await;

            if let Err(e) = put_result {
                let message = format!("Failed to store upload: {}", e);
                self.uploads.mark_failed(upload.id, &message).await?;
                return Err(AppError::Storage(message));
            }

            self.dispatch_processing(upload.id).await?;

            tracing::info!(
                upload_id = %upload.id,
                user_id = %user_id,
                size_bytes = size_bytes,
                "Direct upload stored and queued for processing"
            );

            return Ok(BeginUploadOutcome::Direct(upload));
        }

        if payload.is_some() {
            return Err(AppError::InvalidInput(format!(
                "Files larger than {} bytes must be uploaded in chunks",
                self.config.chunk_size_bytes
            )));
        }

        let total_chunks = (size_bytes as u64).div_ceil(self.config.chunk_size_bytes) as i32;
        let upload_session_id = Uuid::new_v4();

        let upload = self
            .uploads
            .create(NewUploadRecord {
                user_id,
                original_filename: request.filename,
                stored_key,
                content_hash,
                size_bytes,
                mime_type,
                is_chunked: true,
                total_chunks,
                upload_session_id: Some(upload_session_id),
            })
            .await?;

        tracing::info!(
            upload_id = %upload.id,
            user_id = %user_id,
            upload_session_id = %upload_session_id,
            size_bytes = size_bytes,
            total_chunks = total_chunks,
            "Chunked upload initialized"
        );

        Ok(BeginUploadOutcome::Chunked {
            upload,
            chunk_size_bytes: self.config.chunk_size_bytes,
        })
    }

    /// Submit one chunk of a chunked upload.
    ///
    /// The chunk digest is verified before anything is written; corrupt data
    /// never reaches storage or the database. The post-increment observation
    /// of `uploaded_chunks == total_chunks` dispatches reassembly exactly
    /// once even when the last two chunks arrive simultaneously.
    pub async fn submit_chunk(
        &self,
        user_id: Uuid,
        upload_id: Uuid,
        chunk_number: i32,
        declared_hash: &str,
        data: Bytes,
    ) -> Result<SubmitChunkResponse, AppError> {
        let upload = self.get_owned(user_id, upload_id).await?;

        if !upload.is_chunked {
            return Err(AppError::BadRequest(
                "Upload is not configured for chunking".to_string(),
            ));
        }
        if upload.status != UploadStatus::Uploading {
            return Err(AppError::BadRequest(format!(
                "Upload is {} and no longer accepts chunks",
                upload.status
            )));
        }
        if chunk_number < 1 || chunk_number > upload.total_chunks {
            return Err(AppError::ChunkOutOfRange {
                chunk_number,
                total_chunks: upload.total_chunks,
            });
        }

        let declared_hash = declared_hash.to_lowercase();
        let actual_hash = sha256_hex(&data);
        if actual_hash != declared_hash {
            return Err(AppError::IntegrityMismatch {
                expected: declared_hash,
                actual: actual_hash,
            });
        }

        let upload_session_id = upload.upload_session_id.ok_or_else(|| {
            AppError::Internal(format!("Chunked upload {} has no session id", upload_id))
        })?;
        let stored_key = keys::chunk_key(upload_session_id, chunk_number);

        // Claim the slot first; the unique constraint arbitrates duplicates.
        let chunk = self
            .chunks
            .insert_pending(
                upload_id,
                chunk_number,
                data.len() as i64,
                &actual_hash,
                &stored_key,
            )
            .await?;

        let attempts = self.config.io_retry_attempts;
        let backoff = self.config.io_retry_backoff_ms;
        let put_result = retry_io(attempts, backoff, "put chunk", || {
            let bytes = data.to_vec();
            let storage = self.storage.clone();
            let key = stored_key.clone();
            async move { storage.put(&key, bytes, CHUNK_MIME_TYPE).await }
        })
        .await;

        if let Err(e) = put_result {
            // Release the claim so the client can retry this chunk.
            if let Err(cleanup_err) = self.chunks.delete(chunk.id).await {
                tracing::error!(
                    error = %cleanup_err,
                    chunk_id = %chunk.id,
                    "Failed to release chunk claim after storage failure"
                );
            }
            return Err(AppError::Storage(format!(
                "Failed to store chunk {}: {}",
                chunk_number, e
            )));
        }

        let chunk = self.chunks.mark_uploaded(chunk.id).await?;

        let (uploaded_chunks, total_chunks) =
            self.uploads.increment_uploaded_chunks(upload_id).await?;

        tracing::info!(
            upload_id = %upload_id,
            chunk_number = chunk_number,
            uploaded_chunks = uploaded_chunks,
            total_chunks = total_chunks,
            "Chunk stored"
        );

        if uploaded_chunks == total_chunks {
            tracing::info!(upload_id = %upload_id, "All chunks uploaded, dispatching reassembly");
            let payload = Task::payload_from(&AssembleUploadPayload { upload_id });
            if let Err(e) = self
                .queue
                .submit_task(
                    pdfvault_core::models::TaskType::AssembleUpload,
                    payload,
                    Priority::High,
                    None,
                )
                .await
            {
                tracing::error!(error = %e, upload_id = %upload_id, "Failed to dispatch reassembly");
                let message = "Failed to schedule reassembly".to_string();
                self.uploads.mark_failed(upload_id, &message).await?;
                return Err(AppError::Internal(message));
            }
        }

        let progress = {
            let ratio = uploaded_chunks as f64 / total_chunks.max(1) as f64;
            (ratio * 100.0 * 100.0).round() / 100.0
        };

        Ok(SubmitChunkResponse {
            chunk: chunk.into(),
            uploaded_chunks,
            total_chunks,
            progress,
        })
    }

    /// An upload with its chunk records, owner-scoped.
    pub async fn get_upload(
        &self,
        user_id: Uuid,
        upload_id: Uuid,
    ) -> Result<(Upload, Vec<Chunk>), AppError> {
        let upload = self.get_owned(user_id, upload_id).await?;
        let chunks = if upload.is_chunked {
            self.chunks.list_for_upload(upload_id).await?
        } else {
            Vec::new()
        };
        Ok((upload, chunks))
    }

    /// Newest-first page of the user's uploads, plus the total count.
    pub async fn list_uploads(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Upload>, i64), AppError> {
        let uploads = self.uploads.list_for_user(user_id, limit, offset).await?;
        let total = self.uploads.count_for_user(user_id).await?;
        Ok((uploads, total))
    }

    /// Delete an upload. A completed upload releases its bytes from the
    /// owner's quota; uploads in any other state never touch the ledger.
    pub async fn delete_upload(&self, user_id: Uuid, upload_id: Uuid) -> Result<(), AppError> {
        let upload = self.get_owned(user_id, upload_id).await?;

        // Capture chunk keys before the rows cascade away.
        let chunk_keys: Vec<String> = if upload.is_chunked {
            self.chunks
                .list_for_upload(upload_id)
                .await?
                .into_iter()
                .map(|chunk| chunk.stored_key)
                .collect()
        } else {
            Vec::new()
        };

        let deleted = self
            .uploads
            .delete_with_release(upload_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Upload not found: {}", upload_id)))?;

        // Storage cleanup is best effort; rows and quota are already settled.
        if let Err(e) = self.storage.delete(&deleted.stored_key).await {
            tracing::warn!(error = %e, key = %deleted.stored_key, "Failed to delete upload artifact");
        }
        for key in &chunk_keys {
            if let Err(e) = self.storage.delete(key).await {
                tracing::warn!(error = %e, key = %key, "Failed to delete chunk object");
            }
        }
        if let Some(session_id) = deleted.upload_session_id {
            if let Err(e) = self
                .storage
                .delete_prefix(&keys::session_prefix(session_id))
                .await
            {
                tracing::warn!(error = %e, session_id = %session_id, "Failed to delete chunk working area");
            }
        }

        tracing::info!(
            upload_id = %upload_id,
            user_id = %user_id,
            released_bytes = if deleted.released { deleted.size_bytes } else { 0 },
            "Upload deleted"
        );

        Ok(())
    }

    async fn dispatch_processing(&self, upload_id: Uuid) -> Result<(), AppError> {
        let payload = Task::payload_from(&ProcessDocumentPayload { upload_id });
        if let Err(e) = self
            .queue
            .submit_task(
                pdfvault_core::models::TaskType::ProcessDocument,
                payload,
                Priority::Normal,
                None,
            )
            .await
        {
            tracing::error!(error = %e, upload_id = %upload_id, "Failed to dispatch processing");
            let message = "Failed to schedule document processing".to_string();
            self.uploads.mark_failed(upload_id, &message).await?;
            return Err(AppError::Internal(message));
        }
        Ok(())
    }

    async fn get_owned(&self, user_id: Uuid, upload_id: Uuid) -> Result<Upload, AppError> {
        let upload = self
            .uploads
            .get_by_id(upload_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Upload not found: {}", upload_id)))?;

        if upload.user_id != user_id {
            return Err(AppError::Unauthorized(
                "Upload belongs to a different user".to_string(),
            ));
        }

        Ok(upload)
    }
}
