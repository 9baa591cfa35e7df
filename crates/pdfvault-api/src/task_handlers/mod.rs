//! Background task handlers.
//!
//! Dispatches queue tasks to the service layer. Handlers are idempotent (the
//! services gate re-entry on upload status) and guarantee that no upload is
//! left stuck in a non-terminal state: when the retry budget for a transient
//! failure is exhausted, the upload is marked `failed` with the recorded
//! error before the task itself fails.

use async_trait::async_trait;
use pdfvault_core::models::{AssembleUploadPayload, ProcessDocumentPayload, Task, TaskType, UploadStatus};
use pdfvault_core::{AppError, TaskError};
use pdfvault_db::{CompleteOutcome, UploadRepository};
use pdfvault_services::{AssemblyService, ContentProcessor};
use pdfvault_storage::{Storage, StorageError};
use pdfvault_worker::TaskHandlerContext;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Concrete dispatch context wired over the application services.
pub struct AppTaskContext {
    pub assembly: AssemblyService,
    uploads: UploadRepository,
    storage: Arc<dyn Storage>,
    processor: Arc<dyn ContentProcessor>,
}

impl AppTaskContext {
    pub fn new(
        assembly: AssemblyService,
        uploads: UploadRepository,
        storage: Arc<dyn Storage>,
        processor: Arc<dyn ContentProcessor>,
    ) -> Self {
        Self {
            assembly,
            uploads,
            storage,
            processor,
        }
    }

    async fn handle_assemble(&self, task: &Task) -> anyhow::Result<serde_json::Value> {
        let payload: AssembleUploadPayload = task
            .try_payload_as()
            .map_err(|e| TaskError::unrecoverable(anyhow::anyhow!("Bad task payload: {}", e)))?;
        let upload_id = payload.upload_id;

        match self.assembly.assemble(upload_id).await {
            Ok(()) => Ok(json!({ "upload_id": upload_id, "assembled": true })),
            Err(e) if is_permanent(&e) => {
                // The service already moved the upload to failed for terminal
                // verification errors; retrying cannot change the outcome.
                Err(TaskError::unrecoverable(anyhow::Error::new(e)).into())
            }
            Err(e) => Err(self.transient_failure(task, upload_id, "Reassembly", e).await),
        }
    }

    async fn handle_process(&self, task: &Task) -> anyhow::Result<serde_json::Value> {
        let payload: ProcessDocumentPayload = task
            .try_payload_as()
            .map_err(|e| TaskError::unrecoverable(anyhow::anyhow!("Bad task payload: {}", e)))?;
        let upload_id = payload.upload_id;

        let upload = match self.uploads.get_by_id(upload_id).await {
            Ok(Some(upload)) => upload,
            Ok(None) => {
                return Err(TaskError::unrecoverable(anyhow::anyhow!(
                    "Upload not found: {}",
                    upload_id
                ))
                .into());
            }
            Err(e) => {
                return Err(self
                    .transient_failure(task, upload_id, "Processing", e)
                    .await);
            }
        };

        match upload.status {
            UploadStatus::Completed | UploadStatus::Failed => {
                tracing::info!(
                    upload_id = %upload_id,
                    status = %upload.status,
                    "Upload already terminal, skipping processing"
                );
                return Ok(json!({ "upload_id": upload_id, "skipped": true }));
            }
            UploadStatus::Uploading => {
                // Direct uploads enter processing here; for chunked uploads
                // reassembly already did this and the CAS is a no-op.
                if let Err(e) = self.uploads.begin_processing(upload_id).await {
                    return Err(self
                        .transient_failure(task, upload_id, "Processing", e)
                        .await);
                }
            }
            UploadStatus::Processing => {}
        }

        let data = match self.storage.get(&upload.stored_key).await {
            Ok(data) => data,
            Err(StorageError::NotFound(key)) => {
                let message = format!("Stored artifact missing: {}", key);
                self.mark_failed_logged(upload_id, &message).await;
                return Err(TaskError::unrecoverable(anyhow::anyhow!(message)).into());
            }
            Err(e) => {
                return Err(self
                    .transient_failure(task, upload_id, "Processing", AppError::Storage(e.to_string()))
                    .await);
            }
        };

        let content = match self
            .processor
            .process(&upload.original_filename, data)
            .await
        {
            Ok(content) => content,
            Err(e) => {
                // Content the processor rejects is a terminal, user-visible
                // failure; retries see the same bytes.
                self.mark_failed_logged(upload_id, &e.to_string()).await;
                return Err(TaskError::unrecoverable(anyhow::Error::new(e)).into());
            }
        };

        let metadata = content.metadata_json();
        let outcome = match self
            .uploads
            .complete_with_charge(upload_id, content.extracted_text.as_deref(), Some(&metadata))
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                return Err(self
                    .transient_failure(task, upload_id, "Completion", e)
                    .await);
            }
        };

        if outcome == CompleteOutcome::QuotaExceeded {
            // The cap filled up between admission and completion. Terminal:
            // record the failure and drop the artifact so it cannot linger
            // unaccounted.
            let message = "Storage quota exceeded at completion".to_string();
            self.mark_failed_logged(upload_id, &message).await;
            if let Err(e) = self.storage.delete(&upload.stored_key).await {
                tracing::warn!(
                    error = %e,
                    key = %upload.stored_key,
                    "Failed to delete artifact of quota-failed upload"
                );
            }
            return Err(TaskError::unrecoverable(anyhow::anyhow!(message)).into());
        }

        tracing::info!(
            upload_id = %upload_id,
            outcome = ?outcome,
            "Document processed"
        );

        Ok(json!({
            "upload_id": upload_id,
            "completed": true,
            "charged": outcome == CompleteOutcome::Charged,
        }))
    }

    /// A retryable failure: if this was the last attempt, record a terminal
    /// failure on the upload so it never sits in a non-terminal state.
    async fn transient_failure(
        &self,
        task: &Task,
        upload_id: Uuid,
        stage: &str,
        error: AppError,
    ) -> anyhow::Error {
        if !task.can_retry() {
            let message = format!(
                "{} failed after {} attempts: {}",
                stage,
                task.retry_count + 1,
                error
            );
            self.mark_failed_logged(upload_id, &message).await;
        }
        TaskError::recoverable(anyhow::Error::new(error)).into()
    }

    async fn mark_failed_logged(&self, upload_id: Uuid, message: &str) {
        if let Err(e) = self.uploads.mark_failed(upload_id, message).await {
            tracing::error!(
                error = %e,
                upload_id = %upload_id,
                "Failed to record terminal upload failure"
            );
        }
    }
}

#[async_trait]
impl TaskHandlerContext for AppTaskContext {
    async fn dispatch_task(&self, task: &Task) -> anyhow::Result<serde_json::Value> {
        match task.task_type {
            TaskType::AssembleUpload => self.handle_assemble(task).await,
            TaskType::ProcessDocument => self.handle_process(task).await,
        }
    }
}

/// Errors that no amount of retrying will fix.
fn is_permanent(error: &AppError) -> bool {
    !matches!(
        error,
        AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Internal(_)
            | AppError::InternalWithSource { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanence_classification() {
        assert!(is_permanent(&AppError::IncompleteChunks {
            expected: 3,
            found: 2
        }));
        assert!(is_permanent(&AppError::SizeMismatch {
            expected: 10,
            actual: 9
        }));
        assert!(is_permanent(&AppError::NotFound("x".into())));
        assert!(!is_permanent(&AppError::Storage("flaky".into())));
        assert!(!is_permanent(&AppError::Internal("oops".into())));
    }
}
