//! Service graph construction.
//!
//! Two `TaskQueue` handles share one tasks table: a no-worker handle the
//! services submit through, and the worker handle that claims and dispatches.
//! The dispatch context only gets a weak reference from the worker, so
//! `AppState` keeps the strong one.

use pdfvault_core::Config;
use pdfvault_db::{ChunkRepository, QuotaRepository, TaskRepository, UploadRepository};
use pdfvault_services::{
    AssemblyService, PdfProcessor, QuotaService, UploadService, UploadServiceConfig,
};
use pdfvault_storage::Storage;
use pdfvault_worker::{TaskHandlerContext, TaskQueue, TaskQueueConfig};
use sqlx::PgPool;
use std::sync::{Arc, Weak};

use crate::state::AppState;
use crate::task_handlers::AppTaskContext;

/// Wire repositories, services, the task context, and the background worker
/// into an [`AppState`].
pub fn build_app_state(config: Config, pool: PgPool, storage: Arc<dyn Storage>) -> Arc<AppState> {
    let upload_repository = UploadRepository::new(pool.clone());
    let chunk_repository = ChunkRepository::new(pool.clone());
    let quota_repository = QuotaRepository::new(pool.clone());
    let task_repository = TaskRepository::new(pool.clone());

    let queue_config = TaskQueueConfig::from(&config);
    let submit_queue = TaskQueue::new_no_worker(task_repository.clone(), queue_config.clone());

    let quota = QuotaService::new(
        quota_repository,
        upload_repository.clone(),
        config.default_max_storage_bytes,
    );

    let uploads = UploadService::new(
        upload_repository.clone(),
        chunk_repository.clone(),
        quota.clone(),
        storage.clone(),
        submit_queue.clone(),
        UploadServiceConfig::from(&config),
    );

    let assembly = AssemblyService::new(
        upload_repository.clone(),
        chunk_repository,
        storage.clone(),
        submit_queue,
        config.assembly_work_dir.clone(),
        config.io_retry_attempts,
        config.io_retry_backoff_ms,
    );

    let task_context = Arc::new(AppTaskContext::new(
        assembly,
        upload_repository,
        storage.clone(),
        Arc::new(PdfProcessor),
    ));

    let context_ref: Weak<dyn TaskHandlerContext> = Arc::downgrade(&task_context);
    let task_queue = TaskQueue::new(
        task_repository,
        queue_config,
        context_ref,
        Some(pool.clone()),
    );

    Arc::new(AppState {
        config,
        pool,
        storage,
        uploads,
        quota,
        task_context,
        task_queue,
    })
}
