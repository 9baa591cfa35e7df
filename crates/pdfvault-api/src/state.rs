//! Application state shared across handlers.

use pdfvault_core::Config;
use pdfvault_services::{QuotaService, UploadService};
use pdfvault_storage::Storage;
use pdfvault_worker::TaskQueue;
use sqlx::PgPool;
use std::sync::Arc;

use crate::task_handlers::AppTaskContext;

/// Everything a handler can reach. Also owns the task context and worker
/// queue so the background pool (which only holds a weak reference to the
/// context) stays alive for the life of the server.
pub struct AppState {
    pub config: Config,
    pub pool: PgPool,
    pub storage: Arc<dyn Storage>,
    pub uploads: UploadService,
    pub quota: QuotaService,
    pub task_context: Arc<AppTaskContext>,
    pub task_queue: TaskQueue,
}
