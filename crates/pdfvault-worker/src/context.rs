//! Dispatch context for task handlers.

use async_trait::async_trait;
use pdfvault_core::models::Task;

/// Routes a claimed task to its handler.
///
/// Implemented by the application over its wired services. Handlers must be
/// idempotent: the queue delivers at least once, and a redelivered task may
/// run after a previous attempt already finished the work.
///
/// The returned value is stored as the task's `result`. Errors should be
/// wrapped in [`pdfvault_core::TaskError`] to control retryability; bare
/// errors are treated as recoverable.
#[async_trait]
pub trait TaskHandlerContext: Send + Sync {
    async fn dispatch_task(&self, task: &Task) -> anyhow::Result<serde_json::Value>;
}
