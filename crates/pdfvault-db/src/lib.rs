//! Pdfvault database layer.
//!
//! Repositories over PostgreSQL. All access to persisted state goes through
//! this crate; the atomic operations the upload pipeline depends on
//! (unique chunk insert, increment-and-return, status-gated quota charge)
//! live here rather than in application code.

pub mod db;

pub use db::chunks::ChunkRepository;
pub use db::quotas::QuotaRepository;
pub use db::tasks::{TaskRepository, TASK_NOTIFY_CHANNEL};
pub use db::uploads::{CompleteOutcome, DeletedUpload, NewUploadRecord, UploadRepository};
