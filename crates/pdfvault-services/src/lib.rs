//! Pdfvault service layer.
//!
//! The upload pipeline lives here: ingestion (direct vs. chunked), the chunk
//! store, reassembly, quota accounting, and the document content processor.
//! Services operate on plain records through the repository layer; nothing in
//! this crate talks SQL directly.

pub mod assembly;
pub mod processing;
pub mod quota;
pub mod retry;
pub mod upload;

pub use assembly::AssemblyService;
pub use processing::{ContentProcessor, DocumentContent, DocumentMetadata, PdfProcessor};
pub use quota::QuotaService;
pub use retry::retry_io;
pub use upload::{BeginUploadOutcome, UploadService, UploadServiceConfig};
