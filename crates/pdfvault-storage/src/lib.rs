//! Pdfvault Storage Library
//!
//! Storage abstraction and backends for chunk staging and final artifacts.
//!
//! # Storage key format
//!
//! - Final artifacts: `pdfs/{file_id}.pdf`
//! - Chunk staging: `chunks/{upload_session_id}/chunk_{n}`
//!
//! Keys must not contain `..` or a leading `/`. Key generation is centralized
//! in the `keys` module so all backends stay consistent.
//!
//! # Atomic visibility
//!
//! `put` and `put_file` never expose a partially written object under its
//! key: the local backend writes to a temporary sibling and renames, and S3
//! PUTs are atomic by contract.

pub mod factory;
pub mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod traits;

// Re-export commonly used types
pub use factory::create_storage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use pdfvault_core::StorageBackend;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use traits::{ByteStream, Storage, StorageError, StorageResult};
