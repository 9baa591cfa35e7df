//! Error types module
//!
//! This module provides the core error types used throughout the Pdfvault
//! application. All errors are unified under the `AppError` enum, which can
//! represent database, storage, validation, and upload-pipeline errors.
//!
//! The `Database` variant and `From<sqlx::Error>` are gated behind the `sqlx`
//! feature so that storage-only consumers can build without a database driver.

use std::io;

#[cfg(feature = "sqlx")]
use sqlx::Error as SqlxError;

/// Log level for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level - for expected errors like validation failures
    Debug,
    /// Warning level - for recoverable issues like resource limits
    Warn,
    /// Error level - for unexpected failures
    Error,
}

/// Metadata for error responses - defines how an error should be presented.
/// This trait allows errors to self-describe their HTTP response characteristics.
pub trait ErrorMetadata {
    /// HTTP status code to return
    fn http_status_code(&self) -> u16;

    /// Machine-readable error code (e.g., "QUOTA_EXCEEDED")
    fn error_code(&self) -> &'static str;

    /// Whether this error is recoverable (can be retried)
    fn is_recoverable(&self) -> bool;

    /// Suggested action for the client
    fn suggested_action(&self) -> Option<&'static str>;

    /// Client-facing message (may differ from internal error message)
    fn client_message(&self) -> String;

    /// Whether details should be hidden in production
    fn is_sensitive(&self) -> bool;

    /// Log level for this error
    fn log_level(&self) -> LogLevel;
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[cfg(feature = "sqlx")]
    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[cfg(not(feature = "sqlx"))]
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Insufficient storage quota: {required} bytes required, {available} bytes available")]
    QuotaExceeded { required: i64, available: i64 },

    #[error("File already uploaded: {0}")]
    DuplicateUpload(String),

    #[error("Chunk {chunk_number} already uploaded")]
    DuplicateChunk { chunk_number: i32 },

    #[error("Chunk number {chunk_number} out of range (1..={total_chunks})")]
    ChunkOutOfRange {
        chunk_number: i32,
        total_chunks: i32,
    },

    #[error("Content hash mismatch: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },

    #[error("Missing chunks: expected {expected}, found {found}")]
    IncompleteChunks { expected: i32, found: i32 },

    #[error("Assembled size mismatch: expected {expected} bytes, got {actual} bytes")]
    SizeMismatch { expected: i64, actual: i64 },

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Internal error with source")]
    InternalWithSource {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

// Error conversion implementations
#[cfg(feature = "sqlx")]
impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::InternalWithSource {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<io::Error> for AppError {
    fn from(err: io::Error) -> Self {
        AppError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::InvalidInput(format!("UUID parsing error: {}", err))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::InvalidInput(format!("Validation error: {}", err))
    }
}

/// Static metadata for each variant: (http_status, error_code, recoverable, suggested_action, sensitive, log_level).
/// Reduces duplication in the ErrorMetadata impl; client_message stays per-variant for dynamic content.
fn app_error_static_metadata(
    err: &AppError,
) -> (
    u16,
    &'static str,
    bool,
    Option<&'static str>,
    bool,
    LogLevel,
) {
    match err {
        AppError::Database(_) => (
            500,
            "DATABASE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Storage(_) => (
            500,
            "STORAGE_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InvalidInput(_) => (
            400,
            "INVALID_INPUT",
            false,
            Some("Check request parameters and try again"),
            false,
            LogLevel::Debug,
        ),
        AppError::BadRequest(_) => (
            400,
            "BAD_REQUEST",
            false,
            Some("Check request format and parameters"),
            false,
            LogLevel::Debug,
        ),
        AppError::NotFound(_) => (
            404,
            "NOT_FOUND",
            false,
            Some("Verify the resource ID exists"),
            false,
            LogLevel::Debug,
        ),
        AppError::Unauthorized(_) => (
            403,
            "UNAUTHORIZED",
            false,
            Some("Check that the upload belongs to the acting user"),
            false,
            LogLevel::Debug,
        ),
        AppError::PayloadTooLarge(_) => (
            413,
            "PAYLOAD_TOO_LARGE",
            false,
            Some("Reduce file size or use chunked upload"),
            false,
            LogLevel::Debug,
        ),
        AppError::QuotaExceeded { .. } => (
            403,
            "QUOTA_EXCEEDED",
            false,
            Some("Free storage or purchase additional quota"),
            false,
            LogLevel::Warn,
        ),
        AppError::DuplicateUpload(_) => (
            409,
            "DUPLICATE_UPLOAD",
            false,
            Some("The file is already stored; delete it first to re-upload"),
            false,
            LogLevel::Debug,
        ),
        AppError::DuplicateChunk { .. } => (
            409,
            "DUPLICATE_CHUNK",
            false,
            Some("The chunk was already received; continue with the next chunk"),
            false,
            LogLevel::Debug,
        ),
        AppError::ChunkOutOfRange { .. } => (
            400,
            "CHUNK_OUT_OF_RANGE",
            false,
            Some("Check chunk_number against the chunk plan"),
            false,
            LogLevel::Debug,
        ),
        AppError::IntegrityMismatch { .. } => (
            400,
            "INTEGRITY_MISMATCH",
            false,
            Some("Re-read the file and retry the submission"),
            false,
            LogLevel::Warn,
        ),
        AppError::IncompleteChunks { .. } => (
            409,
            "INCOMPLETE_CHUNKS",
            false,
            None,
            false,
            LogLevel::Error,
        ),
        AppError::SizeMismatch { .. } => (
            409,
            "SIZE_MISMATCH",
            false,
            None,
            false,
            LogLevel::Error,
        ),
        AppError::Processing(_) => (
            500,
            "PROCESSING_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::Internal(_) => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
        AppError::InternalWithSource { .. } => (
            500,
            "INTERNAL_ERROR",
            true,
            Some("Retry after a short delay"),
            true,
            LogLevel::Error,
        ),
    }
}

impl AppError {
    /// Get the error type name for detailed error responses
    pub fn error_type(&self) -> &str {
        match self {
            AppError::Database(_) => "Database",
            AppError::Storage(_) => "Storage",
            AppError::InvalidInput(_) => "InvalidInput",
            AppError::BadRequest(_) => "BadRequest",
            AppError::NotFound(_) => "NotFound",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::PayloadTooLarge(_) => "PayloadTooLarge",
            AppError::QuotaExceeded { .. } => "QuotaExceeded",
            AppError::DuplicateUpload(_) => "DuplicateUpload",
            AppError::DuplicateChunk { .. } => "DuplicateChunk",
            AppError::ChunkOutOfRange { .. } => "ChunkOutOfRange",
            AppError::IntegrityMismatch { .. } => "IntegrityMismatch",
            AppError::IncompleteChunks { .. } => "IncompleteChunks",
            AppError::SizeMismatch { .. } => "SizeMismatch",
            AppError::Processing(_) => "Processing",
            AppError::Internal(_) => "Internal",
            AppError::InternalWithSource { .. } => "Internal",
        }
    }

    /// Get detailed error information including the error chain
    pub fn detailed_message(&self) -> String {
        use std::error::Error;

        let mut details = self.to_string();

        let mut source = self.source();
        let mut depth = 0;
        while let Some(err) = source {
            depth += 1;
            if depth > 5 {
                details.push_str("\n  ... (truncated)");
                break;
            }
            details.push_str(&format!("\n  Caused by: {}", err));
            source = err.source();
        }

        details
    }
}

impl ErrorMetadata for AppError {
    fn http_status_code(&self) -> u16 {
        app_error_static_metadata(self).0
    }

    fn error_code(&self) -> &'static str {
        app_error_static_metadata(self).1
    }

    fn is_recoverable(&self) -> bool {
        app_error_static_metadata(self).2
    }

    fn suggested_action(&self) -> Option<&'static str> {
        app_error_static_metadata(self).3
    }

    fn is_sensitive(&self) -> bool {
        app_error_static_metadata(self).4
    }

    fn log_level(&self) -> LogLevel {
        app_error_static_metadata(self).5
    }

    fn client_message(&self) -> String {
        match self {
            AppError::Database(_) => "Failed to access database".to_string(),
            AppError::Storage(_) => "Failed to access storage".to_string(),
            AppError::Processing(_) => "Failed to process document".to_string(),
            AppError::Internal(_) => "Internal server error".to_string(),
            AppError::InternalWithSource { .. } => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}
