//! Shared constants.

/// Bytes per mebibyte, used wherever sizes are configured in MB.
pub const BYTES_PER_MB: u64 = 1_048_576;

/// Default chunk size for chunked uploads (20 MiB). Files at or below this
/// size are stored directly.
pub const DEFAULT_CHUNK_SIZE_MB: u64 = 20;

/// Default upper bound for a single upload (100 MiB).
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 100;

/// Default storage quota granted to a new user (100 MiB).
pub const DEFAULT_MAX_STORAGE_BYTES: i64 = 104_857_600;

/// Length of a hex-encoded SHA-256 digest.
pub const SHA256_HEX_LEN: usize = 64;

/// PDF file signature.
pub const PDF_MAGIC: &[u8] = b"%PDF";
