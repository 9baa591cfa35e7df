//! SHA-256 content digests.
//!
//! All integrity checks in the upload pipeline use hex-encoded SHA-256.
//! Whole-file digests for chunked uploads are computed incrementally during
//! reassembly with [`sha2::Sha256`] directly; this helper covers the
//! in-memory cases (direct uploads, chunk verification).

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 digest of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
