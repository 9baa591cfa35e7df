//! Bounded retries for storage IO.
//!
//! Transient backend failures are retried a fixed number of times with
//! doubling backoff before being escalated to the caller.

use pdfvault_storage::{StorageError, StorageResult};
use std::future::Future;
use std::time::Duration;

/// Run `op` up to `attempts` times, sleeping `backoff_ms * 2^(n-1)` between
/// tries. Permanent errors (missing object, invalid key) are returned
/// immediately.
pub async fn retry_io<T, F, Fut>(
    attempts: u32,
    backoff_ms: u64,
    op_name: &str,
    mut op: F,
) -> StorageResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StorageResult<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                let delay = backoff_ms * 2u64.pow(attempt - 1);
                tracing::warn!(
                    error = %e,
                    op = op_name,
                    attempt = attempt,
                    max_attempts = attempts,
                    backoff_ms = delay,
                    "Storage operation failed, retrying"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_io(3, 1, "put", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(StorageError::BackendError("flaky".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: StorageResult<()> = retry_io(3, 1, "put", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StorageError::BackendError("down".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: StorageResult<()> = retry_io(3, 1, "get", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(StorageError::NotFound("gone".into())) }
        })
        .await;

        assert!(matches!(result, Err(StorageError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
