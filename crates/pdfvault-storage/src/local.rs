use crate::traits::{ByteStream, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use futures::StreamExt;
use pdfvault_core::StorageBackend;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

/// Local filesystem storage implementation.
///
/// Objects are written to a temporary sibling file and renamed into place, so
/// a partially written object is never visible under its key.
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage instance rooted at `base_path`
    /// (e.g., "/var/lib/pdfvault/storage"). The directory is created if missing.
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage { base_path })
    }

    /// Convert storage key to filesystem path with security validation.
    ///
    /// Storage keys must not contain path traversal sequences that could
    /// escape the base storage directory.
    fn key_to_path(&self, storage_key: &str) -> StorageResult<PathBuf> {
        if storage_key.is_empty()
            || storage_key.contains("..")
            || storage_key.starts_with('/')
            || storage_key.contains('\\')
        {
            return Err(StorageError::InvalidKey(
                "Storage key contains invalid characters".to_string(),
            ));
        }

        let path = self.base_path.join(storage_key);

        if let Ok(canonical) = path.canonicalize() {
            let base_canonical = self.base_path.canonicalize().map_err(|e| {
                StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
            })?;
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Temporary sibling used for atomic writes. Lives in the same directory
    /// as the target so the final rename stays on one filesystem.
    fn scratch_path(path: &Path) -> PathBuf {
        let mut name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name.push_str(&format!(".tmp.{}", Uuid::new_v4()));
        path.with_file_name(name)
    }

    async fn promote(&self, scratch: &Path, path: &Path) -> StorageResult<()> {
        fs::rename(scratch, path).await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to promote {} to {}: {}",
                scratch.display(),
                path.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn put(&self, storage_key: &str, data: Vec<u8>, _content_type: &str) -> StorageResult<()> {
        let path = self.key_to_path(storage_key)?;
        let size = data.len();

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();
        let scratch = Self::scratch_path(&path);

        let mut file = fs::File::create(&scratch).await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to create file {}: {}",
                scratch.display(),
                e
            ))
        })?;

        if let Err(e) = file.write_all(&data).await {
            let _ = fs::remove_file(&scratch).await;
            return Err(StorageError::UploadFailed(format!(
                "Failed to write file {}: {}",
                scratch.display(),
                e
            )));
        }

        if let Err(e) = file.sync_all().await {
            let _ = fs::remove_file(&scratch).await;
            return Err(StorageError::UploadFailed(format!(
                "Failed to sync file {}: {}",
                scratch.display(),
                e
            )));
        }
        drop(file);

        self.promote(&scratch, &path).await?;

        tracing::info!(
            path = %path.display(),
            key = %storage_key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage put successful"
        );

        Ok(())
    }

    async fn put_file(
        &self,
        storage_key: &str,
        file_path: &Path,
        _content_type: &str,
    ) -> StorageResult<u64> {
        let path = self.key_to_path(storage_key)?;
        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();
        let scratch = Self::scratch_path(&path);

        // Copy first: the source may live on a different filesystem, and the
        // rename below must stay within the storage directory to be atomic.
        let bytes_copied = fs::copy(file_path, &scratch).await.map_err(|e| {
            StorageError::UploadFailed(format!(
                "Failed to copy {} to {}: {}",
                file_path.display(),
                scratch.display(),
                e
            ))
        })?;

        self.promote(&scratch, &path).await?;

        tracing::info!(
            path = %path.display(),
            key = %storage_key,
            size_bytes = bytes_copied,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage put_file successful"
        );

        Ok(bytes_copied)
    }

    async fn get(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        let path = self.key_to_path(storage_key)?;
        let start = std::time::Instant::now();

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(storage_key.to_string()));
        }

        let data = fs::read(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to read file {}: {}", path.display(), e))
        })?;

        tracing::debug!(
            path = %path.display(),
            key = %storage_key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage get successful"
        );

        Ok(data)
    }

    async fn get_stream(&self, storage_key: &str) -> StorageResult<ByteStream> {
        let path = self.key_to_path(storage_key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(storage_key.to_string()));
        }

        let file = fs::File::open(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to open file {}: {}", path.display(), e))
        })?;

        let reader = tokio_util::io::ReaderStream::new(file);
        let stream = reader.map(|result| {
            result.map_err(|e| StorageError::DownloadFailed(format!("Failed to read chunk: {}", e)))
        });

        Ok(Box::pin(stream))
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        let path = self.key_to_path(storage_key)?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_file(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!("Failed to delete file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            key = %storage_key,
            "Local storage delete successful"
        );

        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> StorageResult<()> {
        let path = self.key_to_path(prefix.trim_end_matches('/'))?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_dir_all(&path).await.map_err(|e| {
            StorageError::DeleteFailed(format!(
                "Failed to delete directory {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::info!(prefix = %prefix, "Local storage delete_prefix successful");

        Ok(())
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        let path = self.key_to_path(storage_key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn content_length(&self, storage_key: &str) -> StorageResult<u64> {
        let path = self.key_to_path(storage_key)?;
        let meta = fs::metadata(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(storage_key.to_string())
            } else {
                StorageError::BackendError(e.to_string())
            }
        })?;
        Ok(meta.len())
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let data = b"test data".to_vec();
        storage
            .put("pdfs/test.pdf", data.clone(), "application/pdf")
            .await
            .unwrap();

        let downloaded = storage.get("pdfs/test.pdf").await.unwrap();
        assert_eq!(data, downloaded);
        assert_eq!(storage.content_length("pdfs/test.pdf").await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_put_leaves_no_scratch_files() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        storage
            .put("pdfs/clean.pdf", b"x".to_vec(), "application/pdf")
            .await
            .unwrap();

        let mut entries = std::fs::read_dir(dir.path().join("pdfs"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        entries.sort();
        assert_eq!(entries, vec!["clean.pdf"]);
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let result = storage.get("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.delete("../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));

        let result = storage.exists("/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_ok() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        assert!(storage.delete("nonexistent/file.pdf").await.is_ok());
        assert!(storage.delete_prefix("chunks/missing/").await.is_ok());
    }

    #[tokio::test]
    async fn test_exists() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        storage
            .put("pdfs/exists.pdf", b"test".to_vec(), "application/pdf")
            .await
            .unwrap();

        assert!(storage.exists("pdfs/exists.pdf").await.unwrap());
        assert!(!storage.exists("pdfs/nope.pdf").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_object_get_is_not_found() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        assert!(matches!(
            storage.get("pdfs/missing.pdf").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.content_length("pdfs/missing.pdf").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_put_file_round_trip() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let staging = tempdir().unwrap();
        let source = staging.path().join("assembled.pdf");
        std::fs::write(&source, b"assembled contents").unwrap();

        let written = storage
            .put_file("pdfs/assembled.pdf", &source, "application/pdf")
            .await
            .unwrap();
        assert_eq!(written, 18);

        let downloaded = storage.get("pdfs/assembled.pdf").await.unwrap();
        assert_eq!(downloaded, b"assembled contents");
    }

    #[tokio::test]
    async fn test_get_stream() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let data = b"stream download test".to_vec();
        storage
            .put("chunks/s/chunk_1", data.clone(), "application/octet-stream")
            .await
            .unwrap();

        let mut stream = storage.get_stream("chunks/s/chunk_1").await.unwrap();
        let mut downloaded = Vec::new();
        while let Some(chunk_result) = stream.next().await {
            downloaded.extend_from_slice(&chunk_result.unwrap());
        }

        assert_eq!(data, downloaded);
    }

    #[tokio::test]
    async fn test_delete_prefix_removes_working_area() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        storage
            .put("chunks/session/chunk_1", b"a".to_vec(), "application/octet-stream")
            .await
            .unwrap();
        storage
            .put("chunks/session/chunk_2", b"b".to_vec(), "application/octet-stream")
            .await
            .unwrap();

        storage.delete_prefix("chunks/session/").await.unwrap();

        assert!(!storage.exists("chunks/session/chunk_1").await.unwrap());
        assert!(!storage.exists("chunks/session/chunk_2").await.unwrap());
    }
}
