use crate::traits::{ByteStream, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::Client;
use futures::StreamExt;
use pdfvault_core::StorageBackend;
use std::path::Path;

/// S3 storage implementation.
///
/// Works against AWS S3 and S3-compatible providers (MinIO, DigitalOcean
/// Spaces) via a custom endpoint URL. Credentials come from the standard AWS
/// environment/credential chain.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
}

impl S3Storage {
    /// Create a new S3Storage instance.
    ///
    /// # Arguments
    /// * `bucket` - S3 bucket name
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = endpoint_url {
            // Path-style addressing is required for MinIO and most
            // S3-compatible providers.
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        let client = Client::from_conf(builder.build());

        Ok(S3Storage { client, bucket })
    }
}

#[async_trait]
impl Storage for S3Storage {
    async fn put(&self, storage_key: &str, data: Vec<u8>, content_type: &str) -> StorageResult<()> {
        let size = data.len();
        let start = std::time::Instant::now();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(storage_key)
            .content_type(content_type)
            .body(aws_sdk_s3::primitives::ByteStream::from(data))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %storage_key,
                    size_bytes = size,
                    "S3 put failed"
                );
                StorageError::UploadFailed(e.to_string())
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %storage_key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 put successful"
        );

        Ok(())
    }

    async fn put_file(
        &self,
        storage_key: &str,
        file_path: &Path,
        content_type: &str,
    ) -> StorageResult<u64> {
        let size = tokio::fs::metadata(file_path).await?.len();
        let start = std::time::Instant::now();

        let body = aws_sdk_s3::primitives::ByteStream::from_path(file_path)
            .await
            .map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to open {} for upload: {}",
                    file_path.display(),
                    e
                ))
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(storage_key)
            .content_type(content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %storage_key,
                    size_bytes = size,
                    "S3 put_file failed"
                );
                StorageError::UploadFailed(e.to_string())
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %storage_key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 put_file successful"
        );

        Ok(size)
    }

    async fn get(&self, storage_key: &str) -> StorageResult<Vec<u8>> {
        let start = std::time::Instant::now();

        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(storage_key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    StorageError::NotFound(storage_key.to_string())
                } else {
                    tracing::error!(
                        error = %service_error,
                        bucket = %self.bucket,
                        key = %storage_key,
                        "S3 get failed"
                    );
                    StorageError::DownloadFailed(service_error.to_string())
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| StorageError::DownloadFailed(format!("Failed to read body: {}", e)))?
            .into_bytes()
            .to_vec();

        tracing::debug!(
            bucket = %self.bucket,
            key = %storage_key,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 get successful"
        );

        Ok(data)
    }

    async fn get_stream(&self, storage_key: &str) -> StorageResult<ByteStream> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(storage_key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    StorageError::NotFound(storage_key.to_string())
                } else {
                    StorageError::DownloadFailed(service_error.to_string())
                }
            })?;

        let reader = tokio_util::io::ReaderStream::new(response.body.into_async_read());
        let stream = reader.map(|result| {
            result.map_err(|e| StorageError::DownloadFailed(format!("Failed to read chunk: {}", e)))
        });

        Ok(Box::pin(stream))
    }

    async fn delete(&self, storage_key: &str) -> StorageResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(storage_key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %storage_key,
                    "S3 delete failed"
                );
                StorageError::DeleteFailed(e.to_string())
            })?;

        tracing::info!(bucket = %self.bucket, key = %storage_key, "S3 delete successful");

        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> StorageResult<()> {
        let mut continuation_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }

            let listing = request
                .send()
                .await
                .map_err(|e| StorageError::DeleteFailed(e.to_string()))?;

            for object in listing.contents() {
                if let Some(key) = object.key() {
                    self.delete(key).await?;
                }
            }

            match listing.next_continuation_token() {
                Some(token) => continuation_token = Some(token.to_string()),
                None => break,
            }
        }

        tracing::info!(bucket = %self.bucket, prefix = %prefix, "S3 delete_prefix successful");

        Ok(())
    }

    async fn exists(&self, storage_key: &str) -> StorageResult<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(storage_key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(StorageError::BackendError(service_error.to_string()))
                }
            }
        }
    }

    async fn content_length(&self, storage_key: &str) -> StorageResult<u64> {
        let head = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(storage_key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    StorageError::NotFound(storage_key.to_string())
                } else {
                    StorageError::BackendError(service_error.to_string())
                }
            })?;

        Ok(head.content_length().unwrap_or(0).max(0) as u64)
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::S3
    }
}
