use pdfvault_core::models::{Upload, UploadStats, UploadStatus};
use pdfvault_core::AppError;
use sqlx::{PgPool, Row};
use uuid::Uuid;

const UPLOAD_COLUMNS: &str = r#"
    id, user_id, original_filename, stored_key, content_hash, size_bytes,
    mime_type, status, is_chunked, total_chunks, uploaded_chunks,
    upload_session_id, extracted_text, metadata, error_message, completed_at,
    created_at, updated_at
"#;

/// Fields for a new upload row. The row is created in `uploading` status
/// before any bytes are durably stored.
#[derive(Debug)]
pub struct NewUploadRecord {
    pub user_id: Uuid,
    pub original_filename: String,
    pub stored_key: String,
    pub content_hash: String,
    pub size_bytes: i64,
    pub mime_type: String,
    pub is_chunked: bool,
    pub total_chunks: i32,
    pub upload_session_id: Option<Uuid>,
}

/// Result of the transactional complete-and-charge operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompleteOutcome {
    /// This call performed the `processing -> completed` transition and
    /// charged the owner's quota.
    Charged,
    /// The upload was not in `processing`; nothing changed.
    AlreadyFinished,
    /// The cap no longer accommodates the file; nothing changed.
    QuotaExceeded,
}

/// What a deleted upload looked like, for storage cleanup and quota release.
#[derive(Debug)]
pub struct DeletedUpload {
    pub user_id: Uuid,
    pub status: UploadStatus,
    pub size_bytes: i64,
    pub stored_key: String,
    pub upload_session_id: Option<Uuid>,
    /// Whether the quota was released as part of the delete.
    pub released: bool,
}

/// Repository for upload records.
#[derive(Clone)]
pub struct UploadRepository {
    pool: PgPool,
}

impl UploadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new upload row. A live duplicate of `(user_id, content_hash)`
    /// is rejected by the partial unique index, not by a prior read.
    pub async fn create(&self, record: NewUploadRecord) -> Result<Upload, AppError> {
        let upload = sqlx::query_as::<_, Upload>(&format!(
            r#"
            INSERT INTO uploads (
                user_id, original_filename, stored_key, content_hash,
                size_bytes, mime_type, is_chunked, total_chunks, upload_session_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {UPLOAD_COLUMNS}
            "#
        ))
        .bind(record.user_id)
        .bind(&record.original_filename)
        .bind(&record.stored_key)
        .bind(&record.content_hash)
        .bind(record.size_bytes)
        .bind(&record.mime_type)
        .bind(record.is_chunked)
        .bind(record.total_chunks)
        .bind(record.upload_session_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::DuplicateUpload(record.original_filename.clone())
            } else {
                AppError::Database(e)
            }
        })?;

        Ok(upload)
    }

    pub async fn get_by_id(&self, upload_id: Uuid) -> Result<Option<Upload>, AppError> {
        let upload = sqlx::query_as::<_, Upload>(&format!(
            "SELECT {UPLOAD_COLUMNS} FROM uploads WHERE id = $1"
        ))
        .bind(upload_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(upload)
    }

    /// Look up a live upload of the same content for duplicate detection.
    pub async fn find_duplicate(
        &self,
        user_id: Uuid,
        content_hash: &str,
    ) -> Result<Option<Upload>, AppError> {
        let upload = sqlx::query_as::<_, Upload>(&format!(
            r#"
            SELECT {UPLOAD_COLUMNS}
            FROM uploads
            WHERE user_id = $1 AND content_hash = $2 AND status <> 'failed'
            "#
        ))
        .bind(user_id)
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(upload)
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Upload>, AppError> {
        let uploads = sqlx::query_as::<_, Upload>(&format!(
            r#"
            SELECT {UPLOAD_COLUMNS}
            FROM uploads
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(uploads)
    }

    pub async fn count_for_user(&self, user_id: Uuid) -> Result<i64, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM uploads WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get("count"))
    }

    /// Atomically bump `uploaded_chunks` and return `(uploaded_chunks,
    /// total_chunks)` as observed by this increment. Exactly one caller sees
    /// the two equal even when the last chunks land simultaneously; that
    /// caller dispatches reassembly.
    pub async fn increment_uploaded_chunks(
        &self,
        upload_id: Uuid,
    ) -> Result<(i32, i32), AppError> {
        let row = sqlx::query(
            r#"
            UPDATE uploads
            SET uploaded_chunks = uploaded_chunks + 1, updated_at = NOW()
            WHERE id = $1
            RETURNING uploaded_chunks, total_chunks
            "#,
        )
        .bind(upload_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((row.get("uploaded_chunks"), row.get("total_chunks")))
    }

    /// Compare-and-set `uploading -> processing`. Returns false when another
    /// caller already moved the upload on (the loser of a duplicate
    /// reassembly dispatch, or a redelivered processing task).
    pub async fn begin_processing(&self, upload_id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE uploads
            SET status = 'processing', updated_at = NOW()
            WHERE id = $1 AND status = 'uploading'
            "#,
        )
        .bind(upload_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Record a terminal failure. Only non-terminal uploads transition; a
    /// completed upload is never clobbered by a late failure report.
    pub async fn mark_failed(&self, upload_id: Uuid, error_message: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE uploads
            SET status = 'failed', error_message = $2, updated_at = NOW()
            WHERE id = $1 AND status IN ('uploading', 'processing')
            "#,
        )
        .bind(upload_id)
        .bind(error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Complete an upload and charge the owner's quota in one transaction.
    ///
    /// The charge is gated on the upload's own `processing -> completed`
    /// transition, so a redelivered completion event can never charge twice.
    /// The quota increment is conditional on staying under the cap and takes
    /// the user's row lock, so concurrent completions for one user serialize
    /// and can never overshoot `max_storage_bytes`; when the cap no longer
    /// accommodates the file, the whole transaction rolls back.
    pub async fn complete_with_charge(
        &self,
        upload_id: Uuid,
        extracted_text: Option<&str>,
        metadata: Option<&serde_json::Value>,
    ) -> Result<CompleteOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let completed: Option<(Uuid, i64)> = sqlx::query(
            r#"
            UPDATE uploads
            SET status = 'completed',
                extracted_text = $2,
                metadata = $3,
                completed_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            RETURNING user_id, size_bytes
            "#,
        )
        .bind(upload_id)
        .bind(extracted_text)
        .bind(metadata)
        .fetch_optional(&mut *tx)
        .await?
        .map(|row| (row.get("user_id"), row.get("size_bytes")));

        let Some((user_id, size_bytes)) = completed else {
            tx.rollback().await.ok();
            return Ok(CompleteOutcome::AlreadyFinished);
        };

        let charged = sqlx::query(
            r#"
            UPDATE user_quotas
            SET used_storage_bytes = used_storage_bytes + $2, updated_at = NOW()
            WHERE user_id = $1 AND used_storage_bytes + $2 <= max_storage_bytes
            "#,
        )
        .bind(user_id)
        .bind(size_bytes)
        .execute(&mut *tx)
        .await?;

        if charged.rows_affected() != 1 {
            tx.rollback().await.ok();
            tracing::warn!(
                upload_id = %upload_id,
                user_id = %user_id,
                size_bytes = size_bytes,
                "Quota no longer accommodates upload at completion"
            );
            return Ok(CompleteOutcome::QuotaExceeded);
        }

        tx.commit().await?;

        tracing::info!(
            upload_id = %upload_id,
            user_id = %user_id,
            size_bytes = size_bytes,
            "Upload completed and quota charged"
        );

        Ok(CompleteOutcome::Charged)
    }

    /// Delete an upload and, iff it was completed, release its bytes from the
    /// owner's quota in the same transaction. Chunk rows cascade.
    pub async fn delete_with_release(
        &self,
        upload_id: Uuid,
    ) -> Result<Option<DeletedUpload>, AppError> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query(
            r#"
            DELETE FROM uploads
            WHERE id = $1
            RETURNING user_id, status, size_bytes, stored_key, upload_session_id
            "#,
        )
        .bind(upload_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = deleted else {
            tx.rollback().await.ok();
            return Ok(None);
        };

        let user_id: Uuid = row.get("user_id");
        let status: UploadStatus = row.get("status");
        let size_bytes: i64 = row.get("size_bytes");
        let released = status == UploadStatus::Completed;

        if released {
            sqlx::query(
                r#"
                UPDATE user_quotas
                SET used_storage_bytes = GREATEST(used_storage_bytes - $2, 0),
                    updated_at = NOW()
                WHERE user_id = $1
                "#,
            )
            .bind(user_id)
            .bind(size_bytes)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(Some(DeletedUpload {
            user_id,
            status,
            size_bytes,
            stored_key: row.get("stored_key"),
            upload_session_id: row.get("upload_session_id"),
            released,
        }))
    }

    /// Per-user upload counters for the stats endpoint.
    pub async fn stats_for_user(&self, user_id: Uuid) -> Result<UploadStats, AppError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_uploads,
                COUNT(*) FILTER (WHERE status = 'completed') AS completed_uploads,
                COUNT(*) FILTER (WHERE status = 'failed') AS failed_uploads,
                COUNT(*) FILTER (WHERE status IN ('uploading', 'processing')) AS in_progress_uploads,
                COALESCE(SUM(size_bytes) FILTER (WHERE status = 'completed'), 0)::BIGINT AS completed_size_bytes
            FROM uploads
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let completed_size_bytes: i64 = row.get("completed_size_bytes");

        Ok(UploadStats {
            total_uploads: row.get("total_uploads"),
            completed_uploads: row.get("completed_uploads"),
            failed_uploads: row.get("failed_uploads"),
            in_progress_uploads: row.get("in_progress_uploads"),
            completed_size_bytes,
            completed_size_mb: pdfvault_core::models::bytes_to_mb(completed_size_bytes),
        })
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    error
        .as_database_error()
        .map(|db_err| db_err.is_unique_violation())
        .unwrap_or(false)
}
