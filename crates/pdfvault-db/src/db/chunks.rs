use pdfvault_core::models::Chunk;
use pdfvault_core::AppError;
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for chunk records of chunked uploads.
#[derive(Clone)]
pub struct ChunkRepository {
    pool: PgPool,
}

impl ChunkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Claim a chunk slot. The unique constraint on
    /// `(upload_id, chunk_number)` arbitrates concurrent submissions of the
    /// same chunk: the insert either succeeds or fails, there is no
    /// read-then-write window.
    pub async fn insert_pending(
        &self,
        upload_id: Uuid,
        chunk_number: i32,
        size_bytes: i64,
        content_hash: &str,
        stored_key: &str,
    ) -> Result<Chunk, AppError> {
        let chunk = sqlx::query_as::<_, Chunk>(
            r#"
            INSERT INTO upload_chunks (upload_id, chunk_number, size_bytes, content_hash, stored_key)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, upload_id, chunk_number, size_bytes, content_hash,
                      stored_key, status, uploaded_at, created_at, updated_at
            "#,
        )
        .bind(upload_id)
        .bind(chunk_number)
        .bind(size_bytes)
        .bind(content_hash)
        .bind(stored_key)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let is_duplicate = e
                .as_database_error()
                .map(|db_err| db_err.is_unique_violation())
                .unwrap_or(false);
            if is_duplicate {
                AppError::DuplicateChunk { chunk_number }
            } else {
                AppError::Database(e)
            }
        })?;

        Ok(chunk)
    }

    /// Promote a claim to `uploaded` once its bytes are durably stored.
    pub async fn mark_uploaded(&self, chunk_id: Uuid) -> Result<Chunk, AppError> {
        let chunk = sqlx::query_as::<_, Chunk>(
            r#"
            UPDATE upload_chunks
            SET status = 'uploaded', uploaded_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING id, upload_id, chunk_number, size_bytes, content_hash,
                      stored_key, status, uploaded_at, created_at, updated_at
            "#,
        )
        .bind(chunk_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(chunk)
    }

    /// Drop a claim whose bytes never made it to storage, so the client can
    /// retry the submission.
    pub async fn delete(&self, chunk_id: Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM upload_chunks WHERE id = $1")
            .bind(chunk_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Uploaded chunks in reassembly order.
    pub async fn list_uploaded(&self, upload_id: Uuid) -> Result<Vec<Chunk>, AppError> {
        let chunks = sqlx::query_as::<_, Chunk>(
            r#"
            SELECT id, upload_id, chunk_number, size_bytes, content_hash,
                   stored_key, status, uploaded_at, created_at, updated_at
            FROM upload_chunks
            WHERE upload_id = $1 AND status = 'uploaded'
            ORDER BY chunk_number
            "#,
        )
        .bind(upload_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(chunks)
    }

    /// All chunk rows of an upload, in order.
    pub async fn list_for_upload(&self, upload_id: Uuid) -> Result<Vec<Chunk>, AppError> {
        let chunks = sqlx::query_as::<_, Chunk>(
            r#"
            SELECT id, upload_id, chunk_number, size_bytes, content_hash,
                   stored_key, status, uploaded_at, created_at, updated_at
            FROM upload_chunks
            WHERE upload_id = $1
            ORDER BY chunk_number
            "#,
        )
        .bind(upload_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(chunks)
    }

    /// Mark every uploaded chunk of an upload as consumed by reassembly.
    pub async fn mark_all_processed(&self, upload_id: Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE upload_chunks
            SET status = 'processed', updated_at = NOW()
            WHERE upload_id = $1 AND status = 'uploaded'
            "#,
        )
        .bind(upload_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
