use pdfvault_core::models::UserQuota;
use pdfvault_core::AppError;
use sqlx::PgPool;
use uuid::Uuid;

/// Repository for per-user storage quotas.
///
/// Charging and releasing `used_storage_bytes` for uploads happens inside
/// `UploadRepository` transactions, gated on the upload's own status
/// transition; this repository covers reads, row creation, and the
/// quota-increase hook the payment collaborator calls.
#[derive(Clone)]
pub struct QuotaRepository {
    pool: PgPool,
}

impl QuotaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a user's quota, creating the row with `default_max_storage_bytes`
    /// on first use.
    pub async fn get_or_create(
        &self,
        user_id: Uuid,
        default_max_storage_bytes: i64,
    ) -> Result<UserQuota, AppError> {
        sqlx::query(
            r#"
            INSERT INTO user_quotas (user_id, max_storage_bytes)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(default_max_storage_bytes)
        .execute(&self.pool)
        .await?;

        let quota = sqlx::query_as::<_, UserQuota>(
            "SELECT * FROM user_quotas WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(quota)
    }

    pub async fn get(&self, user_id: Uuid) -> Result<Option<UserQuota>, AppError> {
        let quota = sqlx::query_as::<_, UserQuota>(
            "SELECT * FROM user_quotas WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(quota)
    }

    /// Raise a user's cap after a storage purchase. Atomic on the user row.
    pub async fn add_storage(
        &self,
        user_id: Uuid,
        additional_bytes: i64,
    ) -> Result<UserQuota, AppError> {
        let quota = sqlx::query_as::<_, UserQuota>(
            r#"
            UPDATE user_quotas
            SET max_storage_bytes = max_storage_bytes + $2, updated_at = NOW()
            WHERE user_id = $1
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(additional_bytes)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Quota not found for user {}", user_id)))?;

        tracing::info!(
            user_id = %user_id,
            additional_bytes = additional_bytes,
            max_storage_bytes = quota.max_storage_bytes,
            "Storage quota increased"
        );

        Ok(quota)
    }
}
