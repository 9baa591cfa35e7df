//! Quota ledger service.
//!
//! Gate-keeps new uploads and exposes usage figures. The actual
//! charge/release mutations are transactional repository operations gated on
//! the upload's own status transition (see `UploadRepository`), so this
//! service never needs to mutate `used_storage_bytes` itself.

use pdfvault_core::models::{QuotaResponse, UploadStats, UserQuota};
use pdfvault_core::AppError;
use pdfvault_db::{QuotaRepository, UploadRepository};
use uuid::Uuid;

#[derive(Clone)]
pub struct QuotaService {
    quotas: QuotaRepository,
    uploads: UploadRepository,
    default_max_storage_bytes: i64,
}

impl QuotaService {
    pub fn new(
        quotas: QuotaRepository,
        uploads: UploadRepository,
        default_max_storage_bytes: i64,
    ) -> Self {
        Self {
            quotas,
            uploads,
            default_max_storage_bytes,
        }
    }

    /// The user's quota row, created with the default cap on first use.
    pub async fn get_or_create(&self, user_id: Uuid) -> Result<UserQuota, AppError> {
        self.quotas
            .get_or_create(user_id, self.default_max_storage_bytes)
            .await
    }

    /// Advisory admission check at ingestion time. The binding check is the
    /// transactional charge at completion.
    pub async fn ensure_can_accept(&self, user_id: Uuid, bytes: i64) -> Result<(), AppError> {
        let quota = self.get_or_create(user_id).await?;
        if quota.can_accept(bytes) {
            Ok(())
        } else {
            Err(AppError::QuotaExceeded {
                required: bytes,
                available: quota.remaining_storage_bytes(),
            })
        }
    }

    pub async fn usage(&self, user_id: Uuid) -> Result<QuotaResponse, AppError> {
        let quota = self.get_or_create(user_id).await?;
        Ok(QuotaResponse::from(quota))
    }

    pub async fn upload_stats(&self, user_id: Uuid) -> Result<UploadStats, AppError> {
        self.uploads.stats_for_user(user_id).await
    }

    /// Quota-increase hook for the payment collaborator: raises the cap once
    /// a storage purchase has settled.
    pub async fn add_storage(
        &self,
        user_id: Uuid,
        additional_bytes: i64,
    ) -> Result<QuotaResponse, AppError> {
        if additional_bytes <= 0 {
            return Err(AppError::InvalidInput(
                "additional_bytes must be positive".to_string(),
            ));
        }
        // Ensure the row exists before bumping the cap.
        self.get_or_create(user_id).await?;
        let quota = self.quotas.add_storage(user_id, additional_bytes).await?;
        Ok(QuotaResponse::from(quota))
    }
}
