//! Per-user storage quota.

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::bytes_to_mb;

/// Storage accounting for one user. `used_storage_bytes` is only mutated by
/// the transactional charge/release operations in the database layer.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct UserQuota {
    pub user_id: Uuid,
    pub used_storage_bytes: i64,
    pub max_storage_bytes: i64,
    pub is_premium: bool,
    pub premium_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserQuota {
    /// Whether `additional_bytes` fit under the cap. Advisory at ingestion
    /// time; the binding check is the transactional charge on completion.
    pub fn can_accept(&self, additional_bytes: i64) -> bool {
        self.used_storage_bytes + additional_bytes <= self.max_storage_bytes
    }

    pub fn remaining_storage_bytes(&self) -> i64 {
        (self.max_storage_bytes - self.used_storage_bytes).max(0)
    }

    pub fn usage_percent(&self) -> f64 {
        if self.max_storage_bytes == 0 {
            return 0.0;
        }
        let ratio = self.used_storage_bytes as f64 / self.max_storage_bytes as f64;
        (ratio * 100.0 * 100.0).round() / 100.0
    }
}

/// Quota plus derived usage figures, as returned by the API.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuotaResponse {
    pub user_id: Uuid,
    pub used_storage_bytes: i64,
    pub max_storage_bytes: i64,
    pub remaining_storage_bytes: i64,
    pub used_storage_mb: f64,
    pub max_storage_mb: f64,
    pub usage_percent: f64,
    pub is_premium: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub premium_expires_at: Option<DateTime<Utc>>,
}

impl From<UserQuota> for QuotaResponse {
    fn from(quota: UserQuota) -> Self {
        Self {
            remaining_storage_bytes: quota.remaining_storage_bytes(),
            used_storage_mb: bytes_to_mb(quota.used_storage_bytes),
            max_storage_mb: bytes_to_mb(quota.max_storage_bytes),
            usage_percent: quota.usage_percent(),
            user_id: quota.user_id,
            used_storage_bytes: quota.used_storage_bytes,
            max_storage_bytes: quota.max_storage_bytes,
            is_premium: quota.is_premium,
            premium_expires_at: quota.premium_expires_at,
        }
    }
}

/// Per-user upload counters for the stats endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct UploadStats {
    pub total_uploads: i64,
    pub completed_uploads: i64,
    pub failed_uploads: i64,
    /// Uploads still in `uploading` or `processing`.
    pub in_progress_uploads: i64,
    /// Sum of `size_bytes` over completed uploads.
    pub completed_size_bytes: i64,
    pub completed_size_mb: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quota(used: i64, max: i64) -> UserQuota {
        UserQuota {
            user_id: Uuid::new_v4(),
            used_storage_bytes: used,
            max_storage_bytes: max,
            is_premium: false,
            premium_expires_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn can_accept_is_inclusive_of_the_cap() {
        let q = quota(60, 100);
        assert!(q.can_accept(40));
        assert!(!q.can_accept(41));
    }

    #[test]
    fn remaining_storage_floors_at_zero() {
        assert_eq!(quota(60, 100).remaining_storage_bytes(), 40);
        assert_eq!(quota(150, 100).remaining_storage_bytes(), 0);
    }

    #[test]
    fn usage_percent_handles_zero_cap() {
        assert_eq!(quota(0, 0).usage_percent(), 0.0);
        assert_eq!(quota(50, 200).usage_percent(), 25.0);
    }

    #[test]
    fn quota_response_derives_usage_fields() {
        let response = QuotaResponse::from(quota(52_428_800, 104_857_600));
        assert_eq!(response.remaining_storage_bytes, 52_428_800);
        assert_eq!(response.used_storage_mb, 50.0);
        assert_eq!(response.max_storage_mb, 100.0);
        assert_eq!(response.usage_percent, 50.0);
    }
}
