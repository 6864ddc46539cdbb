pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::notification::{NewNotification, NotificationRecord};

/// Durable notification records.
/// Implementations: PgStore (Postgres), MemoryStore (in-process).
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist one record as `unread`, stamped with the store's clock.
    /// Returns only after the write is durable.
    async fn create(&self, new: &NewNotification) -> Result<NotificationRecord, AppError>;

    /// Unread records whose recipient is `user_id`, newest first.
    async fn list_unread(&self, user_id: &str) -> Result<Vec<NotificationRecord>, AppError>;

    /// Most recent records for `user_id` regardless of status.
    async fn list_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<NotificationRecord>, AppError>;

    async fn count_unread(&self, user_id: &str) -> Result<i64, AppError>;

    /// Idempotent. `AppError::NotFound` when the id does not exist.
    async fn mark_read(&self, id: Uuid) -> Result<NotificationRecord, AppError>;

    /// Returns how many records changed.
    async fn mark_all_read(&self, user_id: &str) -> Result<u64, AppError>;

    /// Delete read records created before `cutoff`. Unread records are kept.
    async fn purge_read_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;

    /// Liveness check for `/readyz`.
    async fn ping(&self) -> Result<(), AppError>;
}

/// Per-user profile data the push path needs: one device token per user,
/// last write wins.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn push_token(&self, user_id: &str) -> Result<Option<String>, AppError>;

    async fn set_push_token(&self, user_id: &str, token: &str) -> Result<(), AppError>;

    async fn has_push_token(&self, user_id: &str) -> Result<bool, AppError> {
        Ok(self.push_token(user_id).await?.is_some())
    }
}
