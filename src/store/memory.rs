use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::{NotificationStore, ProfileStore};
use crate::errors::AppError;
use crate::models::notification::{NewNotification, NotificationRecord, NotificationStatus};

/// Entry stored in the notifications map. `seq` breaks ties between records
/// created within the same clock tick.
#[derive(Clone)]
struct StoredNotification {
    seq: u64,
    record: NotificationRecord,
}

/// In-process store backed by DashMaps. Selected with `IDEAHUB_STORE=memory`
/// for local development; contents are lost on restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    notifications: Arc<DashMap<Uuid, StoredNotification>>,
    tokens: Arc<DashMap<String, String>>,
    seq: Arc<AtomicU64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records held (for tests / debugging).
    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    fn collect_for<F>(&self, user_id: &str, keep: F) -> Vec<NotificationRecord>
    where
        F: Fn(&NotificationRecord) -> bool,
    {
        let mut entries: Vec<StoredNotification> = self
            .notifications
            .iter()
            .filter(|e| e.record.metadata.user_id == user_id && keep(&e.record))
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then(b.seq.cmp(&a.seq))
        });
        entries.into_iter().map(|e| e.record).collect()
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create(&self, new: &NewNotification) -> Result<NotificationRecord, AppError> {
        let record = NotificationRecord {
            id: Uuid::new_v4(),
            title: new.title.clone(),
            category: new.category.clone(),
            body: new.body.clone(),
            status: NotificationStatus::Unread,
            created_at: Utc::now(),
            metadata: new.metadata.clone(),
        };
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.notifications.insert(
            record.id,
            StoredNotification {
                seq,
                record: record.clone(),
            },
        );
        Ok(record)
    }

    async fn list_unread(&self, user_id: &str) -> Result<Vec<NotificationRecord>, AppError> {
        Ok(self.collect_for(user_id, NotificationRecord::is_unread))
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<NotificationRecord>, AppError> {
        let limit = usize::try_from(limit).unwrap_or(0);
        let mut records = self.collect_for(user_id, |_| true);
        records.truncate(limit);
        Ok(records)
    }

    async fn count_unread(&self, user_id: &str) -> Result<i64, AppError> {
        let count = self
            .notifications
            .iter()
            .filter(|e| e.record.metadata.user_id == user_id && e.record.is_unread())
            .count();
        Ok(count as i64)
    }

    async fn mark_read(&self, id: Uuid) -> Result<NotificationRecord, AppError> {
        let mut entry = self.notifications.get_mut(&id).ok_or(AppError::NotFound)?;
        entry.record.status = NotificationStatus::Read;
        Ok(entry.record.clone())
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64, AppError> {
        let mut changed = 0;
        for mut entry in self.notifications.iter_mut() {
            if entry.record.metadata.user_id == user_id && entry.record.is_unread() {
                entry.record.status = NotificationStatus::Read;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn purge_read_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let before = self.notifications.len();
        self.notifications
            .retain(|_, e| e.record.is_unread() || e.record.created_at >= cutoff);
        Ok((before - self.notifications.len()) as u64)
    }

    async fn ping(&self) -> Result<(), AppError> {
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn push_token(&self, user_id: &str) -> Result<Option<String>, AppError> {
        Ok(self
            .tokens
            .get(user_id)
            .map(|t| t.value().clone())
            .filter(|t| !t.trim().is_empty()))
    }

    async fn set_push_token(&self, user_id: &str, token: &str) -> Result<(), AppError> {
        self.tokens.insert(user_id.to_string(), token.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::metadata::EventMetadata;

    fn new_for(user: &str, title: &str) -> NewNotification {
        NewNotification::new(
            title,
            "like",
            "someone liked your idea",
            EventMetadata::builder(user, "idea-1").build().unwrap(),
        )
    }

    #[tokio::test]
    async fn test_create_starts_unread_with_clock() {
        let store = MemoryStore::new();
        let before = Utc::now();
        let rec = store.create(&new_for("u1", "t")).await.unwrap();
        assert_eq!(rec.status, NotificationStatus::Unread);
        assert!(rec.created_at >= before && rec.created_at <= Utc::now());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_list_unread_newest_first_and_scoped_to_recipient() {
        let store = MemoryStore::new();
        store.create(&new_for("u1", "first")).await.unwrap();
        store.create(&new_for("u2", "other user")).await.unwrap();
        store.create(&new_for("u1", "second")).await.unwrap();

        let unread = store.list_unread("u1").await.unwrap();
        let titles: Vec<&str> = unread.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_mark_read_twice_is_idempotent() {
        let store = MemoryStore::new();
        let rec = store.create(&new_for("u1", "t")).await.unwrap();

        let first = store.mark_read(rec.id).await.unwrap();
        let second = store.mark_read(rec.id).await.unwrap();
        assert_eq!(first.status, NotificationStatus::Read);
        assert_eq!(second.status, NotificationStatus::Read);
        assert!(store.list_unread("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_read_unknown_id_is_not_found() {
        let store = MemoryStore::new();
        let err = store.mark_read(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound));
    }

    #[tokio::test]
    async fn test_mark_all_read_counts_only_unread() {
        let store = MemoryStore::new();
        let a = store.create(&new_for("u1", "a")).await.unwrap();
        store.create(&new_for("u1", "b")).await.unwrap();
        store.create(&new_for("u2", "c")).await.unwrap();
        store.mark_read(a.id).await.unwrap();

        assert_eq!(store.mark_all_read("u1").await.unwrap(), 1);
        assert_eq!(store.count_unread("u1").await.unwrap(), 0);
        assert_eq!(store.count_unread("u2").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_purge_keeps_unread_records() {
        let store = MemoryStore::new();
        let read = store.create(&new_for("u1", "old read")).await.unwrap();
        store.create(&new_for("u1", "old unread")).await.unwrap();
        store.mark_read(read.id).await.unwrap();

        let purged = store
            .purge_read_before(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.count_unread("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_push_token_last_write_wins() {
        let store = MemoryStore::new();
        assert!(!store.has_push_token("u1").await.unwrap());
        store.set_push_token("u1", "tok-a").await.unwrap();
        store.set_push_token("u1", "tok-b").await.unwrap();
        assert_eq!(store.push_token("u1").await.unwrap().as_deref(), Some("tok-b"));
        assert!(store.has_push_token("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_blank_push_token_counts_as_absent() {
        let store = MemoryStore::new();
        store.set_push_token("u1", "").await.unwrap();
        assert!(!store.has_push_token("u1").await.unwrap());
    }
}
