//! Background job: purge read notifications past the retention window.
//!
//! Off unless IDEAHUB_READ_RETENTION_DAYS is set. Unread notifications are
//! never purged, whatever their age.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time;

use crate::store::NotificationStore;

/// Spawn the hourly retention task. Call this once at startup.
pub fn spawn(store: Arc<dyn NotificationStore>, retention_days: u32) {
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(3600)); // every hour
        loop {
            interval.tick().await;
            if let Err(e) = purge_once(store.as_ref(), retention_days).await {
                tracing::error!("retention job failed: {}", e);
            }
        }
    });
}

/// Delete read notifications older than `retention_days`. Returns the number
/// of records removed.
pub async fn purge_once(store: &dyn NotificationStore, retention_days: u32) -> anyhow::Result<u64> {
    let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
    let purged = store.purge_read_before(cutoff).await?;

    if purged > 0 {
        tracing::info!(rows = purged, retention_days, "purged read notifications");
    }

    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::metadata::EventMetadata;
    use crate::models::notification::NewNotification;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn test_fresh_read_records_survive() {
        let store = MemoryStore::new();
        let rec = store
            .create(&NewNotification::new(
                "t",
                "like",
                "b",
                EventMetadata::builder("u1", "i1").build().unwrap(),
            ))
            .await
            .unwrap();
        store.mark_read(rec.id).await.unwrap();

        assert_eq!(purge_once(&store, 30).await.unwrap(), 0);
        assert_eq!(store.len(), 1);
    }
}
