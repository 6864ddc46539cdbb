//! The single "emit event" path every feature uses.
//!
//! Fixed order: validate → persist → push → realtime. Only validation and
//! persistence can fail the call; once the record is written, push and
//! realtime are best-effort and their failures are logged as delivery
//! warnings.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::push::{PushDispatcher, PushMessage, PushOutcome};
use super::realtime::{FanoutOutcome, RealtimeFanout, RealtimeMessage};
use crate::errors::AppError;
use crate::middleware::metrics::METRICS;
use crate::models::notification::{NewNotification, NotificationRecord};
use crate::store::NotificationStore;

#[derive(Clone)]
pub struct EventPipeline {
    store: Arc<dyn NotificationStore>,
    push: PushDispatcher,
    realtime: RealtimeFanout,
}

impl EventPipeline {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        push: PushDispatcher,
        realtime: RealtimeFanout,
    ) -> Self {
        Self {
            store,
            push,
            realtime,
        }
    }

    pub fn store(&self) -> &Arc<dyn NotificationStore> {
        &self.store
    }

    pub fn push(&self) -> &PushDispatcher {
        &self.push
    }

    pub fn realtime(&self) -> &RealtimeFanout {
        &self.realtime
    }

    /// Persist one notification and notify its recipient.
    ///
    /// Returns the persisted record. A validation or store failure aborts
    /// before any delivery is attempted.
    pub async fn create_event(&self, new: NewNotification) -> Result<NotificationRecord, AppError> {
        new.validate()?;

        let record = match self.store.create(&new).await {
            Ok(record) => record,
            Err(e) => {
                METRICS.record_persist_failure();
                warn!(
                    category = %new.category,
                    recipient = %new.recipient(),
                    error = %e,
                    "notification persistence failed, event aborted"
                );
                return Err(e);
            }
        };
        METRICS.record_created(&record.category);
        info!(
            notification_id = %record.id,
            category = %record.category,
            recipient = %record.recipient(),
            "notification created"
        );

        self.dispatch_push(record.recipient(), &record.title, &record.body)
            .await;
        self.notify_realtime(record.recipient(), RealtimeMessage::new_notification(&record))
            .await;

        Ok(record)
    }

    /// Run `create_event` in the background and log the outcome. For
    /// callers whose own action must succeed regardless of notification
    /// delivery.
    pub fn emit_detached(&self, new: NewNotification) {
        let pipeline = self.clone();
        tokio::spawn(async move {
            let category = new.category.clone();
            if let Err(e) = pipeline.create_event(new).await {
                warn!(category = %category, error = %e, "detached notification event failed");
            }
        });
    }

    /// Best-effort push to the user's device.
    pub async fn dispatch_push(&self, user_id: &str, title: &str, body: &str) -> PushOutcome {
        let outcome = self.push.dispatch(user_id, title, body).await;
        METRICS.record_push(outcome.as_str());
        outcome
    }

    /// Best-effort realtime signal to the user's live connections.
    pub async fn notify_realtime(&self, user_id: &str, message: RealtimeMessage) -> FanoutOutcome {
        let outcome = self.realtime.notify(user_id, message).await;
        METRICS.record_realtime(outcome.as_str());
        outcome
    }

    pub async fn send_direct_push(&self, token: &str, message: &PushMessage) -> Result<(), AppError> {
        self.push.send_direct(token, message).await
    }

    // -- Read side, for the client-facing notifications feature --

    pub async fn list_unread(&self, user_id: &str) -> Result<Vec<NotificationRecord>, AppError> {
        self.store.list_unread(user_id).await
    }

    pub async fn list_recent(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<NotificationRecord>, AppError> {
        self.store.list_for_user(user_id, limit.clamp(1, 100)).await
    }

    pub async fn count_unread(&self, user_id: &str) -> Result<i64, AppError> {
        self.store.count_unread(user_id).await
    }

    pub async fn mark_read(&self, id: Uuid) -> Result<NotificationRecord, AppError> {
        self.store.mark_read(id).await
    }

    pub async fn mark_all_read(&self, user_id: &str) -> Result<u64, AppError> {
        self.store.mark_all_read(user_id).await
    }

    // -- Push permission UX --

    pub async fn set_token(&self, user_id: &str, token: &str) -> Result<(), AppError> {
        self.push.set_token(user_id, token).await
    }

    pub async fn has_token(&self, user_id: &str) -> Result<bool, AppError> {
        self.push.has_token(user_id).await
    }
}

// ── Tests ─────────────────────────────────────────────────────
