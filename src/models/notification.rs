use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::metadata::EventMetadata;
use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Unread,
    Read,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Unread => "unread",
            NotificationStatus::Read => "read",
        }
    }
}

impl std::str::FromStr for NotificationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unread" => Ok(NotificationStatus::Unread),
            "read" => Ok(NotificationStatus::Read),
            other => anyhow::bail!("unknown notification status: {}", other),
        }
    }
}

/// One persisted notification. Created once per event, only ever mutated
/// by marking it read.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub id: Uuid,
    pub title: String,
    /// Open set of event tags ("like", "comment", "invite", ...).
    pub category: String,
    pub body: String,
    pub status: NotificationStatus,
    pub created_at: DateTime<Utc>,
    pub metadata: EventMetadata,
}

impl NotificationRecord {
    pub fn recipient(&self) -> &str {
        &self.metadata.user_id
    }

    pub fn is_unread(&self) -> bool {
        self.status == NotificationStatus::Unread
    }
}

/// Write-side input for `NotificationStore::create`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub title: String,
    pub category: String,
    pub body: String,
    pub metadata: EventMetadata,
}

impl NewNotification {
    pub fn new(
        title: impl Into<String>,
        category: impl Into<String>,
        body: impl Into<String>,
        metadata: EventMetadata,
    ) -> Self {
        Self {
            title: title.into(),
            category: category.into(),
            body: body.into(),
            metadata,
        }
    }

    /// Title, body and the metadata's required ids must be present.
    /// `category` is a free-form tag and may be empty.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.title.trim().is_empty() {
            return Err(AppError::validation("title is required"));
        }
        if self.body.trim().is_empty() {
            return Err(AppError::validation("body is required"));
        }
        self.metadata.validate()
    }

    pub fn recipient(&self) -> &str {
        &self.metadata.user_id
    }
}
