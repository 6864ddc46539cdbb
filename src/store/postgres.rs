use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{NotificationStore, ProfileStore};
use crate::errors::AppError;
use crate::models::metadata::EventMetadata;
use crate::models::notification::{NewNotification, NotificationRecord, NotificationStatus};

const RECORD_COLUMNS: &str = "id, title, category, body, status, created_at, \
     group_id, idea_id, user_id, member_id, initiator_id, display_name, type_id";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations from the migrations/ directory.
    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Flat row shape; metadata lives in its own columns so the recipient
/// (`user_id`) can be indexed.
#[derive(Debug, sqlx::FromRow)]
pub struct NotificationRow {
    pub id: Uuid,
    pub title: String,
    pub category: String,
    pub body: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub group_id: Option<String>,
    pub idea_id: Option<String>,
    pub user_id: String,
    pub member_id: Option<String>,
    pub initiator_id: Option<String>,
    pub display_name: Option<String>,
    pub type_id: String,
}

impl TryFrom<NotificationRow> for NotificationRecord {
    type Error = AppError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let status: NotificationStatus = row.status.parse()?;
        Ok(NotificationRecord {
            id: row.id,
            title: row.title,
            category: row.category,
            body: row.body,
            status,
            created_at: row.created_at,
            metadata: EventMetadata {
                group_id: row.group_id,
                idea_id: row.idea_id,
                user_id: row.user_id,
                member_id: row.member_id,
                initiator_id: row.initiator_id,
                display_name: row.display_name,
                type_id: row.type_id,
            },
        })
    }
}

fn into_records(rows: Vec<NotificationRow>) -> Result<Vec<NotificationRecord>, AppError> {
    rows.into_iter().map(NotificationRecord::try_from).collect()
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn create(&self, new: &NewNotification) -> Result<NotificationRecord, AppError> {
        let meta = &new.metadata;
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"INSERT INTO notifications
                 (id, title, category, body, status,
                  group_id, idea_id, user_id, member_id, initiator_id, display_name, type_id)
               VALUES ($1, $2, $3, $4, 'unread', $5, $6, $7, $8, $9, $10, $11)
               RETURNING {}"#,
            RECORD_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(&new.title)
        .bind(&new.category)
        .bind(&new.body)
        .bind(&meta.group_id)
        .bind(&meta.idea_id)
        .bind(&meta.user_id)
        .bind(&meta.member_id)
        .bind(&meta.initiator_id)
        .bind(&meta.display_name)
        .bind(&meta.type_id)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn list_unread(&self, user_id: &str) -> Result<Vec<NotificationRecord>, AppError> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"SELECT {} FROM notifications
               WHERE user_id = $1 AND status = 'unread'
               ORDER BY created_at DESC"#,
            RECORD_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        into_records(rows)
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<NotificationRecord>, AppError> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"SELECT {} FROM notifications
               WHERE user_id = $1
               ORDER BY created_at DESC
               LIMIT $2"#,
            RECORD_COLUMNS
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        into_records(rows)
    }

    async fn count_unread(&self, user_id: &str) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND status = 'unread'"#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn mark_read(&self, id: Uuid) -> Result<NotificationRecord, AppError> {
        // No status guard in the WHERE clause: re-marking a read record
        // must still return it.
        let row = sqlx::query_as::<_, NotificationRow>(&format!(
            r#"UPDATE notifications SET status = 'read'
               WHERE id = $1
               RETURNING {}"#,
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(AppError::NotFound)?.try_into()
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"UPDATE notifications SET status = 'read' WHERE user_id = $1 AND status = 'unread'"#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn purge_read_before(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"DELETE FROM notifications WHERE status = 'read' AND created_at < $1"#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for PgStore {
    async fn push_token(&self, user_id: &str) -> Result<Option<String>, AppError> {
        let token = sqlx::query_scalar::<_, Option<String>>(
            r#"SELECT push_token FROM profiles WHERE user_id = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(token.flatten().filter(|t| !t.trim().is_empty()))
    }

    async fn set_push_token(&self, user_id: &str, token: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"INSERT INTO profiles (user_id, push_token, updated_at)
               VALUES ($1, $2, NOW())
               ON CONFLICT (user_id)
               DO UPDATE SET push_token = EXCLUDED.push_token, updated_at = NOW()"#,
        )
        .bind(user_id)
        .bind(token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
