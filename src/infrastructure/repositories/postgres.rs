use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Pool, Postgres};
use uuid::Uuid;

use crate::domain::{
    models::{Message, MessageStatus, NewMessage},
    repositories::MessageRepository,
};

pub type PgPool = Pool<Postgres>;

pub async fn migrate(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("failed to run database migrations")
}

#[derive(Clone)]
pub struct PostgresMessageRepository {
    pool: PgPool,
}

impl PostgresMessageRepository {
    pub fn new(pool: PgPool) -> Arc<Self> {
        Arc::new(Self { pool })
    }
}

#[async_trait]
impl MessageRepository for PostgresMessageRepository {
    async fn create(&self, message: &NewMessage) -> anyhow::Result<Message> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            INSERT INTO messages (content, phone, status)
            VALUES ($1, $2, $3::message_status)
            RETURNING id, created_at, updated_at, content, phone, status::text AS status
            "#,
        )
        .bind(&message.content)
        .bind(&message.phone)
        .bind(message.status.as_str())
        .fetch_one(&self.pool)
        .await?;
        record.try_into()
    }

    async fn find_all_by_status(&self, status: MessageStatus) -> anyhow::Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, created_at, updated_at, content, phone, status::text AS status
            FROM messages
            WHERE status = $1::message_status
            ORDER BY created_at DESC
            "#,
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|record| record.try_into()).collect()
    }

    async fn find_by_id(&self, id: &Uuid) -> anyhow::Result<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, created_at, updated_at, content, phone, status::text AS status
            FROM messages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        record.map(|record| record.try_into()).transpose()
    }

    async fn update_all_statuses_by_status(
        &self,
        from: MessageStatus,
        to: MessageStatus,
    ) -> anyhow::Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET status = $1::message_status, updated_at = now()
            WHERE status = $2::message_status
            "#,
        )
        .bind(to.as_str())
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[derive(Debug, FromRow)]
struct MessageRecord {
    id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    content: String,
    phone: String,
    status: String,
}

impl TryFrom<MessageRecord> for Message {
    type Error = anyhow::Error;

    fn try_from(record: MessageRecord) -> Result<Self, Self::Error> {
        let status = MessageStatus::from_str(&record.status)
            .ok_or_else(|| anyhow::anyhow!("unknown message status {}", record.status))?;
        Ok(Message {
            id: record.id,
            created_at: record.created_at,
            updated_at: record.updated_at,
            content: record.content,
            phone: record.phone,
            status,
        })
    }
}
