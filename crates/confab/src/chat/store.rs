//! Message store trait and its SQLite implementation.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use super::models::{NewMessage, StoredMessage};

/// Persistence gateway used by the relay.
///
/// The relay calls this from the connection loop that received the message
/// and treats failures as non-fatal: delivery to the room proceeds either
/// way.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist a message, returning its durable id.
    async fn save_message(&self, message: &NewMessage) -> Result<String>;

    /// Move a conversation's activity timestamp forward.
    async fn touch_conversation(
        &self,
        conversation_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<()>;

    /// Total number of stored messages, for diagnostics.
    async fn message_count(&self) -> Result<i64>;
}

/// [`MessageStore`] backed by the SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteMessageStore {
    pool: SqlitePool,
}

impl SqliteMessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a conversation row. Conversations are normally created by the
    /// management surface; this exists for fixtures and tests.
    pub async fn insert_conversation(&self, id: &str, updated_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("INSERT INTO conversations (id, updated_at) VALUES (?, ?)")
            .bind(id)
            .bind(updated_at.to_rfc3339())
            .execute(&self.pool)
            .await
            .context("creating conversation")?;
        Ok(())
    }

    /// Read back a conversation's activity timestamp.
    pub async fn conversation_updated_at(&self, id: &str) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT updated_at FROM conversations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("fetching conversation timestamp")
    }

    /// All messages in a conversation, oldest first.
    pub async fn find_by_conversation(&self, conversation_id: &str) -> Result<Vec<StoredMessage>> {
        let messages = sqlx::query_as::<_, StoredMessage>(
            r#"
            SELECT id, conversation_id, content, sender_id, is_owner, created_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .context("fetching conversation messages")?;
        Ok(messages)
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn save_message(&self, message: &NewMessage) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, content, sender_id, is_owner, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&message.conversation_id)
        .bind(&message.content)
        .bind(&message.sender_id)
        .bind(message.is_owner)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("saving message")?;

        Ok(id)
    }

    async fn touch_conversation(
        &self,
        conversation_id: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        // No-op when the conversation row does not exist yet; the relay
        // does not own conversation creation.
        sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(timestamp.to_rfc3339())
            .bind(conversation_id)
            .execute(&self.pool)
            .await
            .context("updating conversation timestamp")?;
        Ok(())
    }

    async fn message_count(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await
            .context("counting messages")
    }
}
