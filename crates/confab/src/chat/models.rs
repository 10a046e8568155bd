//! Chat data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A message accepted by the relay, not yet persisted.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub content: String,
    pub sender_id: String,
    pub conversation_id: String,
    pub is_owner: bool,
    /// Server-side receipt time. Also becomes the conversation's new
    /// activity timestamp.
    pub created_at: DateTime<Utc>,
}

/// A message row as stored. Timestamps are kept as RFC 3339 text.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: String,
    pub content: String,
    pub sender_id: String,
    pub is_owner: bool,
    pub created_at: String,
}
