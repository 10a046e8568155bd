//! Canonical frame types.
//!
//! Every WebSocket text frame carries exactly one JSON object tagged by
//! `type`. Clients send [`ClientFrame`]s, the server answers with
//! [`ServerFrame`]s. Field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A frame sent by a connected client.
///
/// All fields are optional at the decoding layer; the relay validates the
/// ones it needs and silently drops frames that fail validation. A frame
/// whose `type` tag is unknown does not decode at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    /// Enter a conversation room on this connection.
    Join {
        #[serde(default)]
        conversation_id: String,
    },

    /// Exit a conversation room on this connection.
    Leave {
        #[serde(default)]
        conversation_id: String,
    },

    /// Submit a chat message for persistence and fan-out to the room.
    Message {
        #[serde(default)]
        content: String,
        #[serde(default)]
        conversation_id: String,
        #[serde(default)]
        sender_id: String,
        #[serde(default)]
        sender_name: String,
        #[serde(default)]
        is_owner: bool,
    },
}

/// A frame sent by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerFrame {
    /// Point-to-point confirmation that a join took effect.
    JoinAck { data: JoinAckData },

    /// A chat message fanned out to every member of a conversation room,
    /// the sender included.
    NewMessage {
        content: String,
        conversation_id: String,
        sender_id: String,
        sender_name: String,
        is_owner: bool,
        data: NewMessageData,
    },
}

impl ServerFrame {
    /// Build the acknowledgement sent back to a client that joined a room.
    pub fn join_ack(conversation_id: impl Into<String>) -> Self {
        Self::JoinAck {
            data: JoinAckData {
                conversation_id: conversation_id.into(),
                status: "joined".to_string(),
            },
        }
    }
}

/// Payload of a [`ServerFrame::JoinAck`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinAckData {
    /// Room the client is now a member of.
    pub conversation_id: String,

    /// Always `"joined"`.
    pub status: String,
}

/// Persistence details attached to a [`ServerFrame::NewMessage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessageData {
    /// Durable message id. Absent when the message could not be stored;
    /// the frame is still delivered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Server-side receipt time, RFC 3339.
    pub created_at: DateTime<Utc>,

    /// Who wrote the message.
    pub sender: MessageSender,
}

/// Author identity echoed back with a relayed message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSender {
    pub id: String,
    pub name: String,
}
