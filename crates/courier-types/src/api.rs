use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, MessageStatus, Presence};

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub from: Uuid,
    pub to: Uuid,
    /// Opaque message body, base64-encoded.
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub from: Uuid,
    pub to: Uuid,
}

/// Wire shape of a message, shared by the REST surface and the push channel.
/// Content rides as base64 so the opaque bytes survive JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub from: Uuid,
    pub to: Uuid,
    pub content: String,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Message> for MessageResponse {
    fn from(m: &Message) -> Self {
        Self {
            id: m.id,
            from: m.from,
            to: m.to,
            content: B64.encode(&m.content),
            status: m.status,
            created_at: m.created_at,
            updated_at: m.updated_at,
        }
    }
}

// -- Presence --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LivenessRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OfflineRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct UserStatusResponse {
    pub user_id: Uuid,
    pub username: String,
    pub status: Presence,
    pub last_seen: DateTime<Utc>,
}

// -- Users --

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct UserSummary {
    pub user_id: Uuid,
    pub username: String,
    pub status: Presence,
    pub last_seen: DateTime<Utc>,
}

// -- Conversations --

#[derive(Debug, Deserialize)]
pub struct ConversationsQuery {
    pub user_id: Uuid,
}

/// Derived per-peer summary: the most recent message exchanged with the peer
/// plus the peer's current presence. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub peer_id: Uuid,
    pub username: String,
    /// Content of the most recent message, base64-encoded.
    pub last_message: String,
    pub last_message_at: DateTime<Utc>,
    pub status: Presence,
    pub last_seen: DateTime<Utc>,
}
