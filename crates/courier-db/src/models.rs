//! Database row types — these map directly to SQLite rows.
//! Distinct from the courier-types API models to keep the DB layer
//! independent; conversion happens here.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use courier_types::models::{Message, MessageStatus, Presence, User};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub status: String,
    pub last_seen: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: Vec<u8>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

/// SQLite stores timestamps as TEXT. Migrations write
/// `YYYY-MM-DD HH:MM:SS.SSS`; older rows may lack the fractional part, and
/// anything imported may carry a timezone. Parse tolerantly, warn on garbage.
pub fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|ndt| ndt.and_utc())
        })
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|| {
            warn!("Corrupt timestamp '{}'", raw);
            DateTime::default()
        })
}

fn parse_uuid(raw: &str, what: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}': {}", what, raw, e);
        Uuid::default()
    })
}

impl MessageRow {
    pub fn into_message(self) -> Message {
        let status = MessageStatus::parse(&self.status).unwrap_or_else(|| {
            warn!("Corrupt status '{}' on message '{}'", self.status, self.id);
            MessageStatus::Sent
        });
        Message {
            id: parse_uuid(&self.id, "message id"),
            from: parse_uuid(&self.sender_id, "sender_id"),
            to: parse_uuid(&self.recipient_id, "recipient_id"),
            content: self.content,
            status,
            created_at: parse_timestamp(&self.created_at),
            updated_at: parse_timestamp(&self.updated_at),
        }
    }
}

impl UserRow {
    pub fn into_user(self) -> User {
        let status = Presence::parse(&self.status).unwrap_or_else(|| {
            warn!("Corrupt status '{}' on user '{}'", self.status, self.id);
            Presence::Offline
        });
        User {
            id: parse_uuid(&self.id, "user id"),
            username: self.username,
            status,
            last_seen: parse_timestamp(&self.last_seen),
            created_at: parse_timestamp(&self.created_at),
        }
    }
}
