use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::MessageResponse;
use crate::models::MessageStatus;

/// Commands sent FROM client TO server over the push channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    /// Bind this connection to a user's channel. Must be the first command.
    Join { user_id: Uuid },

    /// Send a message. `from` must match the joined user.
    SendMessage {
        from: Uuid,
        to: Uuid,
        /// Opaque body, base64-encoded.
        content: String,
    },

    /// The recipient's client confirms it holds the message.
    MessageDeliveredAck { msg_id: Uuid },

    /// The recipient opened the thread and viewed the message.
    MessageSeen { msg_id: Uuid },
}

/// Events sent FROM server TO client over the push channel.
///
/// Delivery is best-effort, at-most-once, with no backlog: a user with zero
/// subscribers at emission time simply misses the event, and the polling
/// surface recovers the state on the next cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Acknowledgement to the sender's channel, so every tab of the sender
    /// sees the message it just sent.
    MessageSent { message: MessageResponse },

    /// A new message, emitted to the recipient's channel.
    MessageReceived { message: MessageResponse },

    /// A message advanced to `delivered` or `seen`. Emitted to the original
    /// sender's channel only — the actor who caused the transition already
    /// knows.
    UpdateMessageStatus {
        msg_id: Uuid,
        status: MessageStatus,
        content: String,
    },
}
