use std::collections::{HashMap, HashSet};

use axum::Json;
use axum::extract::{Query, State};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use courier_db::StoreError;
use courier_types::api::{ConversationSummary, ConversationsQuery};
use courier_types::models::{Message, User};

use crate::error::ApiError;
use crate::presence::effective_presence;
use crate::state::AppState;

/// Latest message per peer. The input is an ascending scan (creation time,
/// then insertion order), so the last write per peer wins: the retained
/// message carries the maximum `created_at`, with exact-timestamp ties going
/// to the most recently inserted.
pub fn latest_message_per_peer(user_id: Uuid, messages: &[Message]) -> HashMap<Uuid, &Message> {
    let mut latest = HashMap::new();
    for m in messages {
        let peer = if m.from == user_id { m.to } else { m.from };
        latest.insert(peer, m);
    }
    latest
}

/// getConversations: one summary per peer the user has exchanged messages
/// with — most recent message plus the peer's current presence. Output order
/// is not contractual; most-recent-first is for display.
pub async fn get_conversations(
    State(state): State<AppState>,
    Query(query): Query<ConversationsQuery>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let user_id = query.user_id;
    let db = state.db.clone();
    let uid = user_id.to_string();

    let (messages, peers) = tokio::task::spawn_blocking(move || {
        let rows = db.messages_involving(&uid)?;

        let peer_ids: Vec<String> = rows
            .iter()
            .map(|r| {
                if r.sender_id == uid {
                    r.recipient_id.clone()
                } else {
                    r.sender_id.clone()
                }
            })
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let peers = db.users_by_ids(&peer_ids)?;

        let messages: Vec<Message> = rows.into_iter().map(|r| r.into_message()).collect();
        Ok::<_, StoreError>((messages, peers))
    })
    .await??;

    let peers_by_id: HashMap<Uuid, User> = peers
        .into_iter()
        .map(|row| row.into_user())
        .map(|user| (user.id, user))
        .collect();

    let now = Utc::now();
    let mut summaries: Vec<ConversationSummary> = latest_message_per_peer(user_id, &messages)
        .into_iter()
        .filter_map(|(peer_id, message)| {
            let Some(peer) = peers_by_id.get(&peer_id) else {
                warn!("Message {} references unknown peer {}", message.id, peer_id);
                return None;
            };
            Some(ConversationSummary {
                peer_id,
                username: peer.username.clone(),
                last_message: B64.encode(&message.content),
                last_message_at: message.created_at,
                status: effective_presence(peer, state.presence_window_secs, now),
                last_seen: peer.last_seen,
            })
        })
        .collect();

    summaries.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
    Ok(Json(summaries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use courier_types::models::MessageStatus;

    fn uid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    fn msg(id: u128, from: Uuid, to: Uuid, at: i64) -> Message {
        Message {
            id: uid(id),
            from,
            to,
            content: b"x".to_vec(),
            status: MessageStatus::Sent,
            created_at: DateTime::from_timestamp(at, 0).unwrap(),
            updated_at: DateTime::from_timestamp(at, 0).unwrap(),
        }
    }

    #[test]
    fn keeps_the_most_recent_message_per_peer() {
        let (a, b, c) = (uid(1), uid(2), uid(3));
        // a -> b at t=100, a -> c at t=90, b -> a at t=50
        let messages = vec![
            msg(10, b, a, 50),
            msg(11, a, c, 90),
            msg(12, a, b, 100),
        ];

        let latest = latest_message_per_peer(a, &messages);
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[&b].id, uid(12));
        assert_eq!(latest[&c].id, uid(11));

        // sorted by last_message_at descending: b before c
        let mut order: Vec<(Uuid, i64)> = latest
            .iter()
            .map(|(peer, m)| (*peer, m.created_at.timestamp()))
            .collect();
        order.sort_by(|x, y| y.1.cmp(&x.1));
        assert_eq!(order[0].0, b);
        assert_eq!(order[1].0, c);
    }

    #[test]
    fn timestamp_ties_go_to_the_most_recently_inserted() {
        let (a, b) = (uid(1), uid(2));
        let messages = vec![msg(10, a, b, 100), msg(11, b, a, 100)];

        let latest = latest_message_per_peer(a, &messages);
        assert_eq!(latest[&b].id, uid(11));
    }

    #[test]
    fn direction_does_not_matter() {
        let (a, b) = (uid(1), uid(2));
        let messages = vec![msg(10, b, a, 100)];

        let latest = latest_message_per_peer(a, &messages);
        assert_eq!(latest[&b].id, uid(10));
    }
}
