//! Store-and-fan-out orchestration shared by the push channel and the REST
//! surface: both create messages and advance statuses the same way, the only
//! difference being how failures surface (REST propagates, push logs and
//! drops).

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use thiserror::Error;
use tokio::task;
use uuid::Uuid;

use courier_db::{Database, StoreError};
use courier_types::api::MessageResponse;
use courier_types::events::ServerEvent;
use courier_types::models::{Message, MessageStatus};

use crate::dispatcher::Dispatcher;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("{0}")]
    Validation(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("store task failed: {0}")]
    TaskJoin(#[from] task::JoinError),
}

/// Rejects bad input before any state changes: missing parties or content,
/// or a self-addressed message.
pub fn validate_send(from: Uuid, to: Uuid, content: &[u8]) -> Result<(), SendError> {
    if from.is_nil() {
        return Err(SendError::Validation("missing sender"));
    }
    if to.is_nil() {
        return Err(SendError::Validation("missing recipient"));
    }
    if content.is_empty() {
        return Err(SendError::Validation("missing content"));
    }
    if from == to {
        return Err(SendError::Validation("sender and recipient must differ"));
    }
    Ok(())
}

/// Creates the message (status 'sent'), records the sender's liveness
/// (sending proves the user is alive), then fans out: the full message to
/// the recipient's channel, and the same message to the sender's channel so
/// the sender's other tabs stay in sync.
pub async fn send_message(
    db: &Arc<Database>,
    dispatcher: &Dispatcher,
    from: Uuid,
    to: Uuid,
    content: Vec<u8>,
) -> Result<Message, SendError> {
    validate_send(from, to, &content)?;

    let store = db.clone();
    let (sender_id, recipient_id) = (from.to_string(), to.to_string());
    let row = task::spawn_blocking(move || {
        let row = store.insert_message(&sender_id, &recipient_id, &content)?;
        store.touch_liveness(&sender_id)?;
        Ok::<_, StoreError>(row)
    })
    .await??;

    let message = row.into_message();
    let wire = MessageResponse::from(&message);

    dispatcher
        .send_to_user(to, ServerEvent::MessageReceived { message: wire.clone() })
        .await;
    dispatcher
        .send_to_user(from, ServerEvent::MessageSent { message: wire })
        .await;

    Ok(message)
}

/// Conditionally advances a message's status and notifies the original
/// sender's channel — the actor who caused the transition already knows.
/// Returns `None` (and emits nothing) when the message already held an
/// equal-or-higher status.
pub async fn advance_status(
    db: &Arc<Database>,
    dispatcher: &Dispatcher,
    msg_id: Uuid,
    target: MessageStatus,
) -> Result<Option<Message>, SendError> {
    let store = db.clone();
    let id = msg_id.to_string();
    let advanced = task::spawn_blocking(move || match target {
        MessageStatus::Delivered => store.mark_delivered(&id),
        MessageStatus::Seen => store.mark_seen(&id),
        // 'sent' is the initial state, there is nothing to advance to
        MessageStatus::Sent => Ok(None),
    })
    .await??;

    let Some(row) = advanced else {
        return Ok(None);
    };

    let message = row.into_message();
    dispatcher
        .send_to_user(
            message.from,
            ServerEvent::UpdateMessageStatus {
                msg_id: message.id,
                status: message.status,
                content: B64.encode(&message.content),
            },
        )
        .await;

    Ok(Some(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<Database>, Dispatcher, Uuid, Uuid) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        db.create_user(&alice.to_string(), "alice").unwrap();
        db.create_user(&bob.to_string(), "bob").unwrap();
        (db, Dispatcher::new(), alice, bob)
    }

    #[tokio::test]
    async fn send_notifies_recipient_and_acks_sender() {
        let (db, dispatcher, alice, bob) = setup();
        let (_conn_a, mut rx_a) = dispatcher.register(alice).await;
        let (_conn_b, mut rx_b) = dispatcher.register(bob).await;

        let message = send_message(&db, &dispatcher, alice, bob, b"hi".to_vec())
            .await
            .unwrap();
        assert_eq!(message.status, MessageStatus::Sent);

        match rx_b.try_recv().unwrap() {
            ServerEvent::MessageReceived { message: m } => assert_eq!(m.id, message.id),
            other => panic!("recipient got {:?}", other),
        }
        match rx_a.try_recv().unwrap() {
            ServerEvent::MessageSent { message: m } => assert_eq!(m.id, message.id),
            other => panic!("sender got {:?}", other),
        }
    }

    #[tokio::test]
    async fn status_advance_notifies_only_the_original_sender() {
        let (db, dispatcher, alice, bob) = setup();
        let message = send_message(&db, &dispatcher, alice, bob, b"hi".to_vec())
            .await
            .unwrap();

        let (_conn_a, mut rx_a) = dispatcher.register(alice).await;
        let (_conn_b, mut rx_b) = dispatcher.register(bob).await;

        // bob acks delivery; alice is told, bob is not
        let advanced = advance_status(&db, &dispatcher, message.id, MessageStatus::Delivered)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(advanced.status, MessageStatus::Delivered);

        match rx_a.try_recv().unwrap() {
            ServerEvent::UpdateMessageStatus { msg_id, status, .. } => {
                assert_eq!(msg_id, message.id);
                assert_eq!(status, MessageStatus::Delivered);
            }
            other => panic!("sender got {:?}", other),
        }
        assert!(rx_b.try_recv().is_err());

        // bob opens the thread
        let seen = advance_status(&db, &dispatcher, message.id, MessageStatus::Seen)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(seen.status, MessageStatus::Seen);
        assert!(matches!(
            rx_a.try_recv().unwrap(),
            ServerEvent::UpdateMessageStatus { status: MessageStatus::Seen, .. }
        ));
    }

    #[tokio::test]
    async fn noop_advance_emits_nothing() {
        let (db, dispatcher, alice, bob) = setup();
        let message = send_message(&db, &dispatcher, alice, bob, b"hi".to_vec())
            .await
            .unwrap();
        advance_status(&db, &dispatcher, message.id, MessageStatus::Seen)
            .await
            .unwrap();

        let (_conn_a, mut rx_a) = dispatcher.register(alice).await;
        let outcome = advance_status(&db, &dispatcher, message.id, MessageStatus::Delivered)
            .await
            .unwrap();
        assert!(outcome.is_none());
        assert!(rx_a.try_recv().is_err());
    }

    #[tokio::test]
    async fn dropped_push_still_lands_in_the_store() {
        let (db, dispatcher, alice, bob) = setup();

        // bob has no subscriber at emission time: the push is dropped,
        // but the next poll of the conversation still returns the message
        let message = send_message(&db, &dispatcher, alice, bob, b"hi".to_vec())
            .await
            .unwrap();

        let rows = db
            .conversation_messages(&alice.to_string(), &bob.to_string())
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, message.id.to_string());
        assert_eq!(rows[0].status, "sent");
    }

    #[tokio::test]
    async fn validation_rejects_before_any_state_change() {
        let (db, dispatcher, alice, _bob) = setup();

        assert!(matches!(
            send_message(&db, &dispatcher, alice, alice, b"hi".to_vec()).await,
            Err(SendError::Validation(_))
        ));
        assert!(matches!(
            send_message(&db, &dispatcher, alice, Uuid::new_v4(), vec![]).await,
            Err(SendError::Validation(_))
        ));

        let rows = db.messages_involving(&alice.to_string()).unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn advancing_unknown_message_is_not_found() {
        let (db, dispatcher, _alice, _bob) = setup();
        let outcome =
            advance_status(&db, &dispatcher, Uuid::new_v4(), MessageStatus::Delivered).await;
        assert!(matches!(
            outcome,
            Err(SendError::Store(StoreError::NotFound(_)))
        ));
    }
}
