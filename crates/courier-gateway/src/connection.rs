use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use futures_util::{SinkExt, StreamExt};
use tokio::task;
use tracing::{info, warn};
use uuid::Uuid;

use courier_db::{Database, StoreError};
use courier_types::events::ClientCommand;
use courier_types::models::MessageStatus;

use crate::delivery::{self, SendError};
use crate::dispatcher::Dispatcher;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long a fresh connection may sit silent before its `join` arrives.
const JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle a single WebSocket connection: wait for `join`, then run the
/// event loop until either side closes.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    store_timeout: Duration,
) {
    let (sender, mut receiver) = socket.split();

    let user_id = match wait_for_join(&mut receiver).await {
        Some(id) => id,
        None => {
            warn!("WebSocket client failed to join, closing");
            return;
        }
    };

    info!("{} connected to gateway", user_id);

    run_connection_loop(sender, receiver, dispatcher, db, store_timeout, user_id).await;
}

/// The connection is a long-lived task reading a stream of typed client
/// commands and writing a stream of typed server events; it suspends only
/// while idle waiting for the next event, never while holding a lock.
async fn run_connection_loop(
    mut sender: futures_util::stream::SplitSink<WebSocket, WsMessage>,
    mut receiver: futures_util::stream::SplitStream<WebSocket>,
    dispatcher: Dispatcher,
    db: Arc<Database>,
    store_timeout: Duration,
    user_id: Uuid,
) {
    // Joining is a liveness event
    record_liveness(&db, store_timeout, user_id).await;

    let (conn_id, mut user_rx) = dispatcher.register(user_id).await;

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = user_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Failed to encode event for {}: {}", user_id, e);
                            continue;
                        }
                    };
                    if sender.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let dispatcher_recv = dispatcher.clone();
    let db_recv = db.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                WsMessage::Text(text) => {
                    match serde_json::from_str::<ClientCommand>(&text) {
                        Ok(cmd) => {
                            handle_command(&dispatcher_recv, &db_recv, store_timeout, user_id, cmd)
                                .await;
                        }
                        Err(e) => {
                            warn!(
                                "{} bad command: {} -- raw: {}",
                                user_id,
                                e,
                                &text[..text.len().min(200)]
                            );
                        }
                    }
                }
                WsMessage::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Remove this subscriber immediately. Presence is NOT flipped here: the
    // user may hold another tab, and the sweep or the explicit offline
    // beacon owns the offline transition.
    dispatcher.unregister(user_id, conn_id).await;
    info!("{} disconnected from gateway", user_id);
}

async fn wait_for_join(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
) -> Option<Uuid> {
    let timeout = tokio::time::timeout(JOIN_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let WsMessage::Text(text) = msg {
                if let Ok(ClientCommand::Join { user_id }) =
                    serde_json::from_str::<ClientCommand>(&text)
                {
                    return Some(user_id);
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

/// Push-path handlers never propagate failures: every store call is bounded
/// by the configured timeout, and on timeout or error the event is logged
/// and dropped — the next poll cycle recovers. Nothing here tears down the
/// connection, so one user's failure cannot take out another's.
async fn handle_command(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    store_timeout: Duration,
    user_id: Uuid,
    cmd: ClientCommand,
) {
    match cmd {
        ClientCommand::Join { .. } => {} // Already handled

        ClientCommand::SendMessage { from, to, content } => {
            if from != user_id {
                warn!("{} tried to send as {}, dropped", user_id, from);
                return;
            }
            let content = match B64.decode(&content) {
                Ok(content) => content,
                Err(e) => {
                    warn!("{} sent undecodable content: {}", user_id, e);
                    return;
                }
            };

            let outcome = tokio::time::timeout(
                store_timeout,
                delivery::send_message(db, dispatcher, from, to, content),
            )
            .await;
            match outcome {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("{} send dropped: {}", user_id, e),
                Err(_) => warn!("{} send timed out against the store, dropped", user_id),
            }
        }

        ClientCommand::MessageDeliveredAck { msg_id } => {
            advance(dispatcher, db, store_timeout, user_id, msg_id, MessageStatus::Delivered).await;
        }

        ClientCommand::MessageSeen { msg_id } => {
            advance(dispatcher, db, store_timeout, user_id, msg_id, MessageStatus::Seen).await;
        }
    }
}

async fn advance(
    dispatcher: &Dispatcher,
    db: &Arc<Database>,
    store_timeout: Duration,
    user_id: Uuid,
    msg_id: Uuid,
    target: MessageStatus,
) {
    let outcome = tokio::time::timeout(
        store_timeout,
        delivery::advance_status(db, dispatcher, msg_id, target),
    )
    .await;
    match outcome {
        Ok(Ok(_)) => {}
        // unknown id is a logged no-op, not a failure
        Ok(Err(SendError::Store(StoreError::NotFound(_)))) => {
            warn!("{} acked unknown message {}", user_id, msg_id);
        }
        Ok(Err(e)) => warn!("{} status update dropped: {}", user_id, e),
        Err(_) => warn!("{} status update timed out against the store, dropped", user_id),
    }
}

async fn record_liveness(db: &Arc<Database>, store_timeout: Duration, user_id: Uuid) {
    let store = db.clone();
    let id = user_id.to_string();
    let outcome = tokio::time::timeout(
        store_timeout,
        task::spawn_blocking(move || store.touch_liveness(&id)),
    )
    .await;
    match outcome {
        Ok(Ok(Ok(true))) => {}
        Ok(Ok(Ok(false))) => warn!("Liveness for unknown user {}", user_id),
        Ok(Ok(Err(e))) => warn!("Liveness update for {} dropped: {}", user_id, e),
        Ok(Err(e)) => warn!("Liveness task for {} failed: {}", user_id, e),
        Err(_) => warn!("Liveness update for {} timed out, dropped", user_id),
    }
}
