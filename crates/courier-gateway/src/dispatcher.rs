use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::trace;
use uuid::Uuid;

use courier_types::events::ServerEvent;

/// Per-user addressable fan-out for push delivery.
///
/// A user may hold several simultaneous subscribers (multiple tabs or
/// devices); every event addressed to the user is cloned to each of them.
/// Delivery is best-effort, at-most-once, with no backlog — a user with zero
/// subscribers at emission time simply misses the event, and polling
/// recovers the state.
///
/// The handle is cheap to clone and is passed explicitly into everything
/// that publishes or subscribes; there is no ambient global hub.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// user_id -> (conn_id -> sender), one entry per open connection
    user_channels: RwLock<HashMap<Uuid, HashMap<Uuid, mpsc::UnboundedSender<ServerEvent>>>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                user_channels: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a new subscriber under the user's channel.
    /// Returns (conn_id, receiver).
    pub async fn register(&self, user_id: Uuid) -> (Uuid, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .user_channels
            .write()
            .await
            .entry(user_id)
            .or_default()
            .insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Remove exactly one subscriber. Takes effect immediately — no event
    /// emitted after this call reaches the removed connection.
    pub async fn unregister(&self, user_id: Uuid, conn_id: Uuid) {
        let mut channels = self.inner.user_channels.write().await;
        if let Some(conns) = channels.get_mut(&user_id) {
            conns.remove(&conn_id);
            if conns.is_empty() {
                channels.remove(&user_id);
            }
        }
    }

    /// Emit an event to every subscriber of the user. Zero subscribers means
    /// the event is dropped.
    pub async fn send_to_user(&self, user_id: Uuid, event: ServerEvent) {
        let channels = self.inner.user_channels.read().await;
        match channels.get(&user_id) {
            Some(conns) => {
                for tx in conns.values() {
                    let _ = tx.send(event.clone());
                }
            }
            None => {
                trace!("No subscribers for {}, event dropped", user_id);
            }
        }
    }

    pub async fn subscriber_count(&self, user_id: Uuid) -> usize {
        self.inner
            .user_channels
            .read()
            .await
            .get(&user_id)
            .map_or(0, |conns| conns.len())
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_types::models::MessageStatus;

    fn status_event() -> ServerEvent {
        ServerEvent::UpdateMessageStatus {
            msg_id: Uuid::new_v4(),
            status: MessageStatus::Delivered,
            content: "aGk=".into(),
        }
    }

    #[tokio::test]
    async fn every_tab_of_a_user_receives_the_event() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (_tab1, mut rx1) = dispatcher.register(user).await;
        let (_tab2, mut rx2) = dispatcher.register(user).await;
        assert_eq!(dispatcher.subscriber_count(user).await, 2);

        let event = status_event();
        dispatcher.send_to_user(user, event.clone()).await;

        assert_eq!(rx1.try_recv().unwrap(), event);
        assert_eq!(rx2.try_recv().unwrap(), event);
    }

    #[tokio::test]
    async fn unregister_stops_delivery_immediately() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (conn, mut rx) = dispatcher.register(user).await;
        dispatcher.unregister(user, conn).await;
        assert_eq!(dispatcher.subscriber_count(user).await, 0);

        dispatcher.send_to_user(user, status_event()).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn events_to_absent_users_are_dropped_silently() {
        let dispatcher = Dispatcher::new();
        // no registration at all — must not panic or block
        dispatcher.send_to_user(Uuid::new_v4(), status_event()).await;
    }

    #[tokio::test]
    async fn unregister_of_one_tab_leaves_the_other() {
        let dispatcher = Dispatcher::new();
        let user = Uuid::new_v4();

        let (tab1, mut rx1) = dispatcher.register(user).await;
        let (_tab2, mut rx2) = dispatcher.register(user).await;

        dispatcher.unregister(user, tab1).await;
        dispatcher.send_to_user(user, status_event()).await;

        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }
}
