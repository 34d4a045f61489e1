use std::collections::HashMap;
use std::collections::hash_map::Entry;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use courier_types::models::{Message, MessageStatus};

/// A locally submitted message the store has not yet confirmed. It has no
/// server-assigned id; its only identity is its exact content.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticEntry {
    pub content: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// One row of the merged view. `id` is `None` (and `pending` true) while the
/// entry is still optimistic.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewMessage {
    pub id: Option<Uuid>,
    pub from: Uuid,
    pub to: Uuid,
    pub content: Vec<u8>,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
    pub pending: bool,
}

/// Merge the three layers into one view.
///
/// 1. The authoritative snapshot, keyed by id, is the base of truth.
/// 2. Pushed messages fill ids the last poll has not caught up to; where both
///    layers know an id, the higher status wins.
/// 3. Status overlays from the push channel advance per-id status, never
///    regress it.
/// 4. Optimistic entries whose content matches no authoritative entry are
///    overlaid as pending; a content match means the entry was promoted.
/// 5. Sort ascending by creation time (authoritative before pending, then id,
///    on exact ties).
///
/// Idempotent: the output depends only on the inputs, and re-merging the
/// merged state changes nothing.
pub fn merge(
    snapshot: &[Message],
    pushed: &[Message],
    status_overlay: &HashMap<Uuid, MessageStatus>,
    optimistic: &[OptimisticEntry],
    me: Uuid,
    peer: Uuid,
) -> Vec<ViewMessage> {
    let mut by_id: HashMap<Uuid, ViewMessage> = HashMap::new();

    for m in snapshot {
        by_id.insert(m.id, authoritative(m));
    }

    for m in pushed {
        match by_id.entry(m.id) {
            Entry::Occupied(mut e) => {
                let v = e.get_mut();
                v.status = v.status.max(m.status);
            }
            Entry::Vacant(e) => {
                e.insert(authoritative(m));
            }
        }
    }

    for (id, status) in status_overlay {
        if let Some(v) = by_id.get_mut(id) {
            v.status = v.status.max(*status);
        }
    }

    let mut out: Vec<ViewMessage> = by_id.into_values().collect();

    for o in optimistic {
        let confirmed = out.iter().any(|v| v.content == o.content);
        if !confirmed {
            out.push(ViewMessage {
                id: None,
                from: me,
                to: peer,
                content: o.content.clone(),
                status: MessageStatus::Sent,
                created_at: o.created_at,
                pending: true,
            });
        }
    }

    out.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then(a.pending.cmp(&b.pending))
            .then(a.id.cmp(&b.id))
    });
    out
}

fn authoritative(m: &Message) -> ViewMessage {
    ViewMessage {
        id: Some(m.id),
        from: m.from,
        to: m.to,
        content: m.content.clone(),
        status: m.status,
        created_at: m.created_at,
        pending: false,
    }
}

/// Stateful wrapper over [`merge`] for one open conversation. Feed it poll
/// results and push events as they arrive; read `messages()` whenever any
/// layer changed.
#[derive(Debug)]
pub struct ConversationView {
    me: Uuid,
    peer: Uuid,
    snapshot: Vec<Message>,
    pushed: HashMap<Uuid, Message>,
    status_overlay: HashMap<Uuid, MessageStatus>,
    optimistic: Vec<OptimisticEntry>,
}

impl ConversationView {
    pub fn new(me: Uuid, peer: Uuid) -> Self {
        Self {
            me,
            peer,
            snapshot: Vec::new(),
            pushed: HashMap::new(),
            status_overlay: HashMap::new(),
            optimistic: Vec::new(),
        }
    }

    /// Install a fresh authoritative snapshot. Push-delivered state that the
    /// poll has caught up to (equal-or-newer status) is retired; anything the
    /// poll is still behind on is preserved. Optimistic entries confirmed by
    /// the snapshot are promoted.
    pub fn apply_poll(&mut self, snapshot: Vec<Message>) {
        self.pushed.retain(|id, pushed| {
            match snapshot.iter().find(|s| s.id == *id) {
                Some(s) => s.status < pushed.status,
                None => true,
            }
        });
        self.status_overlay.retain(|id, status| {
            match snapshot.iter().find(|s| s.id == *id) {
                Some(s) => s.status < *status,
                None => true,
            }
        });
        self.optimistic
            .retain(|o| !snapshot.iter().any(|s| s.content == o.content));
        self.snapshot = snapshot;
    }

    /// A full message arrived on the push channel (`messageReceived`, or the
    /// `messageSent` ack for our own send — which promotes the matching
    /// optimistic entry).
    pub fn apply_push(&mut self, message: Message) {
        self.optimistic.retain(|o| o.content != message.content);
        match self.pushed.entry(message.id) {
            Entry::Occupied(mut e) => {
                let v = e.get_mut();
                v.status = v.status.max(message.status);
            }
            Entry::Vacant(e) => {
                e.insert(message);
            }
        }
    }

    /// An `updateMessageStatus` event arrived on the push channel.
    pub fn apply_status(&mut self, id: Uuid, status: MessageStatus) {
        match self.status_overlay.entry(id) {
            Entry::Occupied(mut e) => {
                let v = e.get_mut();
                *v = (*v).max(status);
            }
            Entry::Vacant(e) => {
                e.insert(status);
            }
        }
    }

    /// Record a locally submitted message awaiting store confirmation.
    pub fn push_optimistic(&mut self, content: Vec<u8>, created_at: DateTime<Utc>) {
        self.optimistic.push(OptimisticEntry { content, created_at });
    }

    pub fn messages(&self) -> Vec<ViewMessage> {
        let pushed: Vec<Message> = self.pushed.values().cloned().collect();
        merge(
            &self.snapshot,
            &pushed,
            &self.status_overlay,
            &self.optimistic,
            self.me,
            self.peer,
        )
    }
}
