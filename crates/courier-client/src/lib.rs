//! Client-side reconciliation for an open conversation.
//!
//! A client holds three layers of truth: the latest authoritative poll
//! snapshot, events already applied from the push channel, and locally
//! created optimistic messages the store has not yet confirmed. The merge in
//! [`merge`] folds them into one consistent, duplicate-free, ordered view —
//! independent of any transport, so it can be exercised with plain in-memory
//! lists.

pub mod merge;

pub use merge::{ConversationView, OptimisticEntry, ViewMessage};

use std::time::Duration;

/// Poll cadence for an open conversation. Polling is the correctness
/// backstop: push delivery is best-effort and may be silently dropped.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Liveness refresh cadence. Must stay well inside the server's inactivity
/// window (180 s by default) or the user flickers offline between beats.
pub const LIVENESS_REFRESH_INTERVAL: Duration = Duration::from_secs(10);
