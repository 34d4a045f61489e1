use rusqlite::Connection;
use uuid::Uuid;

use crate::models::{MessageRow, UserRow};
use crate::{Database, Result, StoreError};

/// SQLite expression for "now" with millisecond precision; plain
/// `datetime('now')` truncates to seconds, which is too coarse to order
/// messages within a burst.
const NOW: &str = "strftime('%Y-%m-%d %H:%M:%f','now')";

const MESSAGE_COLS: &str = "id, sender_id, recipient_id, content, status, created_at, updated_at";
const USER_COLS: &str = "id, username, status, last_seen, created_at";

impl Database {
    // -- Users --

    /// Entry point for the external signup collaborator (and tests).
    /// Presence starts offline; the tracker owns it from here on.
    pub fn create_user(&self, id: &str, username: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username) VALUES (?1, ?2)",
                (id, username),
            )
            .map_err(StoreError::from_sqlite)?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    pub fn search_users(&self, q: &str, limit: u32) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {USER_COLS} FROM users
                 WHERE username LIKE '%' || ?1 || '%'
                 ORDER BY username
                 LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![q, limit], map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch users for a set of ids (aggregator input).
    pub fn users_by_ids(&self, ids: &[String]) -> Result<Vec<UserRow>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> = (1..=ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT {USER_COLS} FROM users WHERE id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::types::ToSql).collect();

            let rows = stmt
                .query_map(params.as_slice(), map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Presence --

    /// Liveness event: login, heartbeat, or sending a message.
    /// Returns false when the user does not exist (logged upstream, not fatal).
    pub fn touch_liveness(&self, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                &format!("UPDATE users SET status = 'online', last_seen = {NOW} WHERE id = ?1"),
                [user_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Explicit logout / unload beacon. Idempotent; racing the sweep still
    /// converges to offline.
    pub fn set_offline(&self, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                &format!("UPDATE users SET status = 'offline', last_seen = {NOW} WHERE id = ?1"),
                [user_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Server-owned inactivity expiry: one conditional UPDATE flips every
    /// online user whose last liveness event is older than the window.
    /// `last_seen` is left at the last liveness time — that is what
    /// "last seen" means to peers.
    pub fn sweep_stale_presence(&self, window_secs: u64) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let cutoff = format!("-{} seconds", window_secs);
            let changed = conn.execute(
                "UPDATE users SET status = 'offline'
                 WHERE status = 'online'
                   AND last_seen < strftime('%Y-%m-%d %H:%M:%f','now', ?1)",
                [&cutoff],
            )?;
            Ok(changed)
        })
    }

    // -- Messages --

    /// Creates a message with status 'sent'. The id is assigned here.
    /// Field validation (empty content, from == to) lives in the API and
    /// gateway layers; the store enforces referential sanity via foreign keys.
    pub fn insert_message(&self, from: &str, to: &str, content: &[u8]) -> Result<MessageRow> {
        let id = Uuid::new_v4().to_string();
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, recipient_id, content) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![id, from, to, content],
            )
            .map_err(StoreError::from_sqlite)?;

            query_message(conn, &id)?.ok_or(StoreError::NotFound("message"))
        })
    }

    /// Advances 'sent' → 'delivered'. The compare and the write are a single
    /// UPDATE statement, so concurrent delivered/seen calls for the same
    /// message cannot regress it. Returns the updated row, or `None` when the
    /// message already outranks 'sent' (a no-op, not an error).
    pub fn mark_delivered(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE messages SET status = 'delivered', updated_at = {NOW}
                     WHERE id = ?1 AND status = 'sent'"
                ),
                [id],
            )?;

            if changed == 0 {
                return match query_message(conn, id)? {
                    Some(_) => Ok(None),
                    None => Err(StoreError::NotFound("message")),
                };
            }
            query_message(conn, id)
        })
    }

    /// Advances to 'seen' from either 'sent' or 'delivered' — viewing implies
    /// receipt, so the delivered step may be skipped. No-op if already seen.
    pub fn mark_seen(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn_mut(|conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE messages SET status = 'seen', updated_at = {NOW}
                     WHERE id = ?1 AND status IN ('sent', 'delivered')"
                ),
                [id],
            )?;

            if changed == 0 {
                return match query_message(conn, id)? {
                    Some(_) => Ok(None),
                    None => Err(StoreError::NotFound("message")),
                };
            }
            query_message(conn, id)
        })
    }

    /// Every message between `a` and `b`, in either direction, ascending by
    /// creation time (insertion order breaks ties). Symmetric in its
    /// arguments.
    pub fn conversation_messages(&self, a: &str, b: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLS} FROM messages
                 WHERE (sender_id = ?1 AND recipient_id = ?2)
                    OR (sender_id = ?2 AND recipient_id = ?1)
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt
                .query_map([a, b], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Every message the user sent or received, ascending — the conversation
    /// aggregator's input scan.
    pub fn messages_involving(&self, user_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLS} FROM messages
                 WHERE sender_id = ?1 OR recipient_id = ?1
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            let rows = stmt
                .query_map([user_id], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn map_message_row(row: &rusqlite::Row<'_>) -> std::result::Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        recipient_id: row.get(2)?,
        content: row.get(3)?,
        status: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn map_user_row(row: &rusqlite::Row<'_>) -> std::result::Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        status: row.get(2)?,
        last_seen: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn query_message(conn: &Connection, id: &str) -> Result<Option<MessageRow>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {MESSAGE_COLS} FROM messages WHERE id = ?1"))?;
    stmt.query_row([id], map_message_row).optional()
}

fn query_user(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLS} FROM users WHERE id = ?1"))?;
    stmt.query_row([id], map_user_row).optional()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn seed_user(db: &Database, username: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_user(&id, username).unwrap();
        id
    }

    fn backdate_last_seen(db: &Database, user_id: &str, secs: u64) {
        db.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET last_seen = strftime('%Y-%m-%d %H:%M:%f','now', ?1) WHERE id = ?2",
                rusqlite::params![format!("-{} seconds", secs), user_id],
            )?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn new_message_starts_sent() {
        let db = test_db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");

        let row = db.insert_message(&a, &b, b"hi").unwrap();
        assert_eq!(row.status, "sent");
        assert_eq!(row.sender_id, a);
        assert_eq!(row.recipient_id, b);
        assert_eq!(row.content, b"hi");
    }

    #[test]
    fn status_advances_sent_delivered_seen() {
        let db = test_db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");
        let msg = db.insert_message(&a, &b, b"hi").unwrap();

        let delivered = db.mark_delivered(&msg.id).unwrap().unwrap();
        assert_eq!(delivered.status, "delivered");

        let seen = db.mark_seen(&msg.id).unwrap().unwrap();
        assert_eq!(seen.status, "seen");
    }

    #[test]
    fn seen_skipping_delivered_is_allowed() {
        let db = test_db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");
        let msg = db.insert_message(&a, &b, b"hi").unwrap();

        let seen = db.mark_seen(&msg.id).unwrap().unwrap();
        assert_eq!(seen.status, "seen");
    }

    #[test]
    fn status_never_regresses() {
        let db = test_db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");
        let msg = db.insert_message(&a, &b, b"hi").unwrap();

        db.mark_seen(&msg.id).unwrap().unwrap();

        // delivered after seen is a no-op, not an error
        assert!(db.mark_delivered(&msg.id).unwrap().is_none());

        let rows = db.conversation_messages(&a, &b).unwrap();
        assert_eq!(rows[0].status, "seen");
    }

    #[test]
    fn repeated_advances_are_noops() {
        let db = test_db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");
        let msg = db.insert_message(&a, &b, b"hi").unwrap();

        assert!(db.mark_delivered(&msg.id).unwrap().is_some());
        assert!(db.mark_delivered(&msg.id).unwrap().is_none());
        assert!(db.mark_seen(&msg.id).unwrap().is_some());
        assert!(db.mark_seen(&msg.id).unwrap().is_none());
    }

    #[test]
    fn advancing_unknown_message_is_not_found() {
        let db = test_db();
        let missing = Uuid::new_v4().to_string();
        assert!(matches!(
            db.mark_delivered(&missing),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(db.mark_seen(&missing), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn conversation_is_symmetric_and_ascending() {
        let db = test_db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");
        let c = seed_user(&db, "carol");

        db.insert_message(&a, &b, b"one").unwrap();
        db.insert_message(&b, &a, b"two").unwrap();
        db.insert_message(&a, &c, b"unrelated").unwrap();
        db.insert_message(&a, &b, b"three").unwrap();

        let ab = db.conversation_messages(&a, &b).unwrap();
        let ba = db.conversation_messages(&b, &a).unwrap();

        let contents: Vec<&[u8]> = ab.iter().map(|m| m.content.as_slice()).collect();
        assert_eq!(contents, vec![b"one".as_slice(), b"two", b"three"]);
        assert_eq!(
            ab.iter().map(|m| &m.id).collect::<Vec<_>>(),
            ba.iter().map(|m| &m.id).collect::<Vec<_>>()
        );
    }

    #[test]
    fn insert_with_unknown_user_is_a_constraint_error() {
        let db = test_db();
        let a = seed_user(&db, "alice");
        let ghost = Uuid::new_v4().to_string();
        assert!(matches!(
            db.insert_message(&a, &ghost, b"hi"),
            Err(StoreError::Constraint(_))
        ));
    }

    #[test]
    fn liveness_sets_online_and_sweep_expires_it() {
        let db = test_db();
        let a = seed_user(&db, "alice");
        let b = seed_user(&db, "bob");

        assert!(db.touch_liveness(&a).unwrap());
        assert!(db.touch_liveness(&b).unwrap());

        // alice last proved liveness 200s ago; 180s window has elapsed
        backdate_last_seen(&db, &a, 200);

        let swept = db.sweep_stale_presence(180).unwrap();
        assert_eq!(swept, 1);

        assert_eq!(db.get_user(&a).unwrap().unwrap().status, "offline");
        assert_eq!(db.get_user(&b).unwrap().unwrap().status, "online");

        // sweep is idempotent
        assert_eq!(db.sweep_stale_presence(180).unwrap(), 0);
    }

    #[test]
    fn logout_and_sweep_converge_to_offline() {
        let db = test_db();
        let a = seed_user(&db, "alice");
        db.touch_liveness(&a).unwrap();

        assert!(db.set_offline(&a).unwrap());
        assert_eq!(db.get_user(&a).unwrap().unwrap().status, "offline");

        // expiry after explicit logout changes nothing
        backdate_last_seen(&db, &a, 500);
        assert_eq!(db.sweep_stale_presence(180).unwrap(), 0);
        assert_eq!(db.get_user(&a).unwrap().unwrap().status, "offline");
    }

    #[test]
    fn liveness_for_unknown_user_reports_false() {
        let db = test_db();
        let ghost = Uuid::new_v4().to_string();
        assert!(!db.touch_liveness(&ghost).unwrap());
        assert!(!db.set_offline(&ghost).unwrap());
    }

    #[test]
    fn reopening_a_database_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("courier.db");

        let alice;
        {
            let db = Database::open(&path).unwrap();
            alice = seed_user(&db, "alice");
            db.touch_liveness(&alice).unwrap();
        }

        let db = Database::open(&path).unwrap();
        let user = db.get_user(&alice).unwrap().unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.status, "online");
    }

    #[test]
    fn search_matches_username_substring() {
        let db = test_db();
        seed_user(&db, "alice");
        seed_user(&db, "malice");
        seed_user(&db, "bob");

        let hits = db.search_users("lic", 20).unwrap();
        let names: Vec<&str> = hits.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["alice", "malice"]);
    }
}
