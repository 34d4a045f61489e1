use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            status      TEXT NOT NULL DEFAULT 'offline',
            last_seen   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f','now')),
            created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f','now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            id            TEXT PRIMARY KEY,
            sender_id     TEXT NOT NULL REFERENCES users(id),
            recipient_id  TEXT NOT NULL REFERENCES users(id),
            content       BLOB NOT NULL,
            status        TEXT NOT NULL DEFAULT 'sent',
            created_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f','now')),
            updated_at    TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f','now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender_id, recipient_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_recipient
            ON messages(recipient_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_users_presence
            ON users(status, last_seen);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
