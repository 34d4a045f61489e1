use thiserror::Error;

/// Store-level error taxonomy.
///
/// `NotFound` is the only variant callers are expected to branch on — a
/// status update naming a nonexistent message is a logged no-op, not a hard
/// failure. Everything else is treated as transient by the push path
/// (log and drop, the next poll recovers) and surfaced by the pull path.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("constraint violated: {0}")]
    Constraint(String),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl StoreError {
    /// Maps SQLite constraint failures (unknown sender/recipient, duplicate
    /// username) to `Constraint` so callers can reject them as bad input
    /// instead of a storage fault.
    pub fn from_sqlite(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, msg)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Constraint(msg.clone().unwrap_or_else(|| e.to_string()))
            }
            _ => StoreError::Sqlite(err),
        }
    }
}
