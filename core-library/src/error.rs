use thiserror::Error;

/// Error messages that indicate the write lost a lock race and may succeed
/// on retry. Covers SQLite plus the server engines the schema also runs on.
const LOCK_SIGNATURES: &[&str] = &[
    "database is locked",
    "database table is locked",
    "lock wait timeout",
    "deadlock",
    "try restarting transaction",
];

/// SQLITE_BUSY and SQLITE_LOCKED primary result codes.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

impl LibraryError {
    /// Whether this is transient storage contention (busy, locked, deadlock).
    pub fn is_lock_contention(&self) -> bool {
        let LibraryError::Database(err) = self else {
            return false;
        };

        if let Some(code) = err
            .as_database_error()
            .and_then(|db| db.code())
            .and_then(|code| code.parse::<i32>().ok())
        {
            let primary = code & 0xff;
            if primary == SQLITE_BUSY || primary == SQLITE_LOCKED {
                return true;
            }
        }

        let message = err.to_string().to_lowercase();
        LOCK_SIGNATURES.iter().any(|sig| message.contains(sig))
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
