use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The transaction lost a lock race (deadlock victim or
    /// serialization failure) and should be retried by the caller.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// A persisted row could not be mapped back to a domain type.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        // 40001 = serialization_failure, 40P01 = deadlock_detected.
        if let sqlx::Error::Database(db) = &e
            && let Some(code) = db.code()
            && (code == "40001" || code == "40P01")
        {
            return StoreError::ConcurrencyConflict(db.message().to_string());
        }
        StoreError::Database(e)
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
