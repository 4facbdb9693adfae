//! Error types for the PostgreSQL storage backend.

use rollcall_storage::StorageError;
use sqlx_core::error::Error as SqlxError;

/// PostgreSQL error code for unique constraint violations (23505).
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Errors specific to the PostgreSQL storage backend.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Error reported by the driver or the database.
    #[error("Database error: {0}")]
    Database(#[from] SqlxError),

    /// The query did not finish within the configured bound.
    #[error("Query timed out after {millis}ms")]
    Timeout { millis: u64 },

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PostgresError {
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this is a unique constraint violation.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Database(e) if has_pg_error_code(e, PG_UNIQUE_VIOLATION))
    }
}

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Database(e) => match e {
                SqlxError::Io(_)
                | SqlxError::Tls(_)
                | SqlxError::PoolTimedOut
                | SqlxError::PoolClosed
                | SqlxError::WorkerCrashed => StorageError::connection_error(e.to_string()),
                other => StorageError::internal(format!("Database error: {other}")),
            },
            PostgresError::Timeout { millis } => StorageError::timeout(millis),
            PostgresError::Migration(e) => StorageError::internal(format!("Migration error: {e}")),
            PostgresError::Config { message } => {
                StorageError::internal(format!("Configuration error: {message}"))
            }
        }
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;
