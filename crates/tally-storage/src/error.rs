//! Storage error types.

/// Errors that can occur during local-store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The requested record was not found.
    #[error("{table} not found: {id}")]
    NotFound {
        /// The table the lookup ran against.
        table: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Failed to establish or maintain a database connection.
    #[error("connection error: {0}")]
    Connection(String),

    /// A schema migration step failed. Fatal at open: the store must not be
    /// used with a half-migrated schema.
    #[error("migration to version {version} failed: {reason}")]
    Migration {
        /// The schema version the failing step belongs to.
        version: i32,
        /// Underlying error description.
        reason: String,
    },

    /// A validation constraint was violated before the write was attempted.
    #[error("validation error: {message}")]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// A raw SQLite query error (the local store rejected a read or write).
    #[error("query error: {0}")]
    Query(#[from] rusqlite::Error),

    /// JSON serialization/deserialization failed (option-id columns).
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the storage crate.
pub type Result<T> = std::result::Result<T, StorageError>;

impl StorageError {
    /// Creates a [`StorageError::NotFound`] for the given table and id.
    pub fn not_found(table: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            table: table.into(),
            id: id.to_string(),
        }
    }

    /// Creates a [`StorageError::Validation`] with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a [`StorageError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
