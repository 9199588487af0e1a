//! Sync error types.

use tally_storage::StorageError;

/// Errors that can occur during cloud reconciliation.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A cloud-store call failed (network error, timeout, rejected upsert).
    #[error("cloud {operation} failed for {collection}: {reason}")]
    Cloud {
        /// The operation that failed ("fetch", "upsert").
        operation: String,
        /// The collection the call targeted.
        collection: String,
        /// Underlying error description.
        reason: String,
    },

    /// The local store rejected an operation.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A record could not be converted to or from its cloud document shape.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the sync crate.
pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Creates a [`SyncError::Cloud`] for the given operation and collection.
    pub fn cloud(
        operation: impl Into<String>,
        collection: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        Self::Cloud {
            operation: operation.into(),
            collection: collection.into(),
            reason: reason.to_string(),
        }
    }
}
