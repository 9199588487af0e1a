//! Local SQLite storage for the tally sync system.
//!
//! The local store is the source of truth for reads and writes: the UI layer
//! never talks to the cloud directly. Opening a [`SqliteStore`] runs the
//! versioned migration runner (gated on `PRAGMA user_version`) before any
//! other operation; a failed migration aborts the open.

pub mod error;
pub mod sqlite;

// Re-exports for convenience.
pub use error::{Result, StorageError};
pub use sqlite::SqliteStore;
pub use sqlite::schema::TARGET_SCHEMA_VERSION;
