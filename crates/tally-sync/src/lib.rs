//! Hybrid local/cloud reconciliation engine for the tally sync system.
//!
//! The local store is the source of truth: all reads and writes go through
//! [`SyncEngine`], which mirrors the tables in memory for the UI and
//! reconciles the cloud-synced collections on demand or on a timer.
//! Locally-created records start unsynced and are pushed; unknown cloud
//! records are pulled in as synced; on id collision the local copy wins.

pub mod cloud;
pub mod engine;
pub mod error;
pub mod http;
mod scheduler;

// Re-exports for convenience.
pub use cloud::{CloudStore, MemoryCloudStore};
pub use engine::{SyncEngine, SyncOutcome, SyncReport};
pub use error::SyncError;
pub use http::HttpCloudStore;
