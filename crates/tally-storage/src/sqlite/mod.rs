//! SQLite implementation of the local store.

pub mod items;
pub mod notes;
pub mod options;
pub mod schema;
pub mod store;

pub use store::SqliteStore;
