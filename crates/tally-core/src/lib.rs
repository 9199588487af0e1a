//! Core record types for the tally sync system.
//!
//! Everything the storage and sync layers agree on lives here: the
//! cloud-synced [`record::Note`], the local-only inventory records, and the
//! typed partial-update structs used to build column-restricted writes.

pub mod idgen;
pub mod inventory;
pub mod record;
