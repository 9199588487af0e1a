//! Note -- the cloud-synced record type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the cloud collection holding notes.
pub const NOTES_COLLECTION: &str = "notes";

/// A note, the one record type reconciled with the cloud store.
///
/// Serialisation is the wire shape pushed to / pulled from the cloud:
/// `synced_to_cloud` is local bookkeeping and never leaves the device, so it
/// is serde-skipped. A record deserialised from a cloud document therefore
/// comes back unsynced and the storage layer sets the flag explicitly on
/// insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Locally-generated `nt-` hash id, or the cloud-assigned id for
    /// records that originated remotely.
    pub id: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub content: String,

    /// True iff the local row is known to match a cloud copy with this id.
    #[serde(skip)]
    pub synced_to_cloud: bool,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// Creates a new unsynced note with the given id.
    ///
    /// Records created through the local-write path always start unsynced;
    /// the storage layer relies on this when listing push candidates.
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            synced_to_cloud: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Typed partial-update struct for notes.
///
/// Only `Some` fields are written; `None` fields are left unchanged. This
/// replaces runtime key introspection with a statically-known field set.
#[derive(Debug, Clone, Default)]
pub struct NoteUpdates {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl NoteUpdates {
    /// Returns `true` if no field is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }
}
