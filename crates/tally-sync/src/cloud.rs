//! The cloud-store contract and an in-memory implementation.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;

use crate::error::{Result, SyncError};

/// The remote collaborator the engine reconciles against.
///
/// Treated as an opaque document store keyed by record id per collection:
/// query-by-collection plus upsert-by-id is all the engine needs. The
/// concrete transport (HTTP, test double) lives behind this trait.
pub trait CloudStore: Send + Sync {
    /// Returns every document in a collection.
    fn fetch_collection(&self, collection: &str) -> Result<Vec<Value>>;

    /// Inserts or replaces the document with the given id.
    fn upsert(&self, collection: &str, id: &str, doc: &Value) -> Result<()>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// In-memory [`CloudStore`] for tests and offline development.
///
/// Counts upsert calls and supports per-id failure injection so tests can
/// exercise the per-record isolation of the push phase.
#[derive(Default)]
pub struct MemoryCloudStore {
    collections: Mutex<HashMap<String, BTreeMap<String, Value>>>,
    failing_ids: Mutex<HashSet<String>>,
    upsert_calls: AtomicUsize,
}

impl MemoryCloudStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a document directly, bypassing the upsert counter.
    pub fn seed(&self, collection: &str, id: &str, doc: Value) {
        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc);
    }

    /// Makes every upsert for the given id fail until cleared.
    pub fn fail_upserts_for(&self, id: &str) {
        let mut failing = self.failing_ids.lock().unwrap_or_else(|e| e.into_inner());
        failing.insert(id.to_string());
    }

    /// Clears all injected failures.
    pub fn clear_failures(&self) {
        let mut failing = self.failing_ids.lock().unwrap_or_else(|e| e.into_inner());
        failing.clear();
    }

    /// Returns the document with the given id, if present.
    pub fn get(&self, collection: &str, id: &str) -> Option<Value> {
        let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        collections.get(collection)?.get(id).cloned()
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: &str) -> usize {
        let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        collections.get(collection).map_or(0, BTreeMap::len)
    }

    /// Returns `true` if the collection holds no documents.
    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }

    /// Total number of upsert calls received (including failed ones).
    pub fn upsert_call_count(&self) -> usize {
        self.upsert_calls.load(Ordering::SeqCst)
    }
}

impl CloudStore for MemoryCloudStore {
    fn fetch_collection(&self, collection: &str) -> Result<Vec<Value>> {
        let collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        Ok(collections
            .get(collection)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default())
    }

    fn upsert(&self, collection: &str, id: &str, doc: &Value) -> Result<()> {
        self.upsert_calls.fetch_add(1, Ordering::SeqCst);

        let failing = self.failing_ids.lock().unwrap_or_else(|e| e.into_inner());
        if failing.contains(id) {
            return Err(SyncError::cloud("upsert", collection, "injected failure"));
        }
        drop(failing);

        let mut collections = self.collections.lock().unwrap_or_else(|e| e.into_inner());
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), doc.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn upsert_and_fetch() {
        let cloud = MemoryCloudStore::new();
        cloud.upsert("notes", "a", &json!({"id": "a"})).unwrap();
        cloud.upsert("notes", "a", &json!({"id": "a", "v": 2})).unwrap();

        assert_eq!(cloud.len("notes"), 1, "upsert replaces, not duplicates");
        assert_eq!(cloud.fetch_collection("notes").unwrap().len(), 1);
        assert_eq!(cloud.upsert_call_count(), 2);
    }

    #[test]
    fn failure_injection() {
        let cloud = MemoryCloudStore::new();
        cloud.fail_upserts_for("bad");
        assert!(cloud.upsert("notes", "bad", &json!({})).is_err());
        assert!(cloud.upsert("notes", "good", &json!({})).is_ok());

        cloud.clear_failures();
        assert!(cloud.upsert("notes", "bad", &json!({})).is_ok());
    }

    #[test]
    fn fetch_unknown_collection_is_empty() {
        let cloud = MemoryCloudStore::new();
        assert!(cloud.fetch_collection("nothing").unwrap().is_empty());
    }
}
