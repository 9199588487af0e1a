//! [`SyncEngine`] -- local-first CRUD plus cloud reconciliation.
//!
//! The engine owns the local store (created once at startup) and keeps an
//! in-memory mirror of every table as the UI read model. Mutations write to
//! the store first and patch the mirror incrementally afterwards; a store
//! error leaves the mirror untouched, and no mutation ever triggers a
//! full-table reload.
//!
//! Reconciliation is push-then-pull within a pass, guarded by an atomic
//! flag: a sync request arriving mid-pass is dropped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use tally_config::TallyConfig;
use tally_core::inventory::{
    Item, ItemUpdates, OptionGroup, OptionValue, Variant, VariantUpdates,
};
use tally_core::record::{NOTES_COLLECTION, Note, NoteUpdates};
use tally_storage::SqliteStore;

use crate::cloud::CloudStore;
use crate::error::Result;
use crate::scheduler::AutoSync;

// ---------------------------------------------------------------------------
// Sync outcome types
// ---------------------------------------------------------------------------

/// What a call to [`SyncEngine::sync_with_cloud`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another pass was already in flight; this request was dropped.
    Skipped,
    /// A full push + pull pass ran.
    Completed(SyncReport),
}

/// Per-pass reconciliation counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Records upserted to the cloud and flagged synced.
    pub pushed: usize,
    /// Records whose upsert failed; they stay unsynced and retry next pass.
    pub push_failures: usize,
    /// Cloud records inserted locally because their id was unknown.
    pub pulled: usize,
}

/// In-memory read model, one vector per table.
#[derive(Debug, Default)]
struct Mirrors {
    notes: Vec<Note>,
    items: Vec<Item>,
    variants: Vec<Variant>,
    op_groups: Vec<OptionGroup>,
    op_values: Vec<OptionValue>,
}

/// Releases the `is_syncing` flag on every exit path, including panics.
struct SyncGuard<'a>(&'a AtomicBool);

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Hybrid local/cloud sync engine.
///
/// Constructed once at startup as an `Arc`; the UI layer reads through the
/// accessor methods and mutates through the CRUD methods, never touching
/// the store or the mirrors directly.
pub struct SyncEngine {
    store: SqliteStore,
    cloud: Arc<dyn CloudStore>,
    mirrors: RwLock<Mirrors>,
    is_syncing: AtomicBool,
    auto_sync: Mutex<Option<AutoSync>>,
    interval: Duration,
}

impl SyncEngine {
    /// Opens the local store at the configured path and builds the engine.
    ///
    /// Migrations run inside the store open and abort it on failure. The
    /// optional initial sync pass afterwards is best-effort: a cloud that
    /// is unreachable at startup is logged and ignored.
    pub fn open(config: &TallyConfig, cloud: Arc<dyn CloudStore>) -> Result<Arc<Self>> {
        let store = SqliteStore::open(&config.database.path)?;
        Self::with_store(store, cloud, config)
    }

    /// Builds the engine around an already-open store (used by tests with
    /// in-memory databases).
    pub fn with_store(
        store: SqliteStore,
        cloud: Arc<dyn CloudStore>,
        config: &TallyConfig,
    ) -> Result<Arc<Self>> {
        let mirrors = Mirrors {
            notes: store.list_notes()?,
            items: store.list_items()?,
            variants: store.list_variants()?,
            op_groups: store.list_op_groups()?,
            op_values: store.list_op_values()?,
        };

        let engine = Arc::new(Self {
            store,
            cloud,
            mirrors: RwLock::new(mirrors),
            is_syncing: AtomicBool::new(false),
            auto_sync: Mutex::new(None),
            interval: config.sync.interval(),
        });

        if config.sync.initial_sync {
            if let Err(e) = engine.sync_with_cloud() {
                warn!(error = %e, "initial sync failed, continuing offline");
            }
        }
        if config.sync.auto_sync {
            engine.set_auto_sync(true);
        }

        Ok(engine)
    }

    fn read_mirrors(&self) -> std::sync::RwLockReadGuard<'_, Mirrors> {
        self.mirrors.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_mirrors(&self) -> std::sync::RwLockWriteGuard<'_, Mirrors> {
        self.mirrors.write().unwrap_or_else(|e| e.into_inner())
    }

    // -- Notes ---------------------------------------------------------------

    /// Creates a note locally; it starts unsynced and is pushed on the next
    /// sync pass.
    pub fn create_note(&self, title: &str, content: &str) -> Result<Note> {
        let note = self.store.create_note(title, content)?;
        self.write_mirrors().notes.push(note.clone());
        Ok(note)
    }

    /// Applies partial updates to a note. The record is re-flagged unsynced.
    pub fn update_note(&self, id: &str, updates: &NoteUpdates) -> Result<Note> {
        let note = self.store.update_note(id, updates)?;
        let mut mirrors = self.write_mirrors();
        if let Some(slot) = mirrors.notes.iter_mut().find(|n| n.id == note.id) {
            *slot = note.clone();
        }
        Ok(note)
    }

    /// Deletes a note locally. No cloud deletion is attempted here; that is
    /// a separate, not-guaranteed-atomic operation for the caller.
    pub fn delete_note(&self, id: &str) -> Result<()> {
        self.store.delete_note(id)?;
        self.write_mirrors().notes.retain(|n| n.id != id);
        Ok(())
    }

    /// All notes, from the mirror (no I/O).
    pub fn notes(&self) -> Vec<Note> {
        self.read_mirrors().notes.clone()
    }

    /// A single note by id, from the mirror (no I/O).
    pub fn get_note(&self, id: &str) -> Option<Note> {
        self.read_mirrors().notes.iter().find(|n| n.id == id).cloned()
    }

    // -- Items and variants --------------------------------------------------

    pub fn create_item(&self, name: &str, category: &str, option_ids: &[i64]) -> Result<Item> {
        let item = self.store.create_item(name, category, option_ids)?;
        self.write_mirrors().items.push(item.clone());
        Ok(item)
    }

    pub fn update_item(&self, id: i64, updates: &ItemUpdates) -> Result<Item> {
        let item = self.store.update_item(id, updates)?;
        let mut mirrors = self.write_mirrors();
        if let Some(slot) = mirrors.items.iter_mut().find(|i| i.id == id) {
            *slot = item.clone();
        }
        Ok(item)
    }

    /// Deletes an item and, via the store's cascade, its variants. Both
    /// mirrors are patched.
    pub fn delete_item(&self, id: i64) -> Result<()> {
        self.store.delete_item(id)?;
        let mut mirrors = self.write_mirrors();
        mirrors.items.retain(|i| i.id != id);
        mirrors.variants.retain(|v| v.item_id != id);
        Ok(())
    }

    pub fn create_variant(&self, variant: &Variant) -> Result<Variant> {
        let variant = self.store.create_variant(variant)?;
        self.write_mirrors().variants.push(variant.clone());
        Ok(variant)
    }

    pub fn update_variant(&self, id: i64, updates: &VariantUpdates) -> Result<Variant> {
        let variant = self.store.update_variant(id, updates)?;
        let mut mirrors = self.write_mirrors();
        if let Some(slot) = mirrors.variants.iter_mut().find(|v| v.id == id) {
            *slot = variant.clone();
        }
        Ok(variant)
    }

    pub fn delete_variant(&self, id: i64) -> Result<()> {
        self.store.delete_variant(id)?;
        self.write_mirrors().variants.retain(|v| v.id != id);
        Ok(())
    }

    pub fn items(&self) -> Vec<Item> {
        self.read_mirrors().items.clone()
    }

    pub fn variants(&self) -> Vec<Variant> {
        self.read_mirrors().variants.clone()
    }

    /// Variants belonging to one item, from the mirror (no I/O).
    pub fn variants_for_item(&self, item_id: i64) -> Vec<Variant> {
        self.read_mirrors()
            .variants
            .iter()
            .filter(|v| v.item_id == item_id)
            .cloned()
            .collect()
    }

    // -- Option groups and values --------------------------------------------

    pub fn create_op_group(&self, name: &str) -> Result<OptionGroup> {
        let group = self.store.create_op_group(name)?;
        self.write_mirrors().op_groups.push(group.clone());
        Ok(group)
    }

    pub fn rename_op_group(&self, id: i64, name: &str) -> Result<()> {
        self.store.rename_op_group(id, name)?;
        let mut mirrors = self.write_mirrors();
        if let Some(group) = mirrors.op_groups.iter_mut().find(|g| g.id == id) {
            group.name = name.to_string();
        }
        Ok(())
    }

    /// Deletes a group and, via the store's cascade, its values.
    pub fn delete_op_group(&self, id: i64) -> Result<()> {
        self.store.delete_op_group(id)?;
        let mut mirrors = self.write_mirrors();
        mirrors.op_groups.retain(|g| g.id != id);
        mirrors.op_values.retain(|v| v.group_id != id);
        Ok(())
    }

    pub fn create_op_value(&self, group_id: i64, value: &str) -> Result<OptionValue> {
        let value = self.store.create_op_value(group_id, value)?;
        self.write_mirrors().op_values.push(value.clone());
        Ok(value)
    }

    pub fn update_op_value(&self, id: i64, value: &str) -> Result<()> {
        self.store.update_op_value(id, value)?;
        let mut mirrors = self.write_mirrors();
        if let Some(v) = mirrors.op_values.iter_mut().find(|v| v.id == id) {
            v.value = value.to_string();
        }
        Ok(())
    }

    pub fn delete_op_value(&self, id: i64) -> Result<()> {
        self.store.delete_op_value(id)?;
        self.write_mirrors().op_values.retain(|v| v.id != id);
        Ok(())
    }

    pub fn op_groups(&self) -> Vec<OptionGroup> {
        self.read_mirrors().op_groups.clone()
    }

    /// Values belonging to one option group, from the mirror (no I/O).
    pub fn op_values_for_group(&self, group_id: i64) -> Vec<OptionValue> {
        self.read_mirrors()
            .op_values
            .iter()
            .filter(|v| v.group_id == group_id)
            .cloned()
            .collect()
    }

    // -- Reconciliation ------------------------------------------------------

    /// Runs one push-then-pull reconciliation pass.
    ///
    /// Push: every unsynced note is upserted independently; a failure leaves
    /// that record unsynced for the next pass without aborting the batch.
    /// Pull: cloud records with unknown ids are inserted locally as synced;
    /// on id collision the local copy wins and the cloud copy is discarded
    /// for this pass. Push runs strictly before pull, so a record pushed
    /// moments ago is recognised as already-local and never duplicated.
    pub fn sync_with_cloud(&self) -> Result<SyncOutcome> {
        if self
            .is_syncing
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            debug!("sync already in progress, dropping request");
            return Ok(SyncOutcome::Skipped);
        }
        let _guard = SyncGuard(&self.is_syncing);

        let mut report = SyncReport::default();

        // Push phase.
        let pending = self.store.list_unsynced_notes()?;
        for note in &pending {
            let doc = match serde_json::to_value(note) {
                Ok(doc) => doc,
                Err(e) => {
                    warn!(id = %note.id, error = %e, "could not serialise note, skipping");
                    report.push_failures += 1;
                    continue;
                }
            };
            match self.cloud.upsert(NOTES_COLLECTION, &note.id, &doc) {
                Ok(()) => {
                    self.store.mark_note_synced(&note.id)?;
                    let mut mirrors = self.write_mirrors();
                    if let Some(n) = mirrors.notes.iter_mut().find(|n| n.id == note.id) {
                        n.synced_to_cloud = true;
                    }
                    report.pushed += 1;
                }
                Err(e) => {
                    warn!(id = %note.id, error = %e, "push failed, will retry next pass");
                    report.push_failures += 1;
                }
            }
        }

        // Pull phase. A failed fetch aborts the pull for this pass; the
        // guard still releases the flag on the way out.
        let docs = self.cloud.fetch_collection(NOTES_COLLECTION)?;
        for doc in docs {
            let note: Note = match serde_json::from_value(doc) {
                Ok(note) => note,
                Err(e) => {
                    warn!(error = %e, "skipping malformed cloud document");
                    continue;
                }
            };
            let known = self.read_mirrors().notes.iter().any(|n| n.id == note.id);
            if known {
                // Local-wins: the cloud copy is discarded for this pass.
                debug!(id = %note.id, "cloud record already known locally");
                continue;
            }
            if self.store.insert_note_from_cloud(&note)? {
                let mut inserted = note;
                inserted.synced_to_cloud = true;
                self.write_mirrors().notes.push(inserted);
                report.pulled += 1;
            }
        }

        info!(
            pushed = report.pushed,
            pulled = report.pulled,
            push_failures = report.push_failures,
            "sync pass completed"
        );
        Ok(SyncOutcome::Completed(report))
    }

    /// Returns `true` while a reconciliation pass is in flight.
    pub fn is_syncing(&self) -> bool {
        self.is_syncing.load(Ordering::Acquire)
    }

    // -- Auto-sync -----------------------------------------------------------

    /// Starts or stops the repeating auto-sync timer.
    ///
    /// The timer holds only a weak handle to the engine, so dropping the
    /// last strong reference tears it down; disabling joins the timer
    /// thread.
    pub fn set_auto_sync(self: &Arc<Self>, enabled: bool) {
        let mut slot = self.auto_sync.lock().unwrap_or_else(|e| e.into_inner());
        if enabled {
            if slot.is_none() {
                *slot = Some(AutoSync::start(Arc::downgrade(self), self.interval));
                info!(interval = ?self.interval, "auto-sync enabled");
            }
        } else if let Some(auto) = slot.take() {
            drop(slot);
            auto.stop();
            info!("auto-sync disabled");
        }
    }

    /// Returns `true` if the auto-sync timer is currently running.
    pub fn auto_sync_enabled(&self) -> bool {
        self.auto_sync
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("is_syncing", &self.is_syncing())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::MemoryCloudStore;
    use pretty_assertions::assert_eq;

    fn quiet_config() -> TallyConfig {
        let mut config = TallyConfig::default();
        config.sync.initial_sync = false;
        config
    }

    fn test_engine() -> (Arc<SyncEngine>, Arc<MemoryCloudStore>) {
        let cloud = Arc::new(MemoryCloudStore::new());
        let store = SqliteStore::open_in_memory().unwrap();
        let engine = SyncEngine::with_store(store, cloud.clone(), &quiet_config()).unwrap();
        (engine, cloud)
    }

    #[test]
    fn created_notes_start_unsynced_in_mirror() {
        let (engine, _cloud) = test_engine();
        let note = engine.create_note("Groceries", "milk").unwrap();
        assert!(!note.synced_to_cloud);

        let mirror = engine.notes();
        assert_eq!(mirror.len(), 1);
        assert!(!mirror[0].synced_to_cloud);
    }

    #[test]
    fn push_convergence() {
        let (engine, cloud) = test_engine();
        for i in 0..5 {
            engine.create_note(&format!("note {i}"), "body").unwrap();
        }

        let outcome = engine.sync_with_cloud().unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Completed(SyncReport {
                pushed: 5,
                push_failures: 0,
                pulled: 0,
            })
        );

        assert_eq!(cloud.len("notes"), 5);
        assert!(engine.notes().iter().all(|n| n.synced_to_cloud));

        // Field values match in the cloud.
        let note = &engine.notes()[0];
        let doc = cloud.get("notes", &note.id).unwrap();
        assert_eq!(doc["title"], serde_json::json!(note.title));
    }

    #[test]
    fn push_failure_is_isolated_and_retried() {
        let (engine, cloud) = test_engine();
        let bad = engine.create_note("bad", "").unwrap();
        let good = engine.create_note("good", "").unwrap();
        cloud.fail_upserts_for(&bad.id);

        let SyncOutcome::Completed(report) = engine.sync_with_cloud().unwrap() else {
            panic!("pass should run");
        };
        assert_eq!(report.pushed, 1);
        assert_eq!(report.push_failures, 1);
        assert!(engine.get_note(&good.id).unwrap().synced_to_cloud);
        assert!(!engine.get_note(&bad.id).unwrap().synced_to_cloud);

        // The failed record retries on the next pass.
        cloud.clear_failures();
        let SyncOutcome::Completed(report) = engine.sync_with_cloud().unwrap() else {
            panic!("pass should run");
        };
        assert_eq!(report.pushed, 1);
        assert!(engine.get_note(&bad.id).unwrap().synced_to_cloud);
    }

    #[test]
    fn pull_inserts_unknown_records_as_synced() {
        let (engine, cloud) = test_engine();
        cloud.seed(
            "notes",
            "nt-remote01",
            serde_json::json!({"id": "nt-remote01", "title": "From cloud", "content": ""}),
        );

        let SyncOutcome::Completed(report) = engine.sync_with_cloud().unwrap() else {
            panic!("pass should run");
        };
        assert_eq!(report.pulled, 1);

        let pulled = engine.get_note("nt-remote01").unwrap();
        assert!(pulled.synced_to_cloud);
        assert_eq!(pulled.title, "From cloud");
    }

    #[test]
    fn pull_does_not_duplicate_or_overwrite_local_records() {
        let (engine, cloud) = test_engine();
        let local = engine.create_note("Local title", "local").unwrap();
        cloud.seed(
            "notes",
            &local.id,
            serde_json::json!({"id": local.id, "title": "Remote title", "content": "remote"}),
        );

        engine.sync_with_cloud().unwrap();

        let notes = engine.notes();
        let matching: Vec<_> = notes.iter().filter(|n| n.id == local.id).collect();
        assert_eq!(matching.len(), 1, "exactly one row with the id");
        assert_eq!(matching[0].title, "Local title", "local wins");
    }

    #[test]
    fn freshly_pushed_record_is_not_duplicated_by_same_pass_pull() {
        let (engine, _cloud) = test_engine();
        let note = engine.create_note("once", "").unwrap();

        // Push puts it in the cloud; the same pass's pull sees it there and
        // must recognise it as already local.
        engine.sync_with_cloud().unwrap();

        let notes = engine.notes();
        assert_eq!(notes.iter().filter(|n| n.id == note.id).count(), 1);
    }

    #[test]
    fn malformed_cloud_document_is_skipped() {
        let (engine, cloud) = test_engine();
        cloud.seed("notes", "junk", serde_json::json!(["not", "an", "object"]));
        cloud.seed(
            "notes",
            "nt-ok000001",
            serde_json::json!({"id": "nt-ok000001", "title": "fine", "content": ""}),
        );

        let SyncOutcome::Completed(report) = engine.sync_with_cloud().unwrap() else {
            panic!("pass should run");
        };
        assert_eq!(report.pulled, 1);
        assert!(engine.get_note("nt-ok000001").is_some());
    }

    #[test]
    fn update_reflags_and_next_pass_repushes() {
        let (engine, cloud) = test_engine();
        let note = engine.create_note("Draft", "v1").unwrap();
        engine.sync_with_cloud().unwrap();
        assert!(engine.get_note(&note.id).unwrap().synced_to_cloud);

        let updates = NoteUpdates {
            content: Some("v2".into()),
            ..Default::default()
        };
        engine.update_note(&note.id, &updates).unwrap();
        assert!(!engine.get_note(&note.id).unwrap().synced_to_cloud);

        engine.sync_with_cloud().unwrap();
        let doc = cloud.get("notes", &note.id).unwrap();
        assert_eq!(doc["content"], serde_json::json!("v2"));
    }

    #[test]
    fn mirror_untouched_when_store_rejects_write() {
        let (engine, _cloud) = test_engine();
        assert!(engine.create_item("", "Tools", &[]).is_err());
        assert!(engine.items().is_empty());
    }

    #[test]
    fn cascade_delete_patches_both_mirrors() {
        let (engine, _cloud) = test_engine();
        let item = engine.create_item("Widget", "Tools", &[]).unwrap();
        let other = engine.create_item("Other", "", &[]).unwrap();
        engine
            .create_variant(&Variant {
                id: 0,
                item_id: item.id,
                sku: "W-1".into(),
                barcode: String::new(),
                price: 1.0,
                stock: 1,
                status: Default::default(),
                option_ids: vec![],
            })
            .unwrap();
        engine
            .create_variant(&Variant {
                id: 0,
                item_id: other.id,
                sku: "O-1".into(),
                barcode: String::new(),
                price: 1.0,
                stock: 1,
                status: Default::default(),
                option_ids: vec![],
            })
            .unwrap();

        engine.delete_item(item.id).unwrap();

        assert!(engine.variants_for_item(item.id).is_empty());
        assert_eq!(engine.variants().len(), 1);
        assert_eq!(engine.items().len(), 1);
    }

    #[test]
    fn op_group_cascade_in_mirror() {
        let (engine, _cloud) = test_engine();
        let size = engine.create_op_group("Size").unwrap();
        engine.create_op_value(size.id, "L").unwrap();
        engine.create_op_value(size.id, "M").unwrap();

        engine.delete_op_group(size.id).unwrap();
        assert!(engine.op_groups().is_empty());
        assert!(engine.op_values_for_group(size.id).is_empty());
    }

    #[test]
    fn initial_sync_pulls_seeded_cloud() {
        let cloud = Arc::new(MemoryCloudStore::new());
        cloud.seed(
            "notes",
            "nt-seeded01",
            serde_json::json!({"id": "nt-seeded01", "title": "seeded", "content": ""}),
        );
        let store = SqliteStore::open_in_memory().unwrap();
        let config = TallyConfig::default(); // initial_sync on by default
        let engine = SyncEngine::with_store(store, cloud, &config).unwrap();

        assert!(engine.get_note("nt-seeded01").is_some());
    }
}
