//! [`SqliteStore`] -- the local store and its migration runner.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Result, StorageError};
use crate::sqlite::schema;

/// SQLite-backed local store.
///
/// Wraps a [`rusqlite::Connection`] in a `Mutex` for thread safety. All
/// public methods acquire the lock, execute SQL, and release it. SQLite
/// itself serializes writes; no additional locking is layered on top.
///
/// Opening a store runs the migration runner: the schema is brought from
/// whatever `PRAGMA user_version` says up to
/// [`schema::TARGET_SCHEMA_VERSION`], and a failing step aborts the open.
pub struct SqliteStore {
    /// The mutex-protected SQLite connection.
    pub(crate) conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite database at the given path.
    ///
    /// Enables WAL mode and foreign keys, then applies pending migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(?path, "opening SQLite database");

        let conn = Connection::open(path).map_err(|e| {
            StorageError::Connection(format!("failed to open {}: {e}", path.display()))
        })?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.configure_connection()?;
        store.migrate()?;

        Ok(store)
    }

    /// Opens an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        debug!("opening in-memory SQLite database");
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Connection(format!("failed to open in-memory db: {e}")))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.configure_connection()?;
        store.migrate()?;

        Ok(store)
    }

    /// Sets connection pragmas (WAL mode, foreign keys, busy timeout).
    fn configure_connection(&self) -> Result<()> {
        let conn = self.lock_conn()?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| StorageError::Connection(format!("failed to set pragmas: {e}")))?;

        Ok(())
    }

    /// Applies pending migrations up to the target version.
    ///
    /// Safe to call repeatedly: an up-to-date database is a no-op.
    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock_conn()?;
        run_migrations_on_conn(&conn, schema::TARGET_SCHEMA_VERSION)
    }

    /// Returns the schema version currently recorded in `PRAGMA user_version`.
    pub fn schema_version(&self) -> Result<i32> {
        let conn = self.lock_conn()?;
        read_user_version(&conn)
    }

    /// Acquires the connection lock. Helper used by all operation modules.
    pub(crate) fn lock_conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StorageError::Connection(format!("mutex poisoned: {e}")))
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Migration runner
// ---------------------------------------------------------------------------

/// Reads the persisted schema version.
pub(crate) fn read_user_version(conn: &Connection) -> Result<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

/// Applies every migration step above the current version, in ascending
/// order, then records the new version.
///
/// `user_version` is only written after all pending steps succeed, so it
/// always equals the highest fully-applied version. A failing statement
/// surfaces as [`StorageError::Migration`]; callers must treat that as
/// fatal rather than proceed with a half-migrated schema. The statements
/// themselves are idempotent, so a retried open resumes cleanly.
pub(crate) fn run_migrations_on_conn(conn: &Connection, target: i32) -> Result<()> {
    let current = read_user_version(conn)?;
    if current >= target {
        debug!(version = current, "schema already at target version");
        return Ok(());
    }

    for &(version, statements) in schema::MIGRATIONS {
        if version <= current || version > target {
            continue;
        }
        debug!(version, "applying migration");
        for stmt in statements {
            conn.execute_batch(stmt)
                .map_err(|e| StorageError::Migration {
                    version,
                    reason: format!("{e}\nStatement: {}", truncate(stmt, 120)),
                })?;
        }
    }

    conn.pragma_update(None, "user_version", target)
        .map_err(|e| StorageError::Migration {
            version: target,
            reason: format!("failed to record schema version: {e}"),
        })?;

    info!(from = current, to = target, "schema migrated");
    Ok(())
}

/// Truncates a string for error messages.
fn truncate(s: &str, max: usize) -> String {
    if s.len() > max {
        format!("{}...", &s[..max])
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::schema::TARGET_SCHEMA_VERSION;

    /// Returns `true` if a table with the given name exists.
    fn table_exists(store: &SqliteStore, name: &str) -> bool {
        let conn = store.lock_conn().unwrap();
        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [name],
                |row| row.get(0),
            )
            .unwrap();
        count > 0
    }

    #[test]
    fn fresh_database_reaches_target_version() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.schema_version().unwrap(), TARGET_SCHEMA_VERSION);
        for table in ["notes", "items", "variants", "opgroups", "opvalues"] {
            assert!(table_exists(&store, table), "{table} should exist");
        }
        assert!(!table_exists(&store, "issues"));
        assert!(!table_exists(&store, "comments"));
    }

    #[test]
    fn migrate_is_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.migrate().unwrap();
        store.migrate().unwrap();
        assert_eq!(store.schema_version().unwrap(), TARGET_SCHEMA_VERSION);
    }

    #[test]
    fn migrates_from_every_intermediate_version() {
        for start in 0..TARGET_SCHEMA_VERSION {
            let conn = Connection::open_in_memory().unwrap();
            run_migrations_on_conn(&conn, start).unwrap();
            assert_eq!(read_user_version(&conn).unwrap(), start);

            run_migrations_on_conn(&conn, TARGET_SCHEMA_VERSION).unwrap();
            assert_eq!(
                read_user_version(&conn).unwrap(),
                TARGET_SCHEMA_VERSION,
                "starting from v{start}"
            );

            let count: i32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                     AND name IN ('notes', 'items', 'variants', 'opgroups', 'opvalues')",
                    [],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 5, "starting from v{start}");
        }
    }

    #[test]
    fn v3_drops_legacy_tables() {
        // A database from before the versioned schema: user_version 0 with
        // the retired issue-tracker tables already present.
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE issues (id TEXT PRIMARY KEY, title TEXT);
             CREATE TABLE comments (id INTEGER PRIMARY KEY, issue_id TEXT, body TEXT);
             CREATE INDEX idx_issues_status ON issues(title);
             CREATE INDEX idx_comments_issue ON comments(issue_id);",
        )
        .unwrap();

        run_migrations_on_conn(&conn, TARGET_SCHEMA_VERSION).unwrap();

        let count: i32 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('issues', 'comments')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 0, "legacy tables should be dropped");
    }

    #[test]
    fn on_disk_database_persists_across_reopen() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("tally.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.create_note("kept", "still here after reopen").unwrap();
        }

        // Reopening runs the migration runner again as a no-op and sees the
        // previously written rows.
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.schema_version().unwrap(), TARGET_SCHEMA_VERSION);
        let notes = store.list_notes().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "kept");
    }

    #[test]
    fn version_never_regresses() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations_on_conn(&conn, TARGET_SCHEMA_VERSION).unwrap();
        // Asking for an older target is a no-op, not a downgrade.
        run_migrations_on_conn(&conn, 1).unwrap();
        assert_eq!(read_user_version(&conn).unwrap(), TARGET_SCHEMA_VERSION);
    }
}
