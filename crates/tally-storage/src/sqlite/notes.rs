//! Note CRUD and sync-flag operations for [`SqliteStore`].

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row, params};
use tracing::debug;

use tally_core::idgen;
use tally_core::record::{Note, NoteUpdates};

use crate::error::{Result, StorageError};
use crate::sqlite::store::SqliteStore;

/// All note columns in a deterministic order for SELECT queries.
pub(crate) const NOTE_COLUMNS: &str =
    "id, title, content, synced_to_cloud, created_at, updated_at";

/// How many id-collision retries `create_note` attempts before giving up.
const ID_RETRY_LIMIT: i32 = 5;

// ---------------------------------------------------------------------------
// Row scanning and timestamp helpers
// ---------------------------------------------------------------------------

/// Deserialises a row into a [`Note`]. Column order MUST match [`NOTE_COLUMNS`].
pub(crate) fn scan_note(row: &Row<'_>) -> rusqlite::Result<Note> {
    let created_at_str: String = row.get("created_at")?;
    let updated_at_str: String = row.get("updated_at")?;
    Ok(Note {
        id: row.get("id")?,
        title: row.get("title")?,
        content: row.get("content")?,
        synced_to_cloud: row.get::<_, i64>("synced_to_cloud")? != 0,
        created_at: parse_datetime(&created_at_str),
        updated_at: parse_datetime(&updated_at_str),
    })
}

/// Formats a datetime as ISO 8601 with millisecond precision.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

/// Parses an ISO 8601 timestamp, falling back to the epoch on garbage.
pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Connection-level helpers
// ---------------------------------------------------------------------------

/// Retrieves a single note by id on the given connection.
pub(crate) fn get_note_on_conn(conn: &Connection, id: &str) -> Result<Note> {
    let sql = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1");
    conn.query_row(&sql, params![id], scan_note)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StorageError::not_found("note", id),
            other => StorageError::Query(other),
        })
}

fn insert_note_on_conn(conn: &Connection, note: &Note) -> std::result::Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO notes (id, title, content, synced_to_cloud, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            note.id,
            note.title,
            note.content,
            note.synced_to_cloud as i64,
            format_datetime(&note.created_at),
            format_datetime(&note.updated_at),
        ],
    )?;
    Ok(())
}

/// Returns `true` for the unique-constraint failure raised by an id collision.
fn is_constraint_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

// ---------------------------------------------------------------------------
// SqliteStore methods
// ---------------------------------------------------------------------------

impl SqliteStore {
    /// Creates a note through the local-write path.
    ///
    /// The record starts with `synced_to_cloud = false` and a locally
    /// generated id; a unique-constraint collision on the id retries with a
    /// fresh nonce.
    pub fn create_note(&self, title: &str, content: &str) -> Result<Note> {
        let conn = self.lock_conn()?;
        let now = Utc::now();

        let mut nonce = 0;
        loop {
            let seed = format!("{title}|{content}");
            let id = idgen::generate_record_id("nt", &seed, now, nonce);
            let note = Note::new(id, title, content);

            match insert_note_on_conn(&conn, &note) {
                Ok(()) => {
                    debug!(id = %note.id, "created note");
                    // Re-read so the caller sees exactly what the row holds
                    // (timestamps are stored at millisecond precision).
                    return get_note_on_conn(&conn, &note.id);
                }
                Err(e) if is_constraint_violation(&e) && nonce < ID_RETRY_LIMIT => {
                    nonce += 1;
                }
                Err(e) => return Err(StorageError::Query(e)),
            }
        }
    }

    /// Retrieves a note by id.
    pub fn get_note(&self, id: &str) -> Result<Note> {
        let conn = self.lock_conn()?;
        get_note_on_conn(&conn, id)
    }

    /// Returns all notes, most recently updated first.
    pub fn list_notes(&self) -> Result<Vec<Note>> {
        let conn = self.lock_conn()?;
        let sql = format!("SELECT {NOTE_COLUMNS} FROM notes ORDER BY updated_at DESC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], scan_note)?;
        let mut notes = Vec::new();
        for row in rows {
            notes.push(row?);
        }
        Ok(notes)
    }

    /// Applies partial updates to a note and returns the updated row.
    ///
    /// Any domain-field change re-flags the record as unsynced so the edit
    /// is pushed on the next sync pass, and bumps `updated_at`. An empty
    /// update is a no-op.
    pub fn update_note(&self, id: &str, updates: &NoteUpdates) -> Result<Note> {
        let conn = self.lock_conn()?;

        if updates.is_empty() {
            return get_note_on_conn(&conn, id);
        }

        // Build SET clause from the statically-known field set.
        let mut set_clauses: Vec<&str> = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref title) = updates.title {
            set_clauses.push("title = ?");
            param_values.push(Box::new(title.clone()));
        }
        if let Some(ref content) = updates.content {
            set_clauses.push("content = ?");
            param_values.push(Box::new(content.clone()));
        }

        set_clauses.push("synced_to_cloud = 0");
        set_clauses.push("updated_at = ?");
        param_values.push(Box::new(format_datetime(&Utc::now())));

        param_values.push(Box::new(id.to_string()));
        let sql = format!("UPDATE notes SET {} WHERE id = ?", set_clauses.join(", "));

        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let changed = conn.execute(&sql, param_refs.as_slice())?;
        if changed == 0 {
            return Err(StorageError::not_found("note", id));
        }

        get_note_on_conn(&conn, id)
    }

    /// Deletes a note by id.
    pub fn delete_note(&self, id: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        let changed = conn.execute("DELETE FROM notes WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StorageError::not_found("note", id));
        }
        Ok(())
    }

    /// Returns every note pending a push (`synced_to_cloud = false`),
    /// oldest first so retries keep their original order.
    pub fn list_unsynced_notes(&self) -> Result<Vec<Note>> {
        let conn = self.lock_conn()?;
        let sql = format!(
            "SELECT {NOTE_COLUMNS} FROM notes WHERE synced_to_cloud = 0 ORDER BY updated_at ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], scan_note)?;
        let mut notes = Vec::new();
        for row in rows {
            notes.push(row?);
        }
        Ok(notes)
    }

    /// Flags a note as matching the cloud copy, after a successful push.
    pub fn mark_note_synced(&self, id: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        let changed = conn.execute(
            "UPDATE notes SET synced_to_cloud = 1 WHERE id = ?1",
            params![id],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("note", id));
        }
        Ok(())
    }

    /// Inserts a cloud-originated note with `synced_to_cloud = true`.
    ///
    /// Uses `INSERT OR IGNORE`: an existing local row with the same id is
    /// never overwritten (local-wins). Returns `true` if a row was inserted.
    pub fn insert_note_from_cloud(&self, note: &Note) -> Result<bool> {
        let conn = self.lock_conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO notes (id, title, content, synced_to_cloud, created_at, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?5)",
            params![
                note.id,
                note.title,
                note.content,
                format_datetime(&note.created_at),
                format_datetime(&note.updated_at),
            ],
        )?;
        Ok(inserted > 0)
    }
}
