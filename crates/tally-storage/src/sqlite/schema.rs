//! Versioned DDL migrations for the local SQLite schema.
//!
//! The applied version lives in `PRAGMA user_version` (0 on a fresh file).
//! Steps run strictly in ascending version order and every statement uses
//! existential guards (`IF NOT EXISTS` / `IF EXISTS`), so re-running a step
//! that partially applied cannot corrupt state.
//!
//! Timestamps are stored as TEXT in ISO 8601 format (SQLite has no native
//! datetime type). Booleans are stored as INTEGER (0/1). Id lists are JSON
//! text.

/// Highest schema version the migration runner brings a database to.
pub const TARGET_SCHEMA_VERSION: i32 = 3;

/// Ordered migration steps: `(version, statements)`.
///
/// Version 3 retires the legacy issue-tracker tables that predate the
/// versioned schema; on a fresh database those drops are no-ops.
pub const MIGRATIONS: &[(i32, &[&str])] = &[
    (
        1,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS notes (
                id              TEXT PRIMARY KEY,
                title           TEXT NOT NULL DEFAULT '',
                content         TEXT NOT NULL DEFAULT '',
                synced_to_cloud INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_notes_updated_at ON notes(updated_at)",
            "CREATE INDEX IF NOT EXISTS idx_notes_synced ON notes(synced_to_cloud)",
        ],
    ),
    (
        2,
        &[
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                name       TEXT NOT NULL,
                category   TEXT NOT NULL DEFAULT '',
                option_ids TEXT NOT NULL DEFAULT '[]'
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS variants (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                item_id    INTEGER NOT NULL,
                sku        TEXT NOT NULL DEFAULT '',
                barcode    TEXT NOT NULL DEFAULT '',
                price      REAL NOT NULL DEFAULT 0,
                stock      INTEGER NOT NULL DEFAULT 0,
                status     INTEGER NOT NULL DEFAULT 1,
                option_ids TEXT NOT NULL DEFAULT '[]',
                FOREIGN KEY (item_id) REFERENCES items(id) ON DELETE CASCADE
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS opgroups (
                id   INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS opvalues (
                id       INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id INTEGER NOT NULL,
                value    TEXT NOT NULL,
                FOREIGN KEY (group_id) REFERENCES opgroups(id) ON DELETE CASCADE
            )
            "#,
            "CREATE INDEX IF NOT EXISTS idx_variants_item ON variants(item_id)",
            "CREATE INDEX IF NOT EXISTS idx_opvalues_group ON opvalues(group_id)",
        ],
    ),
    (
        3,
        &[
            "DROP INDEX IF EXISTS idx_comments_issue",
            "DROP INDEX IF EXISTS idx_issues_status",
            "DROP TABLE IF EXISTS comments",
            "DROP TABLE IF EXISTS issues",
        ],
    ),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_ascend_without_gaps() {
        let mut expected = 1;
        for &(version, statements) in MIGRATIONS {
            assert_eq!(version, expected, "versions must be dense and ordered");
            assert!(!statements.is_empty());
            expected += 1;
        }
        assert_eq!(expected - 1, TARGET_SCHEMA_VERSION);
    }

    #[test]
    fn statements_are_guarded() {
        for &(version, statements) in MIGRATIONS {
            for stmt in statements {
                assert!(
                    stmt.contains("IF NOT EXISTS") || stmt.contains("IF EXISTS"),
                    "v{version} statement lacks an existential guard: {stmt}"
                );
            }
        }
    }
}
