//! Option group and option value CRUD operations for [`SqliteStore`].

use rusqlite::{Row, params};

use tally_core::inventory::{OptionGroup, OptionValue};

use crate::error::{Result, StorageError};
use crate::sqlite::store::SqliteStore;

fn scan_group(row: &Row<'_>) -> rusqlite::Result<OptionGroup> {
    Ok(OptionGroup {
        id: row.get("id")?,
        name: row.get("name")?,
    })
}

fn scan_value(row: &Row<'_>) -> rusqlite::Result<OptionValue> {
    Ok(OptionValue {
        id: row.get("id")?,
        group_id: row.get("group_id")?,
        value: row.get("value")?,
    })
}

impl SqliteStore {
    /// Creates an option group (e.g. "Size").
    pub fn create_op_group(&self, name: &str) -> Result<OptionGroup> {
        if name.is_empty() {
            return Err(StorageError::validation("option group name must not be empty"));
        }
        let conn = self.lock_conn()?;
        conn.execute("INSERT INTO opgroups (name) VALUES (?1)", params![name])?;
        Ok(OptionGroup {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    /// Returns all option groups.
    pub fn list_op_groups(&self) -> Result<Vec<OptionGroup>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare("SELECT id, name FROM opgroups ORDER BY id ASC")?;
        let rows = stmt.query_map([], scan_group)?;
        let mut groups = Vec::new();
        for row in rows {
            groups.push(row?);
        }
        Ok(groups)
    }

    /// Renames an option group.
    pub fn rename_op_group(&self, id: i64, name: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        let changed = conn.execute(
            "UPDATE opgroups SET name = ?1 WHERE id = ?2",
            params![name, id],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("opgroup", id));
        }
        Ok(())
    }

    /// Deletes an option group. Its values are removed by the cascade.
    pub fn delete_op_group(&self, id: i64) -> Result<()> {
        let conn = self.lock_conn()?;
        let changed = conn.execute("DELETE FROM opgroups WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StorageError::not_found("opgroup", id));
        }
        Ok(())
    }

    /// Creates a value within an option group (e.g. "Large").
    pub fn create_op_value(&self, group_id: i64, value: &str) -> Result<OptionValue> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO opvalues (group_id, value) VALUES (?1, ?2)",
            params![group_id, value],
        )?;
        Ok(OptionValue {
            id: conn.last_insert_rowid(),
            group_id,
            value: value.to_string(),
        })
    }

    /// Returns all option values.
    pub fn list_op_values(&self) -> Result<Vec<OptionValue>> {
        let conn = self.lock_conn()?;
        let mut stmt =
            conn.prepare("SELECT id, group_id, value FROM opvalues ORDER BY id ASC")?;
        let rows = stmt.query_map([], scan_value)?;
        let mut values = Vec::new();
        for row in rows {
            values.push(row?);
        }
        Ok(values)
    }

    /// Changes the text of an option value.
    pub fn update_op_value(&self, id: i64, value: &str) -> Result<()> {
        let conn = self.lock_conn()?;
        let changed = conn.execute(
            "UPDATE opvalues SET value = ?1 WHERE id = ?2",
            params![value, id],
        )?;
        if changed == 0 {
            return Err(StorageError::not_found("opvalue", id));
        }
        Ok(())
    }

    /// Deletes an option value by id.
    pub fn delete_op_value(&self, id: i64) -> Result<()> {
        let conn = self.lock_conn()?;
        let changed = conn.execute("DELETE FROM opvalues WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StorageError::not_found("opvalue", id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn group_and_value_lifecycle() {
        let store = test_store();
        let size = store.create_op_group("Size").unwrap();
        let large = store.create_op_value(size.id, "Large").unwrap();
        store.create_op_value(size.id, "Small").unwrap();

        assert_eq!(store.list_op_groups().unwrap().len(), 1);
        assert_eq!(store.list_op_values().unwrap().len(), 2);

        store.update_op_value(large.id, "XL").unwrap();
        let values = store.list_op_values().unwrap();
        assert!(values.iter().any(|v| v.value == "XL"));

        store.rename_op_group(size.id, "Fit").unwrap();
        assert_eq!(store.list_op_groups().unwrap()[0].name, "Fit");
    }

    #[test]
    fn deleting_group_cascades_to_values() {
        let store = test_store();
        let size = store.create_op_group("Size").unwrap();
        let color = store.create_op_group("Color").unwrap();
        store.create_op_value(size.id, "L").unwrap();
        store.create_op_value(color.id, "Red").unwrap();

        store.delete_op_group(size.id).unwrap();

        let values = store.list_op_values().unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0].value, "Red");
    }

    #[test]
    fn value_requires_existing_group() {
        let store = test_store();
        assert!(store.create_op_value(42, "L").is_err());
    }
}
