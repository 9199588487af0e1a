//! Item and Variant CRUD operations for [`SqliteStore`].
//!
//! Inventory tables are local-only: no sync flag, integer rowids assigned by
//! the store. Deleting an item cascades to its variants (FK ON DELETE
//! CASCADE, enforced because the connection enables foreign keys).

use rusqlite::{Connection, Row, params};

use tally_core::inventory::{Item, ItemUpdates, Variant, VariantStatus, VariantUpdates};

use crate::error::{Result, StorageError};
use crate::sqlite::store::SqliteStore;

pub(crate) const ITEM_COLUMNS: &str = "id, name, category, option_ids";
pub(crate) const VARIANT_COLUMNS: &str =
    "id, item_id, sku, barcode, price, stock, status, option_ids";

// ---------------------------------------------------------------------------
// Row scanning
// ---------------------------------------------------------------------------

fn parse_id_list(json: &str) -> Vec<i64> {
    serde_json::from_str(json).unwrap_or_default()
}

fn id_list_json(ids: &[i64]) -> Result<String> {
    Ok(serde_json::to_string(ids)?)
}

pub(crate) fn scan_item(row: &Row<'_>) -> rusqlite::Result<Item> {
    let option_ids_str: String = row.get("option_ids")?;
    Ok(Item {
        id: row.get("id")?,
        name: row.get("name")?,
        category: row.get("category")?,
        option_ids: parse_id_list(&option_ids_str),
    })
}

pub(crate) fn scan_variant(row: &Row<'_>) -> rusqlite::Result<Variant> {
    let option_ids_str: String = row.get("option_ids")?;
    let status: i64 = row.get("status")?;
    Ok(Variant {
        id: row.get("id")?,
        item_id: row.get("item_id")?,
        sku: row.get("sku")?,
        barcode: row.get("barcode")?,
        price: row.get("price")?,
        stock: row.get("stock")?,
        status: VariantStatus::from(status),
        option_ids: parse_id_list(&option_ids_str),
    })
}

fn get_item_on_conn(conn: &Connection, id: i64) -> Result<Item> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1");
    conn.query_row(&sql, params![id], scan_item)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StorageError::not_found("item", id),
            other => StorageError::Query(other),
        })
}

fn get_variant_on_conn(conn: &Connection, id: i64) -> Result<Variant> {
    let sql = format!("SELECT {VARIANT_COLUMNS} FROM variants WHERE id = ?1");
    conn.query_row(&sql, params![id], scan_variant)
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => StorageError::not_found("variant", id),
            other => StorageError::Query(other),
        })
}

// ---------------------------------------------------------------------------
// SqliteStore methods -- items
// ---------------------------------------------------------------------------

impl SqliteStore {
    /// Creates an item and returns it with its store-assigned id.
    pub fn create_item(&self, name: &str, category: &str, option_ids: &[i64]) -> Result<Item> {
        if name.is_empty() {
            return Err(StorageError::validation("item name must not be empty"));
        }
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO items (name, category, option_ids) VALUES (?1, ?2, ?3)",
            params![name, category, id_list_json(option_ids)?],
        )?;
        let id = conn.last_insert_rowid();
        Ok(Item {
            id,
            name: name.to_string(),
            category: category.to_string(),
            option_ids: option_ids.to_vec(),
        })
    }

    /// Retrieves an item by id.
    pub fn get_item(&self, id: i64) -> Result<Item> {
        let conn = self.lock_conn()?;
        get_item_on_conn(&conn, id)
    }

    /// Returns all items.
    pub fn list_items(&self) -> Result<Vec<Item>> {
        let conn = self.lock_conn()?;
        let sql = format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY id ASC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], scan_item)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    /// Applies partial updates to an item and returns the updated row.
    pub fn update_item(&self, id: i64, updates: &ItemUpdates) -> Result<Item> {
        let conn = self.lock_conn()?;

        let mut set_clauses: Vec<&str> = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref name) = updates.name {
            set_clauses.push("name = ?");
            param_values.push(Box::new(name.clone()));
        }
        if let Some(ref category) = updates.category {
            set_clauses.push("category = ?");
            param_values.push(Box::new(category.clone()));
        }
        if let Some(ref option_ids) = updates.option_ids {
            set_clauses.push("option_ids = ?");
            param_values.push(Box::new(id_list_json(option_ids)?));
        }

        if set_clauses.is_empty() {
            return get_item_on_conn(&conn, id);
        }

        param_values.push(Box::new(id));
        let sql = format!("UPDATE items SET {} WHERE id = ?", set_clauses.join(", "));
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let changed = conn.execute(&sql, param_refs.as_slice())?;
        if changed == 0 {
            return Err(StorageError::not_found("item", id));
        }

        get_item_on_conn(&conn, id)
    }

    /// Deletes an item. Variants referencing it are removed by the cascade.
    pub fn delete_item(&self, id: i64) -> Result<()> {
        let conn = self.lock_conn()?;
        let changed = conn.execute("DELETE FROM items WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StorageError::not_found("item", id));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// SqliteStore methods -- variants
// ---------------------------------------------------------------------------

impl SqliteStore {
    /// Creates a variant under an existing item.
    pub fn create_variant(&self, variant: &Variant) -> Result<Variant> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO variants (item_id, sku, barcode, price, stock, status, option_ids)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                variant.item_id,
                variant.sku,
                variant.barcode,
                variant.price,
                variant.stock,
                variant.status.as_i64(),
                id_list_json(&variant.option_ids)?,
            ],
        )?;
        let id = conn.last_insert_rowid();
        Ok(Variant {
            id,
            ..variant.clone()
        })
    }

    /// Retrieves a variant by id.
    pub fn get_variant(&self, id: i64) -> Result<Variant> {
        let conn = self.lock_conn()?;
        get_variant_on_conn(&conn, id)
    }

    /// Returns all variants.
    pub fn list_variants(&self) -> Result<Vec<Variant>> {
        let conn = self.lock_conn()?;
        let sql = format!("SELECT {VARIANT_COLUMNS} FROM variants ORDER BY id ASC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], scan_variant)?;
        let mut variants = Vec::new();
        for row in rows {
            variants.push(row?);
        }
        Ok(variants)
    }

    /// Applies partial updates to a variant and returns the updated row.
    ///
    /// Only the `Some` fields are written, so e.g. a price change leaves
    /// `sku` and `stock` untouched.
    pub fn update_variant(&self, id: i64, updates: &VariantUpdates) -> Result<Variant> {
        let conn = self.lock_conn()?;

        let mut set_clauses: Vec<&str> = Vec::new();
        let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(ref sku) = updates.sku {
            set_clauses.push("sku = ?");
            param_values.push(Box::new(sku.clone()));
        }
        if let Some(ref barcode) = updates.barcode {
            set_clauses.push("barcode = ?");
            param_values.push(Box::new(barcode.clone()));
        }
        if let Some(price) = updates.price {
            set_clauses.push("price = ?");
            param_values.push(Box::new(price));
        }
        if let Some(stock) = updates.stock {
            set_clauses.push("stock = ?");
            param_values.push(Box::new(stock));
        }
        if let Some(status) = updates.status {
            set_clauses.push("status = ?");
            param_values.push(Box::new(status.as_i64()));
        }
        if let Some(ref option_ids) = updates.option_ids {
            set_clauses.push("option_ids = ?");
            param_values.push(Box::new(id_list_json(option_ids)?));
        }

        if set_clauses.is_empty() {
            return get_variant_on_conn(&conn, id);
        }

        param_values.push(Box::new(id));
        let sql = format!("UPDATE variants SET {} WHERE id = ?", set_clauses.join(", "));
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            param_values.iter().map(|p| p.as_ref()).collect();
        let changed = conn.execute(&sql, param_refs.as_slice())?;
        if changed == 0 {
            return Err(StorageError::not_found("variant", id));
        }

        get_variant_on_conn(&conn, id)
    }

    /// Deletes a variant by id.
    pub fn delete_variant(&self, id: i64) -> Result<()> {
        let conn = self.lock_conn()?;
        let changed = conn.execute("DELETE FROM variants WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(StorageError::not_found("variant", id));
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

    fn test_variant(item_id: i64, sku: &str) -> Variant {
        Variant {
            id: 0,
            item_id,
            sku: sku.to_string(),
            barcode: String::new(),
            price: 9.5,
            stock: 3,
            status: VariantStatus::Active,
            option_ids: vec![],
        }
    }

    #[test]
    fn create_and_get_item() {
        let store = test_store();
        let item = store.create_item("Widget", "Tools", &[1, 2]).unwrap();
        assert!(item.id > 0);

        let got = store.get_item(item.id).unwrap();
        assert_eq!(got, item);
        assert_eq!(got.option_ids, vec![1, 2]);
    }

    #[test]
    fn empty_item_name_rejected() {
        let store = test_store();
        let err = store.create_item("", "Tools", &[]).unwrap_err();
        assert!(matches!(err, StorageError::Validation { .. }));
    }

    #[test]
    fn variant_requires_existing_item() {
        let store = test_store();
        let err = store.create_variant(&test_variant(999, "SKU-1")).unwrap_err();
        assert!(matches!(err, StorageError::Query(_)), "FK should reject");
    }

    #[test]
    fn deleting_item_cascades_to_its_variants_only() {
        let store = test_store();
        let a = store.create_item("A", "", &[]).unwrap();
        let b = store.create_item("B", "", &[]).unwrap();
        store.create_variant(&test_variant(a.id, "A-1")).unwrap();
        store.create_variant(&test_variant(a.id, "A-2")).unwrap();
        let keep = store.create_variant(&test_variant(b.id, "B-1")).unwrap();

        store.delete_item(a.id).unwrap();

        let remaining = store.list_variants().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, keep.id);
    }

    #[test]
    fn partial_update_preserves_unspecified_fields() {
        let store = test_store();
        let item = store.create_item("Widget", "", &[]).unwrap();
        let variant = store.create_variant(&test_variant(item.id, "SKU-9")).unwrap();

        let updates = VariantUpdates {
            price: Some(10.0),
            ..Default::default()
        };
        let updated = store.update_variant(variant.id, &updates).unwrap();

        assert_eq!(updated.price, 10.0);
        assert_eq!(updated.sku, "SKU-9");
        assert_eq!(updated.stock, 3);
        assert_eq!(updated.status, VariantStatus::Active);
    }

    #[test]
    fn update_item_fields() {
        let store = test_store();
        let item = store.create_item("Old", "Misc", &[]).unwrap();
        let updates = ItemUpdates {
            name: Some("New".into()),
            option_ids: Some(vec![4]),
            ..Default::default()
        };
        let updated = store.update_item(item.id, &updates).unwrap();
        assert_eq!(updated.name, "New");
        assert_eq!(updated.category, "Misc");
        assert_eq!(updated.option_ids, vec![4]);
    }
}
