//! Local-only inventory records: items, variants, option groups and values.
//!
//! These tables live only in the local store and are excluded from cloud
//! reconciliation, so none of them carries a sync flag.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Variant status
// ---------------------------------------------------------------------------

/// Lifecycle status of a variant, stored as an INTEGER column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum VariantStatus {
    /// Sellable / in rotation.
    #[default]
    Active,
    /// Retired but kept for history.
    Archived,
    /// Unrecognised status code, preserved round-trip.
    Other(i64),
}

impl VariantStatus {
    /// Returns the integer representation stored in the database.
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Archived => 0,
            Self::Active => 1,
            Self::Other(n) => n,
        }
    }
}

impl From<i64> for VariantStatus {
    fn from(n: i64) -> Self {
        match n {
            0 => Self::Archived,
            1 => Self::Active,
            other => Self::Other(other),
        }
    }
}

impl From<VariantStatus> for i64 {
    fn from(s: VariantStatus) -> Self {
        s.as_i64()
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A catalogue item. Parent of zero or more [`Variant`]s (cascade delete).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    /// Local rowid, assigned by the store on insert.
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub category: String,
    /// Option-group ids this item draws variants from (JSON text column).
    #[serde(default)]
    pub option_ids: Vec<i64>,
}

/// A concrete sellable variant of an [`Item`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    #[serde(default)]
    pub id: i64,
    pub item_id: i64,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub barcode: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub status: VariantStatus,
    /// Option-value ids identifying this variant (JSON text column).
    #[serde(default)]
    pub option_ids: Vec<i64>,
}

/// A named group of option values (e.g. "Size"). Parent of [`OptionValue`]s
/// (cascade delete).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionGroup {
    #[serde(default)]
    pub id: i64,
    pub name: String,
}

/// A single value within an [`OptionGroup`] (e.g. "Large").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionValue {
    #[serde(default)]
    pub id: i64,
    pub group_id: i64,
    pub value: String,
}

// ---------------------------------------------------------------------------
// Partial updates
// ---------------------------------------------------------------------------

/// Typed partial-update struct for items.
#[derive(Debug, Clone, Default)]
pub struct ItemUpdates {
    pub name: Option<String>,
    pub category: Option<String>,
    pub option_ids: Option<Vec<i64>>,
}

/// Typed partial-update struct for variants.
#[derive(Debug, Clone, Default)]
pub struct VariantUpdates {
    pub sku: Option<String>,
    pub barcode: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub status: Option<VariantStatus>,
    pub option_ids: Option<Vec<i64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn status_int_round_trip() {
        assert_eq!(VariantStatus::from(0), VariantStatus::Archived);
        assert_eq!(VariantStatus::from(1), VariantStatus::Active);
        assert_eq!(VariantStatus::from(7), VariantStatus::Other(7));
        assert_eq!(VariantStatus::Other(7).as_i64(), 7);
    }

    #[test]
    fn status_default_is_active() {
        assert_eq!(VariantStatus::default(), VariantStatus::Active);
    }
}
