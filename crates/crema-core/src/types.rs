//! # Domain Types
//!
//! Inventory entities shared by the engines and the persistence layer.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────┐   ┌─────────────┐   ┌──────────────────┐               │
//! │  │    Unit     │◄──│  Material   │◄──│   RecipeLine     │               │
//! │  │  symbol     │   │  code       │   │  size_id (opt)   │               │
//! │  │  unit_class │   │  unit       │   │  consume_quantity│               │
//! │  └─────────────┘   └──────┬──────┘   └────────┬─────────┘               │
//! │                           │                   │ recipe_id               │
//! │                           │            ┌──────┴──────┐                  │
//! │                           │            │   Recipe    │ 1:1 product      │
//! │                           ▼            └─────────────┘                  │
//! │                  ┌─────────────────┐                                    │
//! │                  │  StockSnapshot  │  append-only ledger row            │
//! │                  │  date, remain   │◄── consumption                     │
//! │                  │  delta, source  │◄── wastage                         │
//! │                  └─────────────────┘◄── reconciliation                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Products, sizes, toppings, users and order lines belong to external
//! subsystems and appear here only as opaque string identifiers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::quantity::Quantity;
use crate::units::UnitClass;

// =============================================================================
// Unit & Material
// =============================================================================

/// A unit of measure. Immutable reference data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Unit {
    pub id: String,
    pub name: String,
    /// Short symbol used by conversion: "g", "kg", "ml", "l", "piece".
    pub symbol: String,
    pub unit_class: UnitClass,
}

/// A raw material tracked by the stock ledger (coffee beans, milk, cups).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Material {
    pub id: String,
    pub name: String,
    /// Back-office code, unique ("COF-ARABICA").
    pub code: String,
    /// Storage unit: the denomination of every ledger quantity.
    pub unit: Unit,
    /// Soft-disable flag. Materials referenced by the ledger are never deleted.
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Recipes
// =============================================================================

/// Recipe header. At most one per product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Recipe {
    pub id: String,
    pub product_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// One consumption rule: this much material per unit sold, at this size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RecipeLine {
    pub id: String,
    pub recipe_id: String,
    pub material_id: String,
    /// `None` for single-size products, toppings, and size-independent
    /// ingredients of multi-size products.
    pub size_id: Option<String>,
    /// Already in the material's storage unit.
    #[ts(type = "string")]
    pub consume_quantity: Quantity,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Stock Ledger
// =============================================================================

/// Which engine appended a ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSource {
    /// Order-line draw-down or its compensating reversal.
    Consumption,
    /// Spillage, spoilage, breakage, or a voided wastage entry.
    Wastage,
    /// Physical count accepted by the operator.
    Reconciliation,
}

impl SnapshotSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotSource::Consumption => "consumption",
            SnapshotSource::Wastage => "wastage",
            SnapshotSource::Reconciliation => "reconciliation",
        }
    }
}

impl fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only ledger row.
///
/// `id` is the insertion sequence: for two rows on the same date the higher
/// id is the later state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockSnapshot {
    pub id: i64,
    pub material_id: String,
    #[ts(as = "String")]
    pub date: NaiveDate,
    /// Stock after this row.
    #[ts(type = "string")]
    pub remain: Quantity,
    /// Signed change applied by this row.
    #[ts(type = "string")]
    pub delta: Quantity,
    pub source: SnapshotSource,
    /// Order line, wastage entry or reconciliation run that caused the row.
    pub reference: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Wastage
// =============================================================================

/// A recorded material loss outside normal consumption.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct WastageLogEntry {
    pub id: String,
    pub material_id: String,
    /// Amount removed, in the storage unit. Always > 0.
    #[ts(type = "string")]
    pub quantity: Quantity,
    pub reason: String,
    /// Date of the ledger row; later than the requested date when the
    /// material's ledger had already moved on.
    #[ts(as = "String")]
    pub date: NaiveDate,
    pub user_id: String,
    /// Ledger row appended for this entry.
    pub snapshot_id: i64,
    /// Set when the entry was voided by a compensating row.
    #[ts(as = "Option<String>")]
    pub voided_at: Option<DateTime<Utc>>,
    /// Who voided the entry.
    pub voided_by: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Consumption
// =============================================================================

/// Idempotency record for a processed order line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ConsumptionRecord {
    pub order_line_id: String,
    pub product_id: String,
    pub size_id: Option<String>,
    pub quantity_sold: i64,
    #[ts(as = "String")]
    pub confirmed_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub reversed_at: Option<DateTime<Utc>>,
}

/// What one order line actually drew down from one material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ConsumptionDeduction {
    pub order_line_id: String,
    pub material_id: String,
    #[ts(type = "string")]
    pub quantity: Quantity,
    pub snapshot_id: i64,
    /// Stock after the deduction; negative means shortfall.
    #[ts(type = "string")]
    pub remain_after: Quantity,
}

/// Persisted data-integrity alert: a sale hit a recipe with a missing line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct RecipeGapAlert {
    pub id: i64,
    pub order_line_id: String,
    pub product_id: String,
    pub size_id: Option<String>,
    pub material_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Reconciliation
// =============================================================================

/// An accepted reconciliation batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ReconciliationRun {
    pub id: String,
    #[ts(as = "String")]
    pub as_of_date: NaiveDate,
    pub user_id: String,
    pub material_count: i64,
    #[ts(as = "String")]
    pub accepted_at: DateTime<Utc>,
}

/// An operator's physical count for one material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CountedStock {
    pub material_id: String,
    #[ts(type = "string")]
    pub counted_remain: Quantity,
}

impl CountedStock {
    pub fn new(material_id: impl Into<String>, counted_remain: Quantity) -> Self {
        CountedStock {
            material_id: material_id.into(),
            counted_remain,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_source_serialization() {
        let json = serde_json::to_string(&SnapshotSource::Reconciliation).unwrap();
        assert_eq!(json, "\"reconciliation\"");
        assert_eq!(SnapshotSource::Wastage.to_string(), "wastage");
    }

    #[test]
    fn test_counted_stock_json_keeps_five_digits() {
        let count = CountedStock::new("milk", Quantity::from_raw(920_000));
        let json = serde_json::to_value(&count).unwrap();
        assert_eq!(json["counted_remain"], "9.20000");
    }
}
