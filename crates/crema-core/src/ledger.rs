//! # Stock Ledger Rules
//!
//! Pure checks over a material's append-only snapshot chain.
//!
//! ## Chain Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  id  date        source          delta      remain                      │
//! │  ──  ──────────  ──────────────  ─────────  ─────────                   │
//! │  1   2026-03-01  reconciliation  +10.00000  10.00000   (opening count)  │
//! │  4   2026-03-01  wastage         -0.50000    9.50000                    │
//! │  9   2026-03-02  reconciliation  -0.30000    9.20000   (counted 9.2)    │
//! │                                                                         │
//! │  Invariant: remain[n] = remain[n-1] + delta[n], starting from 0,        │
//! │  walking rows in (date, id) order.                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::quantity::Quantity;
use crate::types::StockSnapshot;

/// Ledger order: date first, insertion sequence second.
pub fn ledger_order(a: &StockSnapshot, b: &StockSnapshot) -> Ordering {
    a.date.cmp(&b.date).then(a.id.cmp(&b.id))
}

/// The row that defines current stock: the latest by `(date, id)`.
pub fn head(snapshots: &[StockSnapshot]) -> Option<&StockSnapshot> {
    snapshots.iter().max_by(|a, b| ledger_order(a, b))
}

/// Current stock of a single material's chain; zero with no history.
pub fn current_remain(snapshots: &[StockSnapshot]) -> Quantity {
    head(snapshots).map(|s| s.remain).unwrap_or(Quantity::ZERO)
}

/// Checks that every row's `remain` equals the previous row's `remain` plus
/// its own `delta`, per material.
///
/// Rows may be passed in any order and may mix materials.
///
/// ## Example
/// ```rust
/// use chrono::{NaiveDate, Utc};
/// use crema_core::ledger::verify_additivity;
/// use crema_core::quantity::Quantity;
/// use crema_core::types::{SnapshotSource, StockSnapshot};
///
/// let row = StockSnapshot {
///     id: 1,
///     material_id: "milk".into(),
///     date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
///     remain: Quantity::from_units(10),
///     delta: Quantity::from_units(10),
///     source: SnapshotSource::Reconciliation,
///     reference: None,
///     created_at: Utc::now(),
/// };
/// assert!(verify_additivity(&[row]).is_ok());
/// ```
pub fn verify_additivity(snapshots: &[StockSnapshot]) -> CoreResult<()> {
    let mut ordered: Vec<&StockSnapshot> = snapshots.iter().collect();
    ordered.sort_by(|a, b| {
        a.material_id
            .cmp(&b.material_id)
            .then_with(|| ledger_order(a, b))
    });

    let mut previous: Option<&str> = None;
    let mut running = Quantity::ZERO;

    for snapshot in ordered {
        if previous != Some(snapshot.material_id.as_str()) {
            previous = Some(snapshot.material_id.as_str());
            running = Quantity::ZERO;
        }

        let expected = running
            .checked_add(snapshot.delta)
            .ok_or_else(|| CoreError::overflow(format!("ledger of {}", snapshot.material_id)))?;

        if expected != snapshot.remain {
            return Err(CoreError::LedgerInconsistent {
                material_id: snapshot.material_id.clone(),
                snapshot_id: snapshot.id,
                expected,
                found: snapshot.remain,
            });
        }
        running = snapshot.remain;
    }

    Ok(())
}

/// A material whose stock went below zero after a deduction.
///
/// Shortfall is valid ledger state; it is surfaced to the operator, never
/// raised as an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Shortfall {
    pub material_id: String,
    #[ts(type = "string")]
    pub remain_after: Quantity,
}

impl Shortfall {
    /// Returns a shortfall when `remain_after` is negative.
    pub fn check(material_id: &str, remain_after: Quantity) -> Option<Shortfall> {
        remain_after.is_negative().then(|| Shortfall {
            material_id: material_id.to_string(),
            remain_after,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
