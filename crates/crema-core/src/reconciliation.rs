//! # Reconciliation Records
//!
//! Compares ledger stock against an operator's physical count for one date.
//!
//! ## Run Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   COMPUTED ──────────────► PROPOSED ──────────────► ACCEPTED            │
//! │   ComputedStock            ProposedReconciliation   one snapshot per    │
//! │   (ledger as of date)      (counts + differences)   record, one tx      │
//! │                                                                         │
//! │   difference = counted_remain − system_computed_remain                  │
//! │   records sorted by difference ascending (largest shortfall first),     │
//! │   ties by material code                                                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the transition to ACCEPTED touches storage; this module covers the
//! first two states.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::quantity::Quantity;
use crate::types::{CountedStock, ReconciliationRun, StockSnapshot};
use crate::validation::validate_non_negative_quantity;

// =============================================================================
// Computed
// =============================================================================

/// Ledger state of one material as of the run date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockBaseline {
    pub material_id: String,
    pub material_code: String,
    pub material_name: String,
    pub unit_symbol: String,
    /// Remain recorded by the most recent accepted count on or before the
    /// date; zero if the material was never counted.
    #[ts(type = "string")]
    pub last_remain_quantity: Quantity,
    /// Latest ledger remain on or before the date.
    #[ts(type = "string")]
    pub system_computed_remain: Quantity,
}

/// The COMPUTED state: every active material's ledger stock as of a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ComputedStock {
    #[ts(as = "String")]
    pub as_of_date: NaiveDate,
    pub baselines: Vec<StockBaseline>,
}

impl ComputedStock {
    pub fn baseline(&self, material_id: &str) -> Option<&StockBaseline> {
        self.baselines.iter().find(|b| b.material_id == material_id)
    }

    /// Moves to PROPOSED by pairing counts with their baselines.
    ///
    /// Counts must be non-negative, appear at most once per material, and
    /// name a material present in this computation. Materials without a
    /// count are left out of the batch.
    pub fn propose(&self, counts: &[CountedStock]) -> CoreResult<ProposedReconciliation> {
        let by_id: HashMap<&str, &StockBaseline> = self
            .baselines
            .iter()
            .map(|b| (b.material_id.as_str(), b))
            .collect();

        let mut seen = HashSet::with_capacity(counts.len());
        let mut records = Vec::with_capacity(counts.len());

        for count in counts {
            validate_non_negative_quantity("counted_remain", count.counted_remain)?;

            if !seen.insert(count.material_id.as_str()) {
                return Err(ValidationError::Duplicate {
                    field: "material_id".to_string(),
                    value: count.material_id.clone(),
                }
                .into());
            }

            let baseline =
                by_id
                    .get(count.material_id.as_str())
                    .ok_or_else(|| ValidationError::InvalidFormat {
                        field: "material_id".to_string(),
                        reason: format!(
                            "material '{}' is not part of the stock computed for {}",
                            count.material_id, self.as_of_date
                        ),
                    })?;

            records.push(ReconciliationRecord {
                material_id: baseline.material_id.clone(),
                material_code: baseline.material_code.clone(),
                material_name: baseline.material_name.clone(),
                last_remain_quantity: baseline.last_remain_quantity,
                system_computed_remain: baseline.system_computed_remain,
                counted_remain: count.counted_remain,
                difference: count
                    .counted_remain
                    .checked_sub(baseline.system_computed_remain)
                    .ok_or_else(|| {
                        CoreError::overflow(format!("difference of {}", count.material_id))
                    })?,
            });
        }

        sort_for_review(&mut records);

        Ok(ProposedReconciliation {
            as_of_date: self.as_of_date,
            records,
        })
    }
}

// =============================================================================
// Proposed
// =============================================================================

/// One material's line in a reconciliation batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReconciliationRecord {
    pub material_id: String,
    pub material_code: String,
    pub material_name: String,
    #[ts(type = "string")]
    pub last_remain_quantity: Quantity,
    #[ts(type = "string")]
    pub system_computed_remain: Quantity,
    #[ts(type = "string")]
    pub counted_remain: Quantity,
    /// `counted_remain − system_computed_remain`; negative is a shortfall.
    #[ts(type = "string")]
    pub difference: Quantity,
}

/// The PROPOSED state: a batch waiting for operator confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProposedReconciliation {
    #[ts(as = "String")]
    pub as_of_date: NaiveDate,
    pub records: Vec<ReconciliationRecord>,
}

impl ProposedReconciliation {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Net change across the batch.
    pub fn total_difference(&self) -> Quantity {
        self.records.iter().map(|r| r.difference).sum()
    }
}

/// Largest shortfalls first, ties by material code.
pub fn sort_for_review(records: &mut [ReconciliationRecord]) {
    records.sort_by(|a, b| {
        a.difference
            .cmp(&b.difference)
            .then_with(|| a.material_code.cmp(&b.material_code))
    });
}

// =============================================================================
// Accepted
// =============================================================================

/// A committed batch: the run header and the snapshots it appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AcceptedReconciliation {
    pub run: ReconciliationRun,
    pub snapshots: Vec<StockSnapshot>,
}

/// The whole batch was rolled back; nothing from it is in the ledger.
///
/// Carries the full batch so the operator can see what was lost. Its
/// baselines may be stale: recompute and re-propose from [`Self::counts`]
/// rather than accepting the same records again.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Reconciliation for {as_of_date} rolled back ({} materials): {reason}", .batch.len())]
pub struct ReconciliationBatchFailure {
    pub as_of_date: NaiveDate,
    pub batch: Vec<ReconciliationRecord>,
    pub reason: String,
}

impl ReconciliationBatchFailure {
    pub fn new(proposal: &ProposedReconciliation, reason: impl Into<String>) -> Self {
        ReconciliationBatchFailure {
            as_of_date: proposal.as_of_date,
            batch: proposal.records.clone(),
            reason: reason.into(),
        }
    }

    /// The operator's counts, ready for a fresh proposal.
    pub fn counts(&self) -> Vec<CountedStock> {
        self.batch
            .iter()
            .map(|r| CountedStock::new(r.material_id.clone(), r.counted_remain))
            .collect()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    fn q(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    fn baseline(id: &str, code: &str, system: &str) -> StockBaseline {
        StockBaseline {
            material_id: id.to_string(),
            material_code: code.to_string(),
            material_name: id.to_string(),
            unit_symbol: "l".to_string(),
            last_remain_quantity: q("10"),
            system_computed_remain: q(system),
        }
    }

    fn computed() -> ComputedStock {
        ComputedStock {
            as_of_date: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
            baselines: vec![
                baseline("milk", "MILK", "9.5"),
                baseline("beans", "BEANS", "4"),
                baseline("cups", "CUPS", "100"),
                baseline("syrup", "SYRUP", "2"),
            ],
        }
    }

    #[test]
    fn test_milk_difference() {
        let proposal = computed()
            .propose(&[CountedStock::new("milk", q("9.2"))])
            .unwrap();
        let record = &proposal.records[0];
        assert_eq!(record.system_computed_remain, q("9.5"));
        assert_eq!(record.difference, q("-0.3"));
        assert_eq!(record.difference.to_string(), "-0.30000");
    }

    #[test]
    fn test_sorted_by_difference_then_code() {
        let proposal = computed()
            .propose(&[
                CountedStock::new("cups", q("100")),
                CountedStock::new("milk", q("9.2")),
                CountedStock::new("beans", q("3")),
                CountedStock::new("syrup", q("2")),
            ])
            .unwrap();
        let order: Vec<&str> = proposal.records.iter().map(|r| r.material_id.as_str()).collect();
        assert_eq!(order, vec!["beans", "milk", "cups", "syrup"]);
        assert_eq!(proposal.total_difference(), q("-1.3"));
    }

    #[test]
    fn test_rejects_negative_duplicate_and_unknown_counts() {
        let c = computed();
        assert!(matches!(
            c.propose(&[CountedStock::new("milk", q("-1"))]),
            Err(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));
        assert!(matches!(
            c.propose(&[
                CountedStock::new("milk", q("1")),
                CountedStock::new("milk", q("2")),
            ]),
            Err(CoreError::Validation(ValidationError::Duplicate { .. }))
        ));
        assert!(matches!(
            c.propose(&[CountedStock::new("ghost", q("1"))]),
            Err(CoreError::Validation(ValidationError::InvalidFormat { .. }))
        ));
    }

    #[test]
    fn test_difference_overflow_is_an_error() {
        let mut c = computed();
        c.baselines[0].system_computed_remain = Quantity::from_raw(i64::MIN);
        assert!(matches!(
            c.propose(&[CountedStock::new("milk", q("1"))]),
            Err(CoreError::QuantityOverflow { .. })
        ));
    }

    #[test]
    fn test_uncounted_materials_left_out() {
        let proposal = computed().propose(&[]).unwrap();
        assert!(proposal.is_empty());
    }

    #[test]
    fn test_batch_failure_carries_batch() {
        let proposal = computed()
            .propose(&[CountedStock::new("milk", q("9.2"))])
            .unwrap();
        let failure = ReconciliationBatchFailure::new(&proposal, "stock moved");
        assert_eq!(failure.batch, proposal.records);
        assert_eq!(failure.counts(), vec![CountedStock::new("milk", q("9.2"))]);
        assert_eq!(
            failure.to_string(),
            "Reconciliation for 2026-03-02 rolled back (1 materials): stock moved"
        );
    }
}
