//! # Reconciliation Engine
//!
//! Computes stock as of a date, and commits an operator's counts as one
//! all-or-nothing batch.
//!
//! ## Accept
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  accept(proposal, user)                  (retried on WriteConflict)     │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │   ├── lock_ledger()                                                     │
//! │   ├── INSERT reconciliation_runs                                        │
//! │   ├── all_current_stock(as_of)  ──► must equal system_computed_remain   │
//! │   │                                 for every record (else stale)       │
//! │   ├── per record: append_absolute(counted, as_of, ref = run id)         │
//! │   │                 └── fails when the material has later entries       │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  any failure ──► ROLLBACK ──► DbError::Reconciliation(batch failure)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::{BTreeMap, HashSet};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::ledger::{all_current_stock_on, append_absolute, lock_ledger};
use crate::repository::material::MaterialRepository;
use crate::retry::{with_write_retry, RetryPolicy};
use crema_core::reconciliation::{
    AcceptedReconciliation, ComputedStock, ProposedReconciliation, ReconciliationBatchFailure,
    StockBaseline,
};
use crema_core::validation::{validate_identifier, validate_non_negative_quantity};
use crema_core::{CountedStock, Quantity, ReconciliationRun, SnapshotSource, ValidationError};

/// Repository for reconciliation runs.
#[derive(Debug, Clone)]
pub struct ReconciliationRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl ReconciliationRepository {
    /// Creates a new ReconciliationRepository.
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        ReconciliationRepository { pool, retry }
    }

    // =========================================================================
    // COMPUTED / PROPOSED
    // =========================================================================

    /// Ledger stock of every active material as of the end of `as_of_date`.
    pub async fn compute(&self, as_of_date: NaiveDate) -> DbResult<ComputedStock> {
        let materials = MaterialRepository::new(self.pool.clone()).list(false).await?;

        let mut conn = self.pool.acquire().await?;
        let system = all_current_stock_on(&mut conn, as_of_date).await?;
        let last_counts = last_counts_on(&mut conn, as_of_date).await?;

        let baselines = materials
            .into_iter()
            .map(|material| StockBaseline {
                last_remain_quantity: last_counts
                    .get(&material.id)
                    .copied()
                    .unwrap_or(Quantity::ZERO),
                system_computed_remain: system
                    .get(&material.id)
                    .copied()
                    .unwrap_or(Quantity::ZERO),
                material_id: material.id,
                material_code: material.code,
                material_name: material.name,
                unit_symbol: material.unit.symbol,
            })
            .collect();

        Ok(ComputedStock {
            as_of_date,
            baselines,
        })
    }

    /// [`compute`](Self::compute) followed by [`ComputedStock::propose`].
    pub async fn propose(
        &self,
        as_of_date: NaiveDate,
        counts: &[CountedStock],
    ) -> DbResult<ProposedReconciliation> {
        Ok(self.compute(as_of_date).await?.propose(counts)?)
    }

    // =========================================================================
    // ACCEPTED
    // =========================================================================

    /// Commits a proposed batch.
    ///
    /// ## Errors
    /// - `Domain(Validation)` for an empty batch or a missing user
    /// - `Reconciliation` for everything else: the ledger moved since the
    ///   computation, a material has entries dated after the run date, a
    ///   storage error, or write conflicts past the retry budget. Nothing
    ///   from the batch is in the ledger.
    pub async fn accept(
        &self,
        proposal: &ProposedReconciliation,
        user_id: &str,
    ) -> DbResult<AcceptedReconciliation> {
        validate_identifier("user_id", user_id)?;
        if proposal.is_empty() {
            return Err(ValidationError::Required {
                field: "records".to_string(),
            }
            .into());
        }

        with_write_retry(&self.retry, "accept_reconciliation", move || {
            self.accept_once(proposal, user_id)
        })
        .await
        .map_err(|err| {
            warn!(
                as_of_date = %proposal.as_of_date,
                materials = proposal.records.len(),
                error = %err,
                "Reconciliation batch rolled back"
            );
            DbError::Reconciliation(ReconciliationBatchFailure::new(proposal, err.to_string()))
        })
    }

    async fn accept_once(
        &self,
        proposal: &ProposedReconciliation,
        user_id: &str,
    ) -> DbResult<AcceptedReconciliation> {
        let as_of_date = proposal.as_of_date;
        let mut tx = self.pool.begin().await?;

        lock_ledger(&mut tx).await?;

        let run = ReconciliationRun {
            id: Uuid::new_v4().to_string(),
            as_of_date,
            user_id: user_id.to_string(),
            material_count: proposal.records.len() as i64,
            accepted_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO reconciliation_runs (id, as_of_date, user_id, material_count, accepted_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&run.id)
        .bind(run.as_of_date)
        .bind(&run.user_id)
        .bind(run.material_count)
        .bind(run.accepted_at)
        .execute(&mut *tx)
        .await?;

        let current = all_current_stock_on(&mut tx, as_of_date).await?;
        let mut seen = HashSet::with_capacity(proposal.records.len());
        let mut snapshots = Vec::with_capacity(proposal.records.len());

        for record in &proposal.records {
            validate_non_negative_quantity("counted_remain", record.counted_remain)?;
            if !seen.insert(record.material_id.as_str()) {
                return Err(DbError::duplicate("material_id", &record.material_id));
            }

            let found = current
                .get(&record.material_id)
                .copied()
                .ok_or_else(|| DbError::not_found("Material", &record.material_id))?;

            if found != record.system_computed_remain {
                return Err(DbError::TransactionFailed(format!(
                    "stock of {} moved since it was computed: expected {}, found {}",
                    record.material_code, record.system_computed_remain, found
                )));
            }

            let snapshot = append_absolute(
                &mut tx,
                &record.material_id,
                as_of_date,
                record.counted_remain,
                SnapshotSource::Reconciliation,
                Some(&run.id),
            )
            .await?;
            snapshots.push(snapshot);
        }

        tx.commit().await?;

        info!(
            run_id = %run.id,
            %as_of_date,
            user_id,
            materials = snapshots.len(),
            total_difference = %proposal.total_difference(),
            "Reconciliation accepted"
        );

        Ok(AcceptedReconciliation { run, snapshots })
    }

    /// Runs accepted for a date, in acceptance order.
    pub async fn runs_for_date(&self, as_of_date: NaiveDate) -> DbResult<Vec<ReconciliationRun>> {
        let runs = sqlx::query_as::<_, ReconciliationRun>(
            r#"
            SELECT id, as_of_date, user_id, material_count, accepted_at
            FROM reconciliation_runs
            WHERE as_of_date = ?1
            ORDER BY accepted_at, id
            "#,
        )
        .bind(as_of_date)
        .fetch_all(&self.pool)
        .await?;

        Ok(runs)
    }
}

/// Latest reconciliation count per material on or before `as_of_date`.
async fn last_counts_on(
    conn: &mut SqliteConnection,
    as_of_date: NaiveDate,
) -> DbResult<BTreeMap<String, Quantity>> {
    let rows: Vec<(String, Quantity)> = sqlx::query_as(
        r#"
        SELECT
            m.id,
            COALESCE((
                SELECT s.remain
                FROM stock_snapshots s
                WHERE s.material_id = m.id
                  AND s.source = 'reconciliation'
                  AND s.date <= ?1
                ORDER BY s.date DESC, s.id DESC
                LIMIT 1
            ), 0) AS remain
        FROM materials m
        "#,
    )
    .bind(as_of_date)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().collect())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn q(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    async fn setup() -> (Database, String, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let milk = db.materials().create("Whole milk", "MILK", "unit-l").await.unwrap().id;
        let beans = db.materials().create("Coffee beans", "BEANS", "unit-kg").await.unwrap().id;
        (db, milk, beans)
    }

    #[tokio::test]
    async fn test_opening_count_then_wastage_then_count() {
        let (db, milk, _) = setup().await;
        let reconciliation = db.reconciliation();

        let opening = reconciliation
            .propose(day(1), &[CountedStock::new(&milk, q("10"))])
            .await
            .unwrap();
        reconciliation.accept(&opening, "manager-1").await.unwrap();

        db.wastage()
            .record_wastage(&milk, q("0.5"), "spilled", "barista-1", day(2))
            .await
            .unwrap();

        let computed = reconciliation.compute(day(2)).await.unwrap();
        let baseline = computed.baseline(&milk).unwrap();
        assert_eq!(baseline.last_remain_quantity, q("10"));
        assert_eq!(baseline.system_computed_remain, q("9.5"));

        let proposal = computed.propose(&[CountedStock::new(&milk, q("9.2"))]).unwrap();
        assert_eq!(proposal.records[0].difference, q("-0.3"));

        let accepted = reconciliation.accept(&proposal, "manager-1").await.unwrap();
        assert_eq!(accepted.snapshots.len(), 1);
        assert_eq!(accepted.snapshots[0].delta, q("-0.3"));
        assert_eq!(
            accepted.snapshots[0].reference.as_deref(),
            Some(accepted.run.id.as_str())
        );

        assert_eq!(db.ledger().current_stock(&milk).await.unwrap(), q("9.2"));
        assert_eq!(reconciliation.runs_for_date(day(2)).await.unwrap().len(), 1);
        db.ledger().audit(&milk).await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_batch_rolls_back_entirely() {
        let (db, milk, beans) = setup().await;
        let reconciliation = db.reconciliation();

        let proposal = reconciliation
            .propose(
                day(1),
                &[
                    CountedStock::new(&milk, q("10")),
                    CountedStock::new(&beans, q("4")),
                ],
            )
            .await
            .unwrap();

        // Ledger moves for one material between compute and accept.
        db.wastage()
            .record_wastage(&beans, q("0.1"), "dropped", "barista-1", day(1))
            .await
            .unwrap();

        let err = reconciliation.accept(&proposal, "manager-1").await.unwrap_err();
        match err {
            DbError::Reconciliation(failure) => {
                assert_eq!(failure.batch, proposal.records);
                assert_eq!(failure.as_of_date, day(1));
            }
            other => panic!("expected batch failure, got {other:?}"),
        }

        assert!(db.ledger().history(&milk).await.unwrap().is_empty());
        assert!(reconciliation.runs_for_date(day(1)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_is_re_proposed_from_its_counts() {
        let (db, milk, beans) = setup().await;
        let reconciliation = db.reconciliation();

        let proposal = reconciliation
            .propose(day(1), &[CountedStock::new(&beans, q("4"))])
            .await
            .unwrap();
        db.wastage()
            .record_wastage(&beans, q("0.1"), "dropped", "barista-1", day(1))
            .await
            .unwrap();

        let DbError::Reconciliation(failure) =
            reconciliation.accept(&proposal, "manager-1").await.unwrap_err()
        else {
            panic!("expected batch failure");
        };

        // The same records fail again; a fresh proposal goes through.
        assert!(reconciliation.accept(&proposal, "manager-1").await.is_err());
        let fresh = reconciliation
            .propose(failure.as_of_date, &failure.counts())
            .await
            .unwrap();
        assert_eq!(fresh.records[0].system_computed_remain, q("-0.1"));
        assert_eq!(fresh.records[0].difference, q("4.1"));
        reconciliation.accept(&fresh, "manager-1").await.unwrap();

        assert_eq!(db.ledger().current_stock(&beans).await.unwrap(), q("4"));
        assert!(db.ledger().history(&milk).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_later_entries_block_backdated_count() {
        let (db, milk, _) = setup().await;
        let reconciliation = db.reconciliation();

        db.wastage()
            .record_wastage(&milk, q("0.5"), "spilled", "barista-1", day(5))
            .await
            .unwrap();

        let proposal = reconciliation
            .propose(day(3), &[CountedStock::new(&milk, q("10"))])
            .await
            .unwrap();
        assert_eq!(proposal.records[0].system_computed_remain, Quantity::ZERO);

        let err = reconciliation.accept(&proposal, "manager-1").await.unwrap_err();
        assert!(matches!(err, DbError::Reconciliation(_)));
        assert_eq!(db.ledger().current_stock(&milk).await.unwrap(), q("-0.5"));
    }

    #[tokio::test]
    async fn test_rerun_appends_new_rows() {
        let (db, milk, _) = setup().await;
        let reconciliation = db.reconciliation();

        for count in ["10", "9.8"] {
            let proposal = reconciliation
                .propose(day(1), &[CountedStock::new(&milk, q(count))])
                .await
                .unwrap();
            reconciliation.accept(&proposal, "manager-1").await.unwrap();
        }

        let computed = reconciliation.compute(day(1)).await.unwrap();
        assert_eq!(computed.baseline(&milk).unwrap().last_remain_quantity, q("9.8"));
        assert_eq!(db.ledger().history(&milk).await.unwrap().len(), 2);
        assert_eq!(reconciliation.runs_for_date(day(1)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_inactive_materials_are_not_computed() {
        let (db, milk, beans) = setup().await;
        db.materials().set_active(&beans, false).await.unwrap();

        let computed = db.reconciliation().compute(day(1)).await.unwrap();
        assert_eq!(computed.baselines.len(), 1);
        assert_eq!(computed.baselines[0].material_id, milk);

        let err = computed
            .propose(&[CountedStock::new(&beans, q("1"))])
            .unwrap_err();
        assert!(matches!(err, crema_core::CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let (db, _, _) = setup().await;
        let proposal = ProposedReconciliation {
            as_of_date: day(1),
            records: Vec::new(),
        };
        let err = db.reconciliation().accept(&proposal, "manager-1").await.unwrap_err();
        assert!(matches!(err, DbError::Domain(_)));
    }
}
