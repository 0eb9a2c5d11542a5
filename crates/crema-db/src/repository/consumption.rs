//! # Consumption Engine
//!
//! Turns a confirmed order line into stock deductions.
//!
//! ## Transaction Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  consume(request)                        (retried on WriteConflict)     │
//! │                                                                         │
//! │  BEGIN                                                                  │
//! │   ├── lock_ledger()                                                     │
//! │   ├── INSERT consumption_records … ON CONFLICT DO NOTHING               │
//! │   │      └── 0 rows ──► replay: read original deductions, ROLLBACK      │
//! │   ├── load recipes (product + toppings)                                 │
//! │   ├── compute_draw_down()                                               │
//! │   ├── per material with total ≠ 0:                                      │
//! │   │      append_delta(−total, consumption, ref = order_line_id)         │
//! │   │      INSERT consumption_deductions                                  │
//! │   ├── per missing recipe line: INSERT recipe_gap_alerts                 │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Negative stock is reported, never refused: the sale already happened.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use crate::error::{DbError, DbResult};
use crate::repository::ledger::{append_delta, lock_ledger};
use crate::repository::recipe::load_definitions;
use crate::retry::{with_write_retry, RetryPolicy};
use crema_core::consumption::{compute_draw_down, ConsumeRequest};
use crema_core::ledger::Shortfall;
use crema_core::recipe::MissingRecipeLine;
use crema_core::{
    ConsumptionDeduction, ConsumptionRecord, RecipeGapAlert, SnapshotSource, StockSnapshot,
};

/// Result of [`ConsumptionRepository::consume`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsumptionOutcome {
    pub order_line_id: String,
    pub deductions: Vec<ConsumptionDeduction>,
    /// Materials driven below zero by this line.
    pub shortfalls: Vec<Shortfall>,
    /// Recipe lines that were missing and counted as zero.
    pub missing_lines: Vec<MissingRecipeLine>,
    /// True when the order line had already been consumed; nothing was
    /// appended.
    pub replayed: bool,
}

/// Result of [`ConsumptionRepository::reverse`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReversalOutcome {
    pub order_line_id: String,
    /// Compensating snapshots, one per original deduction.
    pub snapshots: Vec<StockSnapshot>,
    pub already_reversed: bool,
}

/// Repository for consumption records and the consumption engine.
#[derive(Debug, Clone)]
pub struct ConsumptionRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl ConsumptionRepository {
    /// Creates a new ConsumptionRepository.
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        ConsumptionRepository { pool, retry }
    }

    // =========================================================================
    // Engine
    // =========================================================================

    /// Deducts the materials a confirmed order line consumed.
    ///
    /// Idempotent on `order_line_id`: a second call returns the original
    /// deductions with `replayed = true`.
    ///
    /// ## Errors
    /// - `Domain(Validation)` for a malformed request
    /// - `Domain(QuantityOverflow)` when the draw-down does not fit
    /// - `WriteConflict` once the retry budget is spent
    pub async fn consume(&self, request: &ConsumeRequest) -> DbResult<ConsumptionOutcome> {
        request.validate()?;

        with_write_retry(&self.retry, "consume", move || self.consume_once(request)).await
    }

    async fn consume_once(&self, request: &ConsumeRequest) -> DbResult<ConsumptionOutcome> {
        let order_line_id = request.order_line_id.as_str();
        let mut tx = self.pool.begin().await?;

        lock_ledger(&mut tx).await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO consumption_records
                (order_line_id, product_id, size_id, quantity_sold, confirmed_at, reversed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, NULL)
            ON CONFLICT(order_line_id) DO NOTHING
            "#,
        )
        .bind(order_line_id)
        .bind(&request.product_id)
        .bind(&request.size_id)
        .bind(request.quantity_sold)
        .bind(request.confirmed_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            let deductions = deductions_on(&mut tx, order_line_id).await?;
            let missing_lines = missing_lines_on(&mut tx, order_line_id).await?;
            tx.rollback().await?;

            info!(order_line_id, "Order line already consumed, returning original deductions");

            return Ok(ConsumptionOutcome {
                order_line_id: order_line_id.to_string(),
                shortfalls: deductions
                    .iter()
                    .filter_map(|d| Shortfall::check(&d.material_id, d.remain_after))
                    .collect(),
                deductions,
                missing_lines,
                replayed: true,
            });
        }

        let recipes = load_definitions(&mut tx, &request.entity_ids()).await?;
        let draw_down = compute_draw_down(&request.consumable_lines(), &recipes)?;
        let date = request.confirmed_at.date_naive();

        let mut deductions = Vec::with_capacity(draw_down.totals.len());
        let mut shortfalls = Vec::new();

        for (material_id, total) in &draw_down.totals {
            let snapshot = append_delta(
                &mut tx,
                material_id,
                date,
                -*total,
                SnapshotSource::Consumption,
                Some(order_line_id),
            )
            .await?;

            let deduction = ConsumptionDeduction {
                order_line_id: order_line_id.to_string(),
                material_id: material_id.clone(),
                quantity: *total,
                snapshot_id: snapshot.id,
                remain_after: snapshot.remain,
            };

            sqlx::query(
                r#"
                INSERT INTO consumption_deductions
                    (order_line_id, material_id, quantity, snapshot_id, remain_after)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(&deduction.order_line_id)
            .bind(&deduction.material_id)
            .bind(deduction.quantity)
            .bind(deduction.snapshot_id)
            .bind(deduction.remain_after)
            .execute(&mut *tx)
            .await?;

            if let Some(shortfall) = Shortfall::check(material_id, snapshot.remain) {
                warn!(
                    order_line_id,
                    material_id = %shortfall.material_id,
                    remain_after = %shortfall.remain_after,
                    "Stock shortfall after consumption"
                );
                shortfalls.push(shortfall);
            }

            deductions.push(deduction);
        }

        let now = Utc::now();
        for missing in &draw_down.missing {
            sqlx::query(
                r#"
                INSERT INTO recipe_gap_alerts
                    (order_line_id, product_id, size_id, material_id, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(order_line_id)
            .bind(&missing.product_id)
            .bind(&missing.size_id)
            .bind(&missing.material_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            warn!(
                target: "crema::integrity",
                order_line_id,
                product_id = %missing.product_id,
                size_id = missing.size_id.as_deref().unwrap_or("-"),
                material_id = %missing.material_id,
                "Recipe line missing, material counted as zero"
            );
        }

        tx.commit().await?;

        info!(
            order_line_id,
            product_id = %request.product_id,
            materials = deductions.len(),
            shortfalls = shortfalls.len(),
            "Order line consumed"
        );

        Ok(ConsumptionOutcome {
            order_line_id: order_line_id.to_string(),
            deductions,
            shortfalls,
            missing_lines: draw_down.missing,
            replayed: false,
        })
    }

    /// Puts back everything an order line consumed.
    ///
    /// Appends one compensating snapshot per original deduction, dated
    /// `reversed_at`. Reversing twice is a no-op that returns the first
    /// reversal's snapshots.
    ///
    /// ## Errors
    /// `NotFound` when the order line was never consumed.
    pub async fn reverse(
        &self,
        order_line_id: &str,
        reversed_at: DateTime<Utc>,
    ) -> DbResult<ReversalOutcome> {
        with_write_retry(&self.retry, "reverse", move || {
            self.reverse_once(order_line_id, reversed_at)
        })
        .await
    }

    async fn reverse_once(
        &self,
        order_line_id: &str,
        reversed_at: DateTime<Utc>,
    ) -> DbResult<ReversalOutcome> {
        let mut tx = self.pool.begin().await?;

        lock_ledger(&mut tx).await?;

        let record = record_on(&mut tx, order_line_id)
            .await?
            .ok_or_else(|| DbError::not_found("ConsumptionRecord", order_line_id))?;

        if record.reversed_at.is_some() {
            let snapshots = sqlx::query_as::<_, StockSnapshot>(
                r#"
                SELECT id, material_id, date, remain, delta, source, reference, created_at
                FROM stock_snapshots
                WHERE reference = ?1 AND source = 'consumption' AND delta > 0
                ORDER BY id
                "#,
            )
            .bind(order_line_id)
            .fetch_all(&mut *tx)
            .await?;
            tx.rollback().await?;

            info!(order_line_id, "Order line already reversed");
            return Ok(ReversalOutcome {
                order_line_id: order_line_id.to_string(),
                snapshots,
                already_reversed: true,
            });
        }

        let date = reversed_at.date_naive();
        let mut snapshots = Vec::new();

        for deduction in deductions_on(&mut tx, order_line_id).await? {
            let snapshot = append_delta(
                &mut tx,
                &deduction.material_id,
                date,
                deduction.quantity,
                SnapshotSource::Consumption,
                Some(order_line_id),
            )
            .await?;
            snapshots.push(snapshot);
        }

        sqlx::query("UPDATE consumption_records SET reversed_at = ?1 WHERE order_line_id = ?2")
            .bind(reversed_at)
            .bind(order_line_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(order_line_id, materials = snapshots.len(), "Order line reversed");

        Ok(ReversalOutcome {
            order_line_id: order_line_id.to_string(),
            snapshots,
            already_reversed: false,
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Gets the idempotency record of an order line.
    pub async fn get_record(&self, order_line_id: &str) -> DbResult<Option<ConsumptionRecord>> {
        let mut conn = self.pool.acquire().await?;
        record_on(&mut conn, order_line_id).await
    }

    /// What an order line drew down, ordered by material.
    pub async fn deductions(&self, order_line_id: &str) -> DbResult<Vec<ConsumptionDeduction>> {
        let mut conn = self.pool.acquire().await?;
        deductions_on(&mut conn, order_line_id).await
    }

    /// Most recent recipe gap alerts first.
    pub async fn recent_gap_alerts(&self, limit: i64) -> DbResult<Vec<RecipeGapAlert>> {
        let alerts = sqlx::query_as::<_, RecipeGapAlert>(
            r#"
            SELECT id, order_line_id, product_id, size_id, material_id, created_at
            FROM recipe_gap_alerts
            ORDER BY id DESC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(alerts)
    }
}

async fn record_on(
    conn: &mut SqliteConnection,
    order_line_id: &str,
) -> DbResult<Option<ConsumptionRecord>> {
    let record = sqlx::query_as::<_, ConsumptionRecord>(
        r#"
        SELECT order_line_id, product_id, size_id, quantity_sold, confirmed_at, reversed_at
        FROM consumption_records
        WHERE order_line_id = ?1
        "#,
    )
    .bind(order_line_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(record)
}

async fn deductions_on(
    conn: &mut SqliteConnection,
    order_line_id: &str,
) -> DbResult<Vec<ConsumptionDeduction>> {
    let deductions = sqlx::query_as::<_, ConsumptionDeduction>(
        r#"
        SELECT order_line_id, material_id, quantity, snapshot_id, remain_after
        FROM consumption_deductions
        WHERE order_line_id = ?1
        ORDER BY material_id
        "#,
    )
    .bind(order_line_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(deductions)
}

async fn missing_lines_on(
    conn: &mut SqliteConnection,
    order_line_id: &str,
) -> DbResult<Vec<MissingRecipeLine>> {
    let rows: Vec<(String, Option<String>, String)> = sqlx::query_as(
        r#"
        SELECT product_id, size_id, material_id
        FROM recipe_gap_alerts
        WHERE order_line_id = ?1
        ORDER BY id
        "#,
    )
    .bind(order_line_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(product_id, size_id, material_id)| MissingRecipeLine {
            product_id,
            size_id,
            material_id,
        })
        .collect())
}

// =============================================================================
// Unit Tests
// =============================================================================
