//! # Stock Ledger Repository
//!
//! Append-only, per-material time series of stock snapshots.
//!
//! ## Read and Write Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  WRITE (pub(crate), inside an engine transaction)                       │
//! │  ─────────────────────────────────────────────────                      │
//! │  lock_ledger()          UPDATE ledger_state  ← takes SQLite write lock  │
//! │  append_delta()         head + delta         (consumption, wastage)     │
//! │  append_absolute()      counted remain       (reconciliation)           │
//! │       │                                                                 │
//! │       ├──► INSERT stock_snapshots   (triggers forbid UPDATE/DELETE)     │
//! │       └──► UPSERT material_stock    (cached head, same transaction)     │
//! │                                                                         │
//! │  READ (pub)                                                             │
//! │  ──────────                                                             │
//! │  current_stock()        material_stock projection                       │
//! │  history()              stock_snapshots, most recent first              │
//! │  all_current_stock(d)   latest row with date ≤ d, default 0             │
//! │  audit()                replays the chain, checks the projection        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering
//! Rows are ordered by `(date, id)`. A delta append dated before the
//! material's head is lifted to the head date, so every append becomes the
//! new head and the chain stays additive in ledger order.

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{DbError, DbResult};
use crema_core::ledger::{verify_additivity, Shortfall};
use crema_core::{CoreError, Quantity, SnapshotSource, StockSnapshot};

const SELECT_SNAPSHOT: &str = r#"
    SELECT id, material_id, date, remain, delta, source, reference, created_at
    FROM stock_snapshots
"#;

/// Cached head of one material's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub(crate) struct LedgerHead {
    pub remain: Quantity,
    pub last_snapshot_id: i64,
    pub last_date: NaiveDate,
}

/// Repository for reading the stock ledger.
///
/// ## Usage
/// ```rust,ignore
/// let ledger = db.ledger();
/// let milk = ledger.current_stock("mat-milk").await?;
/// let closing = ledger.all_current_stock(today).await?;
/// ```
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
}

impl LedgerRepository {
    /// Creates a new LedgerRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LedgerRepository { pool }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current stock of a material; zero when it has never moved.
    pub async fn current_stock(&self, material_id: &str) -> DbResult<Quantity> {
        let remain: Option<Quantity> =
            sqlx::query_scalar("SELECT remain FROM material_stock WHERE material_id = ?1")
                .bind(material_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(remain.unwrap_or(Quantity::ZERO))
    }

    /// Full ledger history of a material, most recent first.
    pub async fn history(&self, material_id: &str) -> DbResult<Vec<StockSnapshot>> {
        let snapshots = sqlx::query_as::<_, StockSnapshot>(&format!(
            "{} WHERE material_id = ?1 ORDER BY date DESC, id DESC",
            SELECT_SNAPSHOT
        ))
        .bind(material_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(snapshots)
    }

    /// Snapshots appended on behalf of one order line, wastage entry or
    /// reconciliation run, in insertion order.
    pub async fn by_reference(&self, reference: &str) -> DbResult<Vec<StockSnapshot>> {
        let snapshots = sqlx::query_as::<_, StockSnapshot>(&format!(
            "{} WHERE reference = ?1 ORDER BY id",
            SELECT_SNAPSHOT
        ))
        .bind(reference)
        .fetch_all(&self.pool)
        .await?;

        Ok(snapshots)
    }

    /// Gets one snapshot by ID.
    pub async fn get_snapshot(&self, id: i64) -> DbResult<Option<StockSnapshot>> {
        let snapshot =
            sqlx::query_as::<_, StockSnapshot>(&format!("{} WHERE id = ?1", SELECT_SNAPSHOT))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(snapshot)
    }

    /// Stock of every material as of the end of `as_of_date`.
    ///
    /// For each material, the latest snapshot with `date <= as_of_date`;
    /// materials with no such snapshot map to zero.
    pub async fn all_current_stock(
        &self,
        as_of_date: NaiveDate,
    ) -> DbResult<BTreeMap<String, Quantity>> {
        let mut conn = self.pool.acquire().await?;
        all_current_stock_on(&mut conn, as_of_date).await
    }

    /// Materials whose current stock is below zero.
    pub async fn shortfalls(&self) -> DbResult<Vec<Shortfall>> {
        let rows: Vec<(String, Quantity)> = sqlx::query_as(
            "SELECT material_id, remain FROM material_stock WHERE remain < 0 ORDER BY remain",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(material_id, remain_after)| Shortfall {
                material_id,
                remain_after,
            })
            .collect())
    }

    /// Replays a material's chain from zero and checks the cached head.
    ///
    /// ## Errors
    /// `Domain(LedgerInconsistent)` when a row does not follow from its
    /// predecessor or the projection disagrees with the latest row.
    pub async fn audit(&self, material_id: &str) -> DbResult<()> {
        let mut chain = self.history(material_id).await?;
        chain.reverse();

        verify_additivity(&chain)?;

        let head: Option<LedgerHead> = sqlx::query_as(
            "SELECT remain, last_snapshot_id, last_date FROM material_stock WHERE material_id = ?1",
        )
        .bind(material_id)
        .fetch_optional(&self.pool)
        .await?;

        match (chain.last(), head) {
            (None, None) => Ok(()),
            (Some(last), Some(head))
                if last.id == head.last_snapshot_id && last.remain == head.remain =>
            {
                Ok(())
            }
            (last, head) => {
                let expected = last.map(|s| s.remain).unwrap_or(Quantity::ZERO);
                let found = head.map(|h| h.remain).unwrap_or(Quantity::ZERO);
                warn!(
                    target: "crema::integrity",
                    material_id,
                    %expected,
                    %found,
                    "Stock projection disagrees with ledger"
                );
                Err(CoreError::LedgerInconsistent {
                    material_id: material_id.to_string(),
                    snapshot_id: head.map(|h| h.last_snapshot_id).unwrap_or(0),
                    expected,
                    found,
                }
                .into())
            }
        }
    }
}

// =============================================================================
// Append Primitives (engine transactions only)
// =============================================================================

/// Takes the ledger write lock for the surrounding transaction.
///
/// Must be the first statement of every ledger-writing transaction: SQLite
/// grants the write lock on the first write, so every head read that
/// follows sees the state this transaction will build on.
pub(crate) async fn lock_ledger(conn: &mut SqliteConnection) -> DbResult<()> {
    sqlx::query("UPDATE ledger_state SET version = version + 1 WHERE id = 1")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Reads a material's cached head.
pub(crate) async fn head(
    conn: &mut SqliteConnection,
    material_id: &str,
) -> DbResult<Option<LedgerHead>> {
    let head = sqlx::query_as::<_, LedgerHead>(
        "SELECT remain, last_snapshot_id, last_date FROM material_stock WHERE material_id = ?1",
    )
    .bind(material_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(head)
}

/// Appends a signed change on top of the material's current stock.
///
/// A `date` earlier than the head date is lifted to the head date.
pub(crate) async fn append_delta(
    conn: &mut SqliteConnection,
    material_id: &str,
    date: NaiveDate,
    delta: Quantity,
    source: SnapshotSource,
    reference: Option<&str>,
) -> DbResult<StockSnapshot> {
    let current = head(conn, material_id).await?;
    let (previous, date) = match current {
        Some(h) => (h.remain, date.max(h.last_date)),
        None => (Quantity::ZERO, date),
    };

    let remain = previous
        .checked_add(delta)
        .ok_or_else(|| CoreError::overflow(format!("stock of {}", material_id)))?;

    insert_snapshot(conn, material_id, date, remain, delta, source, reference).await
}

/// Appends an absolute remain (a physical count) dated `date`.
///
/// Fails when the material already has a row dated after `date`: the new
/// row would not be the head and the chain would stop adding up.
pub(crate) async fn append_absolute(
    conn: &mut SqliteConnection,
    material_id: &str,
    date: NaiveDate,
    remain: Quantity,
    source: SnapshotSource,
    reference: Option<&str>,
) -> DbResult<StockSnapshot> {
    let previous = match head(conn, material_id).await? {
        Some(h) if h.last_date > date => {
            return Err(DbError::TransactionFailed(format!(
                "material {} has ledger entries dated {} after {}",
                material_id, h.last_date, date
            )));
        }
        Some(h) => h.remain,
        None => Quantity::ZERO,
    };

    let delta = remain
        .checked_sub(previous)
        .ok_or_else(|| CoreError::overflow(format!("stock of {}", material_id)))?;

    insert_snapshot(conn, material_id, date, remain, delta, source, reference).await
}

async fn insert_snapshot(
    conn: &mut SqliteConnection,
    material_id: &str,
    date: NaiveDate,
    remain: Quantity,
    delta: Quantity,
    source: SnapshotSource,
    reference: Option<&str>,
) -> DbResult<StockSnapshot> {
    let created_at = Utc::now();

    let id = sqlx::query(
        r#"
        INSERT INTO stock_snapshots (material_id, date, remain, delta, source, reference, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(material_id)
    .bind(date)
    .bind(remain)
    .bind(delta)
    .bind(source)
    .bind(reference)
    .bind(created_at)
    .execute(&mut *conn)
    .await?
    .last_insert_rowid();

    sqlx::query(
        r#"
        INSERT INTO material_stock (material_id, remain, last_snapshot_id, last_date)
        VALUES (?1, ?2, ?3, ?4)
        ON CONFLICT(material_id) DO UPDATE SET
            remain = excluded.remain,
            last_snapshot_id = excluded.last_snapshot_id,
            last_date = excluded.last_date
        "#,
    )
    .bind(material_id)
    .bind(remain)
    .bind(id)
    .bind(date)
    .execute(&mut *conn)
    .await?;

    debug!(
        snapshot_id = id,
        material_id,
        %date,
        %delta,
        %remain,
        source = %source,
        "Ledger row appended"
    );

    Ok(StockSnapshot {
        id,
        material_id: material_id.to_string(),
        date,
        remain,
        delta,
        source,
        reference: reference.map(str::to_string),
        created_at,
    })
}

/// [`LedgerRepository::all_current_stock`] on an existing connection.
pub(crate) async fn all_current_stock_on(
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
                WHERE s.material_id = m.id AND s.date <= ?1
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
