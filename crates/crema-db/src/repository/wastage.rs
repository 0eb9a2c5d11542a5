//! # Wastage Log
//!
//! Operator-entered material losses, each backed by one ledger row.
//!
//! ```text
//! record_wastage(milk, 0.5, "spilled", …)
//!     ├── stock_snapshots  delta −0.5, source wastage, ref = entry id
//!     └── wastage_log      entry → snapshot_id
//!
//! void_wastage(entry)
//!     ├── stock_snapshots  delta +0.5, source wastage, ref = entry id
//!     └── wastage_log      voided_at, voided_by (the only columns ever updated)
//! ```

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::ledger::{append_delta, lock_ledger};
use crate::retry::{with_write_retry, RetryPolicy};
use crema_core::validation::validate_identifier;
use crema_core::wastage::WastageRequest;
use crema_core::{Quantity, SnapshotSource, StockSnapshot, WastageLogEntry};

const SELECT_ENTRY: &str = r#"
    SELECT id, material_id, quantity, reason, date, user_id, snapshot_id, voided_at, voided_by,
           created_at
    FROM wastage_log
"#;

/// Repository for the wastage log.
#[derive(Debug, Clone)]
pub struct WastageRepository {
    pool: SqlitePool,
    retry: RetryPolicy,
}

impl WastageRepository {
    /// Creates a new WastageRepository.
    pub fn new(pool: SqlitePool, retry: RetryPolicy) -> Self {
        WastageRepository { pool, retry }
    }

    /// Records a loss and deducts it from stock in one transaction.
    ///
    /// A date earlier than the material's latest ledger row is lifted to that
    /// row's date; the returned entry carries the date actually booked.
    ///
    /// ## Errors
    /// - `Domain(InvalidQuantity)` for a zero or negative quantity
    /// - `Domain(Validation)` for a missing reason or user
    /// - `NotFound` for an unknown material
    pub async fn record_wastage(
        &self,
        material_id: &str,
        quantity: Quantity,
        reason: &str,
        user_id: &str,
        date: NaiveDate,
    ) -> DbResult<WastageLogEntry> {
        let request = WastageRequest::new(material_id, quantity, reason.trim(), user_id, date);
        request.validate()?;

        let request = &request;
        with_write_retry(&self.retry, "record_wastage", move || self.record_once(request)).await
    }

    async fn record_once(&self, request: &WastageRequest) -> DbResult<WastageLogEntry> {
        let mut tx = self.pool.begin().await?;

        lock_ledger(&mut tx).await?;

        let known: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM materials WHERE id = ?1")
            .bind(&request.material_id)
            .fetch_one(&mut *tx)
            .await?;
        if known == 0 {
            return Err(DbError::not_found("Material", &request.material_id));
        }

        let id = Uuid::new_v4().to_string();
        let snapshot = append_delta(
            &mut tx,
            &request.material_id,
            request.date,
            request.delta(),
            SnapshotSource::Wastage,
            Some(&id),
        )
        .await?;

        let entry = WastageLogEntry {
            id,
            material_id: request.material_id.clone(),
            quantity: request.quantity,
            reason: request.reason.clone(),
            date: snapshot.date,
            user_id: request.user_id.clone(),
            snapshot_id: snapshot.id,
            voided_at: None,
            voided_by: None,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO wastage_log
                (id, material_id, quantity, reason, date, user_id, snapshot_id,
                 voided_at, voided_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, NULL, ?8)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.material_id)
        .bind(entry.quantity)
        .bind(&entry.reason)
        .bind(entry.date)
        .bind(&entry.user_id)
        .bind(entry.snapshot_id)
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            entry_id = %entry.id,
            material_id = %entry.material_id,
            quantity = %entry.quantity,
            remain_after = %snapshot.remain,
            user_id = %entry.user_id,
            "Wastage recorded"
        );

        Ok(entry)
    }

    /// Cancels a wastage entry with a compensating ledger row.
    ///
    /// The compensating row is dated like the entry (lifted to the head date
    /// if the ledger has moved on).
    ///
    /// ## Errors
    /// - `NotFound` for an unknown entry
    /// - `TransactionFailed` when the entry is already voided
    pub async fn void_wastage(&self, entry_id: &str, user_id: &str) -> DbResult<StockSnapshot> {
        validate_identifier("user_id", user_id)?;

        with_write_retry(&self.retry, "void_wastage", move || {
            self.void_once(entry_id, user_id)
        })
        .await
    }

    async fn void_once(&self, entry_id: &str, user_id: &str) -> DbResult<StockSnapshot> {
        let mut tx = self.pool.begin().await?;

        lock_ledger(&mut tx).await?;

        let entry = entry_on(&mut tx, entry_id)
            .await?
            .ok_or_else(|| DbError::not_found("WastageLogEntry", entry_id))?;

        if entry.voided_at.is_some() {
            return Err(DbError::TransactionFailed(format!(
                "wastage entry {} is already voided",
                entry_id
            )));
        }

        let snapshot = append_delta(
            &mut tx,
            &entry.material_id,
            entry.date,
            entry.quantity,
            SnapshotSource::Wastage,
            Some(entry_id),
        )
        .await?;

        sqlx::query("UPDATE wastage_log SET voided_at = ?1, voided_by = ?2 WHERE id = ?3")
            .bind(Utc::now())
            .bind(user_id)
            .bind(entry_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(
            entry_id,
            material_id = %entry.material_id,
            quantity = %entry.quantity,
            user_id,
            "Wastage voided"
        );

        Ok(snapshot)
    }

    /// Gets one entry by ID.
    pub async fn get(&self, entry_id: &str) -> DbResult<Option<WastageLogEntry>> {
        let mut conn = self.pool.acquire().await?;
        entry_on(&mut conn, entry_id).await
    }

    /// Entries for a business day, oldest first.
    pub async fn list_for_date(&self, date: NaiveDate) -> DbResult<Vec<WastageLogEntry>> {
        let entries = sqlx::query_as::<_, WastageLogEntry>(&format!(
            "{} WHERE date = ?1 ORDER BY created_at, id",
            SELECT_ENTRY
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Entries for a material, most recent first.
    pub async fn list_for_material(&self, material_id: &str) -> DbResult<Vec<WastageLogEntry>> {
        let entries = sqlx::query_as::<_, WastageLogEntry>(&format!(
            "{} WHERE material_id = ?1 ORDER BY date DESC, created_at DESC",
            SELECT_ENTRY
        ))
        .bind(material_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

async fn entry_on(
    conn: &mut SqliteConnection,
    entry_id: &str,
) -> DbResult<Option<WastageLogEntry>> {
    let entry = sqlx::query_as::<_, WastageLogEntry>(&format!("{} WHERE id = ?1", SELECT_ENTRY))
        .bind(entry_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(entry)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crema_core::CoreError;

    fn q(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let milk = db.materials().create("Whole milk", "MILK", "unit-l").await.unwrap();
        (db, milk.id)
    }

    #[tokio::test]
    async fn test_record_deducts_stock() {
        let (db, milk) = setup().await;
        let wastage = db.wastage();

        let entry = wastage
            .record_wastage(&milk, q("0.5"), "spilled", "barista-1", day(1))
            .await
            .unwrap();

        let row = db.ledger().get_snapshot(entry.snapshot_id).await.unwrap().unwrap();
        assert_eq!(row.source, SnapshotSource::Wastage);
        assert_eq!(row.delta, q("-0.5"));
        assert_eq!(row.reference.as_deref(), Some(entry.id.as_str()));

        assert_eq!(db.ledger().current_stock(&milk).await.unwrap(), q("-0.5"));
        assert_eq!(wastage.list_for_date(day(1)).await.unwrap().len(), 1);
        assert_eq!(wastage.list_for_material(&milk).await.unwrap()[0].id, entry.id);
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let (db, milk) = setup().await;
        let wastage = db.wastage();

        let err = wastage
            .record_wastage(&milk, Quantity::ZERO, "spilled", "barista-1", day(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::InvalidQuantity { .. })));

        let err = wastage
            .record_wastage(&milk, q("1"), "   ", "barista-1", day(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));

        let err = wastage
            .record_wastage("ghost", q("1"), "spilled", "barista-1", day(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));

        assert!(db.ledger().history(&milk).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_backdated_entry_is_listed_on_its_ledger_date() {
        let (db, milk) = setup().await;
        let wastage = db.wastage();

        wastage
            .record_wastage(&milk, q("0.2"), "spilled", "barista-1", day(3))
            .await
            .unwrap();
        let late = wastage
            .record_wastage(&milk, q("0.3"), "expired", "barista-1", day(2))
            .await
            .unwrap();

        let row = db.ledger().get_snapshot(late.snapshot_id).await.unwrap().unwrap();
        assert_eq!(late.date, day(3));
        assert_eq!(row.date, late.date);
        assert!(wastage.list_for_date(day(2)).await.unwrap().is_empty());
        assert_eq!(wastage.list_for_date(day(3)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_void_compensates_once() {
        let (db, milk) = setup().await;
        let wastage = db.wastage();

        let entry = wastage
            .record_wastage(&milk, q("0.5"), "spilled", "barista-1", day(1))
            .await
            .unwrap();

        let compensation = wastage.void_wastage(&entry.id, "manager-1").await.unwrap();
        assert_eq!(compensation.delta, q("0.5"));
        assert_eq!(db.ledger().current_stock(&milk).await.unwrap(), Quantity::ZERO);

        let err = wastage.void_wastage(&entry.id, "manager-1").await.unwrap_err();
        assert!(matches!(err, DbError::TransactionFailed(_)));

        let entry = wastage.get(&entry.id).await.unwrap().unwrap();
        assert!(entry.voided_at.is_some());
        assert_eq!(entry.voided_by.as_deref(), Some("manager-1"));
        assert_eq!(db.ledger().history(&milk).await.unwrap().len(), 2);
        db.ledger().audit(&milk).await.unwrap();
    }
}
