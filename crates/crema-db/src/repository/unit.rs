//! # Unit Repository
//!
//! Read access to the unit reference table seeded by migration.

use sqlx::SqlitePool;

use crate::error::{DbError, DbResult};
use crema_core::Unit;

/// Repository for units of measure.
#[derive(Debug, Clone)]
pub struct UnitRepository {
    pool: SqlitePool,
}

impl UnitRepository {
    /// Creates a new UnitRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UnitRepository { pool }
    }

    /// Lists every unit, grouped by class.
    pub async fn list(&self) -> DbResult<Vec<Unit>> {
        let units = sqlx::query_as::<_, Unit>(
            "SELECT id, name, symbol, unit_class FROM units ORDER BY unit_class, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(units)
    }

    /// Gets a unit by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Unit>> {
        let unit = sqlx::query_as::<_, Unit>(
            "SELECT id, name, symbol, unit_class FROM units WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(unit)
    }

    /// Gets a unit by symbol (case-insensitive).
    pub async fn get_by_symbol(&self, symbol: &str) -> DbResult<Unit> {
        sqlx::query_as::<_, Unit>(
            "SELECT id, name, symbol, unit_class FROM units WHERE symbol = ?1 COLLATE NOCASE",
        )
        .bind(symbol.trim())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Unit", symbol))
    }
}
