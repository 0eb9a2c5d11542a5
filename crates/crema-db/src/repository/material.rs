//! # Material Repository
//!
//! Back-office maintenance of raw materials.
//!
//! Materials are never deleted: once a ledger row references one, the
//! foreign key on `stock_snapshots` blocks removal, and retiring a material
//! is done with [`MaterialRepository::set_active`].

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crema_core::validation::{validate_material_code, validate_material_name};
use crema_core::{Material, Unit, UnitClass};

const SELECT_MATERIAL: &str = r#"
    SELECT
        m.id, m.name, m.code, m.is_active, m.created_at, m.updated_at,
        u.id AS unit_id, u.name AS unit_name, u.symbol AS unit_symbol,
        u.unit_class AS unit_class
    FROM materials m
    INNER JOIN units u ON u.id = m.unit_id
"#;

/// Flat row for a material joined with its storage unit.
#[derive(Debug, sqlx::FromRow)]
struct MaterialRow {
    id: String,
    name: String,
    code: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    unit_id: String,
    unit_name: String,
    unit_symbol: String,
    unit_class: UnitClass,
}

impl From<MaterialRow> for Material {
    fn from(row: MaterialRow) -> Self {
        Material {
            id: row.id,
            name: row.name,
            code: row.code,
            unit: Unit {
                id: row.unit_id,
                name: row.unit_name,
                symbol: row.unit_symbol,
                unit_class: row.unit_class,
            },
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for material database operations.
#[derive(Debug, Clone)]
pub struct MaterialRepository {
    pool: SqlitePool,
}

impl MaterialRepository {
    /// Creates a new MaterialRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MaterialRepository { pool }
    }

    /// Creates a material stored in the given unit.
    ///
    /// ## Errors
    /// - `Domain(Validation)` for a bad name or code
    /// - `UniqueViolation` when the code is taken
    /// - `ForeignKeyViolation` for an unknown unit
    pub async fn create(&self, name: &str, code: &str, unit_id: &str) -> DbResult<Material> {
        validate_material_name(name)?;
        validate_material_code(code)?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO materials (id, name, code, unit_id, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)
            "#,
        )
        .bind(&id)
        .bind(name.trim())
        .bind(code.trim())
        .bind(unit_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: code.trim().to_string(),
            },
            other => other,
        })?;

        info!(material_id = %id, code = %code, "Material created");

        self.get_by_id(&id)
            .await?
            .ok_or_else(|| DbError::not_found("Material", &id))
    }

    /// Gets a material by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Material>> {
        let row = sqlx::query_as::<_, MaterialRow>(&format!("{} WHERE m.id = ?1", SELECT_MATERIAL))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Material::from))
    }

    /// Gets a material by its back-office code.
    pub async fn get_by_code(&self, code: &str) -> DbResult<Option<Material>> {
        let row =
            sqlx::query_as::<_, MaterialRow>(&format!("{} WHERE m.code = ?1", SELECT_MATERIAL))
                .bind(code.trim())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(Material::from))
    }

    /// Lists materials ordered by code.
    pub async fn list(&self, include_inactive: bool) -> DbResult<Vec<Material>> {
        let sql = if include_inactive {
            format!("{} ORDER BY m.code", SELECT_MATERIAL)
        } else {
            format!("{} WHERE m.is_active = 1 ORDER BY m.code", SELECT_MATERIAL)
        };

        let rows = sqlx::query_as::<_, MaterialRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Material::from).collect())
    }

    /// Renames a material.
    pub async fn rename(&self, id: &str, name: &str) -> DbResult<()> {
        validate_material_name(name)?;

        let result = sqlx::query("UPDATE materials SET name = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(name.trim())
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Material", id));
        }
        Ok(())
    }

    /// Soft-enables or soft-disables a material.
    ///
    /// Inactive materials keep their ledger history but drop out of
    /// reconciliation batches.
    pub async fn set_active(&self, id: &str, active: bool) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE materials SET is_active = ?1, updated_at = ?2 WHERE id = ?3")
                .bind(active)
                .bind(Utc::now())
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Material", id));
        }

        debug!(material_id = %id, active, "Material active flag changed");
        Ok(())
    }
}
