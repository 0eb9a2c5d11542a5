//! # Recipe Repository
//!
//! Recipe authoring and consumption lookups.
//!
//! ## Authoring Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Back office enters: Latte, size M, Coffee beans, 25 g                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  set_line("latte", coffee, Some("M"), 25, "g")                          │
//! │       │                                                                 │
//! │       ├── material storage unit: kg                                     │
//! │       ├── to_storage_unit(25, "g", "kg") = 0.02500   (or Incompatible)  │
//! │       ├── recipe for "latte" created on first line                      │
//! │       └── UPSERT line (recipe, material, size)                          │
//! │                                                                         │
//! │  Authoring never touches the stock ledger.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::material::MaterialRepository;
use crema_core::recipe::{ConsumptionLookup, ConsumptionRule, RecipeDefinition};
use crema_core::units::to_storage_unit;
use crema_core::validation::{validate_identifier, validate_non_negative_quantity};
use crema_core::{Quantity, Recipe, RecipeLine};

const SELECT_LINE: &str = r#"
    SELECT id, recipe_id, material_id, size_id, consume_quantity, created_at, updated_at
    FROM recipe_lines
"#;

/// Repository for recipes and recipe lines.
#[derive(Debug, Clone)]
pub struct RecipeRepository {
    pool: SqlitePool,
}

impl RecipeRepository {
    /// Creates a new RecipeRepository.
    pub fn new(pool: SqlitePool) -> Self {
        RecipeRepository { pool }
    }

    // =========================================================================
    // Authoring
    // =========================================================================

    /// Creates an empty recipe for a product.
    ///
    /// ## Errors
    /// `UniqueViolation` when the product already has a recipe.
    pub async fn create_recipe(&self, product_id: &str) -> DbResult<Recipe> {
        validate_identifier("product_id", product_id)?;

        let mut conn = self.pool.acquire().await?;
        if find_recipe(&mut conn, product_id).await?.is_some() {
            return Err(DbError::duplicate("recipes.product_id", product_id));
        }
        insert_recipe(&mut conn, product_id).await
    }

    /// Sets the consumption of one material for a product at a size.
    ///
    /// `amount` is given in `consumption_unit` and converted to the
    /// material's storage unit before it is stored. Creates the recipe on
    /// first use and replaces an existing line for the same
    /// `(material, size)`.
    ///
    /// ## Errors
    /// - `Domain(IncompatibleUnit)` / `Domain(UnknownUnit)` from conversion
    /// - `NotFound` for an unknown material
    pub async fn set_line(
        &self,
        product_id: &str,
        material_id: &str,
        size_id: Option<&str>,
        amount: Quantity,
        consumption_unit: &str,
    ) -> DbResult<RecipeLine> {
        validate_identifier("product_id", product_id)?;
        if let Some(size) = size_id {
            validate_identifier("size_id", size)?;
        }
        validate_non_negative_quantity("consume_quantity", amount)?;

        let material = MaterialRepository::new(self.pool.clone())
            .get_by_id(material_id)
            .await?
            .ok_or_else(|| DbError::not_found("Material", material_id))?;

        let consume_quantity = to_storage_unit(amount, consumption_unit, &material.unit.symbol)?;

        let mut tx = self.pool.begin().await?;

        let recipe = match find_recipe(&mut tx, product_id).await? {
            Some(recipe) => recipe,
            None => insert_recipe(&mut tx, product_id).await?,
        };

        let now = Utc::now();
        let updated = sqlx::query(
            r#"
            UPDATE recipe_lines
            SET consume_quantity = ?1, updated_at = ?2
            WHERE recipe_id = ?3 AND material_id = ?4 AND IFNULL(size_id, '') = IFNULL(?5, '')
            "#,
        )
        .bind(consume_quantity)
        .bind(now)
        .bind(&recipe.id)
        .bind(material_id)
        .bind(size_id)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            sqlx::query(
                r#"
                INSERT INTO recipe_lines
                    (id, recipe_id, material_id, size_id, consume_quantity, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&recipe.id)
            .bind(material_id)
            .bind(size_id)
            .bind(consume_quantity)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE recipes SET updated_at = ?1 WHERE id = ?2")
            .bind(now)
            .bind(&recipe.id)
            .execute(&mut *tx)
            .await?;

        let line = sqlx::query_as::<_, RecipeLine>(&format!(
            "{} WHERE recipe_id = ?1 AND material_id = ?2 AND IFNULL(size_id, '') = IFNULL(?3, '')",
            SELECT_LINE
        ))
        .bind(&recipe.id)
        .bind(material_id)
        .bind(size_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            product_id,
            material_id,
            size_id = size_id.unwrap_or("-"),
            %amount,
            consumption_unit,
            storage_unit = %material.unit.symbol,
            %consume_quantity,
            "Recipe line set"
        );

        Ok(line)
    }

    /// Removes the line for `(material, size)` from a product's recipe.
    pub async fn remove_line(
        &self,
        product_id: &str,
        material_id: &str,
        size_id: Option<&str>,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM recipe_lines
            WHERE material_id = ?1
              AND IFNULL(size_id, '') = IFNULL(?2, '')
              AND recipe_id = (SELECT id FROM recipes WHERE product_id = ?3)
            "#,
        )
        .bind(material_id)
        .bind(size_id)
        .bind(product_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(
                "RecipeLine",
                format!("{}/{}/{}", product_id, material_id, size_id.unwrap_or("-")),
            ));
        }

        debug!(product_id, material_id, "Recipe line removed");
        Ok(())
    }

    /// Deletes a product's recipe and all of its lines.
    pub async fn delete_recipe(&self, product_id: &str) -> DbResult<()> {
        let result = sqlx::query("DELETE FROM recipes WHERE product_id = ?1")
            .bind(product_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Recipe", product_id));
        }

        info!(product_id, "Recipe deleted");
        Ok(())
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Gets a product's recipe with all lines, or `None` for untracked
    /// products.
    pub async fn get_by_product(&self, product_id: &str) -> DbResult<Option<RecipeDefinition>> {
        let mut conn = self.pool.acquire().await?;
        let mut definitions = load_definitions(&mut conn, &[product_id]).await?;
        Ok(definitions.remove(product_id))
    }

    /// Consumption per unit sold, failing on missing size lines.
    ///
    /// ## Errors
    /// `Domain(RecipeLineNotFound)` when the recipe exists but lacks a line
    /// for the requested size.
    pub async fn get_consumption(
        &self,
        product_id: &str,
        size_id: Option<&str>,
    ) -> DbResult<Vec<ConsumptionRule>> {
        Ok(self
            .lookup_consumption(product_id, size_id)
            .await?
            .into_strict()?)
    }

    /// Consumption per unit sold, reporting missing size lines instead of
    /// failing.
    pub async fn lookup_consumption(
        &self,
        product_id: &str,
        size_id: Option<&str>,
    ) -> DbResult<ConsumptionLookup> {
        let definition = self.get_by_product(product_id).await?;
        Ok(crema_core::recipe::lookup_consumption(
            definition.as_ref(),
            size_id,
        ))
    }
}

// =============================================================================
// Connection-level helpers
// =============================================================================

async fn find_recipe(conn: &mut SqliteConnection, product_id: &str) -> DbResult<Option<Recipe>> {
    let recipe = sqlx::query_as::<_, Recipe>(
        "SELECT id, product_id, created_at, updated_at FROM recipes WHERE product_id = ?1",
    )
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(recipe)
}

async fn insert_recipe(conn: &mut SqliteConnection, product_id: &str) -> DbResult<Recipe> {
    let now = Utc::now();
    let recipe = Recipe {
        id: Uuid::new_v4().to_string(),
        product_id: product_id.to_string(),
        created_at: now,
        updated_at: now,
    };

    sqlx::query(
        "INSERT INTO recipes (id, product_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
    )
    .bind(&recipe.id)
    .bind(&recipe.product_id)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    info!(recipe_id = %recipe.id, product_id, "Recipe created");
    Ok(recipe)
}

/// Loads the recipes of several products (and toppings) at once.
///
/// Products without a recipe are absent from the map.
pub(crate) async fn load_definitions(
    conn: &mut SqliteConnection,
    product_ids: &[&str],
) -> DbResult<HashMap<String, RecipeDefinition>> {
    let mut definitions = HashMap::with_capacity(product_ids.len());

    for product_id in product_ids {
        let Some(recipe) = find_recipe(conn, product_id).await? else {
            continue;
        };

        let lines = sqlx::query_as::<_, RecipeLine>(&format!(
            "{} WHERE recipe_id = ?1 ORDER BY material_id, size_id",
            SELECT_LINE
        ))
        .bind(&recipe.id)
        .fetch_all(&mut *conn)
        .await?;

        definitions.insert(product_id.to_string(), RecipeDefinition { recipe, lines });
    }

    Ok(definitions)
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

    async fn setup() -> (Database, String, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let coffee = db.materials().create("Coffee beans", "BEANS", "unit-kg").await.unwrap();
        let cups = db.materials().create("Paper cup", "CUP", "unit-piece").await.unwrap();
        (db, coffee.id, cups.id)
    }

    #[tokio::test]
    async fn test_lines_are_converted_to_storage_unit() {
        let (db, coffee, cups) = setup().await;
        let recipes = db.recipes();

        for (size, grams) in [("S", "20"), ("M", "25"), ("L", "30")] {
            recipes
                .set_line("latte", &coffee, Some(size), q(grams), "g")
                .await
                .unwrap();
        }
        recipes.set_line("latte", &cups, None, q("1"), "piece").await.unwrap();

        let latte = recipes.get_by_product("latte").await.unwrap().unwrap();
        assert!(latte.is_multi_size());
        assert_eq!(latte.lines.len(), 4);

        let rules = recipes.get_consumption("latte", Some("M")).await.unwrap();
        let coffee_rule = rules.iter().find(|r| r.material_id == coffee).unwrap();
        assert_eq!(coffee_rule.consume_quantity, q("0.025"));
        assert_eq!(rules.len(), 2);
    }

    #[tokio::test]
    async fn test_set_line_replaces_existing() {
        let (db, coffee, _) = setup().await;
        let recipes = db.recipes();

        recipes.set_line("espresso", &coffee, None, q("18"), "g").await.unwrap();
        let line = recipes.set_line("espresso", &coffee, None, q("0.02"), "kg").await.unwrap();
        assert_eq!(line.consume_quantity, q("0.02"));

        let espresso = recipes.get_by_product("espresso").await.unwrap().unwrap();
        assert_eq!(espresso.lines.len(), 1);
    }

    #[tokio::test]
    async fn test_incompatible_unit_blocks_authoring() {
        let (db, coffee, cups) = setup().await;
        let recipes = db.recipes();

        let err = recipes.set_line("latte", &cups, None, q("20"), "g").await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::IncompatibleUnit { .. })));

        let err = recipes.set_line("latte", &coffee, None, q("20"), "ml").await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::IncompatibleUnit { .. })));

        // Nothing was persisted, not even the recipe header.
        assert!(recipes.get_by_product("latte").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_material() {
        let (db, _, _) = setup().await;
        let err = db
            .recipes()
            .set_line("latte", "no-such-material", None, q("1"), "kg")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_size_line() {
        let (db, coffee, _) = setup().await;
        let recipes = db.recipes();

        recipes.set_line("latte", &coffee, Some("S"), q("20"), "g").await.unwrap();
        recipes.set_line("latte", &coffee, Some("M"), q("25"), "g").await.unwrap();

        let err = recipes.get_consumption("latte", Some("L")).await.unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::RecipeLineNotFound { .. })));

        let lookup = recipes.lookup_consumption("latte", Some("L")).await.unwrap();
        assert!(lookup.rules.is_empty());
        assert_eq!(lookup.missing.len(), 1);
    }

    #[tokio::test]
    async fn test_no_recipe_means_no_consumption() {
        let (db, _, _) = setup().await;
        let rules = db.recipes().get_consumption("bottled-water", None).await.unwrap();
        assert!(rules.is_empty());
    }

    #[tokio::test]
    async fn test_remove_line_and_delete_recipe() {
        let (db, coffee, cups) = setup().await;
        let recipes = db.recipes();

        recipes.create_recipe("mocha").await.unwrap();
        assert!(matches!(
            recipes.create_recipe("mocha").await,
            Err(DbError::UniqueViolation { .. })
        ));

        recipes.set_line("mocha", &coffee, Some("M"), q("25"), "g").await.unwrap();
        recipes.set_line("mocha", &cups, None, q("1"), "piece").await.unwrap();

        recipes.remove_line("mocha", &coffee, Some("M")).await.unwrap();
        assert!(recipes.remove_line("mocha", &coffee, Some("M")).await.is_err());
        assert_eq!(
            recipes.get_by_product("mocha").await.unwrap().unwrap().lines.len(),
            1
        );

        recipes.delete_recipe("mocha").await.unwrap();
        assert!(recipes.get_by_product("mocha").await.unwrap().is_none());
        assert!(recipes.delete_recipe("mocha").await.is_err());
    }
}
