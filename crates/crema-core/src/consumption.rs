//! # Consumption Math
//!
//! Computes how much of each material a confirmed order line draws down.
//!
//! ## One Code Path for Products and Toppings
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ConsumeRequest                                                         │
//! │    product: latte, size M, qty 2                                        │
//! │    toppings: [caramel × 2]                                              │
//! │        │                                                                │
//! │        ▼  consumable_lines()                                            │
//! │  [ {latte, M, 2}, {caramel, none, 2} ]     ← same shape for both        │
//! │        │                                                                │
//! │        ▼  compute_draw_down(lines, recipes)                             │
//! │  coffee: 2 × 0.025          = 0.050                                     │
//! │  milk:   2 × 0.200          = 0.400                                     │
//! │  syrup:  2 × 0.010          = 0.020                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::quantity::Quantity;
use crate::recipe::{lookup_consumption, MissingRecipeLine, RecipeDefinition};
use crate::validation::{validate_identifier, validate_item_count};

/// A topping chosen on an order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ToppingSelection {
    pub topping_id: String,
    /// Total topping portions on the line.
    pub quantity: i64,
}

/// A confirmed order line handed over by the order subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ConsumeRequest {
    /// Idempotency key.
    pub order_line_id: String,
    pub product_id: String,
    pub size_id: Option<String>,
    pub quantity_sold: i64,
    #[serde(default)]
    pub toppings: Vec<ToppingSelection>,
    /// Ledger rows are dated at this instant (UTC date).
    #[ts(as = "String")]
    pub confirmed_at: DateTime<Utc>,
}

impl ConsumeRequest {
    /// Validates identifiers and counts before any ledger work.
    pub fn validate(&self) -> CoreResult<()> {
        validate_identifier("order_line_id", &self.order_line_id)?;
        validate_identifier("product_id", &self.product_id)?;
        validate_item_count("quantity_sold", self.quantity_sold)?;
        for topping in &self.toppings {
            validate_identifier("topping_id", &topping.topping_id)?;
            validate_item_count("topping_quantity", topping.quantity)?;
        }
        Ok(())
    }

    /// Flattens the product and its toppings into consumable lines.
    pub fn consumable_lines(&self) -> Vec<ConsumableLine> {
        let mut lines = Vec::with_capacity(1 + self.toppings.len());
        lines.push(ConsumableLine {
            entity_id: self.product_id.clone(),
            size_id: self.size_id.clone(),
            quantity: self.quantity_sold,
        });
        lines.extend(self.toppings.iter().map(|topping| ConsumableLine {
            entity_id: topping.topping_id.clone(),
            size_id: None,
            quantity: topping.quantity,
        }));
        lines
    }

    /// Product and topping ids whose recipes are needed.
    pub fn entity_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = std::iter::once(self.product_id.as_str())
            .chain(self.toppings.iter().map(|t| t.topping_id.as_str()))
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Anything that consumes materials through a recipe: a product or a topping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumableLine {
    pub entity_id: String,
    pub size_id: Option<String>,
    pub quantity: i64,
}

/// Aggregate draw-down for one order line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawDown {
    /// Nonzero totals per material, ordered by material id.
    pub totals: BTreeMap<String, Quantity>,
    /// Recipe lines that were missing; counted as zero.
    pub missing: Vec<MissingRecipeLine>,
}

impl DrawDown {
    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }
}

/// Sums `quantity × rule` over every line.
///
/// `recipes` maps entity id to its recipe; entities without an entry have no
/// recipe and consume nothing.
pub fn compute_draw_down(
    lines: &[ConsumableLine],
    recipes: &HashMap<String, RecipeDefinition>,
) -> CoreResult<DrawDown> {
    let mut draw_down = DrawDown::default();

    for line in lines {
        let lookup = lookup_consumption(recipes.get(&line.entity_id), line.size_id.as_deref());
        draw_down.missing.extend(lookup.missing);

        for rule in lookup.rules {
            let amount = rule
                .consume_quantity
                .checked_mul(line.quantity)
                .ok_or_else(|| CoreError::overflow(format!("draw-down of {}", rule.material_id)))?;
            let total = draw_down
                .totals
                .entry(rule.material_id.clone())
                .or_insert(Quantity::ZERO);
            *total = total
                .checked_add(amount)
                .ok_or_else(|| CoreError::overflow(format!("draw-down of {}", rule.material_id)))?;
        }
    }

    draw_down.totals.retain(|_, total| !total.is_zero());
    Ok(draw_down)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::tests::{line, recipe};

    fn q(s: &str) -> Quantity {
        s.parse().unwrap()
    }

    fn catalog() -> HashMap<String, RecipeDefinition> {
        let mut recipes = HashMap::new();
        recipes.insert(
            "latte".to_string(),
            recipe(
                "latte",
                vec![
                    line("coffee", Some("S"), "0.020"),
                    line("coffee", Some("M"), "0.025"),
                    line("milk", Some("M"), "0.200"),
                ],
            ),
        );
        recipes.insert(
            "caramel".to_string(),
            recipe("caramel", vec![line("syrup", None, "0.010")]),
        );
        recipes.insert(
            "extra-shot".to_string(),
            recipe("extra-shot", vec![line("coffee", None, "0.008")]),
        );
        recipes
    }

    fn request(size: &str, qty: i64, toppings: Vec<(&str, i64)>) -> ConsumeRequest {
        ConsumeRequest {
            order_line_id: "ol-1".to_string(),
            product_id: "latte".to_string(),
            size_id: Some(size.to_string()),
            quantity_sold: qty,
            toppings: toppings
                .into_iter()
                .map(|(id, quantity)| ToppingSelection {
                    topping_id: id.to_string(),
                    quantity,
                })
                .collect(),
            confirmed_at: Utc::now(),
        }
    }

    #[test]
    fn test_two_medium_lattes() {
        let req = request("M", 2, vec![]);
        let dd = compute_draw_down(&req.consumable_lines(), &catalog()).unwrap();
        assert_eq!(dd.totals["coffee"], q("0.05"));
        assert_eq!(dd.totals["milk"], q("0.4"));
        assert!(dd.missing.is_empty());
    }

    #[test]
    fn test_toppings_merge_into_same_material() {
        let req = request("M", 2, vec![("caramel", 2), ("extra-shot", 1)]);
        let dd = compute_draw_down(&req.consumable_lines(), &catalog()).unwrap();
        assert_eq!(dd.totals["coffee"], q("0.058"));
        assert_eq!(dd.totals["syrup"], q("0.02"));
    }

    #[test]
    fn test_untracked_topping_and_missing_size() {
        let req = request("S", 1, vec![("sprinkles", 3)]);
        let dd = compute_draw_down(&req.consumable_lines(), &catalog()).unwrap();
        assert_eq!(dd.totals.len(), 1);
        assert_eq!(dd.totals["coffee"], q("0.02"));
        assert_eq!(dd.missing.len(), 1);
        assert_eq!(dd.missing[0].material_id, "milk");
    }

    #[test]
    fn test_zero_rules_are_dropped() {
        let mut recipes = catalog();
        recipes.insert("water".to_string(), recipe("water", vec![line("cup", None, "0")]));
        let lines = vec![ConsumableLine {
            entity_id: "water".to_string(),
            size_id: None,
            quantity: 4,
        }];
        assert!(compute_draw_down(&lines, &recipes).unwrap().is_empty());
    }

    #[test]
    fn test_overflow_is_an_error() {
        let mut recipes = HashMap::new();
        recipes.insert(
            "huge".to_string(),
            recipe("huge", vec![line("x", None, "90000000000000")]),
        );
        let lines = vec![ConsumableLine {
            entity_id: "huge".to_string(),
            size_id: None,
            quantity: 999,
        }];
        assert!(matches!(
            compute_draw_down(&lines, &recipes),
            Err(CoreError::QuantityOverflow { .. })
        ));
    }

    #[test]
    fn test_request_validation() {
        assert!(request("M", 1, vec![]).validate().is_ok());
        assert!(request("M", 0, vec![]).validate().is_err());
        assert!(request("M", 1, vec![("caramel", 0)]).validate().is_err());
        assert!(request("M", 1000, vec![("caramel", 1000)]).validate().is_ok());

        let mut req = request("M", 1, vec![]);
        req.order_line_id = "  ".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_entity_ids_are_deduplicated() {
        let req = request("M", 1, vec![("caramel", 1), ("caramel", 2)]);
        assert_eq!(req.entity_ids(), vec!["caramel", "latte"]);
    }
}
