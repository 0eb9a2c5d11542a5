//! # Recipe Resolution
//!
//! Turns a recipe and a requested size into the list of materials one unit
//! of the product consumes.
//!
//! ## Size Handling
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Recipe shape          Requested size    Result                         │
//! │  ───────────────────   ──────────────    ───────────────────────────    │
//! │  no recipe             any               []  (untracked product)        │
//! │  only NULL-size lines  any / none        NULL-size lines                │
//! │  sized lines           "M"               M lines + NULL-size lines      │
//! │  sized lines, no "L"   "L"               NULL-size lines,               │
//! │                                          missing: every sized material  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A missing line is a data-integrity problem, not "no consumption": the
//! lenient lookup reports it so the caller can alert.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::quantity::Quantity;
use crate::types::{Recipe, RecipeLine};

/// `(material, quantity)` for one unit of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ConsumptionRule {
    pub material_id: String,
    #[ts(type = "string")]
    pub consume_quantity: Quantity,
}

/// A material the recipe tracks by size but has no line for at this size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MissingRecipeLine {
    pub product_id: String,
    pub size_id: Option<String>,
    pub material_id: String,
}

impl From<MissingRecipeLine> for CoreError {
    fn from(missing: MissingRecipeLine) -> Self {
        CoreError::RecipeLineNotFound {
            product_id: missing.product_id,
            size_id: missing.size_id,
            material_id: missing.material_id,
        }
    }
}

/// Result of a lenient lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumptionLookup {
    pub rules: Vec<ConsumptionRule>,
    pub missing: Vec<MissingRecipeLine>,
}

impl ConsumptionLookup {
    /// Fails on the first missing line.
    pub fn into_strict(self) -> CoreResult<Vec<ConsumptionRule>> {
        match self.missing.into_iter().next() {
            Some(missing) => Err(missing.into()),
            None => Ok(self.rules),
        }
    }
}

/// A recipe together with all of its lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RecipeDefinition {
    pub recipe: Recipe,
    pub lines: Vec<RecipeLine>,
}

impl RecipeDefinition {
    pub fn product_id(&self) -> &str {
        &self.recipe.product_id
    }

    /// True when at least one line is bound to a size.
    pub fn is_multi_size(&self) -> bool {
        self.lines.iter().any(|line| line.size_id.is_some())
    }

    /// Sizes that have at least one line, sorted.
    pub fn sizes(&self) -> Vec<&str> {
        let sizes: BTreeSet<&str> = self
            .lines
            .iter()
            .filter_map(|line| line.size_id.as_deref())
            .collect();
        sizes.into_iter().collect()
    }

    /// Resolves consumption for one unit sold, reporting gaps instead of
    /// failing.
    pub fn lookup(&self, size_id: Option<&str>) -> ConsumptionLookup {
        let size_independent = self.lines.iter().filter(|line| line.size_id.is_none());

        if !self.is_multi_size() {
            return ConsumptionLookup {
                rules: size_independent.map(rule_of).collect(),
                missing: Vec::new(),
            };
        }

        let mut rules: Vec<ConsumptionRule> = size_independent.map(rule_of).collect();
        let sized_materials: BTreeSet<&str> = self
            .lines
            .iter()
            .filter(|line| line.size_id.is_some())
            .map(|line| line.material_id.as_str())
            .collect();

        let mut missing = Vec::new();
        for material_id in sized_materials {
            let line = size_id.and_then(|size| {
                self.lines.iter().find(|line| {
                    line.material_id == material_id && line.size_id.as_deref() == Some(size)
                })
            });
            match line {
                Some(line) => rules.push(rule_of(line)),
                None => missing.push(MissingRecipeLine {
                    product_id: self.recipe.product_id.clone(),
                    size_id: size_id.map(str::to_string),
                    material_id: material_id.to_string(),
                }),
            }
        }

        ConsumptionLookup { rules, missing }
    }
}

fn rule_of(line: &RecipeLine) -> ConsumptionRule {
    ConsumptionRule {
        material_id: line.material_id.clone(),
        consume_quantity: line.consume_quantity,
    }
}

/// Lenient lookup over an optional recipe: no recipe means no consumption.
pub fn lookup_consumption(
    recipe: Option<&RecipeDefinition>,
    size_id: Option<&str>,
) -> ConsumptionLookup {
    recipe
        .map(|recipe| recipe.lookup(size_id))
        .unwrap_or_default()
}

/// Strict lookup: fails with [`CoreError::RecipeLineNotFound`] when the
/// recipe exists but lacks the requested size.
pub fn get_consumption(
    recipe: Option<&RecipeDefinition>,
    size_id: Option<&str>,
) -> CoreResult<Vec<ConsumptionRule>> {
    lookup_consumption(recipe, size_id).into_strict()
}

// =============================================================================
// Unit Tests
// =============================================================================
