//! # Unit Conversion
//!
//! Converts recipe-authoring quantities ("consumption units" such as grams or
//! millilitres) into a material's storage unit (kilograms, litres).
//!
//! ## Conversion Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  from \ to     same symbol   same class, fixed scale   other class      │
//! │  ───────────   ───────────   ───────────────────────   ───────────      │
//! │  g  → kg       unchanged     ÷ 1000, round 5 dp         IncompatibleUnit │
//! │  ml → l        unchanged     ÷ 1000, round 5 dp         IncompatibleUnit │
//! │  kg → g        unchanged     × 1000                     IncompatibleUnit │
//! │  piece → box   unchanged     (no fixed scale)           IncompatibleUnit │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every function in this module is pure.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::quantity::Quantity;

// =============================================================================
// Unit Class
// =============================================================================

/// Groups units that measure the same dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum UnitClass {
    Mass,
    Volume,
    Count,
}

impl UnitClass {
    /// Returns the class of a built-in unit symbol.
    ///
    /// ```rust
    /// use crema_core::units::UnitClass;
    ///
    /// assert_eq!(UnitClass::of_symbol("ml"), Some(UnitClass::Volume));
    /// assert_eq!(UnitClass::of_symbol("furlong"), None);
    /// ```
    pub fn of_symbol(symbol: &str) -> Option<UnitClass> {
        lookup(symbol).map(|def| def.class)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitClass::Mass => "mass",
            UnitClass::Volume => "volume",
            UnitClass::Count => "count",
        }
    }
}

impl fmt::Display for UnitClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UnitClass {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mass" => Ok(UnitClass::Mass),
            "volume" => Ok(UnitClass::Volume),
            "count" => Ok(UnitClass::Count),
            _ => Err(ValidationError::InvalidFormat {
                field: "unit_class".to_string(),
                reason: format!("unknown unit class '{}'", s),
            }),
        }
    }
}

// =============================================================================
// Built-in Unit Table
// =============================================================================

/// A known unit and its size relative to the smallest unit of its class.
///
/// `factor` is `None` for count units: a box is not a fixed number of pieces.
#[derive(Debug, Clone, Copy)]
struct UnitDef {
    symbol: &'static str,
    class: UnitClass,
    factor: Option<i64>,
}

const UNIT_TABLE: &[UnitDef] = &[
    UnitDef { symbol: "g", class: UnitClass::Mass, factor: Some(1) },
    UnitDef { symbol: "kg", class: UnitClass::Mass, factor: Some(1000) },
    UnitDef { symbol: "ml", class: UnitClass::Volume, factor: Some(1) },
    UnitDef { symbol: "l", class: UnitClass::Volume, factor: Some(1000) },
    UnitDef { symbol: "piece", class: UnitClass::Count, factor: None },
    UnitDef { symbol: "box", class: UnitClass::Count, factor: None },
];

fn lookup(symbol: &str) -> Option<UnitDef> {
    let symbol = symbol.trim();
    UNIT_TABLE
        .iter()
        .find(|def| def.symbol.eq_ignore_ascii_case(symbol))
        .copied()
}

/// Symbols of every built-in unit, in table order.
pub fn known_symbols() -> impl Iterator<Item = &'static str> {
    UNIT_TABLE.iter().map(|def| def.symbol)
}

// =============================================================================
// Conversion
// =============================================================================

/// Converts `amount` from a consumption unit into a storage unit.
///
/// ## Rules
/// - Identical symbols return the amount unchanged (even for units outside
///   the built-in table, such as a custom "tray").
/// - Same class with a fixed scale: small → large divides by the ratio and
///   rounds to 5 decimal places; large → small multiplies.
/// - Anything else fails with [`CoreError::IncompatibleUnit`]; unknown
///   symbols fail with [`CoreError::UnknownUnit`].
///
/// ## Example
/// ```rust
/// use crema_core::quantity::Quantity;
/// use crema_core::units::to_storage_unit;
///
/// let grams: Quantity = "25".parse().unwrap();
/// let kg = to_storage_unit(grams, "g", "kg").unwrap();
/// assert_eq!(kg.to_string(), "0.02500");
///
/// assert!(to_storage_unit(grams, "g", "piece").is_err());
/// ```
pub fn to_storage_unit(
    amount: Quantity,
    consumption_unit: &str,
    storage_unit: &str,
) -> CoreResult<Quantity> {
    if consumption_unit.trim().eq_ignore_ascii_case(storage_unit.trim()) {
        return Ok(amount);
    }

    let from = lookup(consumption_unit)
        .ok_or_else(|| CoreError::UnknownUnit(consumption_unit.to_string()))?;
    let to =
        lookup(storage_unit).ok_or_else(|| CoreError::UnknownUnit(storage_unit.to_string()))?;

    let incompatible = || CoreError::IncompatibleUnit {
        from: from.symbol.to_string(),
        to: to.symbol.to_string(),
    };

    if from.class != to.class {
        return Err(incompatible());
    }

    let (Some(from_factor), Some(to_factor)) = (from.factor, to.factor) else {
        return Err(incompatible());
    };

    if from_factor <= to_factor {
        Ok(amount.div_round(to_factor / from_factor))
    } else {
        amount
            .checked_mul(from_factor / to_factor)
            .ok_or_else(|| CoreError::overflow(format!("{} to {}", from.symbol, to.symbol)))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
