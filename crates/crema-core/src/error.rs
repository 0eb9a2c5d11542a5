//! # Error Types
//!
//! Domain-specific error types for crema-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  crema-core errors (this file)                                          │
//! │  ├── CoreError        - Inventory rule violations                       │
//! │  └── ValidationError  - Input validation failures                       │
//! │                                                                         │
//! │  crema-db errors (separate crate)                                       │
//! │  └── DbError          - Persistence, conflicts, batch failures          │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Negative stock is not an error: it is valid ledger state, reported as a
//! shortfall.

use thiserror::Error;

use crate::quantity::Quantity;

// =============================================================================
// Core Error
// =============================================================================

/// Inventory domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Conversion attempted between units that have no fixed scale.
    ///
    /// ## When This Occurs
    /// - Mass into count (`g` → `piece`)
    /// - Volume into mass (`ml` → `kg`), density is never assumed
    /// - Two different count units (`piece` → `box`)
    ///
    /// Blocks the recipe-authoring action that triggered it.
    #[error("Cannot convert {from} to {to}: incompatible units")]
    IncompatibleUnit { from: String, to: String },

    /// Unit symbol is not part of the known unit table.
    #[error("Unknown unit symbol: {0}")]
    UnknownUnit(String),

    /// A recipe exists for the product but has no line for the requested
    /// size and material.
    ///
    /// ## When This Occurs
    /// Incomplete recipe authoring: a latte has S and M lines for coffee but
    /// nobody entered the L line yet. The consumption engine treats it as
    /// zero consumption for that material and raises an integrity alert.
    #[error(
        "Recipe for product {product_id} has no line for material {material_id} at size {}",
        .size_id.as_deref().unwrap_or("<none>")
    )]
    RecipeLineNotFound {
        product_id: String,
        size_id: Option<String>,
        material_id: String,
    },

    /// A quantity that must be strictly positive was zero or negative.
    #[error("Invalid quantity for {field}: {value} (must be greater than zero)")]
    InvalidQuantity { field: String, value: Quantity },

    /// Draw-down arithmetic exceeded the i64 range.
    #[error("Quantity overflow while computing {context}")]
    QuantityOverflow { context: String },

    /// A material's snapshot chain does not add up.
    #[error(
        "Ledger for material {material_id} is inconsistent at snapshot {snapshot_id}: \
         expected remain {expected}, found {found}"
    )]
    LedgerInconsistent {
        material_id: String,
        snapshot_id: i64,
        expected: Quantity,
        found: Quantity,
    },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an InvalidQuantity error.
    pub fn invalid_quantity(field: impl Into<String>, value: Quantity) -> Self {
        CoreError::InvalidQuantity {
            field: field.into(),
            value,
        }
    }

    /// Creates a QuantityOverflow error.
    pub fn overflow(context: impl Into<String>) -> Self {
        CoreError::QuantityOverflow {
            context: context.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised at the boundary before any ledger work starts.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., invalid UUID, malformed decimal).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value appears more than once where it must be unique.
    #[error("{field} '{value}' appears more than once")]
    Duplicate { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::IncompatibleUnit {
            from: "g".to_string(),
            to: "piece".to_string(),
        };
        assert_eq!(err.to_string(), "Cannot convert g to piece: incompatible units");

        let err = CoreError::invalid_quantity("wastage quantity", Quantity::ZERO);
        assert_eq!(
            err.to_string(),
            "Invalid quantity for wastage quantity: 0.00000 (must be greater than zero)"
        );
    }

    #[test]
    fn test_recipe_line_not_found_message() {
        let err = CoreError::RecipeLineNotFound {
            product_id: "latte".to_string(),
            size_id: Some("L".to_string()),
            material_id: "coffee".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Recipe for product latte has no line for material coffee at size L"
        );

        let err = CoreError::RecipeLineNotFound {
            product_id: "latte".to_string(),
            size_id: None,
            material_id: "coffee".to_string(),
        };
        assert!(err.to_string().ends_with("at size <none>"));
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "reason".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
