//! # Validation Module
//!
//! Boundary checks for everything the inventory engines accept from callers.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Caller (order service, back-office UI)                        │
//! │  └── Basic format checks, immediate feedback                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                   │
//! │  └── Counts, quantities, codes, reasons                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                             │
//! │  ├── NOT NULL / UNIQUE / FOREIGN KEY constraints                        │
//! │  └── Append-only triggers on stock_snapshots                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::quantity::Quantity;
use crate::MAX_REASON_LENGTH;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an opaque identifier (order line, product, size, user).
///
/// ## Rules
/// - Must not be empty after trimming
/// - At most 100 characters
pub fn validate_identifier(field: &str, id: &str) -> ValidationResult<()> {
    let id = id.trim();

    if id.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if id.len() > 100 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 100,
        });
    }

    Ok(())
}

/// Validates a material code.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Letters, digits, hyphens and underscores only
///
/// ## Example
/// ```rust
/// use crema_core::validation::validate_material_code;
///
/// assert!(validate_material_code("COF-ARABICA").is_ok());
/// assert!(validate_material_code("has space").is_err());
/// ```
pub fn validate_material_code(code: &str) -> ValidationResult<()> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "code".to_string(),
        });
    }

    if code.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "code".to_string(),
            max: 50,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "code".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a material name (1 to 200 characters).
pub fn validate_material_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::Required {
            field: "name".to_string(),
        });
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates a wastage reason ("spilled milk jug", "expired croissants").
pub fn validate_reason(reason: &str) -> ValidationResult<()> {
    let reason = reason.trim();

    if reason.is_empty() {
        return Err(ValidationError::Required {
            field: "reason".to_string(),
        });
    }

    if reason.len() > MAX_REASON_LENGTH {
        return Err(ValidationError::TooLong {
            field: "reason".to_string(),
            max: MAX_REASON_LENGTH,
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates an item count (units sold, topping portions).
///
/// Only positivity is checked. Overflow is caught when the count is
/// multiplied into a draw-down.
pub fn validate_item_count(field: &str, count: i64) -> ValidationResult<()> {
    if count <= 0 {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }
    Ok(())
}

/// Requires a strictly positive material quantity.
///
/// Fails with [`CoreError::InvalidQuantity`], the error wastage recording
/// reports for zero or negative amounts.
pub fn validate_positive_quantity(field: &str, quantity: Quantity) -> CoreResult<()> {
    if !quantity.is_positive() {
        return Err(CoreError::invalid_quantity(field, quantity));
    }
    Ok(())
}

/// Requires a non-negative material quantity (physical counts, recipe lines).
pub fn validate_non_negative_quantity(field: &str, quantity: Quantity) -> ValidationResult<()> {
    if quantity.is_negative() {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: i64::MAX,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("order_line_id", "ol-42").is_ok());
        assert!(validate_identifier("order_line_id", "").is_err());
        assert!(validate_identifier("order_line_id", "   ").is_err());
        assert!(validate_identifier("order_line_id", &"x".repeat(101)).is_err());
    }

    #[test]
    fn test_validate_material_code() {
        assert!(validate_material_code("MILK-FULL").is_ok());
        assert!(validate_material_code("cup_12oz").is_ok());
        assert!(validate_material_code("").is_err());
        assert!(validate_material_code("milk full").is_err());
        assert!(validate_material_code(&"A".repeat(60)).is_err());
    }

    #[test]
    fn test_validate_material_name() {
        assert!(validate_material_name("Whole milk").is_ok());
        assert!(validate_material_name("").is_err());
        assert!(validate_material_name(&"A".repeat(300)).is_err());
    }

    #[test]
    fn test_validate_reason() {
        assert!(validate_reason("spilled jug").is_ok());
        assert!(validate_reason(" ").is_err());
        assert!(validate_reason(&"r".repeat(MAX_REASON_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_item_count() {
        assert!(validate_item_count("quantity_sold", 1).is_ok());
        assert!(validate_item_count("quantity_sold", 1000).is_ok());
        assert!(validate_item_count("quantity_sold", 0).is_err());
        assert!(validate_item_count("quantity_sold", -1).is_err());
    }

    #[test]
    fn test_validate_positive_quantity() {
        assert!(validate_positive_quantity("quantity", Quantity::from_raw(1)).is_ok());
        assert!(matches!(
            validate_positive_quantity("quantity", Quantity::ZERO),
            Err(CoreError::InvalidQuantity { .. })
        ));
        assert!(validate_positive_quantity("quantity", Quantity::from_raw(-5)).is_err());
    }

    #[test]
    fn test_validate_non_negative_quantity() {
        assert!(validate_non_negative_quantity("counted", Quantity::ZERO).is_ok());
        assert!(validate_non_negative_quantity("counted", Quantity::from_raw(-1)).is_err());
    }
}
