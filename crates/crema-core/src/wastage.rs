//! # Wastage Requests
//!
//! Input shape and checks for recording a material loss outside normal
//! consumption (spillage, spoilage, breakage).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreResult;
use crate::quantity::Quantity;
use crate::validation::{validate_identifier, validate_positive_quantity, validate_reason};

/// A wastage entry as submitted by an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct WastageRequest {
    pub material_id: String,
    /// Amount lost, in the material's storage unit.
    #[ts(type = "string")]
    pub quantity: Quantity,
    pub reason: String,
    pub user_id: String,
    #[ts(as = "String")]
    pub date: NaiveDate,
}

impl WastageRequest {
    pub fn new(
        material_id: impl Into<String>,
        quantity: Quantity,
        reason: impl Into<String>,
        user_id: impl Into<String>,
        date: NaiveDate,
    ) -> Self {
        WastageRequest {
            material_id: material_id.into(),
            quantity,
            reason: reason.into(),
            user_id: user_id.into(),
            date,
        }
    }

    /// Rejects zero or negative quantities with `InvalidQuantity` before
    /// anything else, then checks the identifiers and reason.
    pub fn validate(&self) -> CoreResult<()> {
        validate_positive_quantity("wastage quantity", self.quantity)?;
        validate_identifier("material_id", &self.material_id)?;
        validate_identifier("user_id", &self.user_id)?;
        validate_reason(&self.reason)?;
        Ok(())
    }

    /// The signed ledger delta this entry applies.
    pub fn delta(&self) -> Quantity {
        -self.quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;

    fn request(quantity: &str, reason: &str) -> WastageRequest {
        WastageRequest::new(
            "milk",
            quantity.parse().unwrap(),
            reason,
            "barista-1",
            NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        )
    }

    #[test]
    fn test_valid_request() {
        let req = request("0.5", "spilled jug");
        assert!(req.validate().is_ok());
        assert_eq!(req.delta(), "-0.5".parse().unwrap());
    }

    #[test]
    fn test_zero_and_negative_rejected() {
        assert!(matches!(
            request("0", "spilled jug").validate(),
            Err(CoreError::InvalidQuantity { .. })
        ));
        assert!(matches!(
            request("-1", "spilled jug").validate(),
            Err(CoreError::InvalidQuantity { .. })
        ));
    }

    #[test]
    fn test_reason_required() {
        assert!(matches!(
            request("0.5", "  ").validate(),
            Err(CoreError::Validation(_))
        ));
    }
}
