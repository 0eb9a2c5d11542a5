//! # crema-core: Pure Inventory Logic for Crema
//!
//! This crate holds the inventory rules of the Crema back office as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Crema Inventory Architecture                     │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │        Collaborators (order service, back-office screens)       │    │
//! │  │   confirm order line ─► consume     count stock ─► reconcile    │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │                 crema-db (engines + SQLite)                     │    │
//! │  │   ConsumptionRepository, WastageRepository, ReconciliationRepo  │    │
//! │  └─────────────────────────────┬───────────────────────────────────┘    │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐    │
//! │  │               ★ crema-core (THIS CRATE) ★                       │    │
//! │  │                                                                 │    │
//! │  │   ┌──────────┐  ┌──────────┐  ┌─────────────┐  ┌────────────┐   │    │
//! │  │   │ quantity │  │  units   │  │   recipe    │  │ consumption│   │    │
//! │  │   │ Quantity │  │ to_stor… │  │ lookup      │  │ draw-down  │   │    │
//! │  │   └──────────┘  └──────────┘  └─────────────┘  └────────────┘   │    │
//! │  │   ┌──────────┐  ┌──────────┐  ┌─────────────┐  ┌────────────┐   │    │
//! │  │   │  ledger  │  │ wastage  │  │ reconcil…   │  │ validation │   │    │
//! │  │   │ additive │  │ request  │  │ records     │  │   rules    │   │    │
//! │  │   └──────────┘  └──────────┘  └─────────────┘  └────────────┘   │    │
//! │  │                                                                 │    │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`quantity`] - Fixed-point material quantity (5 decimals, no floats)
//! - [`units`] - Consumption unit to storage unit conversion
//! - [`types`] - Domain types (Material, Recipe, StockSnapshot, etc.)
//! - [`recipe`] - Recipe resolution per product and size
//! - [`consumption`] - Order-line draw-down computation
//! - [`ledger`] - Ledger ordering and additivity checks
//! - [`wastage`] - Wastage request checks
//! - [`reconciliation`] - Computed/proposed reconciliation records
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Example Usage
//!
//! ```rust
//! use crema_core::quantity::Quantity;
//! use crema_core::units::to_storage_unit;
//!
//! // Recipe authors type grams; the ledger stores kilograms.
//! let grams: Quantity = "25".parse().unwrap();
//! let per_latte = to_storage_unit(grams, "g", "kg").unwrap();
//!
//! // Two medium lattes draw down 0.050 kg of coffee.
//! assert_eq!(per_latte.checked_mul(2).unwrap().to_string(), "0.05000");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod consumption;
pub mod error;
pub mod ledger;
pub mod quantity;
pub mod reconciliation;
pub mod recipe;
pub mod types;
pub mod units;
pub mod validation;
pub mod wastage;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use quantity::Quantity;
pub use types::*;
pub use units::UnitClass;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of a wastage reason.
pub const MAX_REASON_LENGTH: usize = 500;
