//! # Repository Module
//!
//! Database repositories for the Crema inventory engine.
//!
//! ## Who Writes the Ledger
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Reference data (pool-level, no ledger)                                 │
//! │    UnitRepository        units seeded by migration                      │
//! │    MaterialRepository    materials and their storage unit               │
//! │    RecipeRepository      recipes, lines, consumption lookups            │
//! │                                                                         │
//! │  Engines (one transaction each, retried on WriteConflict)               │
//! │    ConsumptionRepository ──┐                                            │
//! │    WastageRepository     ──┼──► ledger::append_delta / append_absolute  │
//! │    ReconciliationRepository┘         (pub(crate))                       │
//! │                                                                         │
//! │  Read side                                                              │
//! │    LedgerRepository      current stock, history, audit                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod consumption;
pub mod ledger;
pub mod material;
pub mod recipe;
pub mod reconciliation;
pub mod unit;
pub mod wastage;
