//! # crema-db: Stock Ledger Persistence for Crema
//!
//! SQLite storage for materials, recipes and the append-only stock ledger,
//! plus the three engines that write to it.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Crema Data Flow                                  │
//! │                                                                         │
//! │  Order subsystem         Wastage UI            Reconciliation UI        │
//! │  (line confirmed)        (loss entered)        (counts entered)         │
//! │       │                       │                      │                  │
//! │       ▼                       ▼                      ▼                  │
//! │  ┌─────────────────────────────────────────────────────────────────┐    │
//! │  │                     crema-db (THIS CRATE)                       │    │
//! │  │                                                                 │    │
//! │  │   consumption()          wastage()           reconciliation()   │    │
//! │  │        │                     │                      │           │    │
//! │  │        └─────────────────────┼──────────────────────┘           │    │
//! │  │                              ▼                                  │    │
//! │  │                  stock_snapshots (append-only)                  │    │
//! │  │                  material_stock  (cached head)                  │    │
//! │  │                                                                 │    │
//! │  │   pool.rs   config.rs   retry.rs   migrations.rs                │    │
//! │  └─────────────────────────────────────────────────────────────────┘    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL)                                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and repository access
//! - [`config`] - `inventory.toml` loading and environment overrides
//! - [`retry`] - Backoff for SQLite write conflicts
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repositories and engines
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crema_db::{Database, DbConfig, InventoryConfig};
//!
//! let config = InventoryConfig::load(None)?;
//! let db = Database::new(DbConfig::from(&config)).await?;
//!
//! let outcome = db.consumption().consume(&request).await?;
//! for shortfall in &outcome.shortfalls {
//!     // surface to the shift manager
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod retry;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::InventoryConfig;
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};
pub use retry::RetryPolicy;

// Repository re-exports for convenience
pub use repository::consumption::{ConsumptionOutcome, ConsumptionRepository, ReversalOutcome};
pub use repository::ledger::LedgerRepository;
pub use repository::material::MaterialRepository;
pub use repository::recipe::RecipeRepository;
pub use repository::reconciliation::ReconciliationRepository;
pub use repository::unit::UnitRepository;
pub use repository::wastage::WastageRepository;
