//! # Database Error Types
//!
//! Error types for ledger persistence and the engines built on it.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)          CoreError (crema-core)             │
//! │       │                                   │                             │
//! │       ▼                                   ▼                             │
//! │  DbError (this module) ← Adds context and categorization                │
//! │       │                                                                 │
//! │       ├── WriteConflict ──► retried by retry::with_write_retry          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Caller (order service, back-office screens)                            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crema_core::reconciliation::ReconciliationBatchFailure;
use crema_core::CoreError;
use thiserror::Error;

/// SQLite primary and extended result codes that mean "another writer holds
/// the lock": BUSY, LOCKED, BUSY_RECOVERY, BUSY_SNAPSHOT, LOCKED_SHAREDCACHE.
const LOCK_CONTENTION_CODES: &[&str] = &["5", "6", "261", "517", "262"];

/// Database operation errors.
///
/// These errors wrap sqlx errors and domain errors, and provide additional
/// context for debugging and operator feedback.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - `fetch_one` returns no rows
    /// - Reversing an order line that was never consumed
    /// - Voiding an unknown wastage entry
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    ///
    /// ## When This Occurs
    /// - Duplicate material code
    /// - Second recipe for the same product
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Recipe line or snapshot referencing a non-existent material
    /// - Material referencing a non-existent unit
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed, or the request conflicts with ledger state
    /// (for example, voiding a wastage entry twice).
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Another writer holds the SQLite lock.
    ///
    /// ## When This Occurs
    /// Two ledger writes overlap and the busy timeout expires. The engines
    /// retry this transparently; callers only see it once the retry budget
    /// is spent.
    #[error("Concurrent write conflict: {0}")]
    WriteConflict(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Inventory rule violation from crema-core.
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// A reconciliation batch was rolled back as a whole.
    #[error(transparent)]
    Reconciliation(#[from] ReconciliationBatchFailure),

    /// Configuration values are out of range or inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be read or parsed.
    #[error("Failed to load configuration: {0}")]
    ConfigLoadFailed(String),

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a UniqueViolation error.
    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// True for errors the write-retry loop should try again.
    pub fn is_write_conflict(&self) -> bool {
        matches!(self, DbError::WriteConflict(_))
    }
}

fn is_lock_contention(code: Option<&str>, message: &str) -> bool {
    code.is_some_and(|c| LOCK_CONTENTION_CODES.contains(&c))
        || message.contains("database is locked")
        || message.contains("database table is locked")
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → BUSY/LOCKED → WriteConflict,
///                               otherwise analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                let code = db_err.code();

                if is_lock_contention(code.as_deref(), msg) {
                    DbError::WriteConflict(msg.to_string())
                } else if msg.contains("UNIQUE constraint failed") {
                    // "UNIQUE constraint failed: <table>.<column>"
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<crema_core::ValidationError> for DbError {
    fn from(err: crema_core::ValidationError) -> Self {
        DbError::Domain(CoreError::Validation(err))
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_contention_detection() {
        assert!(is_lock_contention(Some("5"), "database is locked"));
        assert!(is_lock_contention(Some("517"), ""));
        assert!(is_lock_contention(None, "database table is locked"));
        assert!(!is_lock_contention(Some("19"), "UNIQUE constraint failed: materials.code"));
    }

    #[test]
    fn test_only_write_conflicts_are_retryable() {
        assert!(DbError::WriteConflict("busy".into()).is_write_conflict());
        assert!(!DbError::PoolExhausted.is_write_conflict());
        assert!(!DbError::not_found("Material", "m1").is_write_conflict());
    }

    #[test]
    fn test_core_errors_pass_through() {
        let err: DbError = CoreError::UnknownUnit("cup".into()).into();
        assert_eq!(err.to_string(), "Unknown unit symbol: cup");
    }
}
