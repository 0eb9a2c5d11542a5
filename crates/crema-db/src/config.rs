//! # Inventory Configuration
//!
//! Configuration for the ledger database and the write-retry policy.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     CREMA_DB_PATH=/srv/crema/inventory.db                               │
//! │     CREMA_DB_MAX_CONNECTIONS=8                                          │
//! │     CREMA_RETRY_MAX_ELAPSED_MS=5000                                     │
//! │                                                                         │
//! │  2. TOML Config File                                                    │
//! │     ~/.config/inventory/inventory.toml (Linux)                          │
//! │     ~/Library/Application Support/com.crema.inventory/inventory.toml    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # inventory.toml
//! [database]
//! path = "./data/crema.db"
//! max_connections = 5
//! busy_timeout_ms = 250
//!
//! [retry]
//! initial_backoff_ms = 10
//! max_backoff_ms = 500
//! max_elapsed_ms = 3000
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{DbError, DbResult};
use crate::pool::DbConfig;
use crate::retry::RetryPolicy;

// =============================================================================
// Database Settings
// =============================================================================

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Path to the SQLite file. Created on first connect.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long SQLite itself waits on a locked database before reporting
    /// BUSY (milliseconds).
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u64,

    #[serde(default = "default_true")]
    pub run_migrations: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("crema.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

fn default_busy_timeout() -> u64 {
    250
}

fn default_true() -> bool {
    true
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            busy_timeout_ms: default_busy_timeout(),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Retry Settings
// =============================================================================

/// `[retry]` section: exponential backoff for write conflicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Total time budget for retrying one operation.
    #[serde(default = "default_max_elapsed")]
    pub max_elapsed_ms: u64,
}

fn default_initial_backoff() -> u64 {
    10
}

fn default_max_backoff() -> u64 {
    500
}

fn default_max_elapsed() -> u64 {
    3_000
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
            max_elapsed_ms: default_max_elapsed(),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        RetryPolicy {
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            max_elapsed: Duration::from_millis(settings.max_elapsed_ms),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete inventory configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub retry: RetrySettings,
}

impl InventoryConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (inventory.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> DbResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading inventory config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| DbError::ConfigLoadFailed(format!("{}: {}", path.display(), e)))?;
                config = Self::from_toml_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document; missing sections and keys take defaults.
    pub fn from_toml_str(contents: &str) -> DbResult<Self> {
        toml::from_str(contents).map_err(|e| DbError::ConfigLoadFailed(e.to_string()))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> DbResult<()> {
        if self.database.path.as_os_str().is_empty() {
            return Err(DbError::InvalidConfig("database.path must not be empty".into()));
        }

        if self.database.max_connections == 0 {
            return Err(DbError::InvalidConfig(
                "database.max_connections must be greater than 0".into(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(DbError::InvalidConfig(format!(
                "database.min_connections ({}) exceeds max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }

        if self.retry.initial_backoff_ms == 0 {
            return Err(DbError::InvalidConfig(
                "retry.initial_backoff_ms must be greater than 0".into(),
            ));
        }

        if self.retry.max_backoff_ms < self.retry.initial_backoff_ms {
            return Err(DbError::InvalidConfig(
                "retry.max_backoff_ms must be at least initial_backoff_ms".into(),
            ));
        }

        Ok(())
    }

    /// Returns the write-retry policy described by `[retry]`.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("CREMA_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Ok(max) = std::env::var("CREMA_DB_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid CREMA_DB_MAX_CONNECTIONS"),
            }
        }

        if let Ok(elapsed) = std::env::var("CREMA_RETRY_MAX_ELAPSED_MS") {
            match elapsed.parse::<u64>() {
                Ok(ms) => self.retry.max_elapsed_ms = ms,
                Err(_) => warn!(value = %elapsed, "Ignoring invalid CREMA_RETRY_MAX_ELAPSED_MS"),
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "crema", "inventory")
            .map(|dirs| dirs.config_dir().join("inventory.toml"))
    }
}

impl From<&InventoryConfig> for DbConfig {
    fn from(config: &InventoryConfig) -> Self {
        DbConfig::new(config.database.path.clone())
            .max_connections(config.database.max_connections)
            .min_connections(config.database.min_connections)
            .busy_timeout(Duration::from_millis(config.database.busy_timeout_ms))
            .run_migrations(config.database.run_migrations)
            .retry_policy(config.retry_policy())
    }
}
