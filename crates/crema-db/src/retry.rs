//! # Write-Conflict Retry
//!
//! Retries a whole ledger transaction when SQLite reports lock contention.
//!
//! ## Retry Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   attempt ──► Ok ───────────────────────────────────► return            │
//! │      │                                                                  │
//! │      ├──► Err(WriteConflict) ──► next_backoff() ──► sleep ──► attempt   │
//! │      │                               │                                  │
//! │      │                               └── budget spent ──► return Err    │
//! │      │                                                                  │
//! │      └──► any other Err ────────────────────────────► return            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each attempt is a fresh transaction: a conflicted attempt has already
//! rolled back, so retrying never applies anything twice.

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::DbResult;

/// Exponential backoff settings for write conflicts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Total time budget; once spent the conflict is returned to the caller.
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(500),
            max_elapsed: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// A policy that gives up on the first conflict.
    pub fn no_retry() -> Self {
        RetryPolicy {
            max_elapsed: Duration::ZERO,
            ..Default::default()
        }
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        };
        // Default::default() leaves current_interval at the crate's 500ms.
        backoff.reset();
        backoff
    }
}

/// Runs `attempt` until it succeeds, fails with something other than
/// [`DbError::WriteConflict`](crate::DbError::WriteConflict), or the policy's
/// time budget is spent.
pub async fn with_write_retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    mut attempt: F,
) -> DbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let mut backoff = policy.create_backoff();
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        match attempt().await {
            Err(err) if err.is_write_conflict() => match backoff.next_backoff() {
                Some(delay) => {
                    debug!(
                        operation,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Write conflict, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    warn!(operation, attempts, "Write conflict retry budget exhausted");
                    return Err(err);
                }
            },
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            max_elapsed: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_write_retry(&fast_policy(), "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(DbError::WriteConflict("database is locked".into()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: DbResult<()> = with_write_retry(&fast_policy(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DbError::not_found("Material", "m1"))
        })
        .await;

        assert!(matches!(result, Err(DbError::NotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_returns_conflict() {
        let policy = RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            max_elapsed: Duration::from_millis(20),
        };
        let result: DbResult<()> = with_write_retry(&policy, "test", || async {
            Err(DbError::WriteConflict("busy".into()))
        })
        .await;

        assert!(matches!(result, Err(DbError::WriteConflict(_))));
    }
}
