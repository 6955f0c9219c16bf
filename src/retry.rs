//! Bounded retry for writes that collide with another connection's lock.
//!
//! Only `SQLITE_BUSY` / `SQLITE_LOCKED` are retried. Everything else fails
//! on the first attempt. The pause is fixed and the caller's thread sleeps
//! through it.

use std::time::Duration;

use crate::db::DbError;
use crate::error::SyncError;
use crate::types::RetrySettings;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub pause: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            pause: Duration::from_secs(5),
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            pause: Duration::from_secs(settings.pause_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retryable,
    NonRetryable,
}

pub fn retry_decision_for(err: &DbError) -> RetryDecision {
    if err.is_contention() {
        RetryDecision::Retryable
    } else {
        RetryDecision::NonRetryable
    }
}

/// Run `op` up to `policy.max_attempts` times while it keeps failing with
/// contention. `step` names the operation in logs and errors.
pub fn with_contention_retry<T, F>(step: &str, policy: &RetryPolicy, mut op: F) -> Result<T, SyncError>
where
    F: FnMut() -> Result<T, DbError>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op() {
            Ok(value) => return Ok(value),
            Err(err) => {
                if retry_decision_for(&err) == RetryDecision::NonRetryable {
                    log::error!("{} failed: {}", step, err);
                    return Err(SyncError::Store {
                        step: step.to_string(),
                        source: err,
                    });
                }
                if attempt >= attempts {
                    log::error!("Failed to complete {} after {} attempts: {}", step, attempts, err);
                    return Err(SyncError::ContentionExhausted {
                        step: step.to_string(),
                        attempts,
                        last_error: err.to_string(),
                    });
                }
                log::warn!(
                    "{}: database locked, retrying ({}/{}) in {:?}",
                    step,
                    attempt,
                    attempts,
                    policy.pause
                );
                std::thread::sleep(policy.pause);
            }
        }
    }
}
