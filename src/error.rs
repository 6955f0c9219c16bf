//! Error types for a sync run.
//!
//! Errors are classified by what the run does next:
//! - Fatal: settings, report setup, lease, feed session or roster could not be
//!   obtained. The run stops.
//! - Contention: a write kept hitting a locked database until the retry
//!   ceiling. That step is abandoned, the run continues.
//! - Store: any other database failure inside a step. Same as contention.

use thiserror::Error;

use crate::db::DbError;
use crate::feed::FeedError;
use crate::retry::{retry_decision_for, RetryDecision};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database unavailable: {0}")]
    Database(#[from] DbError),

    #[error("Feed session failed: {0}")]
    Feed(#[from] FeedError),

    #[error("Roster unavailable: {0}")]
    Roster(String),

    #[error("{step} failed: {source}")]
    Store {
        step: String,
        #[source]
        source: DbError,
    },

    #[error("{step} gave up after {attempts} attempts: {last_error}")]
    ContentionExhausted {
        step: String,
        attempts: u32,
        last_error: String,
    },
}

impl SyncError {
    pub fn retry_decision(&self) -> RetryDecision {
        match self {
            SyncError::Database(e) | SyncError::Store { source: e, .. } => retry_decision_for(e),
            SyncError::ContentionExhausted { .. } => RetryDecision::Retryable,
            _ => RetryDecision::NonRetryable,
        }
    }

    /// True if the run must stop rather than move on to the next step.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            SyncError::Store { .. } | SyncError::ContentionExhausted { .. }
        )
    }
}
