//! Roster filter: drop activities from actors outside the team.

use std::collections::HashSet;

use crate::db::{ActivityDb, DbError};
use crate::error::SyncError;
use crate::retry::{with_contention_retry, RetryPolicy};

/// Supplies the set of actor identities considered in scope.
pub trait RosterSource {
    fn valid_identities(&self) -> Result<HashSet<String>, DbError>;
}

/// `team_wise_summary` is the roster of record.
impl RosterSource for ActivityDb {
    fn valid_identities(&self) -> Result<HashSet<String>, DbError> {
        self.team_members()
    }
}

/// Read a roster snapshot. An empty roster is refused: pruning against it
/// would wipe the store, which is never what an unpopulated team table means.
pub fn load_roster(source: &dyn RosterSource) -> Result<HashSet<String>, SyncError> {
    let names = source
        .valid_identities()
        .map_err(|e| SyncError::Roster(e.to_string()))?;
    if names.is_empty() {
        return Err(SyncError::Roster("roster is empty".to_string()));
    }
    log::info!("Fetched {} valid names from the roster", names.len());
    Ok(names)
}

/// Delete every stored activity whose actor is not in `valid_identities`.
///
/// Runs in one transaction, retried while the database is locked. When the
/// retries run out the store is left exactly as it was, and callers must not
/// assume the roster holds.
pub fn prune(
    db: &ActivityDb,
    valid_identities: &HashSet<String>,
    policy: &RetryPolicy,
) -> Result<usize, SyncError> {
    let deleted = with_contention_retry("roster filter", policy, || {
        db.delete_activities_outside(valid_identities)
    })?;
    log::info!("Filtered activities by team: {} rows removed", deleted);
    Ok(deleted)
}
