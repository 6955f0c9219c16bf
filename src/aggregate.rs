//! Aggregator: rebuild the summary tables from the activity store.
//!
//! Three passes run in order, each in its own transaction with its own
//! contention retry:
//! 1. date discovery (insert-only)
//! 2. category recount (activity summary, team-wise, date-wise)
//! 3. total recount (team-wise, date-wise)
//!
//! The passes are not atomic as a group. Between them a reader can see new
//! dates with zeroed counts, or totals that lag the category columns.

use serde::Serialize;

use crate::categories::Granularity;
use crate::db::ActivityDb;
use crate::error::SyncError;
use crate::retry::{with_contention_retry, RetryDecision, RetryPolicy};

/// Which aggregation steps completed during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateReport {
    pub dates_added: Option<usize>,
    pub completed_steps: Vec<String>,
    pub failed_steps: Vec<String>,
    /// Failed steps that gave up on a locked database rather than erroring.
    pub contended_steps: Vec<String>,
}

impl AggregateReport {
    pub fn is_complete(&self) -> bool {
        self.failed_steps.is_empty()
    }

    fn record<T>(&mut self, step: &str, result: Result<T, SyncError>) -> Option<T> {
        match result {
            Ok(value) => {
                self.completed_steps.push(step.to_string());
                Some(value)
            }
            Err(e) => {
                match e.retry_decision() {
                    RetryDecision::Retryable => {
                        log::error!("Aggregation step '{}' abandoned under lock contention: {}", step, e);
                        self.contended_steps.push(step.to_string());
                    }
                    RetryDecision::NonRetryable => {
                        log::error!("Aggregation step '{}' failed: {}", step, e)
                    }
                }
                self.failed_steps.push(step.to_string());
                None
            }
        }
    }
}

/// Pass 1: one `date_wise_summary` row per distinct activity date.
pub fn discover_dates(db: &ActivityDb, policy: &RetryPolicy) -> Result<usize, SyncError> {
    let added = with_contention_retry("date discovery", policy, || db.insert_missing_dates())?;
    log::info!("Date-wise summary updated: {} new dates", added);
    Ok(added)
}

/// Pass 2, per granularity: recount every category column.
pub fn recompute_categories(
    db: &ActivityDb,
    granularity: Granularity,
    policy: &RetryPolicy,
) -> Result<usize, SyncError> {
    let step = format!("{} category recount", granularity.label());
    let rows = with_contention_retry(&step, policy, || db.recompute_category_counts(granularity))?;
    log::info!("{} summary updated: {} rows", granularity.label(), rows);
    Ok(rows)
}

/// Pass 2, per label: recount `activity_summary`.
pub fn recompute_activity_summary(db: &ActivityDb, policy: &RetryPolicy) -> Result<usize, SyncError> {
    let rows = with_contention_retry("activity summary recount", policy, || {
        db.recompute_activity_summary()
    })?;
    log::info!("Activity summary counts updated: {} labels", rows);
    Ok(rows)
}

/// Pass 3: `total_count` = sum of category columns.
pub fn recompute_totals(
    db: &ActivityDb,
    granularity: Granularity,
    policy: &RetryPolicy,
) -> Result<usize, SyncError> {
    let step = format!("{} total recount", granularity.label());
    let rows = with_contention_retry(&step, policy, || db.recompute_totals(granularity))?;
    log::info!("Total count updated in {}: {} rows", granularity.table(), rows);
    Ok(rows)
}

/// Run every pass in order. A step that fails is logged and skipped; later
/// steps still run against whatever state the store is in.
pub fn run_all(db: &ActivityDb, policy: &RetryPolicy) -> AggregateReport {
    let mut report = AggregateReport::default();

    let dates_added = report.record("date discovery", discover_dates(db, policy));
    report.dates_added = dates_added;

    report.record(
        "activity summary recount",
        recompute_activity_summary(db, policy),
    );
    for granularity in Granularity::ALL {
        let step = format!("{} category recount", granularity.label());
        report.record(&step, recompute_categories(db, granularity, policy));
    }
    for granularity in Granularity::ALL {
        let step = format!("{} total recount", granularity.label());
        report.record(&step, recompute_totals(db, granularity, policy));
    }

    report
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rusqlite::Connection;

    use super::*;
    use crate::db::activities::fixtures::activity;
    use crate::db::test_utils::{file_db, test_db};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            pause: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_run_all_builds_consistent_summaries() {
        let db = test_db();
        db.register_team_member("Alice").expect("roster");
        db.register_team_member("Bob").expect("roster");
        db.upsert_activities(&[
            activity("Alice", "Added a note", "2024-03-05 10:00:00"),
            activity("Alice", "Added a note", "2024-03-05 11:00:00"),
            activity("Bob", "Added a tag", "2024-03-05 12:00:00"),
            activity("Bob", "Wrote a reply", "2024-03-06 09:00:00"),
        ])
        .expect("insert");

        let report = run_all(&db, &fast(3));
        assert!(report.is_complete(), "failed: {:?}", report.failed_steps);
        assert_eq!(report.dates_added, Some(2));
        assert_eq!(report.completed_steps.len(), 6);
        assert!(report.contended_steps.is_empty());

        let dates = db.summary_rows(Granularity::Date).expect("dates");
        assert_eq!(dates[0].key, "2024-03-05");
        assert_eq!(dates[0].count_for("Added a note"), Some(2));
        assert_eq!(dates[0].count_for("Added a tag"), Some(1));
        assert_eq!(dates[0].total, 3);

        let team = db.summary_rows(Granularity::Team).expect("team");
        let bob = team.iter().find(|r| r.key == "Bob").expect("bob");
        assert_eq!(bob.total, 2);

        for g in Granularity::ALL {
            for row in db.summary_rows(g).expect("rows") {
                assert_eq!(row.total, row.counts.iter().sum::<i64>());
            }
        }
    }

    #[test]
    fn test_rerun_is_stable() {
        let db = test_db();
        db.register_team_member("Alice").expect("roster");
        db.upsert_activities(&[activity("Alice", "Merged to", "2024-03-05 10:00:00")])
            .expect("insert");

        run_all(&db, &fast(3));
        let first = db.summary_rows(Granularity::Date).expect("rows");
        let report = run_all(&db, &fast(3));
        assert_eq!(report.dates_added, Some(0));
        assert_eq!(db.summary_rows(Granularity::Date).expect("rows"), first);
    }

    #[test]
    fn test_locked_store_fails_every_step_without_panicking() {
        let (db, path) = file_db();
        db.set_busy_timeout(Duration::ZERO).expect("busy timeout");
        db.upsert_activities(&[activity("Alice", "Merged to", "2024-03-05 10:00:00")])
            .expect("insert");

        let holder = Connection::open(&path).expect("second connection");
        holder.execute_batch("BEGIN IMMEDIATE").expect("hold lock");

        let report = run_all(&db, &fast(2));
        assert!(!report.is_complete());
        assert_eq!(report.failed_steps.len(), 6);
        assert_eq!(report.contended_steps, report.failed_steps);
        assert!(report.dates_added.is_none());

        holder.execute_batch("ROLLBACK").expect("release");
        assert!(db.summary_rows(Granularity::Date).expect("rows").is_empty());
    }
}
