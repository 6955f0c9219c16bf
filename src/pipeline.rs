//! Pipeline orchestrator: one unattended sync run, start to finish.
//!
//! Order is fixed: report setup, run lease, feed session, normalize, upsert,
//! roster, prune, aggregate, notify. Anything that fails before the upsert
//! stops the run with nothing written. After that, each step handles its own
//! failures and the run carries on; completed steps are never rolled back.

use chrono::{Local, NaiveDateTime};
use serde::Serialize;

use crate::aggregate::{self, AggregateReport};
use crate::db::{ActivityDb, DbSyncRun, ReportSetup, Table, UpsertSummary};
use crate::error::SyncError;
use crate::feed::{ExportFeedReader, FeedReader};
use crate::normalize::{format_elapsed, normalize_batch};
use crate::notification::{notifier_from_settings, render_template, Notification, Notifier};
use crate::retry::{with_contention_retry, RetryPolicy};
use crate::roster::{self, RosterSource};
use crate::types::Settings;

const STAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub retry: RetryPolicy,
    pub lease_ttl: chrono::Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            lease_ttl: chrono::Duration::hours(1),
        }
    }
}

impl From<&Settings> for PipelineOptions {
    fn from(settings: &Settings) -> Self {
        Self {
            retry: RetryPolicy::from(&settings.retry),
            lease_ttl: chrono::Duration::seconds(
                settings.lease_ttl_secs.min(crate::config::MAX_LEASE_TTL_SECS) as i64,
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every step succeeded.
    Completed,
    /// The run finished but at least one step was abandoned.
    CompletedWithErrors,
    /// The feed produced nothing; the store was not touched.
    NoData,
}

impl RunOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            RunOutcome::Completed => "completed",
            RunOutcome::CompletedWithErrors => "completed_with_errors",
            RunOutcome::NoData => "no_data",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub started_at: NaiveDateTime,
    pub finished_at: NaiveDateTime,
    pub records_read: usize,
    /// Rows in `extracted_activities` before the upsert.
    pub existing_count: i64,
    /// Rows right after the upsert.
    pub latest_count: i64,
    /// Rows after the roster filter.
    pub final_count: i64,
    pub upsert: UpsertSummary,
    pub pruned: usize,
    pub prune_completed: bool,
    pub aggregate: AggregateReport,
    pub notified: bool,
    pub outcome: RunOutcome,
}

impl RunReport {
    /// New natural keys introduced by this batch.
    pub fn inserted(&self) -> i64 {
        self.latest_count - self.existing_count
    }

    /// Values for `v<Key>` tokens in the notification templates.
    pub fn template_variables(&self) -> Vec<(&'static str, String)> {
        vec![
            ("ScriptName", env!("CARGO_PKG_NAME").to_string()),
            ("RunId", self.run_id.clone()),
            ("ExecStartTime", self.started_at.format(STAMP_FORMAT).to_string()),
            ("ExecEndTime", self.finished_at.format(STAMP_FORMAT).to_string()),
            (
                "TotalExecutionTime",
                format_elapsed(self.finished_at - self.started_at),
            ),
            ("ExistingCount", self.existing_count.to_string()),
            ("LatestCount", self.latest_count.to_string()),
            ("TotalCount", self.inserted().to_string()),
            ("PrunedCount", self.pruned.to_string()),
            ("FinalCount", self.final_count.to_string()),
        ]
    }

    fn to_db_run(&self) -> DbSyncRun {
        DbSyncRun {
            id: self.run_id.clone(),
            started_at: self.started_at.format(STAMP_FORMAT).to_string(),
            finished_at: self.finished_at.format(STAMP_FORMAT).to_string(),
            existing_count: self.existing_count,
            latest_count: self.latest_count,
            final_count: self.final_count,
            inserted: self.inserted(),
            pruned: self.pruned as i64,
            failed_records: self.upsert.failed as i64,
            outcome: self.outcome.as_str().to_string(),
        }
    }
}

/// Render the run summary using the report setup's templates. A blank
/// subject template falls back to a timestamped default.
pub fn build_notification(setup: &ReportSetup, report: &RunReport) -> Notification {
    let variables = report.template_variables();
    let subject = if setup.email_subject.trim().is_empty() {
        format!(
            "Activity Report Summary as of {}",
            report.finished_at.format("%d-%b-%Y %H:%M:%S")
        )
    } else {
        render_template(&setup.email_subject, &variables)
    };
    Notification {
        subject,
        body: render_template(&setup.email_body, &variables),
        recipient: setup.email_recipient.clone(),
    }
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Row count for reporting. A failed count is logged and reported as zero
/// so it cannot stop the run.
fn count_rows(db: &ActivityDb) -> i64 {
    match db.row_count(Table::ExtractedActivities) {
        Ok(n) => n,
        Err(e) => {
            log::error!("Error fetching row count for extracted_activities: {}", e);
            0
        }
    }
}

/// Execute one full sync run.
pub fn run(
    db: &ActivityDb,
    feed: &mut dyn FeedReader,
    roster_source: &dyn RosterSource,
    notifier: &dyn Notifier,
    options: &PipelineOptions,
) -> Result<RunReport, SyncError> {
    let started_at = now();
    let run_id = uuid::Uuid::new_v4().to_string();
    log::info!("Sync run {} started", run_id);

    let setup = db.report_setup()?;
    let _lease = db.acquire_lease(&run_id, options.lease_ttl)?;
    let session = feed.open_session(&setup)?;

    let raw: Vec<_> = session.collect();
    if raw.is_empty() {
        log::warn!("No data extracted; leaving the store untouched");
        let count = count_rows(db);
        return Ok(RunReport {
            run_id,
            started_at,
            finished_at: now(),
            records_read: 0,
            existing_count: count,
            latest_count: count,
            final_count: count,
            upsert: UpsertSummary::default(),
            pruned: 0,
            prune_completed: false,
            aggregate: AggregateReport::default(),
            notified: false,
            outcome: RunOutcome::NoData,
        });
    }
    let records_read = raw.len();
    let activities = normalize_batch(raw, now());
    log::info!("Extracted {} rows of activity data", records_read);

    let existing_count = count_rows(db);
    log::info!("Existing row count in extracted_activities: {}", existing_count);

    let mut step_failed = false;
    let upsert = match with_contention_retry("activity upsert", &options.retry, || {
        db.upsert_activities(&activities)
    }) {
        Ok(summary) => summary,
        Err(e) => {
            log::error!("Error saving activities: {}", e);
            step_failed = true;
            UpsertSummary {
                affected: 0,
                failed: activities.len(),
            }
        }
    };
    if upsert.failed > 0 {
        step_failed = true;
    }
    let latest_count = count_rows(db);
    log::info!("Latest row count in extracted_activities: {}", latest_count);

    let valid = roster::load_roster(roster_source)?;
    let (pruned, prune_completed) = match roster::prune(db, &valid, &options.retry) {
        Ok(n) => (n, true),
        Err(e) => {
            log::error!("Roster filter abandoned for this run: {}", e);
            step_failed = true;
            (0, false)
        }
    };
    let final_count = count_rows(db);
    log::info!(
        "Rows inserted: {}, rows pruned: {}, rows retained: {}",
        latest_count - existing_count,
        pruned,
        final_count
    );

    let aggregate = aggregate::run_all(db, &options.retry);
    if !aggregate.is_complete() {
        step_failed = true;
    }

    let mut report = RunReport {
        run_id,
        started_at,
        finished_at: now(),
        records_read,
        existing_count,
        latest_count,
        final_count,
        upsert,
        pruned,
        prune_completed,
        aggregate,
        notified: false,
        outcome: if step_failed {
            RunOutcome::CompletedWithErrors
        } else {
            RunOutcome::Completed
        },
    };

    let notification = build_notification(&setup, &report);
    match notifier.send(&notification) {
        Ok(()) => report.notified = true,
        Err(e) => log::error!("Error sending summary notification: {}", e),
    }

    if let Err(e) = db.record_run(&report.to_db_run()) {
        log::error!("Failed to record run {}: {}", report.run_id, e);
    }

    log::info!(
        "Sync run {} finished: {}",
        report.run_id,
        report.outcome.as_str()
    );
    Ok(report)
}

/// Open the configured database, feed and notifier, then run once.
pub fn run_with_settings(settings: &Settings) -> Result<RunReport, SyncError> {
    let db = match &settings.db_path {
        Some(path) => ActivityDb::open_at(path)?,
        None => ActivityDb::open()?,
    };
    db.set_busy_timeout(std::time::Duration::from_millis(settings.busy_timeout_ms))?;

    let notifier =
        notifier_from_settings(&settings.notifier).map_err(|e| SyncError::Config(e.to_string()))?;
    let mut feed = ExportFeedReader::from_settings(&settings.feed);
    let options = PipelineOptions::from(settings);

    run(&db, &mut feed, &db, notifier.as_ref(), &options)
}
