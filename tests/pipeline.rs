//! End-to-end runs against a file-backed database and a feed export on disk.

use std::collections::HashMap;
use std::path::Path;

use activity_sync_lib::categories::Granularity;
use activity_sync_lib::db::{ActivityDb, ReportSetup, Table};
use activity_sync_lib::feed::ExportFeedReader;
use activity_sync_lib::notification::LogNotifier;
use activity_sync_lib::types::{FeedSettings, NotifierSettings, RetrySettings, Settings};
use activity_sync_lib::{run, run_with_settings, PipelineOptions, RunOutcome};

fn setup() -> ReportSetup {
    ReportSetup {
        base_url: "https://desk.example.com/activity".to_string(),
        login_email: "bot@example.com".to_string(),
        login_password: "secret".to_string(),
        email_recipient: "reports@example.com".to_string(),
        email_subject: "Activity vExecEndTime".to_string(),
        email_body: "vExistingCount/vLatestCount/vTotalCount".to_string(),
    }
}

fn write_feed(path: &Path) {
    std::fs::write(
        path,
        r#"[
            {"name": "Alice", "activityType": "Added a note", "when": "March 5th 2024, 09:00:00", "ticketUrl": "https://desk.example.com/t/1"},
            {"name": "Alice", "activityType": "Added a note", "when": "March 5th 2024, 10:00:00", "ticketUrl": "https://desk.example.com/t/2"},
            {"name": "Alice", "activityType": "Added a tag", "when": "March 5th 2024, 11:00:00", "ticketUrl": "https://desk.example.com/t/3"},
            {"name": "Bob", "activityType": "Added a note", "when": "March 5th 2024, 12:00:00", "ticketUrl": "https://desk.example.com/t/4"},
            {"name": "Mallory", "activityType": "Customer replied", "when": "March 6th 2024, 08:00:00", "ticketUrl": "https://desk.example.com/t/5"}
        ]"#,
    )
    .expect("write feed");
}

fn provision(db_path: &Path) {
    let db = ActivityDb::open_at(db_path).expect("open");
    db.save_report_setup(&setup()).expect("setup");
    db.register_team_member("Alice").expect("alice");
    db.register_team_member("Bob").expect("bob");
}

#[test]
fn sync_run_populates_summaries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("activity.db");
    let feed_path = dir.path().join("feed.json");
    provision(&db_path);
    write_feed(&feed_path);

    let db = ActivityDb::open_at(&db_path).expect("open");
    let mut feed = ExportFeedReader::new(&feed_path);
    let report = run(&db, &mut feed, &db, &LogNotifier, &PipelineOptions::default()).expect("run");

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.inserted(), 5);
    assert_eq!(report.pruned, 1);
    assert_eq!(db.row_count(Table::ExtractedActivities).expect("count"), 4);

    let dates = db.summary_rows(Granularity::Date).expect("dates");
    // Mallory's date row was discovered after pruning, so only the 5th remains.
    assert_eq!(dates.len(), 1);
    let day = &dates[0];
    assert_eq!(day.key, "2024-03-05");
    assert_eq!(day.count_for("Added a note"), Some(3));
    assert_eq!(day.count_for("Added a tag"), Some(1));
    assert_eq!(day.total, 4);

    let team: HashMap<_, _> = db
        .summary_rows(Granularity::Team)
        .expect("team")
        .into_iter()
        .map(|r| (r.key.clone(), r))
        .collect();
    assert_eq!(team["Alice"].total, 3);
    assert_eq!(team["Bob"].count_for("Added a note"), Some(1));

    let labels: HashMap<_, _> = db.activity_summary().expect("labels").into_iter().collect();
    assert_eq!(labels["Added a note"], 3);
    assert_eq!(labels["Customer"], 0);
}

#[test]
fn run_with_settings_is_idempotent_across_runs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("activity.db");
    let feed_path = dir.path().join("feed.json");
    provision(&db_path);
    write_feed(&feed_path);

    let settings = Settings {
        db_path: Some(db_path.clone()),
        feed: FeedSettings {
            path: feed_path,
            ready_timeout_secs: 1,
            poll_interval_ms: 10,
            min_records: 1,
        },
        notifier: NotifierSettings::default(),
        retry: RetrySettings {
            max_attempts: 2,
            pause_secs: 0,
        },
        busy_timeout_ms: 0,
        lease_ttl_secs: 60,
    };

    let first = run_with_settings(&settings).expect("first run");
    let second = run_with_settings(&settings).expect("second run");
    assert_eq!(first.final_count, 4);
    assert_eq!(second.existing_count, 4);
    // Mallory comes back on every replay and is pruned again.
    assert_eq!(second.inserted(), 1);
    assert_eq!(second.final_count, 4);

    let db = ActivityDb::open_at(&db_path).expect("reopen");
    let runs = db.recent_runs(10).expect("runs");
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.outcome == "completed"));
}

#[test]
fn missing_feed_export_aborts_without_writes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let db_path = dir.path().join("activity.db");
    provision(&db_path);

    let db = ActivityDb::open_at(&db_path).expect("open");
    let mut feed = ExportFeedReader::new(dir.path().join("never-written.json")).with_ready_timeout(
        std::time::Duration::from_millis(30),
        std::time::Duration::from_millis(5),
    );
    let err = run(&db, &mut feed, &db, &LogNotifier, &PipelineOptions::default())
        .expect_err("no export");
    assert!(err.is_fatal());
    assert_eq!(db.row_count(Table::ExtractedActivities).expect("count"), 0);
    assert!(db.recent_runs(1).expect("runs").is_empty());
}
