//! Shared type definitions for the database layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Run lease held by {holder} until {expires_at}")]
    LeaseHeld { holder: String, expires_at: String },

    #[error("Run lease TTL of {0}s does not give a valid expiry")]
    InvalidLeaseTtl(i64),

    #[error("No report setup row found in config_setup")]
    MissingReportSetup,
}

impl DbError {
    /// True when SQLite reported the database or a table as locked by
    /// another connection. This is the only condition worth retrying.
    pub fn is_contention(&self) -> bool {
        match self {
            DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Tables whose row counts the pipeline reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    ExtractedActivities,
    DateWiseSummary,
    TeamWiseSummary,
    ActivitySummary,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::ExtractedActivities => "extracted_activities",
            Table::DateWiseSummary => "date_wise_summary",
            Table::TeamWiseSummary => "team_wise_summary",
            Table::ActivitySummary => "activity_summary",
        }
    }
}

/// The singleton row from `config_setup`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSetup {
    pub base_url: String,
    pub login_email: String,
    #[serde(skip_serializing)]
    pub login_password: String,
    pub email_recipient: String,
    pub email_subject: String,
    pub email_body: String,
}

/// Outcome of a batch upsert into `extracted_activities`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertSummary {
    /// Rows inserted or updated.
    pub affected: usize,
    /// Records rejected by the database and skipped.
    pub failed: usize,
}

/// A row from `date_wise_summary` or `team_wise_summary`.
///
/// `counts` follows the order of [`crate::categories::CATEGORIES`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryRow {
    pub key: String,
    pub counts: Vec<i64>,
    pub total: i64,
}

impl SummaryRow {
    /// Count for a category label, if the label is known.
    pub fn count_for(&self, label: &str) -> Option<i64> {
        crate::categories::position(label).and_then(|idx| self.counts.get(idx).copied())
    }
}

/// A row from `sync_runs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbSyncRun {
    pub id: String,
    pub started_at: String,
    pub finished_at: String,
    pub existing_count: i64,
    pub latest_count: i64,
    pub final_count: i64,
    pub inserted: i64,
    pub pruned: i64,
    pub failed_records: i64,
    pub outcome: String,
}
