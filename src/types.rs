//! Shared types: feed records, canonical activities and local settings.

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

// =============================================================================
// Activity records
// =============================================================================

/// One event as captured from the activity feed. Every field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawActivity {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub activity_type: Option<String>,
    /// Human-readable stamp, e.g. `"March 5th 2024, 14:32:10"`.
    #[serde(default, alias = "ariaLabel")]
    pub when: Option<String>,
    #[serde(default)]
    pub ticket_url: Option<String>,
}

/// A canonical activity row, as stored in `extracted_activities`.
///
/// `(name, activity_type, timestamp)` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub name: String,
    pub activity_type: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub timestamp: NaiveDateTime,
    pub ticket_url: String,
    /// Age of the event when it was extracted. Never refreshed afterwards.
    pub time_since_last_activity: String,
}

// =============================================================================
// Settings (~/.activity-sync/config.json)
// =============================================================================

/// Local settings for one batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Database file. Defaults to `~/.activity-sync/activity.db`.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    pub feed: FeedSettings,
    #[serde(default)]
    pub notifier: NotifierSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub busy_timeout_ms: u64,
    #[serde(default = "default_lease_ttl_secs")]
    pub lease_ttl_secs: u64,
}

fn default_lease_ttl_secs() -> u64 {
    3600
}

/// Where the captured feed export lands and how long to wait for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSettings {
    pub path: PathBuf,
    #[serde(default = "default_ready_timeout_secs")]
    pub ready_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_min_records")]
    pub min_records: usize,
}

fn default_ready_timeout_secs() -> u64 {
    10
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_min_records() -> usize {
    1
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifierKind {
    #[default]
    Log,
    Webhook,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifierSettings {
    #[serde(default)]
    pub kind: NotifierKind,
    /// Required when `kind` is `webhook`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Bounded retry for writes that hit a locked database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_pause_secs")]
    pub pause_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_pause_secs() -> u64 {
    5
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            pause_secs: default_pause_secs(),
        }
    }
}
