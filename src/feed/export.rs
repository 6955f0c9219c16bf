//! Feed reader for captured exports on disk.
//!
//! The capture job writes either a JSON array of records or one JSON object
//! per line. The reader waits, up to a bounded timeout, for the export to
//! appear and hold enough records before handing out a session.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::{FeedError, FeedReader, FeedSession};
use crate::db::ReportSetup;
use crate::types::{FeedSettings, RawActivity};

pub struct ExportFeedReader {
    path: PathBuf,
    ready_timeout: Duration,
    poll_interval: Duration,
    min_records: usize,
}

impl ExportFeedReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ready_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(500),
            min_records: 1,
        }
    }

    pub fn from_settings(settings: &FeedSettings) -> Self {
        Self {
            path: settings.path.clone(),
            ready_timeout: Duration::from_secs(settings.ready_timeout_secs),
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            min_records: settings.min_records,
        }
    }

    pub fn with_ready_timeout(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.ready_timeout = timeout;
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_min_records(mut self, min_records: usize) -> Self {
        self.min_records = min_records;
        self
    }

    /// Read whatever the export currently holds. `Ok(None)` means the file
    /// does not exist yet.
    fn read_export(&self) -> Result<Option<Vec<RawActivity>>, FeedError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        parse_export(&self.path, &content).map(Some)
    }
}

/// Parse a JSON array, or JSON lines when the content does not start with
/// `[`. Unparseable lines are skipped with a warning; a malformed array is an
/// error because it usually means the writer has not finished.
pub fn parse_export(path: &Path, content: &str) -> Result<Vec<RawActivity>, FeedError> {
    let trimmed = content.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|source| FeedError::Parse {
            path: path.to_path_buf(),
            source,
        });
    }

    let mut records = Vec::new();
    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RawActivity>(line) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!(
                "Skipping unparseable feed line {} in {}: {}",
                idx + 1,
                path.display(),
                e
            ),
        }
    }
    Ok(records)
}

impl FeedReader for ExportFeedReader {
    fn open_session(&mut self, setup: &ReportSetup) -> Result<FeedSession, FeedError> {
        log::info!(
            "Opening feed session for {} ({}) from {}",
            setup.base_url,
            setup.login_email,
            self.path.display()
        );

        let started = Instant::now();
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let outcome = self.read_export();
            let found = match &outcome {
                Ok(Some(records)) => records.len(),
                _ => 0,
            };

            match outcome {
                Ok(Some(records)) if records.len() >= self.min_records => {
                    log::info!(
                        "Feed ready: {} records loaded after {} checks",
                        records.len(),
                        attempt
                    );
                    return Ok(Box::new(records.into_iter()));
                }
                Err(FeedError::Io(e)) => return Err(FeedError::Io(e)),
                other => {
                    if started.elapsed() >= self.ready_timeout {
                        if let Err(e) = other {
                            return Err(e);
                        }
                        return Err(FeedError::NotReady {
                            path: self.path.clone(),
                            waited: started.elapsed(),
                            found,
                            wanted: self.min_records,
                        });
                    }
                    log::debug!(
                        "Feed not ready ({} of {} records), waiting {:?}",
                        found,
                        self.min_records,
                        self.poll_interval
                    );
                    std::thread::sleep(self.poll_interval);
                }
            }
        }
    }
}
