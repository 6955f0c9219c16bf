//! Feed readers: where raw activity events come from.
//!
//! Acquisition (scraping, API polling, file drops) sits behind
//! [`FeedReader`]. A session is a one-shot iterator of raw records; once
//! consumed it cannot be rewound.

pub mod export;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::db::ReportSetup;
use crate::types::RawActivity;

pub use export::ExportFeedReader;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("Feed export {} is not valid JSON: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Feed not ready after {waited:?}: {} had {found} of {wanted} records", .path.display())]
    NotReady {
        path: PathBuf,
        waited: Duration,
        found: usize,
        wanted: usize,
    },

    #[error("Feed session already consumed")]
    Exhausted,
}

/// A single pass over the feed.
pub type FeedSession = Box<dyn Iterator<Item = RawActivity>>;

pub trait FeedReader {
    /// Open a session. All readiness waiting happens here, so an error means
    /// nothing was read and nothing should be written.
    fn open_session(&mut self, setup: &ReportSetup) -> Result<FeedSession, FeedError>;
}

/// A feed backed by records already in memory. Yields them once.
#[derive(Debug, Default)]
pub struct StaticFeed {
    records: Option<Vec<RawActivity>>,
}

impl StaticFeed {
    pub fn new(records: Vec<RawActivity>) -> Self {
        Self {
            records: Some(records),
        }
    }
}

impl FeedReader for StaticFeed {
    fn open_session(&mut self, _setup: &ReportSetup) -> Result<FeedSession, FeedError> {
        let records = self.records.take().ok_or(FeedError::Exhausted)?;
        Ok(Box::new(records.into_iter()))
    }
}
