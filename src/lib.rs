//! Activity sync: reconciles captured desk-ticket activity into SQLite and
//! rebuilds the reporting summaries.

pub mod aggregate;
pub mod categories;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
mod migrations;
pub mod normalize;
pub mod notification;
pub mod pipeline;
pub mod retry;
pub mod roster;
pub mod types;

pub use error::SyncError;
pub use pipeline::{run, run_with_settings, PipelineOptions, RunOutcome, RunReport};
