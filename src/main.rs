//! Single unattended sync run.
//!
//! Reads `~/.activity-sync/config.json` (or `$ACTIVITY_SYNC_CONFIG`), runs the
//! pipeline once and exits non-zero only when the run was aborted.

use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = match activity_sync_lib::config::load_settings() {
        Ok(settings) => settings,
        Err(e) => {
            log::error!("Error loading settings: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match activity_sync_lib::run_with_settings(&settings) {
        Ok(report) => {
            log::info!(
                "Run {} {}: {} read, {} inserted, {} pruned, {} retained",
                report.run_id,
                report.outcome.as_str(),
                report.records_read,
                report.inserted(),
                report.pruned,
                report.final_count
            );
            ExitCode::SUCCESS
        }
        Err(e) if e.is_fatal() => {
            log::error!("Sync run aborted: {}", e);
            ExitCode::FAILURE
        }
        Err(e) => {
            log::warn!("Sync run stopped after a step failure: {}", e);
            ExitCode::SUCCESS
        }
    }
}
