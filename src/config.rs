//! Settings file loading.

use std::fs;
use std::path::{Path, PathBuf};

use crate::types::Settings;

/// Environment variable that overrides the settings file location.
pub const CONFIG_ENV: &str = "ACTIVITY_SYNC_CONFIG";

/// Longest run lease a settings file may ask for: one week.
pub const MAX_LEASE_TTL_SECS: u64 = 7 * 24 * 60 * 60;

/// `$ACTIVITY_SYNC_CONFIG`, else `~/.activity-sync/config.json`.
pub fn config_path() -> Result<PathBuf, String> {
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }
    let home = dirs::home_dir().ok_or("Could not find home directory")?;
    Ok(home.join(".activity-sync").join("config.json"))
}

pub fn load_settings() -> Result<Settings, String> {
    let path = config_path()?;
    load_settings_at(&path)
}

pub fn load_settings_at(path: &Path) -> Result<Settings, String> {
    if !path.exists() {
        return Err(format!(
            "Config file not found at {}. Create it with: {{ \"feed\": {{ \"path\": \"/path/to/feed.json\" }} }}",
            path.display()
        ));
    }

    let content =
        fs::read_to_string(path).map_err(|e| format!("Failed to read config: {}", e))?;
    let settings: Settings =
        serde_json::from_str(&content).map_err(|e| format!("Failed to parse config: {}", e))?;

    if settings.retry.max_attempts == 0 {
        return Err("retry.maxAttempts must be at least 1".to_string());
    }
    if settings.lease_ttl_secs == 0 || settings.lease_ttl_secs > MAX_LEASE_TTL_SECS {
        return Err(format!(
            "leaseTtlSecs must be between 1 and {}, got {}",
            MAX_LEASE_TTL_SECS, settings.lease_ttl_secs
        ));
    }

    Ok(settings)
}
