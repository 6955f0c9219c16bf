//! Schema migrations.
//!
//! The schema ships as numbered SQL files embedded with `include_str!`.
//! `schema_version` records which ones a database has seen.

use rusqlite::Connection;

struct Migration {
    version: i32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    sql: include_str!("migrations/001_baseline.sql"),
}];

/// Highest recorded version, 0 when the database is new.
fn current_version(conn: &Connection) -> Result<i32, String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("schema_version unavailable: {}", e))?;

    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
        row.get(0)
    })
    .map_err(|e| format!("schema_version unreadable: {}", e))
}

/// Bring the schema up to date and return the number of files applied.
/// A database stamped with a version this build does not know is left alone.
pub fn run_migrations(conn: &Connection) -> Result<usize, String> {
    let current = current_version(conn)?;
    let newest = MIGRATIONS.last().map_or(0, |m| m.version);
    if current > newest {
        return Err(format!(
            "activity store is at schema v{} but this build only knows up to v{}",
            current, newest
        ));
    }

    let mut applied = 0;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        conn.execute_batch(migration.sql)
            .map_err(|e| format!("schema v{}: {}", migration.version, e))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [migration.version],
        )
        .map_err(|e| format!("schema v{} not recorded: {}", migration.version, e))?;
        log::info!("Activity store migrated to schema v{}", migration.version);
        applied += 1;
    }
    Ok(applied)
}
