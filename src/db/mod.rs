//! SQLite store for extracted activities and the reporting summaries.
//!
//! The database lives at `~/.activity-sync/activity.db` unless the settings
//! file points elsewhere. It holds the canonical activity rows, the three
//! denormalized summary tables rebuilt on every run, the singleton report
//! setup, the run lease and the run history.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};

pub mod activities;
pub mod lease;
pub mod runs;
pub mod summaries;
pub mod types;
pub use types::*;

pub struct ActivityDb {
    conn: Connection,
}

impl ActivityDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Run a closure inside a write transaction.
    /// Commits on Ok, rolls back on Err.
    ///
    /// `BEGIN IMMEDIATE` takes the write lock up front, so contention surfaces
    /// here rather than halfway through the closure.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(val) => {
                if let Err(e) = self.conn.execute_batch("COMMIT") {
                    let _ = self.conn.execute_batch("ROLLBACK");
                    return Err(e.into());
                }
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Open (or create) the database at the default location.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::default_path()?;
        Self::open_at(path)
    }

    /// Open (or create) a database at an explicit path and apply the schema.
    pub fn open_at(path: impl AsRef<Path>) -> Result<Self, DbError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        Ok(Self { conn })
    }

    /// Open a private in-memory database with the full schema.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;
        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.activity-sync/activity.db`.
    pub fn default_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".activity-sync").join("activity.db"))
    }

    /// How long SQLite itself waits on a locked database before reporting
    /// `SQLITE_BUSY`. Zero hands contention straight to the retry policy.
    pub fn set_busy_timeout(&self, timeout: Duration) -> Result<(), DbError> {
        self.conn.busy_timeout(timeout)?;
        Ok(())
    }

    /// Total rows in `table`.
    pub fn row_count(&self, table: Table) -> Result<i64, DbError> {
        let count = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", table.name()),
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Load the singleton report setup. Missing row is an error.
    pub fn report_setup(&self) -> Result<ReportSetup, DbError> {
        self.conn
            .query_row(
                "SELECT base_url, login_email, login_password, email_recipient,
                        email_subject, email_body
                 FROM config_setup WHERE id = 1",
                [],
                |row| {
                    Ok(ReportSetup {
                        base_url: row.get(0)?,
                        login_email: row.get(1)?,
                        login_password: row.get(2)?,
                        email_recipient: row.get(3)?,
                        email_subject: row.get(4)?,
                        email_body: row.get(5)?,
                    })
                },
            )
            .optional()?
            .ok_or(DbError::MissingReportSetup)
    }

    /// Write the singleton report setup. Provisioning only; the pipeline
    /// never calls this.
    pub fn save_report_setup(&self, setup: &ReportSetup) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO config_setup
                (id, base_url, login_email, login_password, email_recipient,
                 email_subject, email_body)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                base_url = excluded.base_url,
                login_email = excluded.login_email,
                login_password = excluded.login_password,
                email_recipient = excluded.email_recipient,
                email_subject = excluded.email_subject,
                email_body = excluded.email_body",
            params![
                setup.base_url,
                setup.login_email,
                setup.login_password,
                setup.email_recipient,
                setup.email_subject,
                setup.email_body,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::ActivityDb;

    /// In-memory database with the schema applied.
    pub fn test_db() -> ActivityDb {
        ActivityDb::open_in_memory().expect("Failed to open test database")
    }

    /// File-backed database in a leaked temp dir, for tests that need a
    /// second connection. Returns the path so callers can open it again.
    pub fn file_db() -> (ActivityDb, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("activity.db");
        std::mem::forget(dir);
        let db = ActivityDb::open_at(&path).expect("Failed to open test database");
        (db, path)
    }

    pub fn sample_setup() -> super::ReportSetup {
        super::ReportSetup {
            base_url: "https://desk.example.com/activity".to_string(),
            login_email: "bot@example.com".to_string(),
            login_password: "hunter2".to_string(),
            email_recipient: "reports@example.com".to_string(),
            email_subject: String::new(),
            email_body: "Inserted vTotalCount rows (vExistingCount -> vLatestCount)".to_string(),
        }
    }
}
