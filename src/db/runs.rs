//! Run history in `sync_runs`.

use rusqlite::params;

use super::{ActivityDb, DbError, DbSyncRun};

impl ActivityDb {
    pub fn record_run(&self, run: &DbSyncRun) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO sync_runs
                (id, started_at, finished_at, existing_count, latest_count, final_count,
                 inserted, pruned, failed_records, outcome)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run.id,
                run.started_at,
                run.finished_at,
                run.existing_count,
                run.latest_count,
                run.final_count,
                run.inserted,
                run.pruned,
                run.failed_records,
                run.outcome,
            ],
        )?;
        Ok(())
    }

    /// Most recent runs first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<DbSyncRun>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, existing_count, latest_count, final_count,
                    inserted, pruned, failed_records, outcome
             FROM sync_runs
             ORDER BY started_at DESC
             LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], |row| {
            Ok(DbSyncRun {
                id: row.get(0)?,
                started_at: row.get(1)?,
                finished_at: row.get(2)?,
                existing_count: row.get(3)?,
                latest_count: row.get(4)?,
                final_count: row.get(5)?,
                inserted: row.get(6)?,
                pruned: row.get(7)?,
                failed_records: row.get(8)?,
                outcome: row.get(9)?,
            })
        })?;

        let mut runs = Vec::new();
        for row in rows {
            runs.push(row?);
        }
        Ok(runs)
    }
}
