//! Activity store: idempotent upsert, roster pruning and reads.

use std::collections::HashSet;

use rusqlite::params;

use super::{ActivityDb, DbError, UpsertSummary};
use crate::types::Activity;

impl ActivityDb {
    /// Insert each activity by its natural key. A key that already exists only
    /// has `time_since_last_activity` refreshed; every other column keeps the
    /// value it was first written with.
    ///
    /// Records the database rejects are logged and skipped, the rest of the
    /// batch still commits.
    pub fn upsert_activities(&self, activities: &[Activity]) -> Result<UpsertSummary, DbError> {
        self.with_transaction(|db| {
            let mut stmt = db.conn.prepare_cached(
                "INSERT INTO extracted_activities
                    (name, activity_type, date, time, date_time_stamp, ticket_url,
                     time_since_last_activity)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(name, activity_type, date_time_stamp) DO UPDATE SET
                    time_since_last_activity = excluded.time_since_last_activity",
            )?;

            let mut summary = UpsertSummary::default();
            for activity in activities {
                match stmt.execute(params![
                    activity.name,
                    activity.activity_type,
                    activity.date,
                    activity.time,
                    activity.timestamp,
                    activity.ticket_url,
                    activity.time_since_last_activity,
                ]) {
                    Ok(changed) => summary.affected += changed,
                    Err(e) => {
                        summary.failed += 1;
                        log::error!("Error upserting activity {:?}: {}", activity, e);
                    }
                }
            }
            Ok(summary)
        })
    }

    /// Delete every activity whose actor is not in `valid_names`, in one
    /// transaction. Returns the number of rows removed.
    ///
    /// The snapshot goes through a temp table rather than a bound `NOT IN`
    /// list so roster size is not limited by SQLite's parameter cap.
    pub fn delete_activities_outside(&self, valid_names: &HashSet<String>) -> Result<usize, DbError> {
        self.with_transaction(|db| {
            db.conn.execute_batch(
                "CREATE TEMP TABLE IF NOT EXISTS roster_snapshot (name TEXT PRIMARY KEY);
                 DELETE FROM temp.roster_snapshot;",
            )?;
            {
                let mut insert = db
                    .conn
                    .prepare_cached("INSERT OR IGNORE INTO temp.roster_snapshot (name) VALUES (?1)")?;
                for name in valid_names {
                    insert.execute([name])?;
                }
            }
            let deleted = db.conn.execute(
                "DELETE FROM extracted_activities
                 WHERE name NOT IN (SELECT name FROM temp.roster_snapshot)",
                [],
            )?;
            db.conn.execute("DELETE FROM temp.roster_snapshot", [])?;
            Ok(deleted)
        })
    }

    /// All stored activities, ordered by timestamp then name.
    pub fn list_activities(&self) -> Result<Vec<Activity>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT name, activity_type, date, time, date_time_stamp, ticket_url,
                    time_since_last_activity
             FROM extracted_activities
             ORDER BY date_time_stamp, name, activity_type",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Activity {
                name: row.get(0)?,
                activity_type: row.get(1)?,
                date: row.get(2)?,
                time: row.get(3)?,
                timestamp: row.get(4)?,
                ticket_url: row.get(5)?,
                time_since_last_activity: row.get(6)?,
            })
        })?;

        let mut activities = Vec::new();
        for row in rows {
            activities.push(row?);
        }
        Ok(activities)
    }

    /// Distinct actors currently present in the store.
    pub fn activity_actors(&self) -> Result<HashSet<String>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT name FROM extracted_activities")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut names = HashSet::new();
        for row in rows {
            names.insert(row?);
        }
        Ok(names)
    }
}
