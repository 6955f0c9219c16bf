//! Denormalized summary tables: date-wise, team-wise and per-category counts.
//!
//! Every statement here rebuilds its target from `extracted_activities`; none
//! of them maintain counts incrementally.

use std::collections::HashSet;

use rusqlite::params_from_iter;

use super::{ActivityDb, DbError, SummaryRow};
use crate::categories::{self, Granularity, CATEGORIES, TOTAL_COLUMN};

/// `UPDATE` that recounts every category column of one summary table.
/// Placeholder `?n` carries the label of the n-th category.
fn category_update_sql(granularity: Granularity) -> String {
    let table = granularity.table();
    let key = granularity.key_column();
    let assignments = CATEGORIES
        .iter()
        .enumerate()
        .map(|(idx, category)| {
            format!(
                "{column} = (SELECT COUNT(*) FROM extracted_activities AS e
                    WHERE e.activity_type LIKE '%' || ?{param} || '%'
                      AND e.{key} = {table}.{key})",
                column = category.column,
                param = idx + 1,
                key = key,
                table = table,
            )
        })
        .collect::<Vec<_>>()
        .join(",\n    ");
    format!("UPDATE {} SET\n    {}", table, assignments)
}

fn total_update_sql(granularity: Granularity) -> String {
    let sum = CATEGORIES
        .iter()
        .map(|c| c.column)
        .collect::<Vec<_>>()
        .join(" + ");
    format!(
        "UPDATE {} SET {} = {}",
        granularity.table(),
        TOTAL_COLUMN,
        sum
    )
}

impl ActivityDb {
    /// Add an actor to `team_wise_summary`, which doubles as the roster.
    pub fn register_team_member(&self, name: &str) -> Result<bool, DbError> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO team_wise_summary (name) VALUES (?1)",
            [name],
        )?;
        Ok(inserted > 0)
    }

    /// Names listed in `team_wise_summary`.
    pub fn team_members(&self) -> Result<HashSet<String>, DbError> {
        let mut stmt = self.conn.prepare("SELECT name FROM team_wise_summary")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut names = HashSet::new();
        for row in rows {
            names.insert(row?);
        }
        Ok(names)
    }

    /// Insert a `date_wise_summary` row for every activity date that lacks
    /// one. Existing rows are left alone. Returns the number of new dates.
    pub fn insert_missing_dates(&self) -> Result<usize, DbError> {
        self.with_transaction(|db| {
            let inserted = db.conn.execute(
                "INSERT OR IGNORE INTO date_wise_summary (date)
                 SELECT DISTINCT date FROM extracted_activities",
                [],
            )?;
            Ok(inserted)
        })
    }

    /// Recount each category column for every row of the given summary.
    /// Returns the number of summary rows touched.
    pub fn recompute_category_counts(&self, granularity: Granularity) -> Result<usize, DbError> {
        let sql = category_update_sql(granularity);
        self.with_transaction(|db| {
            let updated = db
                .conn
                .execute(&sql, params_from_iter(CATEGORIES.iter().map(|c| c.label)))?;
            Ok(updated)
        })
    }

    /// Set `total_count` to the sum of the category columns.
    pub fn recompute_totals(&self, granularity: Granularity) -> Result<usize, DbError> {
        let sql = total_update_sql(granularity);
        self.with_transaction(|db| Ok(db.conn.execute(&sql, [])?))
    }

    /// Seed a row per known label, then set each `count` to the number of
    /// activities whose type contains that label.
    pub fn recompute_activity_summary(&self) -> Result<usize, DbError> {
        self.with_transaction(|db| {
            {
                let mut seed = db
                    .conn
                    .prepare_cached("INSERT OR IGNORE INTO activity_summary (activity_type) VALUES (?1)")?;
                for category in CATEGORIES {
                    seed.execute([category.label])?;
                }
            }
            let updated = db.conn.execute(
                "UPDATE activity_summary SET count = (
                    SELECT COUNT(*) FROM extracted_activities AS e
                    WHERE e.activity_type LIKE '%' || activity_summary.activity_type || '%'
                 )",
                [],
            )?;
            Ok(updated)
        })
    }

    /// All rows of a summary table, ordered by key.
    pub fn summary_rows(&self, granularity: Granularity) -> Result<Vec<SummaryRow>, DbError> {
        let sql = format!(
            "SELECT {key}, {columns}, {total} FROM {table} ORDER BY {key}",
            key = granularity.key_column(),
            columns = categories::column_list(),
            total = TOTAL_COLUMN,
            table = granularity.table(),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], |row| {
            let mut counts = Vec::with_capacity(CATEGORIES.len());
            for idx in 0..CATEGORIES.len() {
                counts.push(row.get::<_, i64>(idx + 1)?);
            }
            Ok(SummaryRow {
                key: row.get(0)?,
                counts,
                total: row.get(CATEGORIES.len() + 1)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// `(label, count)` pairs from `activity_summary`, ordered by label.
    pub fn activity_summary(&self) -> Result<Vec<(String, i64)>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT activity_type, count FROM activity_summary ORDER BY activity_type")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::db::activities::fixtures::{activity, on_date};
    use crate::db::test_utils::test_db;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("date")
    }

    #[test]
    fn test_category_sql_binds_labels() {
        let sql = category_update_sql(Granularity::Date);
        for category in CATEGORIES {
            assert!(!sql.contains(category.label), "label inlined: {}", category.label);
        }
        assert!(sql.contains(&format!("?{}", CATEGORIES.len())));
    }

    #[test]
    fn test_insert_missing_dates_is_insert_only() {
        let db = test_db();
        db.upsert_activities(&[
            activity("Alice", "Added a note", "2024-03-05 10:00:00"),
            activity("Alice", "Added a note", "2024-03-05 11:00:00"),
            activity("Bob", "Added a tag", "2024-03-06 09:00:00"),
        ])
        .expect("insert");

        assert_eq!(db.insert_missing_dates().expect("dates"), 2);
        db.conn_ref()
            .execute(
                "UPDATE date_wise_summary SET added_a_note = 7 WHERE date = '2024-03-05'",
                [],
            )
            .expect("poke");
        assert_eq!(db.insert_missing_dates().expect("dates again"), 0);

        let rows = db.summary_rows(Granularity::Date).expect("rows");
        let keys: Vec<_> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["2024-03-05", "2024-03-06"]);
        assert_eq!(rows[0].count_for("Added a note"), Some(7));
    }

    #[test]
    fn test_date_counts_and_totals() {
        let db = test_db();
        let day = d("2024-03-05");
        db.upsert_activities(&[
            on_date("Alice", "Added a note", day, 1),
            on_date("Bob", "Added a note", day, 2),
            on_date("Alice", "Added a tag", day, 3),
            on_date("Alice", "Wrote a reply", d("2024-03-06"), 4),
        ])
        .expect("insert");

        db.insert_missing_dates().expect("dates");
        db.recompute_category_counts(Granularity::Date).expect("counts");
        db.recompute_totals(Granularity::Date).expect("totals");

        let rows = db.summary_rows(Granularity::Date).expect("rows");
        let first = &rows[0];
        assert_eq!(first.key, "2024-03-05");
        assert_eq!(first.count_for("Added a note"), Some(2));
        assert_eq!(first.count_for("Added a tag"), Some(1));
        assert_eq!(first.count_for("Wrote a reply"), Some(0));
        assert_eq!(first.total, 3);
        assert_eq!(rows[1].total, 1);
    }

    #[test]
    fn test_team_counts_use_substring_matching() {
        let db = test_db();
        db.register_team_member("Alice").expect("roster");
        db.register_team_member("Dave").expect("roster");
        db.upsert_activities(&[
            activity("Alice", "Unfollowed ticket", "2024-03-05 10:00:00"),
            activity("Alice", "Followed ticket", "2024-03-05 10:01:00"),
            activity("Alice", "Changed status to Closed", "2024-03-05 10:02:00"),
        ])
        .expect("insert");

        db.recompute_category_counts(Granularity::Team).expect("counts");
        db.recompute_totals(Granularity::Team).expect("totals");

        let rows = db.summary_rows(Granularity::Team).expect("rows");
        let alice = rows.iter().find(|r| r.key == "Alice").expect("alice row");
        assert_eq!(alice.count_for("Followed ticket"), Some(2));
        assert_eq!(alice.count_for("Unfollowed ticket"), Some(1));
        assert_eq!(alice.count_for("Changed status"), Some(1));
        // The nested label is counted twice, so the total exceeds the row count.
        assert_eq!(alice.total, 4);

        let dave = rows.iter().find(|r| r.key == "Dave").expect("dave row");
        assert!(dave.counts.iter().all(|c| *c == 0));
        assert_eq!(dave.total, 0);
    }

    #[test]
    fn test_recount_overwrites_stale_values() {
        let db = test_db();
        db.register_team_member("Alice").expect("roster");
        db.conn_ref()
            .execute(
                "UPDATE team_wise_summary SET customer = 40, total_count = 40",
                [],
            )
            .expect("stale");
        db.recompute_category_counts(Granularity::Team).expect("counts");
        db.recompute_totals(Granularity::Team).expect("totals");
        let rows = db.summary_rows(Granularity::Team).expect("rows");
        assert_eq!(rows[0].count_for("Customer"), Some(0));
        assert_eq!(rows[0].total, 0);
    }

    #[test]
    fn test_totals_equal_sum_of_columns() {
        let db = test_db();
        let day = d("2024-03-05");
        let labels = ["Ticket Received", "Customer", "Merged to", "Customer reply"];
        let batch: Vec<_> = labels
            .iter()
            .enumerate()
            .map(|(i, l)| on_date("Alice", l, day, i as u32))
            .collect();
        db.upsert_activities(&batch).expect("insert");
        db.register_team_member("Alice").expect("roster");
        db.insert_missing_dates().expect("dates");

        for g in Granularity::ALL {
            db.recompute_category_counts(g).expect("counts");
            db.recompute_totals(g).expect("totals");
            for row in db.summary_rows(g).expect("rows") {
                assert_eq!(row.total, row.counts.iter().sum::<i64>(), "{} {}", g.label(), row.key);
            }
        }
    }

    #[test]
    fn test_activity_summary_counts_containment() {
        let db = test_db();
        db.upsert_activities(&[
            activity("Alice", "Added a note", "2024-03-05 10:00:00"),
            activity("Bob", "Added a note (internal)", "2024-03-05 10:00:00"),
            activity("Bob", "Unfollowed ticket", "2024-03-05 11:00:00"),
        ])
        .expect("insert");

        let updated = db.recompute_activity_summary().expect("summary");
        assert_eq!(updated, CATEGORIES.len());

        let counts: std::collections::HashMap<_, _> =
            db.activity_summary().expect("read").into_iter().collect();
        assert_eq!(counts["Added a note"], 2);
        assert_eq!(counts["Followed ticket"], 1);
        assert_eq!(counts["Unfollowed ticket"], 1);
        assert_eq!(counts["Merged to"], 0);
    }

    #[test]
    fn test_sql_recount_agrees_with_label_matching() {
        use crate::categories::matches;

        let db = test_db();
        db.upsert_activities(&[
            activity("Alice", "Added a note", "2024-03-05 10:00:00"),
            activity("Alice", "ADDED A NOTE to #42", "2024-03-05 10:05:00"),
            activity("Alice", "Unfollowed ticket", "2024-03-06 08:00:00"),
            activity("Bob", "Changed status to Pending", "2024-03-05 12:00:00"),
            activity("Bob", "customer replied", "2024-03-06 09:00:00"),
            activity("Bob", "Something unlisted", "2024-03-06 09:30:00"),
        ])
        .expect("insert");
        db.register_team_member("Alice").expect("roster");
        db.register_team_member("Bob").expect("roster");
        db.insert_missing_dates().expect("dates");
        db.recompute_activity_summary().expect("summary");

        let stored = db.list_activities().expect("list");
        for g in Granularity::ALL {
            db.recompute_category_counts(g).expect("counts");
            for row in db.summary_rows(g).expect("rows") {
                for (idx, category) in CATEGORIES.iter().enumerate() {
                    let expected = stored
                        .iter()
                        .filter(|a| match g {
                            Granularity::Date => a.date.to_string() == row.key,
                            Granularity::Team => a.name == row.key,
                        })
                        .filter(|a| matches(&a.activity_type, category.label))
                        .count() as i64;
                    assert_eq!(
                        row.counts[idx], expected,
                        "{} {} {}",
                        g.label(),
                        row.key,
                        category.label
                    );
                }
            }
        }

        for (label, count) in db.activity_summary().expect("read") {
            let expected = stored
                .iter()
                .filter(|a| matches(&a.activity_type, &label))
                .count() as i64;
            assert_eq!(count, expected, "{}", label);
        }
    }

    #[test]
    fn test_register_team_member_is_idempotent() {
        let db = test_db();
        assert!(db.register_team_member("Alice").expect("first"));
        assert!(!db.register_team_member("Alice").expect("second"));
        assert_eq!(db.team_members().expect("members").len(), 1);
    }
}
