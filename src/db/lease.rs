//! Single-instance run lease.
//!
//! The store has no process-level mutual exclusion of its own, so a run claims
//! the singleton `run_lease` row before mutating anything. A lease that has
//! outlived its TTL is treated as abandoned and taken over.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};

use super::{ActivityDb, DbError};

/// Holds the run lease until dropped.
pub struct LeaseGuard<'a> {
    db: &'a ActivityDb,
    holder: String,
}

impl LeaseGuard<'_> {
    pub fn holder(&self) -> &str {
        &self.holder
    }
}

impl Drop for LeaseGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.db.release_lease(&self.holder) {
            log::warn!("Failed to release run lease {}: {}", self.holder, e);
        }
    }
}

impl ActivityDb {
    /// Claim the run lease for `holder` until `now + ttl`.
    pub fn acquire_lease(&self, holder: &str, ttl: Duration) -> Result<LeaseGuard<'_>, DbError> {
        self.acquire_lease_at(holder, ttl, Utc::now())?;
        Ok(LeaseGuard {
            db: self,
            holder: holder.to_string(),
        })
    }

    fn acquire_lease_at(&self, holder: &str, ttl: Duration, now: DateTime<Utc>) -> Result<(), DbError> {
        if ttl <= Duration::zero() {
            return Err(DbError::InvalidLeaseTtl(ttl.num_seconds()));
        }
        let expiry = now
            .checked_add_signed(ttl)
            .ok_or(DbError::InvalidLeaseTtl(ttl.num_seconds()))?;

        self.with_transaction(|db| {
            let current: Option<(String, String)> = db
                .conn
                .query_row(
                    "SELECT holder, expires_at FROM run_lease WHERE id = 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            if let Some((other, expires_at)) = current {
                let live = DateTime::parse_from_rfc3339(&expires_at)
                    .map(|t| t.with_timezone(&Utc) > now)
                    // Unreadable expiry: assume the lease is stale.
                    .unwrap_or(false);
                if live && other != holder {
                    return Err(DbError::LeaseHeld {
                        holder: other,
                        expires_at,
                    });
                }
                if !live {
                    log::warn!("Taking over expired run lease from {}", other);
                }
            }

            db.conn.execute(
                "INSERT INTO run_lease (id, holder, acquired_at, expires_at)
                 VALUES (1, ?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                    holder = excluded.holder,
                    acquired_at = excluded.acquired_at,
                    expires_at = excluded.expires_at",
                params![holder, now.to_rfc3339(), expiry.to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Drop the lease if `holder` still owns it.
    pub fn release_lease(&self, holder: &str) -> Result<bool, DbError> {
        let deleted = self
            .conn
            .execute("DELETE FROM run_lease WHERE id = 1 AND holder = ?1", [holder])?;
        Ok(deleted > 0)
    }
}
