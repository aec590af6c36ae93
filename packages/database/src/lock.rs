//! Advisory locks stored in the `_locks` table.
//!
//! A lock is a row keyed by an integer. Acquiring inserts the row and
//! fails if it already exists; the returned [`LockGuard`] deletes it when
//! dropped. Rows older than the stale timeout are assumed to belong to a
//! crashed run and are cleared before acquiring.

use chrono::{Duration, Utc};
use duckdb::Connection;

use crate::{DbError, timestamp_param};

/// Locks older than this are treated as abandoned.
pub const DEFAULT_STALE_AFTER: Duration = Duration::hours(6);

/// Holds an advisory lock until dropped.
#[derive(Debug)]
pub struct LockGuard<'a> {
    conn: &'a Connection,
    key: i64,
}

impl LockGuard<'_> {
    /// The lock key.
    #[must_use]
    pub const fn key(&self) -> i64 {
        self.key
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        match self
            .conn
            .execute("DELETE FROM _locks WHERE key = ?", [self.key])
        {
            Ok(_) => log::debug!("Released lock {}", self.key),
            Err(e) => log::error!("Failed to release lock {}: {e}", self.key),
        }
    }
}

/// Tries to take lock `key` for `owner`.
///
/// Returns `Ok(None)` when another holder has it.
///
/// # Errors
///
/// Returns [`DbError`] if the lock table cannot be read or written.
pub fn try_lock<'a>(
    conn: &'a Connection,
    key: i64,
    owner: &str,
    stale_after: Duration,
) -> Result<Option<LockGuard<'a>>, DbError> {
    let cutoff = Utc::now() - stale_after;
    let cleared = conn.execute(
        "DELETE FROM _locks WHERE key = ? AND acquired_at < ?",
        duckdb::params![key, timestamp_param(&cutoff)],
    )?;
    if cleared > 0 {
        log::warn!("Cleared stale lock {key}");
    }

    let inserted = conn.execute(
        "INSERT INTO _locks (key, owner, acquired_at) VALUES (?, ?, ?)
         ON CONFLICT (key) DO NOTHING",
        duckdb::params![key, owner, timestamp_param(&Utc::now())],
    )?;

    if inserted == 0 {
        return Ok(None);
    }

    log::debug!("Acquired lock {key} for {owner}");
    Ok(Some(LockGuard { conn, key }))
}

/// Takes lock `key` for `owner`, failing if it is held.
///
/// # Errors
///
/// Returns [`DbError::LockHeld`] naming the current holder, or another
/// [`DbError`] if the lock table cannot be accessed.
pub fn acquire<'a>(
    conn: &'a Connection,
    key: i64,
    owner: &str,
    stale_after: Duration,
) -> Result<LockGuard<'a>, DbError> {
    if let Some(guard) = try_lock(conn, key, owner, stale_after)? {
        return Ok(guard);
    }

    let holder: Option<String> = conn
        .query_row("SELECT owner FROM _locks WHERE key = ?", [key], |row| row.get(0))
        .map(Some)
        .or_else(|e| match e {
            duckdb::Error::QueryReturnedNoRows => Ok(None),
            e => Err(e),
        })?;

    Err(DbError::LockHeld {
        key,
        owner: holder.unwrap_or_else(|| "unknown".to_string()),
    })
}
