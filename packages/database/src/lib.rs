#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `DuckDB` storage for the quake map.
//!
//! A single `DuckDB` file (`data/quakes.duckdb`) holds the landed events,
//! the month coverage catalog, the country/sea lookup tables, and the
//! per-event location classifications. Access goes through an explicitly
//! opened [`Store`]; every table module takes a borrowed
//! [`duckdb::Connection`] so callers control the connection's scope.
//!
//! `DuckDB` rejects `ON CONFLICT DO UPDATE` on tables referenced by a
//! foreign key, so the `location` table's references to `events`,
//! `country`, and `sea` are kept by the writers rather than declared.

pub mod catalog;
pub mod events;
pub mod lock;
pub mod locations;
pub mod lookups;
pub mod paths;

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use duckdb::Connection;

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// `DuckDB` error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Data conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },

    /// An advisory lock is held by someone else.
    #[error("Lock {key} is held by {owner}")]
    LockHeld {
        /// Lock key.
        key: i64,
        /// Recorded holder.
        owner: String,
    },
}

/// An open event store.
///
/// Owns the `DuckDB` connection; the connection is released when the store
/// is dropped or explicitly [closed](Self::close).
pub struct Store {
    conn: Connection,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("path", &self.path).finish_non_exhaustive()
    }
}

impl Store {
    /// Opens (or creates) the store at `path` and ensures the schema
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the directory, connection, or schema creation
    /// fails.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            paths::ensure_dir(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "SET threads = 4;
             SET memory_limit = '512MB';",
        )?;

        create_schema(&conn)?;

        log::debug!("Opened store at {}", path.display());

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Opens the store at the default path.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open_default() -> Result<Self, DbError> {
        Self::open(&paths::store_path())
    }

    /// Opens a throwaway in-memory store with the full schema.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if the connection or schema creation fails.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        create_schema(&conn)?;
        Ok(Self { conn, path: None })
    }

    /// The underlying connection.
    #[must_use]
    pub const fn conn(&self) -> &Connection {
        &self.conn
    }

    /// The backing file, or `None` for an in-memory store.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Closes the connection, surfacing any error `DuckDB` reports.
    ///
    /// # Errors
    ///
    /// Returns [`DbError`] if `DuckDB` fails to close cleanly.
    pub fn close(self) -> Result<(), DbError> {
        self.conn.close().map_err(|(_, e)| DbError::DuckDb(e))
    }
}

fn create_schema(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "CREATE SEQUENCE IF NOT EXISTS events_id_seq START 1;

        CREATE TABLE IF NOT EXISTS events (
            id BIGINT PRIMARY KEY DEFAULT nextval('events_id_seq'),
            usgs_id TEXT NOT NULL UNIQUE,
            mag DOUBLE,
            place TEXT,
            time_utc TIMESTAMP,
            updated_utc TIMESTAMP,
            url TEXT,
            detail_url TEXT,
            tsunami INTEGER NOT NULL DEFAULT 0,
            sig INTEGER,
            mag_type TEXT,
            event_type TEXT,
            title TEXT,
            net TEXT,
            code TEXT,
            depth_km DOUBLE,
            longitude DOUBLE,
            latitude DOUBLE
        );

        CREATE TABLE IF NOT EXISTS data_catalog (
            month_start DATE PRIMARY KEY,
            status TEXT NOT NULL,
            row_count BIGINT NOT NULL DEFAULT 0,
            finalized BOOLEAN NOT NULL DEFAULT FALSE,
            coverage_start_utc TIMESTAMP NOT NULL,
            coverage_end_utc TIMESTAMP NOT NULL,
            error TEXT,
            updated_at TIMESTAMP NOT NULL
        );

        CREATE TABLE IF NOT EXISTS country (
            iso TEXT PRIMARY KEY,
            name TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sea (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS location (
            quake_id BIGINT PRIMARY KEY,
            country_iso TEXT,
            sea_id INTEGER
        );

        CREATE TABLE IF NOT EXISTS _locks (
            key BIGINT PRIMARY KEY,
            owner TEXT NOT NULL,
            acquired_at TIMESTAMP NOT NULL
        );",
    )?;

    Ok(())
}

/// Formats a UTC instant for binding to a `TIMESTAMP` column.
pub(crate) fn timestamp_param(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Formats a date for binding to a `DATE` column.
pub(crate) fn date_param(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Converts an `epoch_ms(...)` column value back to a UTC instant.
pub(crate) fn from_epoch_ms(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(DateTime::from_timestamp_millis)
}

/// Parses a `strftime(..., '%Y-%m-%d')` column value.
pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| DbError::Conversion {
        message: format!("invalid date {s:?}: {e}"),
    })
}

/// Runs `f` inside a transaction, rolling back if it fails.
pub(crate) fn in_transaction<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> Result<T, DbError>,
) -> Result<T, DbError> {
    conn.execute_batch("BEGIN TRANSACTION")?;
    match f(conn) {
        Ok(value) => {
            conn.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                log::warn!("Rollback failed: {rollback}");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        create_schema(store.conn()).unwrap();

        let tables: i64 = store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM information_schema.tables
                 WHERE table_name IN ('events', 'data_catalog', 'country', 'sea', 'location', '_locks')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 6);
        assert!(store.path().is_none());
        store.close().unwrap();
    }

    #[test]
    fn file_store_round_trip() {
        let dir = std::env::temp_dir().join("quake_map_db_test_open");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("nested").join("quakes.duckdb");

        let store = Store::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        store.close().unwrap();

        // Reopening an existing file keeps the schema.
        let store = Store::open(&path).unwrap();
        drop(store);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn epoch_ms_conversion() {
        let dt = from_epoch_ms(Some(1_700_000_000_123)).unwrap();
        assert_eq!(timestamp_param(&dt), "2023-11-14 22:13:20.123");
        assert_eq!(from_epoch_ms(None), None);
        assert!(parse_date("2025-02-01").is_ok());
        assert!(parse_date("nope").is_err());
    }
}
