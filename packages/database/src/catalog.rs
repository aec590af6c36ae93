//! The `data_catalog` table: one row per calendar month of landed data.

use std::str::FromStr as _;

use chrono::{NaiveDate, Utc};
use duckdb::Connection;
use quake_map_quake_models::{CatalogEntry, CatalogStatus, TimeWindow};

use crate::{DbError, date_param, from_epoch_ms, parse_date, timestamp_param};

const SELECT_COLUMNS: &str = "strftime(month_start, '%Y-%m-%d'), status, finalized, row_count,
     epoch_ms(coverage_start_utc), epoch_ms(coverage_end_utc), error, epoch_ms(updated_at)";

/// Reads the catalog row for a month.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or the stored row is malformed.
pub fn get_entry(conn: &Connection, month_start: NaiveDate) -> Result<Option<CatalogEntry>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM data_catalog WHERE month_start = ?"
    ))?;
    let mut rows = stmt.query([date_param(month_start)])?;

    match rows.next()? {
        Some(row) => Ok(Some(entry_from_row(row)?)),
        None => Ok(None),
    }
}

/// Lists every catalog row, oldest month first.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails or a stored row is malformed.
pub fn list_entries(conn: &Connection) -> Result<Vec<CatalogEntry>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM data_catalog ORDER BY month_start"
    ))?;
    let mut rows = stmt.query([])?;
    let mut entries = Vec::new();

    while let Some(row) = rows.next()? {
        entries.push(entry_from_row(row)?);
    }

    Ok(entries)
}

/// Inserts or overwrites the catalog row for `entry.month_start`.
///
/// `updated_at` is always set to the current time.
///
/// # Errors
///
/// Returns [`DbError`] if the upsert fails.
pub fn upsert_entry(conn: &Connection, entry: &CatalogEntry) -> Result<(), DbError> {
    let row_count = i64::try_from(entry.row_count).map_err(|e| DbError::Conversion {
        message: format!("row count {} out of range: {e}", entry.row_count),
    })?;

    conn.execute(
        "INSERT INTO data_catalog
            (month_start, status, row_count, finalized,
             coverage_start_utc, coverage_end_utc, error, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT (month_start) DO UPDATE SET
            status = EXCLUDED.status,
            row_count = EXCLUDED.row_count,
            finalized = EXCLUDED.finalized,
            coverage_start_utc = EXCLUDED.coverage_start_utc,
            coverage_end_utc = EXCLUDED.coverage_end_utc,
            error = EXCLUDED.error,
            updated_at = EXCLUDED.updated_at",
        duckdb::params![
            date_param(entry.month_start),
            entry.status.as_ref(),
            row_count,
            entry.finalized,
            timestamp_param(&entry.coverage.start),
            timestamp_param(&entry.coverage.end),
            entry.error.as_deref(),
            timestamp_param(&Utc::now()),
        ],
    )?;

    Ok(())
}

/// Whether the catalog table exists and is readable.
#[must_use]
pub fn is_available(conn: &Connection) -> bool {
    conn.prepare("SELECT 1 FROM data_catalog LIMIT 1")
        .and_then(|mut stmt| stmt.query([]).map(|_| ()))
        .is_ok()
}

fn entry_from_row(row: &duckdb::Row<'_>) -> Result<CatalogEntry, DbError> {
    let month: String = row.get(0)?;
    let status: String = row.get(1)?;
    let row_count: i64 = row.get(3)?;
    let start = from_epoch_ms(row.get(4)?);
    let end = from_epoch_ms(row.get(5)?);

    let (Some(start), Some(end)) = (start, end) else {
        return Err(DbError::Conversion {
            message: format!("catalog row {month} has no coverage window"),
        });
    };

    Ok(CatalogEntry {
        month_start: parse_date(&month)?,
        status: CatalogStatus::from_str(&status).map_err(|e| DbError::Conversion {
            message: format!("unknown catalog status {status:?}: {e}"),
        })?,
        finalized: row.get(2)?,
        row_count: u64::try_from(row_count).unwrap_or(0),
        coverage: TimeWindow::new(start, end),
        error: row.get(6)?,
        updated_at: from_epoch_ms(row.get(7)?),
    })
}
