//! The `location` join table (one classification per event).

use duckdb::Connection;
use quake_map_location_models::LocationRecord;

use crate::{DbError, in_transaction};

/// Number of rows per INSERT chunk.
const CHUNK_SIZE: usize = 2_000;

/// Upserts classifications keyed by `quake_id` in one transaction.
///
/// An existing row for the same event is overwritten, so re-running with
/// the same records leaves the table unchanged. Returns the number of rows
/// inserted or updated.
///
/// # Errors
///
/// Returns [`DbError`] if any statement fails; the batch is rolled back.
pub fn upsert_locations(conn: &Connection, records: &[LocationRecord]) -> Result<u64, DbError> {
    if records.is_empty() {
        return Ok(0);
    }

    in_transaction(conn, |conn| {
        let mut total = 0u64;

        for chunk in records.chunks(CHUNK_SIZE) {
            let sql = format!(
                "INSERT INTO location (quake_id, country_iso, sea_id) VALUES {}
                 ON CONFLICT (quake_id) DO UPDATE SET
                    country_iso = EXCLUDED.country_iso,
                    sea_id = EXCLUDED.sea_id",
                vec!["(?, ?, ?)"; chunk.len()].join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let mut idx = 1usize;

            for record in chunk {
                stmt.raw_bind_parameter(idx, record.quake_id)?;
                stmt.raw_bind_parameter(idx + 1, record.country_iso.as_deref())?;
                stmt.raw_bind_parameter(idx + 2, record.sea_id)?;
                idx += 3;
            }

            let rows = stmt.raw_execute()?;
            total += u64::try_from(rows).unwrap_or(0);
        }

        Ok(total)
    })
}

/// Reads every classification ordered by `quake_id`.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn load_locations(conn: &Connection) -> Result<Vec<LocationRecord>, DbError> {
    let mut stmt =
        conn.prepare("SELECT quake_id, country_iso, sea_id FROM location ORDER BY quake_id")?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();

    while let Some(row) = rows.next()? {
        out.push(LocationRecord {
            quake_id: row.get(0)?,
            country_iso: row.get(1)?,
            sea_id: row.get(2)?,
        });
    }

    Ok(out)
}

/// Returns the number of classified events.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn count_locations(conn: &Connection) -> Result<u64, DbError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM location", [], |row| row.get(0))?;
    #[allow(clippy::cast_sign_loss)]
    Ok(count as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    fn record(id: i64, iso: Option<&str>, sea: Option<i32>) -> LocationRecord {
        LocationRecord {
            quake_id: id,
            country_iso: iso.map(str::to_string),
            sea_id: sea,
        }
    }

    #[test]
    fn upsert_overwrites_by_quake_id() {
        let store = Store::open_in_memory().unwrap();
        let conn = store.conn();

        let first = vec![record(1, Some("USA"), None), record(2, None, Some(3))];
        assert_eq!(upsert_locations(conn, &first).unwrap(), 2);
        assert_eq!(upsert_locations(conn, &first).unwrap(), 2);
        assert_eq!(load_locations(conn).unwrap(), first);

        upsert_locations(conn, &[record(1, None, Some(0))]).unwrap();
        let loaded = load_locations(conn).unwrap();
        assert_eq!(loaded[0], record(1, None, Some(0)));
        assert_eq!(count_locations(conn).unwrap(), 2);
    }

    #[test]
    fn empty_batch_is_noop() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(upsert_locations(store.conn(), &[]).unwrap(), 0);
        assert_eq!(count_locations(store.conn()).unwrap(), 0);
    }
}
