//! The `events` table.
//!
//! Events are keyed by a surrogate `id` drawn from `events_id_seq` and
//! upserted by their natural key `usgs_id`, so re-landing a window never
//! duplicates rows and never changes an existing event's `id`.

use std::collections::BTreeMap;
use std::path::Path;

use duckdb::Connection;
use quake_map_quake_models::{Event, EventFilters, EventPoint, NormalizedEvent, TimeWindow};

use crate::{DbError, from_epoch_ms, in_transaction, timestamp_param};

/// Number of rows per INSERT chunk.
const CHUNK_SIZE: usize = 1_000;

/// Columns written on upsert, in bind order.
const UPSERT_COLUMNS: &[&str] = &[
    "usgs_id",
    "mag",
    "place",
    "time_utc",
    "updated_utc",
    "url",
    "detail_url",
    "tsunami",
    "sig",
    "mag_type",
    "event_type",
    "title",
    "net",
    "code",
    "depth_km",
    "longitude",
    "latitude",
];

/// Projection used by every full-row read; `epoch_ms` keeps timestamps
/// timezone-free.
const SELECT_COLUMNS: &str = "id, usgs_id, mag, place, epoch_ms(time_utc), epoch_ms(updated_utc),
     url, detail_url, tsunami, sig, mag_type, event_type, title, net, code,
     depth_km, longitude, latitude";

/// Which events to hand to the location resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointSelection {
    /// Every event with coordinates.
    All,
    /// Events with coordinates and no `location` row yet.
    MissingLocation,
}

/// Upserts normalized events by `usgs_id`.
///
/// Duplicate keys within the batch keep their last occurrence. Returns the
/// number of rows inserted or updated.
///
/// # Errors
///
/// Returns [`DbError`] if any statement fails; the whole batch is rolled
/// back.
pub fn upsert_events(conn: &Connection, events: &[NormalizedEvent]) -> Result<u64, DbError> {
    if events.is_empty() {
        return Ok(0);
    }

    let mut last_seen: BTreeMap<&str, usize> = BTreeMap::new();
    for (i, event) in events.iter().enumerate() {
        last_seen.insert(&event.usgs_id, i);
    }
    let deduped: Vec<&NormalizedEvent> = events
        .iter()
        .enumerate()
        .filter(|(i, e)| last_seen.get(e.usgs_id.as_str()) == Some(i))
        .map(|(_, e)| e)
        .collect();

    if deduped.len() < events.len() {
        log::info!(
            "Deduplicated event batch: {} -> {} rows",
            events.len(),
            deduped.len()
        );
    }

    let updates = UPSERT_COLUMNS[1..]
        .iter()
        .map(|c| format!("{c} = EXCLUDED.{c}"))
        .collect::<Vec<_>>()
        .join(",\n                ");
    let row_placeholder = format!("({})", vec!["?"; UPSERT_COLUMNS.len()].join(", "));

    in_transaction(conn, |conn| {
        let mut total = 0u64;

        for chunk in deduped.chunks(CHUNK_SIZE) {
            let sql = format!(
                "INSERT INTO events ({}) VALUES {}
                 ON CONFLICT (usgs_id) DO UPDATE SET
                    {updates}",
                UPSERT_COLUMNS.join(", "),
                vec![row_placeholder.as_str(); chunk.len()].join(", "),
            );

            let mut stmt = conn.prepare(&sql)?;
            let mut idx = 1usize;

            for event in chunk {
                stmt.raw_bind_parameter(idx, &event.usgs_id)?;
                stmt.raw_bind_parameter(idx + 1, event.mag)?;
                stmt.raw_bind_parameter(idx + 2, event.place.as_deref())?;
                stmt.raw_bind_parameter(idx + 3, event.time_utc.as_ref().map(timestamp_param))?;
                stmt.raw_bind_parameter(
                    idx + 4,
                    event.updated_utc.as_ref().map(timestamp_param),
                )?;
                stmt.raw_bind_parameter(idx + 5, event.url.as_deref())?;
                stmt.raw_bind_parameter(idx + 6, event.detail_url.as_deref())?;
                stmt.raw_bind_parameter(idx + 7, event.tsunami)?;
                stmt.raw_bind_parameter(idx + 8, event.sig)?;
                stmt.raw_bind_parameter(idx + 9, event.mag_type.as_deref())?;
                stmt.raw_bind_parameter(idx + 10, event.event_type.as_deref())?;
                stmt.raw_bind_parameter(idx + 11, event.title.as_deref())?;
                stmt.raw_bind_parameter(idx + 12, event.net.as_deref())?;
                stmt.raw_bind_parameter(idx + 13, event.code.as_deref())?;
                stmt.raw_bind_parameter(idx + 14, event.depth_km)?;
                stmt.raw_bind_parameter(idx + 15, event.longitude)?;
                stmt.raw_bind_parameter(idx + 16, event.latitude)?;
                idx += UPSERT_COLUMNS.len();
            }

            let rows = stmt.raw_execute()?;
            total += u64::try_from(rows).unwrap_or(0);
        }

        Ok(total)
    })
}

/// Returns the number of stored events.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn count_events(conn: &Connection) -> Result<u64, DbError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
    #[allow(clippy::cast_sign_loss)]
    Ok(count as u64)
}

/// Returns the number of stored events whose origin time falls in `window`.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn count_in_window(conn: &Connection, window: &TimeWindow) -> Result<u64, DbError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM events WHERE time_utc BETWEEN ? AND ?",
        duckdb::params![timestamp_param(&window.start), timestamp_param(&window.end)],
        |row| row.get(0),
    )?;
    #[allow(clippy::cast_sign_loss)]
    Ok(count as u64)
}

/// Reads `{id, lat, lon}` for events that can be located, in `id` order.
///
/// Events missing either coordinate are never returned.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn select_event_points(
    conn: &Connection,
    selection: PointSelection,
) -> Result<Vec<EventPoint>, DbError> {
    let sql = match selection {
        PointSelection::All => {
            "SELECT id, latitude, longitude FROM events
             WHERE latitude IS NOT NULL AND longitude IS NOT NULL
             ORDER BY id"
        }
        PointSelection::MissingLocation => {
            "SELECT e.id, e.latitude, e.longitude FROM events e
             LEFT JOIN location l ON l.quake_id = e.id
             WHERE e.latitude IS NOT NULL AND e.longitude IS NOT NULL
               AND l.quake_id IS NULL
             ORDER BY e.id"
        }
    };

    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let mut points = Vec::new();

    while let Some(row) = rows.next()? {
        points.push(EventPoint {
            id: row.get(0)?,
            latitude: row.get(1)?,
            longitude: row.get(2)?,
        });
    }

    Ok(points)
}

/// Reads events in `window` that pass `filters`, newest first, capped at
/// `filters.limit`.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn query_events(
    conn: &Connection,
    window: &TimeWindow,
    filters: &EventFilters,
) -> Result<Vec<Event>, DbError> {
    let mut conditions = vec![
        "time_utc BETWEEN ? AND ?".to_string(),
        "mag BETWEEN ? AND ?".to_string(),
        "depth_km BETWEEN ? AND ?".to_string(),
    ];
    let mut text_params: Vec<String> = Vec::new();

    if filters.tsunami_only {
        conditions.push("tsunami = 1".to_string());
    }

    if let Some(text) = filters.normalized_text() {
        conditions.push("(lower(place) LIKE ? OR lower(title) LIKE ?)".to_string());
        let like = format!("%{text}%");
        text_params.push(like.clone());
        text_params.push(like);
    }

    let networks = filters.normalized_networks();
    if !networks.is_empty() {
        let placeholders = vec!["?"; networks.len()].join(", ");
        conditions.push(format!("lower(net) IN ({placeholders})"));
        text_params.extend(networks);
    }

    if filters.bbox.is_some() {
        conditions.push("longitude BETWEEN ? AND ? AND latitude BETWEEN ? AND ?".to_string());
    }

    let sql = format!(
        "SELECT {SELECT_COLUMNS} FROM events
         WHERE {}
         ORDER BY time_utc DESC, id DESC
         LIMIT ?",
        conditions.join(" AND ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut idx = 1usize;

    stmt.raw_bind_parameter(idx, timestamp_param(&window.start))?;
    stmt.raw_bind_parameter(idx + 1, timestamp_param(&window.end))?;
    stmt.raw_bind_parameter(idx + 2, filters.mag_min)?;
    stmt.raw_bind_parameter(idx + 3, filters.mag_max)?;
    stmt.raw_bind_parameter(idx + 4, filters.depth_min)?;
    stmt.raw_bind_parameter(idx + 5, filters.depth_max)?;
    idx += 6;

    for param in &text_params {
        stmt.raw_bind_parameter(idx, param)?;
        idx += 1;
    }

    if let Some(bbox) = filters.bbox {
        stmt.raw_bind_parameter(idx, bbox.min_lon)?;
        stmt.raw_bind_parameter(idx + 1, bbox.max_lon)?;
        stmt.raw_bind_parameter(idx + 2, bbox.min_lat)?;
        stmt.raw_bind_parameter(idx + 3, bbox.max_lat)?;
        idx += 4;
    }

    stmt.raw_bind_parameter(idx, i64::from(filters.limit))?;

    stmt.raw_execute()?;
    let mut rows = stmt.raw_query();
    let mut events = Vec::new();

    while let Some(row) = rows.next()? {
        events.push(Event {
            id: row.get(0)?,
            event: NormalizedEvent {
                usgs_id: row.get(1)?,
                mag: row.get(2)?,
                place: row.get(3)?,
                time_utc: from_epoch_ms(row.get(4)?),
                updated_utc: from_epoch_ms(row.get(5)?),
                url: row.get(6)?,
                detail_url: row.get(7)?,
                tsunami: row.get(8)?,
                sig: row.get(9)?,
                mag_type: row.get(10)?,
                event_type: row.get(11)?,
                title: row.get(12)?,
                net: row.get(13)?,
                code: row.get(14)?,
                depth_km: row.get(15)?,
                longitude: row.get(16)?,
                latitude: row.get(17)?,
            },
        });
    }

    Ok(events)
}

/// Writes the events whose origin time falls in `window` to a Parquet
/// file, replacing any previous file.
///
/// Returns the number of exported rows.
///
/// # Errors
///
/// Returns [`DbError`] if the directory cannot be created or the `COPY`
/// fails.
pub fn export_parquet(
    conn: &Connection,
    window: &TimeWindow,
    path: &Path,
) -> Result<u64, DbError> {
    if let Some(parent) = path.parent() {
        crate::paths::ensure_dir(parent)?;
    }

    let escaped = path.display().to_string().replace('\'', "''");
    let sql = format!(
        "COPY (
            SELECT {SELECT_COLUMNS} FROM events
            WHERE time_utc BETWEEN '{}' AND '{}'
            ORDER BY time_utc
         ) TO '{escaped}' (FORMAT PARQUET)",
        timestamp_param(&window.start),
        timestamp_param(&window.end),
    );

    let rows = conn.execute(&sql, [])?;
    Ok(u64::try_from(rows).unwrap_or(0))
}
