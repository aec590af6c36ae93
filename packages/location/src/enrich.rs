//! The location enrichment batch job.
//!
//! One bulk read selects the events to classify, the resolver runs once
//! per event, and one bulk upsert writes the `location` rows. Events
//! without coordinates are never selected. Re-running with unchanged
//! polygon data rewrites the same rows with the same values.

use std::sync::Arc;
use std::time::Instant;

use duckdb::Connection;
use quake_map_database::events::{PointSelection, select_event_points};
use quake_map_database::locations::upsert_locations;
use quake_map_location_models::{EnrichmentReport, LocationRecord};
use quake_map_source::progress::{ProgressCallback, null_progress};

use crate::{EnrichError, LocationResolver};

/// Resolves every event that has coordinates.
///
/// # Errors
///
/// Returns [`EnrichError`] if the store cannot be read or written, or if
/// the sea lookup table is not populated. Per-point geometry faults do not
/// fail the run; they are counted in [`EnrichmentReport::degraded`].
pub fn enrich_all(
    conn: &Connection,
    resolver: &LocationResolver<'_>,
    progress: Option<Arc<dyn ProgressCallback>>,
) -> Result<EnrichmentReport, EnrichError> {
    enrich(conn, resolver, PointSelection::All, progress)
}

/// Resolves events that have coordinates but no `location` row yet.
///
/// # Errors
///
/// Same as [`enrich_all`].
pub fn enrich_missing(
    conn: &Connection,
    resolver: &LocationResolver<'_>,
    progress: Option<Arc<dyn ProgressCallback>>,
) -> Result<EnrichmentReport, EnrichError> {
    enrich(conn, resolver, PointSelection::MissingLocation, progress)
}

fn enrich(
    conn: &Connection,
    resolver: &LocationResolver<'_>,
    selection: PointSelection,
    progress: Option<Arc<dyn ProgressCallback>>,
) -> Result<EnrichmentReport, EnrichError> {
    let start = Instant::now();
    let progress = progress.unwrap_or_else(null_progress);

    let points = select_event_points(conn, selection)?;
    let mut report = EnrichmentReport {
        selected: points.len() as u64,
        ..EnrichmentReport::default()
    };

    if points.is_empty() {
        log::info!("Enrichment: no events to resolve");
        progress.finish_and_clear();
        return Ok(report);
    }

    progress.set_total(report.selected);
    progress.set_message("Resolving locations".to_string());

    let mut records = Vec::with_capacity(points.len());
    for point in &points {
        let resolution = resolver.resolve(point.latitude, point.longitude)?;
        report.degraded += resolution.degraded_count();
        records.push(LocationRecord::new(point.id, resolution.classification));
        progress.inc(1);
    }

    progress.set_message("Writing locations".to_string());
    report.written = upsert_locations(conn, &records)?;
    drop(records);

    if report.degraded > 0 {
        log::warn!(
            "Enrichment: {} layer lookups degraded to None",
            report.degraded
        );
    }
    log::info!(
        "Enrichment complete: {} selected, {} written, {} degraded, took {:.1}s",
        report.selected,
        report.written,
        report.degraded,
        start.elapsed().as_secs_f64()
    );
    progress.finish(format!("{} locations written", report.written));

    Ok(report)
}
