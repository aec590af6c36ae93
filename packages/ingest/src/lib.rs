#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Month-partitioned landing of USGS events into the local store.
//!
//! Each run lands the current month and a configurable number of previous
//! months, tracking progress per month in the `data_catalog` table. Past
//! months are finalized once landed to month end and are not fetched
//! again; the current month is refreshed up to "now" on every run.

pub mod config;
pub mod months;

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Datelike as _, Utc};
use duckdb::Connection;
use quake_map_database::{DbError, Store, catalog, events, lock, paths};
use quake_map_quake_models::{CatalogEntry, CatalogStatus, TimeWindow};
use quake_map_source::progress::{ProgressCallback, null_progress};
use quake_map_source::{FeedClient, SourceError};

pub use config::{ConfigError, IngestConfig};

/// Advisory lock key shared by every ingestion process.
pub const LOCK_KEY: i64 = 2_025_103_001;

/// Errors that abort an ingestion run.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// Store error.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Feed error.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Counters for one completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Months that were up to date.
    pub skipped: u32,
    /// Months landed successfully.
    pub landed: u32,
    /// Months whose landing failed.
    pub failed: u32,
    /// Events fetched across all landed months.
    pub fetched: u64,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Bootstrapping is switched off.
    Disabled,
    /// Another process holds the ingestion lock.
    Locked,
    /// The run went through every target month.
    Completed(RunSummary),
}

/// Lands every target month that is missing or not finalized.
///
/// # Errors
///
/// Returns [`IngestError`] if the store, the lock, or the catalog cannot
/// be accessed. Failures of individual months are recorded in the catalog
/// and do not abort the run.
#[allow(clippy::future_not_send)]
pub async fn run(
    store: &Store,
    config: &IngestConfig,
    progress: Option<Arc<dyn ProgressCallback>>,
) -> Result<RunOutcome, IngestError> {
    let client = FeedClient::new(&config.feed_url, config.timeout, config.retry_policy())?;
    run_at(store, &client, config, Utc::now(), progress).await
}

/// [`run`] with an explicit client and clock.
///
/// # Errors
///
/// See [`run`].
#[allow(clippy::future_not_send)]
pub async fn run_at(
    store: &Store,
    client: &FeedClient,
    config: &IngestConfig,
    now: DateTime<Utc>,
    progress: Option<Arc<dyn ProgressCallback>>,
) -> Result<RunOutcome, IngestError> {
    if !config.bootstrap {
        log::info!("Bootstrap disabled, nothing to do");
        return Ok(RunOutcome::Disabled);
    }

    let conn = store.conn();
    if !catalog::is_available(conn) {
        log::warn!("Catalog table unavailable, skipping ingestion");
        return Ok(RunOutcome::Disabled);
    }

    let owner = format!("quake_map_ingest:{}", std::process::id());
    let Some(_guard) = lock::try_lock(conn, LOCK_KEY, &owner, lock::DEFAULT_STALE_AFTER)? else {
        log::info!("Another ingestion run holds lock {LOCK_KEY}, exiting");
        return Ok(RunOutcome::Locked);
    };

    let progress = progress.unwrap_or_else(null_progress);
    let start = Instant::now();
    let mut summary = RunSummary::default();

    let mut todo = Vec::new();
    for month in months::target_months(now, config.months_back) {
        if months::needs_landing(catalog::get_entry(conn, month)?.as_ref()) {
            todo.push(month);
        } else {
            summary.skipped += 1;
        }
    }

    log::info!(
        "{} month(s) to land, {} already finalized",
        todo.len(),
        summary.skipped
    );
    progress.set_total(todo.len() as u64);

    for (i, month) in todo.iter().enumerate() {
        let label = month.format("%Y-%m").to_string();
        progress.set_message(label.clone());

        match land_month(conn, client, config, *month, now).await {
            Ok(fetched) => {
                summary.landed += 1;
                summary.fetched += fetched;
            }
            Err(e) => {
                log::warn!("{label}: landing failed: {e}");
                summary.failed += 1;
                let start = months::month_bounds_utc(*month).start;
                catalog::upsert_entry(
                    conn,
                    &CatalogEntry {
                        month_start: *month,
                        status: CatalogStatus::Error,
                        finalized: false,
                        row_count: 0,
                        coverage: TimeWindow::new(start, start),
                        error: Some(e.to_string()),
                        updated_at: None,
                    },
                )?;
            }
        }

        progress.inc(1);
        if i + 1 < todo.len() && !config.sleep.is_zero() {
            tokio::time::sleep(config.sleep).await;
        }
    }

    progress.finish(format!(
        "{} landed, {} failed, {} events",
        summary.landed, summary.failed, summary.fetched
    ));
    log::info!(
        "Ingestion complete: {} landed, {} failed, {} skipped, {} events fetched, took {:.1}s",
        summary.landed,
        summary.failed,
        summary.skipped,
        summary.fetched,
        start.elapsed().as_secs_f64()
    );

    Ok(RunOutcome::Completed(summary))
}

/// Fetches one month and records it in the catalog.
///
/// The current month is landed up to `now` and left unfinalized; past
/// months are landed to month end and finalized. Returns the number of
/// events fetched.
///
/// # Errors
///
/// Returns [`IngestError`] if the fetch, the upsert, or the lake export
/// fails. The catalog is left in the `landing` state.
#[allow(clippy::future_not_send)]
pub async fn land_month(
    conn: &Connection,
    client: &FeedClient,
    config: &IngestConfig,
    month: chrono::NaiveDate,
    now: DateTime<Utc>,
) -> Result<u64, IngestError> {
    let is_current = month == months::month_start(now.date_naive());
    let bounds = months::month_bounds_utc(month);
    let window = TimeWindow::new(bounds.start, if is_current { now } else { bounds.end });

    let mut entry = CatalogEntry {
        month_start: month,
        status: CatalogStatus::Landing,
        finalized: false,
        row_count: 0,
        coverage: window,
        error: None,
        updated_at: None,
    };
    catalog::upsert_entry(conn, &entry)?;

    let fetched = client.fetch_window(&window).await?;
    let written = events::upsert_events(conn, &fetched)?;
    log::info!(
        "{}: fetched {} events, upserted {written}",
        month.format("%Y-%m"),
        fetched.len()
    );

    if let Some(lake_root) = &config.lake_root {
        let path = paths::lake_partition_path(lake_root, month.year(), month.month());
        let exported = events::export_parquet(conn, &window, &path)?;
        log::info!("Exported {exported} events to {}", path.display());
    }

    entry.status = CatalogStatus::Landed;
    entry.finalized = !is_current;
    entry.row_count = events::count_in_window(conn, &window)?;
    catalog::upsert_entry(conn, &entry)?;

    Ok(fetched.len() as u64)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{NaiveDate, TimeZone as _};
    use quake_map_source::retry::RetryPolicy;

    use super::*;

    fn unreachable_client() -> FeedClient {
        FeedClient::new(
            "http://127.0.0.1:9/query",
            Duration::from_secs(2),
            RetryPolicy {
                max_retries: 0,
                max_backoff: Duration::ZERO,
            },
        )
        .unwrap()
    }

    fn quiet_config() -> IngestConfig {
        IngestConfig {
            months_back: 1,
            sleep: Duration::ZERO,
            max_retries: 0,
            ..IngestConfig::default()
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 15, 8, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn disabled_bootstrap_does_nothing() {
        let store = Store::open_in_memory().unwrap();
        let config = IngestConfig {
            bootstrap: false,
            ..quiet_config()
        };

        let outcome = run_at(&store, &unreachable_client(), &config, now(), None)
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Disabled);
        assert!(catalog::list_entries(store.conn()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn held_lock_skips_run() {
        let store = Store::open_in_memory().unwrap();
        let _guard = lock::try_lock(store.conn(), LOCK_KEY, "other", lock::DEFAULT_STALE_AFTER)
            .unwrap()
            .unwrap();

        let outcome = run_at(&store, &unreachable_client(), &quiet_config(), now(), None)
            .await
            .unwrap();
        assert_eq!(outcome, RunOutcome::Locked);
    }

    #[tokio::test]
    async fn failed_months_are_recorded_and_lock_released() {
        let store = Store::open_in_memory().unwrap();

        let outcome = run_at(&store, &unreachable_client(), &quiet_config(), now(), None)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Completed(RunSummary {
                skipped: 0,
                landed: 0,
                failed: 2,
                fetched: 0,
            })
        );

        let entries = catalog::list_entries(store.conn()).unwrap();
        let months: Vec<NaiveDate> = entries.iter().map(|e| e.month_start).collect();
        assert_eq!(
            months,
            vec![
                NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
                NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
            ]
        );
        assert!(entries.iter().all(|e| e.status == CatalogStatus::Error));
        assert!(entries.iter().all(|e| e.error.is_some()));

        assert!(
            lock::try_lock(store.conn(), LOCK_KEY, "next", lock::DEFAULT_STALE_AFTER)
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn finalized_months_are_skipped() {
        let store = Store::open_in_memory().unwrap();
        let february = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
        catalog::upsert_entry(
            store.conn(),
            &CatalogEntry {
                month_start: february,
                status: CatalogStatus::Landed,
                finalized: true,
                row_count: 42,
                coverage: months::month_bounds_utc(february),
                error: None,
                updated_at: None,
            },
        )
        .unwrap();

        let outcome = run_at(&store, &unreachable_client(), &quiet_config(), now(), None)
            .await
            .unwrap();
        let RunOutcome::Completed(summary) = outcome else {
            panic!("expected a completed run, got {outcome:?}");
        };
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);

        let february_entry = catalog::get_entry(store.conn(), february).unwrap().unwrap();
        assert_eq!(february_entry.status, CatalogStatus::Landed);
        assert_eq!(february_entry.row_count, 42);
    }
}
