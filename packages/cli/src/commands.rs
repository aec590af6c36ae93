//! Subcommand handlers.

use std::path::PathBuf;
use std::time::Instant;

use chrono::{Duration, Utc};
use quake_map_cli_utils::{IndicatifProgress, MultiProgress};
use quake_map_database::{Store, catalog, events, locations, lookups as lookup_tables};
use quake_map_geography::{DataLoader, PolygonIndex};
use quake_map_ingest::{IngestConfig, RunOutcome};
use quake_map_location::lookups::{populate_all, populate_from_index};
use quake_map_location::{LocationResolver, enrich_all, enrich_missing};
use quake_map_quake_models::{EventFilters, TimeWindow};
use quake_map_source::retry::RetryPolicy;
use quake_map_source::usgs::{ALL_DAY_FEED_URL, DEFAULT_TIMEOUT};
use quake_map_source::{DatabaseSource, EventSource, FeedClient, HttpSource};

use crate::{QueryArgs, SourceKind};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

/// Paths and terminal state shared by every command.
pub struct Context {
    pub data_dir: PathBuf,
    pub db: PathBuf,
    pub multi: MultiProgress,
}

impl Context {
    fn open_store(&self) -> Result<Store, quake_map_database::DbError> {
        log::debug!("Opening store {}", self.db.display());
        Store::open(&self.db)
    }

    fn loader(&self) -> DataLoader {
        DataLoader::from_data_dir(&self.data_dir)
    }

    fn load_index(&self) -> Result<PolygonIndex, quake_map_geography::LayerError> {
        let start = Instant::now();
        let index = PolygonIndex::load(&self.loader())?;
        log::info!(
            "Loaded {} territory and {} sea polygons in {:.1}s",
            index.territories().len(),
            index.seas().len(),
            start.elapsed().as_secs_f64()
        );
        Ok(index)
    }
}

pub fn init(ctx: &Context) -> CmdResult {
    let store = ctx.open_store()?;
    let (countries, seas) = populate_all(store.conn(), &ctx.loader())?;
    println!("Store ready at {}", ctx.db.display());
    println!("  {countries} countries, {seas} seas");
    store.close()?;
    Ok(())
}

pub async fn ingest(ctx: &Context, months: Option<u32>) -> CmdResult {
    let mut config = IngestConfig::from_env()?;
    if let Some(months) = months {
        config.months_back = months;
    }

    let store = ctx.open_store()?;
    let progress = IndicatifProgress::months_bar(&ctx.multi, "Checking catalog");
    let outcome = quake_map_ingest::run(&store, &config, Some(progress)).await?;

    match outcome {
        RunOutcome::Disabled => println!("Ingestion disabled"),
        RunOutcome::Locked => println!("Another ingestion run is in progress"),
        RunOutcome::Completed(summary) => println!(
            "{} landed, {} failed, {} already finalized, {} events fetched",
            summary.landed, summary.failed, summary.skipped, summary.fetched
        ),
    }

    store.close()?;
    Ok(())
}

pub fn catalog(ctx: &Context) -> CmdResult {
    let store = ctx.open_store()?;
    let entries = catalog::list_entries(store.conn())?;

    if entries.is_empty() {
        println!("Catalog is empty; run `quake_map ingest`");
    } else {
        println!(
            "{:<8} {:<8} {:>9} {:>8}  COVERAGE",
            "MONTH", "STATUS", "FINALIZED", "ROWS"
        );
        println!("{}", "-".repeat(72));
        for e in &entries {
            println!(
                "{:<8} {:<8} {:>9} {:>8}  {} .. {}",
                e.month_start.format("%Y-%m"),
                e.status,
                e.finalized,
                e.row_count,
                e.coverage.start.format("%Y-%m-%d %H:%M"),
                e.coverage.end.format("%Y-%m-%d %H:%M"),
            );
            if let Some(error) = &e.error {
                println!("         error: {error}");
            }
        }
    }

    println!(
        "{} events, {} located",
        events::count_events(store.conn())?,
        locations::count_locations(store.conn())?
    );
    store.close()?;
    Ok(())
}

pub fn lookups(ctx: &Context) -> CmdResult {
    let index = ctx.load_index()?;
    let store = ctx.open_store()?;
    let (countries, seas) = populate_from_index(store.conn(), &index)?;
    println!("{countries} countries, {seas} seas");
    store.close()?;
    Ok(())
}

pub fn enrich(ctx: &Context, missing_only: bool) -> CmdResult {
    let index = ctx.load_index()?;
    let store = ctx.open_store()?;
    let resolver = LocationResolver::from_store(&index, store.conn())?;
    let progress = IndicatifProgress::events_bar(&ctx.multi, "Selecting events");

    let report = if missing_only {
        enrich_missing(store.conn(), &resolver, Some(progress))?
    } else {
        enrich_all(store.conn(), &resolver, Some(progress))?
    };

    println!(
        "{} selected, {} written, {} degraded lookups",
        report.selected, report.written, report.degraded
    );
    store.close()?;
    Ok(())
}

pub fn resolve(ctx: &Context, lat: f64, lon: f64) -> CmdResult {
    let index = ctx.load_index()?;
    let store = ctx.open_store()?;
    let resolver = LocationResolver::from_store(&index, store.conn())?;
    let resolution = resolver.resolve(lat, lon)?;

    let country = resolution.classification.country.as_deref().map(|iso| {
        let name = index
            .countries()
            .iter()
            .find(|(code, _)| code == iso)
            .map_or("", |(_, name)| name.as_str());
        format!("{iso} {name}")
    });
    let sea = match resolution.classification.sea {
        Some(id) => lookup_tables::load_seas(store.conn())?
            .into_iter()
            .find(|s| s.id == id)
            .map(|s| format!("{} {}", s.id, s.name)),
        None => None,
    };

    println!("country: {}", country.as_deref().unwrap_or("-"));
    println!("sea:     {}", sea.as_deref().unwrap_or("-"));
    if let Some(fault) = &resolution.country_fault {
        println!("country lookup degraded: {fault}");
    }
    if let Some(fault) = &resolution.sea_fault {
        println!("sea lookup degraded: {fault}");
    }

    store.close()?;
    Ok(())
}

pub async fn query(ctx: &Context, args: QueryArgs) -> CmdResult {
    let end = args.end.unwrap_or_else(Utc::now);
    let start = args.start.unwrap_or(end - Duration::hours(24));
    let window = TimeWindow::new(start, end);

    let filters = EventFilters {
        mag_min: args.mag_min,
        mag_max: args.mag_max,
        depth_min: args.depth_min,
        depth_max: args.depth_max,
        tsunami_only: args.tsunami_only,
        text_query: args.text,
        networks: args.networks,
        bbox: args.bbox,
        limit: args.limit,
    };

    let source = match args.source {
        SourceKind::Database => EventSource::Database(DatabaseSource::new(&ctx.db)),
        SourceKind::Http => {
            let client = FeedClient::new(
                ALL_DAY_FEED_URL,
                DEFAULT_TIMEOUT,
                RetryPolicy::default(),
            )?;
            EventSource::Http(HttpSource::new(
                client,
                args.url.unwrap_or_else(|| ALL_DAY_FEED_URL.to_string()),
            ))
        }
    };

    let collection = source.fetch(&window, &filters).await?;
    log::info!(
        "{} events from the {} source",
        collection.features.len(),
        source.name()
    );
    println!("{}", serde_json::to_string_pretty(&collection)?);
    Ok(())
}
