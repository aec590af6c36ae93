#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Ingestion autorun: lands missing months and exits.
//!
//! Meant to be run on a schedule. Settings come from the `EXTRACTOR_*`
//! environment variables; flags override the store location and the
//! number of months.

use std::path::PathBuf;

use clap::Parser;
use quake_map_cli_utils::IndicatifProgress;
use quake_map_database::{Store, paths};
use quake_map_ingest::{IngestConfig, RunOutcome};

#[derive(Parser)]
#[command(name = "quake_map_ingest", about = "Land USGS earthquake months into the local store")]
struct Cli {
    /// Store file (defaults to `quakes.duckdb` in the data directory)
    #[arg(long)]
    db: Option<PathBuf>,
    /// Override `EXTRACTOR_MONTHS`
    #[arg(long)]
    months: Option<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = quake_map_cli_utils::init_logger();
    let cli = Cli::parse();

    let mut config = IngestConfig::from_env()?;
    if let Some(months) = cli.months {
        config.months_back = months;
    }

    let store = Store::open(&cli.db.unwrap_or_else(paths::store_path))?;
    let progress = IndicatifProgress::months_bar(&multi, "Checking catalog");

    match quake_map_ingest::run(&store, &config, Some(progress)).await? {
        RunOutcome::Disabled => log::info!("Nothing to do"),
        RunOutcome::Locked => log::info!("Skipped: another run is in progress"),
        RunOutcome::Completed(summary) if summary.failed > 0 => {
            log::warn!("{} month(s) failed; see the catalog for details", summary.failed);
        }
        RunOutcome::Completed(_) => {}
    }

    store.close()?;
    Ok(())
}
