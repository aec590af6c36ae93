#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `quake_map`: the command-line entry point for the toolchain.
//!
//! Uses `indicatif-log-bridge` (via [`quake_map_cli_utils::init_logger`])
//! so log lines and progress bars share the terminal.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use quake_map_quake_models::{BoundingBox, DEFAULT_QUERY_LIMIT};

#[derive(Parser)]
#[command(name = "quake_map", about = "Earthquake event store and location resolver")]
struct Cli {
    /// Data directory (defaults to `QUAKE_MAP_DATA_DIR` or `./data`)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Store file (defaults to `quakes.duckdb` in the data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store schema and populate the country and sea lookups
    Init,
    /// Land missing months from the USGS feed
    Ingest {
        /// Override `EXTRACTOR_MONTHS`
        #[arg(long)]
        months: Option<u32>,
    },
    /// Show the landing catalog
    Catalog,
    /// Re-populate the country and sea lookup tables from the polygon layers
    Lookups,
    /// Resolve the territory and sea of stored events
    Enrich {
        /// Only events without a location row
        #[arg(long)]
        missing_only: bool,
    },
    /// Resolve one point
    Resolve {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    /// Query events as `GeoJSON`
    Query(QueryArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceKind {
    Database,
    Http,
}

#[derive(clap::Args)]
struct QueryArgs {
    #[arg(long, value_enum, default_value = "database")]
    source: SourceKind,
    /// Feed URL for the `http` source
    #[arg(long)]
    url: Option<String>,
    /// Window start (RFC 3339); defaults to 24 hours before `--end`
    #[arg(long)]
    start: Option<chrono::DateTime<chrono::Utc>>,
    /// Window end (RFC 3339); defaults to now
    #[arg(long)]
    end: Option<chrono::DateTime<chrono::Utc>>,
    #[arg(long, default_value_t = 0.0)]
    mag_min: f64,
    #[arg(long, default_value_t = 10.0)]
    mag_max: f64,
    #[arg(long, default_value_t = 0.0)]
    depth_min: f64,
    #[arg(long, default_value_t = 700.0)]
    depth_max: f64,
    #[arg(long)]
    tsunami_only: bool,
    /// Substring of place or title (case-insensitive)
    #[arg(long)]
    text: Option<String>,
    /// Network code; repeatable
    #[arg(long = "net")]
    networks: Vec<String>,
    /// `min_lon,min_lat,max_lon,max_lat`
    #[arg(long, value_parser = parse_bbox, allow_hyphen_values = true)]
    bbox: Option<BoundingBox>,
    #[arg(long, default_value_t = DEFAULT_QUERY_LIMIT)]
    limit: u32,
}

fn parse_bbox(s: &str) -> Result<BoundingBox, String> {
    let parts = s
        .split(',')
        .map(|p| p.trim().parse::<f64>().map_err(|e| format!("{p:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    let [min_lon, min_lat, max_lon, max_lat] = parts[..] else {
        return Err(format!("expected 4 comma-separated numbers, got {}", parts.len()));
    };
    Ok(BoundingBox {
        min_lon,
        min_lat,
        max_lon,
        max_lat,
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = quake_map_cli_utils::init_logger();
    let cli = Cli::parse();

    let data_dir = cli
        .data_dir
        .unwrap_or_else(quake_map_database::paths::data_dir);
    let db = cli
        .db
        .unwrap_or_else(|| quake_map_database::paths::store_path_in(&data_dir));
    let ctx = commands::Context {
        data_dir,
        db,
        multi,
    };

    match cli.command {
        Commands::Init => commands::init(&ctx)?,
        Commands::Ingest { months } => commands::ingest(&ctx, months).await?,
        Commands::Catalog => commands::catalog(&ctx)?,
        Commands::Lookups => commands::lookups(&ctx)?,
        Commands::Enrich { missing_only } => commands::enrich(&ctx, missing_only)?,
        Commands::Resolve { lat, lon } => commands::resolve(&ctx, lat, lon)?,
        Commands::Query(args) => commands::query(&ctx, args).await?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_parses_four_numbers() {
        let bbox = parse_bbox("-125, 32.5,-114,42").unwrap();
        assert_eq!(bbox.min_lon, -125.0);
        assert_eq!(bbox.max_lat, 42.0);
        assert!(parse_bbox("1,2,3").is_err());
        assert!(parse_bbox("a,2,3,4").is_err());
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "quake_map",
            "--db",
            "/tmp/q.duckdb",
            "resolve",
            "--lat",
            "-33.4",
            "--lon",
            "-70.6",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Resolve { lat, lon } if lat == -33.4 && lon == -70.6));

        let cli = Cli::try_parse_from(["quake_map", "enrich", "--missing-only"]).unwrap();
        assert!(matches!(cli.command, Commands::Enrich { missing_only: true }));

        let cli = Cli::try_parse_from([
            "quake_map", "query", "--source", "http", "--net", "us", "--net", "ak",
        ])
        .unwrap();
        let Commands::Query(args) = cli.command else {
            panic!("expected query");
        };
        assert!(matches!(args.source, SourceKind::Http));
        assert_eq!(args.networks, vec!["us", "ak"]);
        assert_eq!(args.limit, DEFAULT_QUERY_LIMIT);
    }
}
