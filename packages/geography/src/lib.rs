#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Territory and sea polygon layers.
//!
//! Reads the EEZ/land-union territory shapefile and the chunked
//! global-oceans-and-seas layer from the `data/` directory, normalizes both
//! to WGS84 longitude/latitude, and builds a [`PolygonIndex`] over them for
//! point classification.
//!
//! Shapefiles and `GeoPackage` chunks are read through the `DuckDB`
//! `spatial` extension; `GeoJSON` feature collections are read directly.

pub mod index;
pub mod loader;
pub mod reader;

use std::path::PathBuf;

use thiserror::Error;

pub use index::{PolygonIndex, Territory};
pub use loader::{DataLoader, LayerPaths, SeaFeature, TerritoryFeature};

/// Errors that can occur while loading polygon layers.
#[derive(Debug, Error)]
pub enum LayerError {
    /// Required polygon source files are absent.
    #[error("Missing polygon data:\n  {}\n{hint}", format_paths(.paths))]
    MissingData {
        /// Every expected path that does not exist.
        paths: Vec<PathBuf>,
        /// Where the files are expected to live.
        hint: String,
    },

    /// A source was read but lacks a required attribute.
    #[error("Schema error in {layer} layer: {message}")]
    Schema {
        /// Which layer (`territory` or `sea`).
        layer: &'static str,
        /// Description of what is missing.
        message: String,
    },

    /// The source declares a coordinate reference system that cannot be
    /// converted to WGS84 by the reader.
    #[error("Unsupported CRS {crs} in {path}")]
    UnsupportedCrs {
        /// Declared CRS.
        crs: String,
        /// Offending file.
        path: PathBuf,
    },

    /// `DuckDB` (spatial extension) error.
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `GeoJSON` parse error.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// Data conversion error.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join("\n  ")
}
