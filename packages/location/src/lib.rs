#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Event location resolution.
//!
//! [`LocationResolver`] classifies a point against the territory and sea
//! layers of a [`quake_map_geography::PolygonIndex`]. The [`lookups`]
//! module fills the `country` and `sea` tables the classifications refer
//! to, and [`enrich`] drives the resolver over stored events and writes
//! the `location` table.

pub mod enrich;
pub mod lookups;
pub mod resolver;

use quake_map_database::DbError;
use quake_map_geography::LayerError;
use thiserror::Error;

pub use enrich::{enrich_all, enrich_missing};
pub use resolver::{LocationResolver, Resolution};

/// Errors from a single resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The sea lookup table does not cover the sea layer.
    #[error("Sea lookup table is not populated: {detail}")]
    LookupNotPopulated {
        /// What is missing.
        detail: String,
    },
}

/// Errors from an enrichment run.
#[derive(Debug, Error)]
pub enum EnrichError {
    /// Database error.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Resolution error.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Errors from populating the lookup tables.
#[derive(Debug, Error)]
pub enum LookupError {
    /// Database error.
    #[error(transparent)]
    Db(#[from] DbError),

    /// Polygon layer error.
    #[error(transparent)]
    Layer(#[from] LayerError),
}

#[cfg(test)]
pub(crate) mod fixtures {
    use geo::{MultiPolygon, polygon};
    use quake_map_geography::{PolygonIndex, SeaFeature, TerritoryFeature};

    pub fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: min_x, y: min_y),
            (x: max_x, y: min_y),
            (x: max_x, y: max_y),
            (x: min_x, y: max_y),
            (x: min_x, y: min_y),
        ]])
    }

    /// Contiguous US (with a Pacific EEZ strip), the eastern Pacific, and
    /// the Gulf of Mexico.
    pub fn territories() -> Vec<TerritoryFeature> {
        vec![
            TerritoryFeature {
                iso: "USA".to_string(),
                name: "United States".to_string(),
                geometry: rect(-130.0, 24.0, -66.0, 50.0),
            },
            TerritoryFeature {
                iso: "MEX".to_string(),
                name: "Mexico".to_string(),
                geometry: rect(-118.0, 14.0, -86.0, 24.0),
            },
        ]
    }

    pub fn seas() -> Vec<SeaFeature> {
        vec![
            SeaFeature {
                row_id: 1,
                name: "Gulf of Mexico".to_string(),
                geometry: rect(-98.0, 18.0, -81.0, 24.0),
            },
            SeaFeature {
                row_id: 0,
                name: "North Pacific Ocean".to_string(),
                geometry: rect(-180.0, 0.0, -117.0, 60.0),
            },
            SeaFeature {
                row_id: 2,
                name: "South Pacific Ocean".to_string(),
                geometry: rect(-180.0, -60.0, -70.0, 0.0),
            },
        ]
    }

    pub fn index() -> PolygonIndex {
        PolygonIndex::build(territories(), seas())
    }
}
