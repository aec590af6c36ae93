//! Point classification against the territory and sea layers.
//!
//! Each layer is queried independently: an R-tree bounding-box pass picks
//! candidates, then an exact boundary-inclusive containment test runs over
//! them in source order and the first hit wins. Overlapping polygons are
//! therefore resolved by source position, not by area or distance.
//!
//! A geometry fault in one layer (an invalid point or a degenerate
//! candidate polygon) degrades that layer's answer to `None` and is logged
//! and reported on the [`Resolution`]; the other layer is unaffected.

use quake_map_database::lookups::load_seas;
use quake_map_geography::PolygonIndex;
use quake_map_location_models::{Classification, SeaLookup};
use quake_map_spatial::GeometryFault;

use crate::ResolveError;

/// The outcome of resolving one point.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resolution {
    /// The classification to persist.
    pub classification: Classification,
    /// Set when the country lookup degraded to `None`.
    pub country_fault: Option<GeometryFault>,
    /// Set when the sea lookup degraded to `None`.
    pub sea_fault: Option<GeometryFault>,
}

impl Resolution {
    /// Whether either layer lookup degraded.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.country_fault.is_some() || self.sea_fault.is_some()
    }

    /// Number of degraded layer lookups (0, 1, or 2).
    #[must_use]
    pub fn degraded_count(&self) -> u64 {
        u64::from(self.country_fault.is_some()) + u64::from(self.sea_fault.is_some())
    }
}

/// Classifies points against a loaded [`PolygonIndex`].
///
/// Borrows the index; sea ids come from the populated `sea` lookup table.
#[derive(Debug)]
pub struct LocationResolver<'a> {
    index: &'a PolygonIndex,
    seas: SeaLookup,
}

impl<'a> LocationResolver<'a> {
    /// Creates a resolver over `index` using an already-read sea lookup.
    #[must_use]
    pub const fn new(index: &'a PolygonIndex, seas: SeaLookup) -> Self {
        Self { index, seas }
    }

    /// Creates a resolver, reading the sea lookup from the store.
    ///
    /// # Errors
    ///
    /// Returns [`quake_map_database::DbError`] if the `sea` table cannot be
    /// read.
    pub fn from_store(
        index: &'a PolygonIndex,
        conn: &duckdb::Connection,
    ) -> Result<Self, quake_map_database::DbError> {
        let seas = SeaLookup::from_rows(&load_seas(conn)?);
        log::debug!("Loaded {} sea lookup rows", seas.len());
        Ok(Self::new(index, seas))
    }

    /// The index being queried.
    #[must_use]
    pub const fn index(&self) -> &'a PolygonIndex {
        self.index
    }

    /// Classifies the point `(lat, lon)` in degrees.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::LookupNotPopulated`] if the sea layer has
    /// polygons but the lookup table is empty, or if the covering sea has
    /// no id in the lookup table.
    pub fn resolve(&self, lat: f64, lon: f64) -> Result<Resolution, ResolveError> {
        let seas = self.index.seas();
        if self.seas.is_empty() && !seas.is_empty() {
            return Err(ResolveError::LookupNotPopulated {
                detail: format!(
                    "sea table is empty but the sea layer has {} polygons; populate lookups first",
                    seas.len()
                ),
            });
        }

        let mut resolution = Resolution::default();

        match self.index.territories().locate(lon, lat) {
            Ok(hit) => resolution.classification.country = hit.map(|t| t.iso.clone()),
            Err(fault) => {
                log::warn!("Country lookup degraded at ({lat}, {lon}): {fault}");
                resolution.country_fault = Some(fault);
            }
        }

        match seas.locate(lon, lat) {
            Ok(Some(name)) => {
                let id = self
                    .seas
                    .id_of(name)
                    .ok_or_else(|| ResolveError::LookupNotPopulated {
                        detail: format!("no sea id for {name:?}"),
                    })?;
                resolution.classification.sea = Some(id);
            }
            Ok(None) => {}
            Err(fault) => {
                log::warn!("Sea lookup degraded at ({lat}, {lon}): {fault}");
                resolution.sea_fault = Some(fault);
            }
        }

        Ok(resolution)
    }
}
