//! Spatial index over the territory and sea layers.

use quake_map_spatial::PolygonLayer;

use crate::LayerError;
use crate::loader::{DataLoader, SeaFeature, TerritoryFeature, distinct_sea_names, distinct_territories};

/// Attributes of a territory polygon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Territory {
    /// Uppercase ISO sovereignty code.
    pub iso: String,
    /// Sovereignty display name.
    pub name: String,
}

/// Both polygon layers, indexed for point lookups.
///
/// Built once per process and shared read-only by every lookup. Candidate
/// order within each layer is source order: territory rows as read, sea
/// rows by their `__row_id__`.
#[derive(Debug)]
pub struct PolygonIndex {
    territories: PolygonLayer<Territory>,
    seas: PolygonLayer<String>,
    sea_names: Vec<String>,
    countries: Vec<(String, String)>,
}

impl PolygonIndex {
    /// Builds the index from already-loaded features.
    #[must_use]
    pub fn build(territories: Vec<TerritoryFeature>, mut seas: Vec<SeaFeature>) -> Self {
        seas.sort_by_key(|s| s.row_id);

        let countries = distinct_territories(&territories);
        let sea_names = distinct_sea_names(&seas);

        let territories = PolygonLayer::build(territories.into_iter().map(|t| {
            (
                Territory {
                    iso: t.iso,
                    name: t.name,
                },
                t.geometry,
            )
        }));
        let seas = PolygonLayer::build(seas.into_iter().map(|s| (s.name, s.geometry)));

        log::info!(
            "Polygon index ready: {} territories ({} skipped), {} seas ({} skipped)",
            territories.len(),
            territories.skipped(),
            seas.len(),
            seas.skipped()
        );

        Self {
            territories,
            seas,
            sea_names,
            countries,
        }
    }

    /// Loads both layers through `loader` and builds the index.
    ///
    /// # Errors
    ///
    /// Returns any [`LayerError`] from loading.
    pub fn load(loader: &DataLoader) -> Result<Self, LayerError> {
        let (territories, seas) = loader.load_all()?;
        Ok(Self::build(territories, seas))
    }

    /// The territory layer.
    #[must_use]
    pub const fn territories(&self) -> &PolygonLayer<Territory> {
        &self.territories
    }

    /// The sea layer; attributes are sea names.
    #[must_use]
    pub const fn seas(&self) -> &PolygonLayer<String> {
        &self.seas
    }

    /// Distinct sea names in first-appearance order. Position is the sea id.
    #[must_use]
    pub fn sea_names(&self) -> &[String] {
        &self.sea_names
    }

    /// Distinct `(iso, name)` pairs, first appearance wins.
    #[must_use]
    pub fn countries(&self) -> &[(String, String)] {
        &self.countries
    }
}

#[cfg(test)]
mod tests {
    use geo::{MultiPolygon, polygon};

    use super::*;

    fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: x0, y: y0),
            (x: x1, y: y0),
            (x: x1, y: y1),
            (x: x0, y: y1),
            (x: x0, y: y0),
        ]])
    }

    #[test]
    fn build_orders_seas_by_row_id() {
        let seas = vec![
            SeaFeature {
                row_id: 5,
                name: "Coral Sea".to_string(),
                geometry: square(0.0, 0.0, 10.0, 10.0),
            },
            SeaFeature {
                row_id: 1,
                name: "Tasman Sea".to_string(),
                geometry: square(0.0, 0.0, 10.0, 10.0),
            },
        ];
        let index = PolygonIndex::build(Vec::new(), seas);

        assert_eq!(index.sea_names(), ["Tasman Sea", "Coral Sea"]);
        assert_eq!(
            index.seas().locate(5.0, 5.0).unwrap().map(String::as_str),
            Some("Tasman Sea")
        );
        assert!(index.territories().is_empty());
    }

    #[test]
    fn territory_lookup_and_countries() {
        let territories = vec![
            TerritoryFeature {
                iso: "USA".to_string(),
                name: "United States".to_string(),
                geometry: square(-125.0, 25.0, -66.0, 49.0),
            },
            TerritoryFeature {
                iso: "USA".to_string(),
                name: "United States".to_string(),
                geometry: square(-170.0, 51.0, -130.0, 72.0),
            },
            TerritoryFeature {
                iso: "JPN".to_string(),
                name: "Japan".to_string(),
                geometry: square(129.0, 30.0, 146.0, 46.0),
            },
        ];
        let index = PolygonIndex::build(territories, Vec::new());

        assert_eq!(index.territories().len(), 3);
        assert_eq!(
            index.countries(),
            [
                ("USA".to_string(), "United States".to_string()),
                ("JPN".to_string(), "Japan".to_string()),
            ]
        );

        let hit = index.territories().locate(-150.0, 60.0).unwrap();
        assert_eq!(hit.map(|t| t.iso.as_str()), Some("USA"));
        assert_eq!(index.territories().locate(0.0, 0.0).unwrap(), None);
    }
}
