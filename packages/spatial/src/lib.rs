#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! In-memory polygon layers for point classification.
//!
//! A [`PolygonLayer`] owns a set of (attribute, polygon) pairs and an
//! R-tree over their bounding boxes. Lookups use the tree as a cheap
//! pre-filter and then run an exact, boundary-inclusive containment test
//! on the surviving candidates. Layers are built once and never mutated.

use geo::coordinate_position::{CoordPos, CoordinatePosition};
use geo::{BoundingRect, Coord, CoordsIter, MultiPolygon};
use geojson::GeoJson;
use rstar::{AABB, RTree, RTreeObject};

/// A per-point, per-layer failure of the exact containment test.
///
/// Callers are expected to degrade the lookup to "no match" and count
/// the fault rather than abort.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum GeometryFault {
    /// The query coordinate is not a finite longitude/latitude in range.
    #[error("invalid point: lng={lng}, lat={lat}")]
    InvalidPoint {
        /// Query longitude.
        lng: f64,
        /// Query latitude.
        lat: f64,
    },

    /// A candidate polygon is degenerate and cannot be tested.
    #[error("malformed geometry at layer position {ordinal}")]
    MalformedGeometry {
        /// Position of the polygon in the source layer.
        ordinal: usize,
    },
}

/// A polygon stored in the R-tree, pointing back at its attributes.
struct LayerEntry {
    ordinal: usize,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
    malformed: bool,
}

impl RTreeObject for LayerEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// A read-only polygon layer with an R-tree bounding-box index.
///
/// Every kept feature gets an ordinal equal to its position among the
/// kept features, so ordinals follow source order. When several polygons
/// cover a point, the one with the lowest ordinal wins.
pub struct PolygonLayer<A> {
    tree: RTree<LayerEntry>,
    attributes: Vec<A>,
    skipped: usize,
}

impl<A> std::fmt::Debug for PolygonLayer<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolygonLayer")
            .field("len", &self.attributes.len())
            .field("skipped", &self.skipped)
            .finish_non_exhaustive()
    }
}

impl<A> PolygonLayer<A> {
    /// Builds the layer and its R-tree from features in source order.
    ///
    /// Empty geometries and geometries with non-finite coordinates are
    /// dropped (and counted in [`Self::skipped`]). Polygons with a
    /// degenerate exterior ring are kept but flagged, so that lookups
    /// touching them report a [`GeometryFault`].
    #[must_use]
    pub fn build(features: impl IntoIterator<Item = (A, MultiPolygon<f64>)>) -> Self {
        let mut attributes = Vec::new();
        let mut entries = Vec::new();
        let mut skipped = 0usize;

        for (attrs, polygon) in features {
            if polygon.0.is_empty() {
                skipped += 1;
                continue;
            }
            if !has_finite_coords(&polygon) {
                log::warn!("Dropping polygon with non-finite coordinates");
                skipped += 1;
                continue;
            }

            let ordinal = attributes.len();
            let malformed = is_degenerate(&polygon);
            if malformed {
                log::warn!("Polygon at layer position {ordinal} has a degenerate ring");
            }

            entries.push(LayerEntry {
                ordinal,
                envelope: compute_envelope(&polygon),
                polygon,
                malformed,
            });
            attributes.push(attrs);
        }

        Self {
            tree: RTree::bulk_load(entries),
            attributes,
            skipped,
        }
    }

    /// Number of indexed polygons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether the layer has no polygons.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Number of source features dropped at build time.
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.skipped
    }

    /// Attributes of the polygon at `ordinal`.
    #[must_use]
    pub fn get(&self, ordinal: usize) -> Option<&A> {
        self.attributes.get(ordinal)
    }

    /// Iterates attributes in source order.
    pub fn iter(&self) -> impl Iterator<Item = &A> {
        self.attributes.iter()
    }

    /// Ordinals of polygons whose bounding box contains the point,
    /// in source order. False positives are expected.
    #[must_use]
    pub fn candidates(&self, lng: f64, lat: f64) -> Vec<usize> {
        let mut ordinals: Vec<usize> = self
            .candidate_entries(lng, lat)
            .into_iter()
            .map(|e| e.ordinal)
            .collect();
        ordinals.sort_unstable();
        ordinals
    }

    /// Finds the first polygon (in source order) that covers the point.
    ///
    /// Points on a polygon's boundary count as covered. Returns `Ok(None)`
    /// when no polygon covers the point.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryFault::InvalidPoint`] for non-finite or
    /// out-of-range coordinates, and [`GeometryFault::MalformedGeometry`]
    /// when a degenerate candidate is reached before any match.
    pub fn locate(&self, lng: f64, lat: f64) -> Result<Option<&A>, GeometryFault> {
        if !is_valid_point(lng, lat) {
            return Err(GeometryFault::InvalidPoint { lng, lat });
        }

        let coord = Coord { x: lng, y: lat };
        let mut entries = self.candidate_entries(lng, lat);
        entries.sort_unstable_by_key(|e| e.ordinal);

        for entry in entries {
            if entry.malformed {
                return Err(GeometryFault::MalformedGeometry {
                    ordinal: entry.ordinal,
                });
            }
            if entry.polygon.coordinate_position(&coord) != CoordPos::Outside {
                return Ok(self.attributes.get(entry.ordinal));
            }
        }

        Ok(None)
    }

    fn candidate_entries(&self, lng: f64, lat: f64) -> Vec<&LayerEntry> {
        let query_env = AABB::from_point([lng, lat]);
        self.tree
            .locate_in_envelope_intersecting(&query_env)
            .collect()
    }
}

/// Whether the coordinate is a finite WGS84 longitude/latitude.
#[must_use]
pub fn is_valid_point(lng: f64, lat: f64) -> bool {
    lng.is_finite()
        && lat.is_finite()
        && (-180.0..=180.0).contains(&lng)
        && (-90.0..=90.0).contains(&lat)
}

/// Parse a `GeoJSON` geometry string into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
#[must_use]
pub fn parse_geojson_to_multipolygon(geojson_str: &str) -> Option<MultiPolygon<f64>> {
    let geojson: GeoJson = geojson_str.parse().ok()?;
    if let GeoJson::Geometry(geom) = geojson {
        let geo_geom: geo::Geometry<f64> = geom.try_into().ok()?;
        into_multipolygon(geo_geom)
    } else {
        None
    }
}

/// Narrows a geometry to a [`MultiPolygon`], or `None` for non-areal types.
#[must_use]
pub fn into_multipolygon(geometry: geo::Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

fn has_finite_coords(mp: &MultiPolygon<f64>) -> bool {
    mp.coords_iter().all(|c| c.x.is_finite() && c.y.is_finite())
}

/// A closed exterior ring needs at least four coordinates.
fn is_degenerate(mp: &MultiPolygon<f64>) -> bool {
    mp.0.iter().any(|p| p.exterior().0.len() < 4)
}

#[cfg(test)]
mod tests {
    use geo::{LineString, Polygon, polygon};

    use super::*;

    fn square(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: min_x, y: min_y),
            (x: max_x, y: min_y),
            (x: max_x, y: max_y),
            (x: min_x, y: max_y),
            (x: min_x, y: min_y),
        ]])
    }

    #[test]
    fn interior_point_is_found() {
        let layer = PolygonLayer::build(vec![("A", square(0.0, 0.0, 10.0, 10.0))]);
        assert_eq!(layer.locate(5.0, 5.0).unwrap(), Some(&"A"));
    }

    #[test]
    fn boundary_points_are_covered() {
        let layer = PolygonLayer::build(vec![("A", square(0.0, 0.0, 10.0, 10.0))]);
        // On an edge
        assert_eq!(layer.locate(10.0, 5.0).unwrap(), Some(&"A"));
        // On a vertex
        assert_eq!(layer.locate(0.0, 0.0).unwrap(), Some(&"A"));
    }

    #[test]
    fn outside_point_is_absent() {
        let layer = PolygonLayer::build(vec![("A", square(0.0, 0.0, 10.0, 10.0))]);
        assert_eq!(layer.locate(20.0, 5.0).unwrap(), None);
        assert!(layer.candidates(20.0, 5.0).is_empty());
    }

    #[test]
    fn bbox_candidate_without_containment_is_absent() {
        // L-shaped polygon: the notch at (8, 8) is inside the bbox only.
        let l_shape = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 5.0),
            (x: 5.0, y: 5.0),
            (x: 5.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ]]);
        let layer = PolygonLayer::build(vec![("L", l_shape)]);
        assert_eq!(layer.candidates(8.0, 8.0), vec![0]);
        assert_eq!(layer.locate(8.0, 8.0).unwrap(), None);
        assert_eq!(layer.locate(2.0, 8.0).unwrap(), Some(&"L"));
    }

    #[test]
    fn holes_are_excluded() {
        let exterior = LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)]);
        let hole = LineString::from(vec![(4.0, 4.0), (6.0, 4.0), (6.0, 6.0), (4.0, 6.0)]);
        let layer = PolygonLayer::build(vec![(
            "donut",
            MultiPolygon(vec![Polygon::new(exterior, vec![hole])]),
        )]);
        assert_eq!(layer.locate(5.0, 5.0).unwrap(), None);
        assert_eq!(layer.locate(1.0, 1.0).unwrap(), Some(&"donut"));
        // The hole's edge is still the polygon's boundary.
        assert_eq!(layer.locate(4.0, 5.0).unwrap(), Some(&"donut"));
    }

    #[test]
    fn overlapping_polygons_resolve_in_source_order() {
        let layer = PolygonLayer::build(vec![
            ("first", square(0.0, 0.0, 10.0, 10.0)),
            ("second", square(5.0, 5.0, 15.0, 15.0)),
        ]);
        assert_eq!(layer.locate(7.0, 7.0).unwrap(), Some(&"first"));
        assert_eq!(layer.locate(12.0, 12.0).unwrap(), Some(&"second"));
        assert_eq!(layer.candidates(7.0, 7.0), vec![0, 1]);
    }

    #[test]
    fn invalid_points_fault() {
        let layer = PolygonLayer::build(vec![("A", square(0.0, 0.0, 10.0, 10.0))]);
        assert!(matches!(
            layer.locate(f64::NAN, 5.0),
            Err(GeometryFault::InvalidPoint { .. })
        ));
        assert!(matches!(
            layer.locate(5.0, 95.0),
            Err(GeometryFault::InvalidPoint { .. })
        ));
    }

    #[test]
    fn degenerate_candidate_faults() {
        let sliver = MultiPolygon(vec![Polygon::new(
            LineString::from(vec![(0.0, 0.0), (10.0, 10.0)]),
            vec![],
        )]);
        let layer = PolygonLayer::build(vec![("sliver", sliver)]);
        assert_eq!(layer.len(), 1);
        assert_eq!(
            layer.locate(5.0, 5.0),
            Err(GeometryFault::MalformedGeometry { ordinal: 0 })
        );
    }

    #[test]
    fn non_finite_and_empty_geometries_are_skipped() {
        let bad = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: f64::INFINITY, y: 0.0),
            (x: 1.0, y: 1.0),
        ]]);
        let layer = PolygonLayer::build(vec![
            ("bad", bad),
            ("empty", MultiPolygon(vec![])),
            ("good", square(0.0, 0.0, 1.0, 1.0)),
        ]);
        assert_eq!(layer.len(), 1);
        assert_eq!(layer.skipped(), 2);
        assert_eq!(layer.get(0), Some(&"good"));
    }

    #[test]
    fn parses_polygon_geojson() {
        let mp = parse_geojson_to_multipolygon(
            r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}"#,
        )
        .unwrap();
        assert_eq!(mp.0.len(), 1);
        assert!(parse_geojson_to_multipolygon(r#"{"type":"Point","coordinates":[0,0]}"#).is_none());
        assert!(parse_geojson_to_multipolygon("not json").is_none());
    }
}
