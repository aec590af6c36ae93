#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Earthquake event, time window, and landing catalog types.
//!
//! Events arrive from the seismic feed as [`NormalizedEvent`] records and
//! are stored as [`Event`] rows keyed by a surrogate integer id. The
//! month-partitioned landing process tracks its progress in
//! [`CatalogEntry`] rows.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// An earthquake normalized from the feed, before it has a store id.
///
/// Coordinates are optional: the feed occasionally omits the geometry,
/// and such events are still stored (they are just never located).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedEvent {
    /// Stable natural key (`net` + `code`, or `code` alone).
    pub usgs_id: String,
    /// Magnitude.
    pub mag: Option<f64>,
    /// Human-readable place description (e.g. "10 km SSW of Idyllwild, CA").
    pub place: Option<String>,
    /// Origin time.
    pub time_utc: Option<DateTime<Utc>>,
    /// Last time the feed updated this event.
    pub updated_utc: Option<DateTime<Utc>>,
    /// Event page URL.
    pub url: Option<String>,
    /// Detail `GeoJSON` URL.
    pub detail_url: Option<String>,
    /// `1` when a tsunami flag was raised, otherwise `0`.
    pub tsunami: i32,
    /// Significance score.
    pub sig: Option<i32>,
    /// Magnitude type (e.g. "ml", "mww").
    pub mag_type: Option<String>,
    /// Event type (e.g. "earthquake", "quarry blast").
    pub event_type: Option<String>,
    /// Feed title.
    pub title: Option<String>,
    /// Contributing network.
    pub net: Option<String>,
    /// Network-specific event code.
    pub code: Option<String>,
    /// Hypocenter depth in kilometers.
    pub depth_km: Option<f64>,
    /// Longitude (WGS84).
    pub longitude: Option<f64>,
    /// Latitude (WGS84).
    pub latitude: Option<f64>,
}

/// A landed event with its store id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Surrogate store id.
    pub id: i64,
    /// Event attributes.
    #[serde(flatten)]
    pub event: NormalizedEvent,
}

/// The minimal event projection needed for location enrichment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EventPoint {
    /// Event store id.
    pub id: i64,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

/// A closed UTC time interval `[start, end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Inclusive end.
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a window, swapping the bounds if they are reversed.
    #[must_use]
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// Length of the window.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Whether `t` falls inside the window (both ends inclusive).
    #[must_use]
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t <= self.end
    }

    /// Splits the window in two halves that do not share a second:
    /// `[start, mid]` and `[mid + 1s, end]`.
    #[must_use]
    pub fn split(&self) -> (Self, Self) {
        let mid = self.start + self.duration() / 2;
        let right_start = (mid + Duration::seconds(1)).min(self.end);
        (
            Self {
                start: self.start,
                end: mid,
            },
            Self {
                start: right_start,
                end: self.end,
            },
        )
    }
}

/// Axis-aligned longitude/latitude bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBox {
    /// Western edge.
    pub min_lon: f64,
    /// Southern edge.
    pub min_lat: f64,
    /// Eastern edge.
    pub max_lon: f64,
    /// Northern edge.
    pub max_lat: f64,
}

impl BoundingBox {
    /// Whether the point lies inside or on the edge of the box.
    #[must_use]
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        self.min_lon <= lon && lon <= self.max_lon && self.min_lat <= lat && lat <= self.max_lat
    }
}

/// Default maximum number of events returned by an event query.
pub const DEFAULT_QUERY_LIMIT: u32 = 5_000;

/// Filters applied when reading events for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFilters {
    /// Minimum magnitude (inclusive).
    pub mag_min: f64,
    /// Maximum magnitude (inclusive).
    pub mag_max: f64,
    /// Minimum depth in km (inclusive).
    pub depth_min: f64,
    /// Maximum depth in km (inclusive).
    pub depth_max: f64,
    /// Only events with the tsunami flag set.
    pub tsunami_only: bool,
    /// Case-insensitive substring matched against place and title.
    pub text_query: Option<String>,
    /// Lowercase network codes; empty means all networks.
    pub networks: Vec<String>,
    /// Spatial restriction.
    pub bbox: Option<BoundingBox>,
    /// Maximum number of events, newest first.
    pub limit: u32,
}

impl Default for EventFilters {
    fn default() -> Self {
        Self {
            mag_min: 0.0,
            mag_max: 10.0,
            depth_min: 0.0,
            depth_max: 700.0,
            tsunami_only: false,
            text_query: None,
            networks: Vec::new(),
            bbox: None,
            limit: DEFAULT_QUERY_LIMIT,
        }
    }
}

impl EventFilters {
    /// Trimmed, lowercased text query, or `None` when blank.
    #[must_use]
    pub fn normalized_text(&self) -> Option<String> {
        self.text_query
            .as_deref()
            .map(|q| q.trim().to_lowercase())
            .filter(|q| !q.is_empty())
    }

    /// Trimmed, lowercased, non-empty network codes.
    #[must_use]
    pub fn normalized_networks(&self) -> Vec<String> {
        self.networks
            .iter()
            .map(|n| n.trim().to_lowercase())
            .filter(|n| !n.is_empty())
            .collect()
    }

    /// Whether an event passes every filter except the time window and
    /// the limit.
    ///
    /// Events without a magnitude or depth never match the range filters.
    #[must_use]
    pub fn matches(&self, event: &NormalizedEvent) -> bool {
        let Some(mag) = event.mag else {
            return false;
        };
        let Some(depth) = event.depth_km else {
            return false;
        };
        if mag < self.mag_min || mag > self.mag_max {
            return false;
        }
        if depth < self.depth_min || depth > self.depth_max {
            return false;
        }
        if self.tsunami_only && event.tsunami != 1 {
            return false;
        }
        if let Some(query) = self.normalized_text() {
            let hit = [event.place.as_deref(), event.title.as_deref()]
                .into_iter()
                .flatten()
                .any(|s| s.to_lowercase().contains(&query));
            if !hit {
                return false;
            }
        }
        let networks = self.normalized_networks();
        if !networks.is_empty() {
            let Some(net) = event.net.as_deref() else {
                return false;
            };
            if !networks.iter().any(|n| n == &net.to_lowercase()) {
                return false;
            }
        }
        if let Some(bbox) = self.bbox {
            match (event.longitude, event.latitude) {
                (Some(lon), Some(lat)) if bbox.contains(lon, lat) => {}
                _ => return false,
            }
        }
        true
    }
}

/// Landing status of one calendar month.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CatalogStatus {
    /// Known but never attempted.
    Pending,
    /// A landing attempt is in flight.
    Landing,
    /// Data for the recorded window is in the store.
    Landed,
    /// The last attempt failed.
    Error,
}

/// One row of the coverage catalog (one per calendar month).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// First day of the month.
    pub month_start: NaiveDate,
    /// Current landing status.
    pub status: CatalogStatus,
    /// Whether the month is closed out and will not be re-fetched.
    pub finalized: bool,
    /// Number of events landed for the window.
    pub row_count: u64,
    /// Actual window covered.
    pub coverage: TimeWindow,
    /// Last error message, if the status is [`CatalogStatus::Error`].
    pub error: Option<String>,
    /// Last time the row was written.
    pub updated_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use std::str::FromStr as _;

    use chrono::TimeZone as _;

    use super::*;

    fn event(mag: f64, depth: f64) -> NormalizedEvent {
        NormalizedEvent {
            usgs_id: "us7000abcd".to_string(),
            mag: Some(mag),
            place: Some("45 km W of Ferndale, CA".to_string()),
            time_utc: None,
            updated_utc: None,
            url: None,
            detail_url: None,
            tsunami: 0,
            sig: None,
            mag_type: None,
            event_type: Some("earthquake".to_string()),
            title: Some("M 4.1 - 45 km W of Ferndale, CA".to_string()),
            net: Some("NC".to_string()),
            code: Some("7000abcd".to_string()),
            depth_km: Some(depth),
            longitude: Some(-124.8),
            latitude: Some(40.6),
        }
    }

    #[test]
    fn catalog_status_strings() {
        assert_eq!(CatalogStatus::Landed.as_ref(), "landed");
        assert_eq!(
            CatalogStatus::from_str("landing").unwrap(),
            CatalogStatus::Landing
        );
        assert!(CatalogStatus::from_str("done").is_err());
    }

    #[test]
    fn window_split_does_not_overlap() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 1, 31, 23, 59, 59).unwrap();
        let (left, right) = TimeWindow::new(start, end).split();
        assert_eq!(left.start, start);
        assert_eq!(right.end, end);
        assert_eq!(right.start - left.end, Duration::seconds(1));
    }

    #[test]
    fn window_new_orders_bounds() {
        let a = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let w = TimeWindow::new(a, b);
        assert_eq!(w.start, b);
        assert!(w.contains(a));
    }

    #[test]
    fn default_filters_match_typical_event() {
        assert!(EventFilters::default().matches(&event(4.1, 12.0)));
    }

    #[test]
    fn filters_reject_out_of_range() {
        let filters = EventFilters {
            mag_min: 5.0,
            ..EventFilters::default()
        };
        assert!(!filters.matches(&event(4.1, 12.0)));

        let filters = EventFilters {
            depth_max: 10.0,
            ..EventFilters::default()
        };
        assert!(!filters.matches(&event(4.1, 12.0)));
    }

    #[test]
    fn filters_text_and_network_are_case_insensitive() {
        let filters = EventFilters {
            text_query: Some("  FERNDALE ".to_string()),
            networks: vec!["nc".to_string(), " ".to_string()],
            ..EventFilters::default()
        };
        assert!(filters.matches(&event(4.1, 12.0)));

        let filters = EventFilters {
            networks: vec!["us".to_string()],
            ..EventFilters::default()
        };
        assert!(!filters.matches(&event(4.1, 12.0)));
    }

    #[test]
    fn filters_bbox_requires_coordinates() {
        let filters = EventFilters {
            bbox: Some(BoundingBox {
                min_lon: -125.0,
                min_lat: 40.0,
                max_lon: -124.0,
                max_lat: 41.0,
            }),
            ..EventFilters::default()
        };
        assert!(filters.matches(&event(4.1, 12.0)));

        let mut no_coords = event(4.1, 12.0);
        no_coords.longitude = None;
        assert!(!filters.matches(&no_coords));
    }
}
