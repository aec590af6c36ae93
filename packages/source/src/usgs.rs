//! USGS earthquake `GeoJSON` feed client.
//!
//! Historical windows come from the FDSN event query endpoint. The
//! endpoint refuses queries that would return too many events with HTTP
//! 400, so a refused window is split in half and each half fetched on its
//! own, down to [`MIN_SPLIT_WINDOW`].

use std::time::Duration;

use chrono::DateTime;
use geojson::{Feature, FeatureCollection, feature::Id};
use quake_map_quake_models::{NormalizedEvent, TimeWindow};
use serde_json::Value;

use crate::SourceError;
use crate::retry::{self, RetryPolicy};

/// FDSN event query endpoint.
pub const DEFAULT_FEED_URL: &str = "https://earthquake.usgs.gov/fdsnws/event/1/query";

/// Live summary feed covering the last 24 hours.
pub const ALL_DAY_FEED_URL: &str =
    "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_day.geojson";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Windows shorter than this are not split further.
pub const MIN_SPLIT_WINDOW: chrono::Duration = chrono::Duration::minutes(1);

/// HTTP client for the USGS feeds.
#[derive(Debug, Clone)]
pub struct FeedClient {
    client: reqwest::Client,
    base_url: String,
    policy: RetryPolicy,
}

impl FeedClient {
    /// Creates a client for the FDSN endpoint at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        policy: RetryPolicy,
    ) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            policy,
        })
    }

    /// The FDSN query URL for a window.
    #[must_use]
    pub fn window_url(&self, window: &TimeWindow) -> String {
        format!(
            "{}?format=geojson&starttime={}&endtime={}",
            self.base_url,
            window.start.format("%Y-%m-%dT%H:%M:%SZ"),
            window.end.format("%Y-%m-%dT%H:%M:%SZ"),
        )
    }

    /// Fetches and normalizes every event in `window`.
    ///
    /// Windows the endpoint refuses with HTTP 400 are split in half
    /// repeatedly; results keep chronological window order.
    ///
    /// # Errors
    ///
    /// Returns the first non-recoverable [`SourceError`], including HTTP 400
    /// on a window already at [`MIN_SPLIT_WINDOW`].
    pub async fn fetch_window(
        &self,
        window: &TimeWindow,
    ) -> Result<Vec<NormalizedEvent>, SourceError> {
        let mut pending = vec![*window];
        let mut events = Vec::new();

        while let Some(current) = pending.pop() {
            let url = self.window_url(&current);
            match self.fetch_url(&url).await {
                Ok(mut batch) => {
                    log::debug!(
                        "{} .. {}: {} events",
                        current.start,
                        current.end,
                        batch.len()
                    );
                    events.append(&mut batch);
                }
                Err(SourceError::Status { status: 400, .. })
                    if current.duration() > MIN_SPLIT_WINDOW =>
                {
                    let (left, right) = current.split();
                    log::info!(
                        "Window {} .. {} refused, splitting at {}",
                        current.start,
                        current.end,
                        left.end
                    );
                    pending.push(right);
                    pending.push(left);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(events)
    }

    /// Fetches and normalizes a `GeoJSON` feed URL.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the request fails after retries or the
    /// body is not a feature collection.
    pub async fn fetch_url(&self, url: &str) -> Result<Vec<NormalizedEvent>, SourceError> {
        let body = retry::send_json(&self.policy, || self.client.get(url)).await?;
        normalize_collection(body)
    }
}

/// Normalizes a feed response into events, skipping features without an
/// id of any kind.
///
/// # Errors
///
/// Returns [`SourceError::Json`] if `value` is not a feature collection.
pub fn normalize_collection(value: Value) -> Result<Vec<NormalizedEvent>, SourceError> {
    let collection: FeatureCollection = serde_json::from_value(value)?;
    let total = collection.features.len();

    let events: Vec<NormalizedEvent> = collection
        .features
        .iter()
        .filter_map(normalize_feature)
        .collect();

    if events.len() < total {
        log::warn!(
            "Skipped {} of {total} features without an event id",
            total - events.len()
        );
    }

    Ok(events)
}

/// Normalizes one feed feature.
///
/// The natural key is `net` + `code` when `net` is present, else `code`,
/// else the feature id. Returns `None` when none of those exist.
#[must_use]
pub fn normalize_feature(feature: &Feature) -> Option<NormalizedEvent> {
    let net = prop_str(feature, "net");
    let code = prop_str(feature, "code");
    let feature_id = match &feature.id {
        Some(Id::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Id::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    let usgs_id = match (&net, &code) {
        (Some(net), Some(code)) => format!("{net}{code}"),
        (_, Some(code)) => code.clone(),
        _ => feature_id?,
    };

    let coords = point_coordinates(feature);
    let coord = |i: usize| coords.get(i).copied();

    Some(NormalizedEvent {
        usgs_id,
        mag: prop_f64(feature, "mag"),
        place: prop_str(feature, "place"),
        time_utc: prop_i64(feature, "time").and_then(DateTime::from_timestamp_millis),
        updated_utc: prop_i64(feature, "updated").and_then(DateTime::from_timestamp_millis),
        url: prop_str(feature, "url"),
        detail_url: prop_str(feature, "detail"),
        tsunami: prop_i64(feature, "tsunami")
            .and_then(|v| i32::try_from(v).ok())
            .unwrap_or(0),
        sig: prop_i64(feature, "sig").and_then(|v| i32::try_from(v).ok()),
        mag_type: prop_str(feature, "magType"),
        event_type: prop_str(feature, "type"),
        title: prop_str(feature, "title"),
        net,
        code,
        depth_km: coord(2),
        longitude: coord(0),
        latitude: coord(1),
    })
}

fn prop<'a>(feature: &'a Feature, key: &str) -> Option<&'a Value> {
    feature
        .properties
        .as_ref()
        .and_then(|p| p.get(key))
        .filter(|v| !v.is_null())
}

fn prop_str(feature: &Feature, key: &str) -> Option<String> {
    match prop(feature, key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn prop_f64(feature: &Feature, key: &str) -> Option<f64> {
    prop(feature, key)?.as_f64().filter(|v| v.is_finite())
}

fn prop_i64(feature: &Feature, key: &str) -> Option<i64> {
    let value = prop(feature, key)?;
    #[allow(clippy::cast_possible_truncation)]
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.round() as i64))
}

fn point_coordinates(feature: &Feature) -> Vec<f64> {
    match feature.geometry.as_ref().map(|g| &g.value) {
        Some(geojson::Value::Point(position)) => position.clone(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone as _, Utc};
    use serde_json::json;

    use super::*;

    fn usgs_feature() -> Value {
        json!({
            "type": "Feature",
            "id": "ci40728416",
            "properties": {
                "mag": 1.72,
                "place": "7 km NW of Toms Place, CA",
                "time": 1_700_000_000_000_i64,
                "updated": 1_700_000_500_000_i64,
                "url": "https://earthquake.usgs.gov/earthquakes/eventpage/ci40728416",
                "detail": "https://earthquake.usgs.gov/fdsnws/event/1/query?eventid=ci40728416&format=geojson",
                "tsunami": 0,
                "sig": 46,
                "net": "ci",
                "code": "40728416",
                "magType": "ml",
                "type": "earthquake",
                "title": "M 1.7 - 7 km NW of Toms Place, CA"
            },
            "geometry": {"type": "Point", "coordinates": [-118.73, 37.61, 5.2]}
        })
    }

    #[test]
    fn normalizes_usgs_feature() {
        let events = normalize_collection(json!({
            "type": "FeatureCollection",
            "metadata": {"count": 1},
            "features": [usgs_feature()]
        }))
        .unwrap();

        assert_eq!(events.len(), 1);
        let e = &events[0];
        assert_eq!(e.usgs_id, "ci40728416");
        assert_eq!(e.mag, Some(1.72));
        assert_eq!(e.sig, Some(46));
        assert_eq!(e.tsunami, 0);
        assert_eq!(e.mag_type.as_deref(), Some("ml"));
        assert_eq!(e.event_type.as_deref(), Some("earthquake"));
        assert_eq!(
            e.time_utc,
            Some(Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap())
        );
        assert_eq!(e.longitude, Some(-118.73));
        assert_eq!(e.latitude, Some(37.61));
        assert_eq!(e.depth_km, Some(5.2));
    }

    #[test]
    fn natural_key_fallbacks() {
        let mut value = usgs_feature();
        value["properties"]["net"] = Value::Null;
        let feature: Feature = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(normalize_feature(&feature).unwrap().usgs_id, "40728416");

        value["properties"]["code"] = Value::Null;
        let feature: Feature = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(normalize_feature(&feature).unwrap().usgs_id, "ci40728416");

        value.as_object_mut().unwrap().remove("id");
        let feature: Feature = serde_json::from_value(value).unwrap();
        assert_eq!(normalize_feature(&feature), None);
    }

    #[test]
    fn missing_geometry_keeps_event() {
        let mut value = usgs_feature();
        value["geometry"] = Value::Null;
        let feature: Feature = serde_json::from_value(value).unwrap();

        let event = normalize_feature(&feature).unwrap();
        assert_eq!(event.latitude, None);
        assert_eq!(event.longitude, None);
        assert_eq!(event.depth_km, None);
    }

    #[test]
    fn window_url_format() {
        let client = FeedClient::new(
            DEFAULT_FEED_URL,
            DEFAULT_TIMEOUT,
            RetryPolicy::default(),
        )
        .unwrap();
        let window = TimeWindow::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 1, 31, 23, 59, 59).unwrap(),
        );
        assert_eq!(
            client.window_url(&window),
            "https://earthquake.usgs.gov/fdsnws/event/1/query?format=geojson\
             &starttime=2025-01-01T00:00:00Z&endtime=2025-01-31T23:59:59Z"
        );
    }

    #[test]
    fn non_collection_is_rejected() {
        assert!(normalize_collection(json!({"type": "Point", "coordinates": [0, 0]})).is_err());
    }
}
