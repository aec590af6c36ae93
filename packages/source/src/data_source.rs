//! Event sources for display.
//!
//! The dashboard reads events either from the local store (landed history)
//! or straight from the live summary feed. Both return the same `GeoJSON`
//! feature collection shape so the renderer does not care which one it
//! got.

use std::path::PathBuf;

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue, feature::Id};
use quake_map_database::{Store, events::query_events};
use quake_map_quake_models::{EventFilters, NormalizedEvent, TimeWindow};

use crate::SourceError;
use crate::usgs::FeedClient;

/// Where events are read from.
#[derive(Debug, Clone)]
pub enum EventSource {
    /// The local `DuckDB` store.
    Database(DatabaseSource),
    /// A live USGS summary feed.
    Http(HttpSource),
}

impl EventSource {
    /// Short label for logs and UI.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Database(_) => "database",
            Self::Http(_) => "http",
        }
    }

    /// Reads events in `window` matching `filters`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the underlying store or feed fails.
    pub async fn fetch(
        &self,
        window: &TimeWindow,
        filters: &EventFilters,
    ) -> Result<FeatureCollection, SourceError> {
        let collection = match self {
            Self::Database(source) => source.fetch(window, filters)?,
            Self::Http(source) => source.fetch(window, filters).await?,
        };
        log::debug!(
            "{} source returned {} features",
            self.name(),
            collection.features.len()
        );
        Ok(collection)
    }
}

/// Reads landed events from a store file.
#[derive(Debug, Clone)]
pub struct DatabaseSource {
    path: PathBuf,
}

impl DatabaseSource {
    /// Source backed by the store file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store file path.
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Opens the store for the duration of one query.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Db`] if the store cannot be opened or queried.
    pub fn fetch(
        &self,
        window: &TimeWindow,
        filters: &EventFilters,
    ) -> Result<FeatureCollection, SourceError> {
        let store = Store::open(&self.path)?;
        let events = query_events(store.conn(), window, filters)?;
        store.close()?;

        let features = events
            .iter()
            .map(|e| feature_from_event(&e.event, Some(e.id)))
            .collect();
        Ok(FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        })
    }
}

/// Reads events from a live summary feed, filtering in memory.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: FeedClient,
    url: String,
}

impl HttpSource {
    /// Source that reads the summary feed at `url` through `client`.
    #[must_use]
    pub fn new(client: FeedClient, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    /// Fetches the feed and keeps events in `window` that pass `filters`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the feed request fails.
    pub async fn fetch(
        &self,
        window: &TimeWindow,
        filters: &EventFilters,
    ) -> Result<FeatureCollection, SourceError> {
        let events = self.client.fetch_url(&self.url).await?;
        Ok(events_to_feature_collection(&select_events(
            events, window, filters,
        )))
    }
}

/// Applies the window, filters, ordering, and limit to feed events.
fn select_events(
    events: Vec<NormalizedEvent>,
    window: &TimeWindow,
    filters: &EventFilters,
) -> Vec<NormalizedEvent> {
    let mut selected: Vec<NormalizedEvent> = events
        .into_iter()
        .filter(|e| e.time_utc.is_some_and(|t| window.contains(t)))
        .filter(|e| filters.matches(e))
        .collect();

    selected.sort_by(|a, b| b.time_utc.cmp(&a.time_utc));
    selected.truncate(usize::try_from(filters.limit).unwrap_or(usize::MAX));
    selected
}

/// Converts events into a feature collection without store ids.
#[must_use]
pub fn events_to_feature_collection(events: &[NormalizedEvent]) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features: events.iter().map(|e| feature_from_event(e, None)).collect(),
        foreign_members: None,
    }
}

/// Builds the display feature for one event.
///
/// Events without coordinates get a null geometry. A missing origin time
/// is rendered as `0`.
#[must_use]
pub fn feature_from_event(event: &NormalizedEvent, id: Option<i64>) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert(
        "time".to_string(),
        JsonValue::from(event.time_utc.map_or(0, |t| t.timestamp_millis())),
    );
    properties.insert("mag".to_string(), JsonValue::from(event.mag));
    properties.insert("place".to_string(), JsonValue::from(event.place.clone()));
    properties.insert("depth_km".to_string(), JsonValue::from(event.depth_km));
    properties.insert("lon".to_string(), JsonValue::from(event.longitude));
    properties.insert("lat".to_string(), JsonValue::from(event.latitude));
    properties.insert("tsunami".to_string(), JsonValue::from(event.tsunami));
    properties.insert("net".to_string(), JsonValue::from(event.net.clone()));
    properties.insert("url".to_string(), JsonValue::from(event.url.clone()));
    properties.insert("title".to_string(), JsonValue::from(event.title.clone()));
    properties.insert("usgs_id".to_string(), JsonValue::from(event.usgs_id.clone()));

    let geometry = match (event.longitude, event.latitude) {
        (Some(lon), Some(lat)) => {
            let mut position = vec![lon, lat];
            if let Some(depth) = event.depth_km {
                position.push(depth);
            }
            Some(Geometry::new(geojson::Value::Point(position)))
        }
        _ => None,
    };

    Feature {
        bbox: None,
        geometry,
        id: Some(id.map_or_else(
            || Id::String(event.usgs_id.clone()),
            |id| Id::Number(id.into()),
        )),
        properties: Some(properties),
        foreign_members: None,
    }
}
