#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Earthquake event sources.
//!
//! [`usgs`] talks to the USGS `GeoJSON` endpoints (with [`retry`] for
//! transient failures) and normalizes features into
//! [`quake_map_quake_models::NormalizedEvent`]s. [`data_source`] exposes
//! the two ways the dashboard reads events: from the local store or from
//! the live feed.

pub mod data_source;
pub mod progress;
pub mod retry;
pub mod usgs;

pub use data_source::{DatabaseSource, EventSource, HttpSource};
pub use usgs::FeedClient;

/// Errors that can occur during event source operations.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered with a non-success status.
    #[error("HTTP {status} from {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// Data normalization error.
    #[error("Normalization error: {message}")]
    Normalization {
        /// Description of what went wrong.
        message: String,
    },

    /// Event store error.
    #[error(transparent)]
    Db(#[from] quake_map_database::DbError),
}
