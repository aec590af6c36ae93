#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Location classification, lookup table, and enrichment report types.
//!
//! A [`Classification`] says which sovereign territory (by ISO code) and
//! which named sea (by lookup id) contain a point. Either side may be
//! absent. Classifications are persisted one-per-event as
//! [`LocationRecord`] rows.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identifier of a row in the `sea` lookup table.
pub type SeaId = i32;

/// The enclosing territory and sea of a point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    /// ISO sovereignty code of the enclosing territory/EEZ polygon.
    pub country: Option<String>,
    /// Lookup id of the enclosing sea polygon.
    pub sea: Option<SeaId>,
}

/// A classification attached to one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRecord {
    /// Event store id.
    pub quake_id: i64,
    /// ISO sovereignty code.
    pub country_iso: Option<String>,
    /// Sea lookup id.
    pub sea_id: Option<SeaId>,
}

impl LocationRecord {
    /// Builds the record for `quake_id` from a classification.
    #[must_use]
    pub fn new(quake_id: i64, classification: Classification) -> Self {
        Self {
            quake_id,
            country_iso: classification.country,
            sea_id: classification.sea,
        }
    }
}

/// A row of the `country` lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Country {
    /// ISO sovereignty code (uppercase).
    pub iso: String,
    /// Display name.
    pub name: String,
}

/// A row of the `sea` lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sea {
    /// Stable id assigned by first appearance in the sea layer.
    pub id: SeaId,
    /// Display name (unique).
    pub name: String,
}

/// Name → id mapping read back from the populated `sea` table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeaLookup {
    by_name: BTreeMap<String, SeaId>,
}

impl SeaLookup {
    /// Builds the mapping from lookup rows.
    #[must_use]
    pub fn from_rows(rows: &[Sea]) -> Self {
        Self {
            by_name: rows.iter().map(|s| (s.name.clone(), s.id)).collect(),
        }
    }

    /// Id for a sea name.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<SeaId> {
        self.by_name.get(name).copied()
    }

    /// Whether the lookup table has been populated at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Number of seas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }
}

/// Summary of one enrichment run.
///
/// `degraded` counts layer lookups that fell back to an absent result
/// because of a geometry fault; the `location` table itself cannot tell
/// those apart from points that are legitimately outside every polygon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentReport {
    /// Events selected for resolution.
    pub selected: u64,
    /// Location rows upserted.
    pub written: u64,
    /// Country or sea lookups degraded to `None`.
    pub degraded: u64,
}
