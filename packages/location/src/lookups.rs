//! Population of the `country` and `sea` lookup tables.
//!
//! Sea ids are assigned here, once, as `0..N-1` over the sea layer's
//! distinct names in row-id order. Resolution only ever reads them back.

use duckdb::Connection;
use quake_map_database::{DbError, lookups as db};
use quake_map_geography::loader::{distinct_sea_names, distinct_territories};
use quake_map_geography::{DataLoader, PolygonIndex, SeaFeature, TerritoryFeature};
use quake_map_location_models::{Country, SeaLookup};

use crate::LookupError;

/// Writes one `country` row per distinct ISO code (first seen wins).
///
/// Returns the number of rows written.
///
/// # Errors
///
/// Returns [`DbError`] if the upsert fails.
pub fn populate_countries(
    conn: &Connection,
    territories: &[TerritoryFeature],
) -> Result<u64, DbError> {
    write_countries(conn, &distinct_territories(territories))
}

/// Assigns sea ids from the layer and writes them to the `sea` table.
///
/// Returns the number of seas in the assignment.
///
/// # Errors
///
/// Returns [`DbError`] if the table cannot be updated.
pub fn populate_seas(conn: &Connection, seas: &[SeaFeature]) -> Result<u64, DbError> {
    db::replace_seas(conn, &distinct_sea_names(seas))
}

/// Populates both tables from an already-built index.
///
/// # Errors
///
/// Returns [`DbError`] if either table cannot be written.
pub fn populate_from_index(conn: &Connection, index: &PolygonIndex) -> Result<(u64, u64), DbError> {
    let countries = write_countries(conn, index.countries())?;
    let seas = db::replace_seas(conn, index.sea_names())?;
    log::info!("Lookup tables populated: {countries} countries, {seas} seas");
    Ok((countries, seas))
}

/// Loads both polygon layers and populates both tables.
///
/// Returns `(countries, seas)`.
///
/// # Errors
///
/// Returns [`LookupError`] if a layer cannot be loaded or a table cannot
/// be written.
pub fn populate_all(conn: &Connection, loader: &DataLoader) -> Result<(u64, u64), LookupError> {
    let (territories, seas) = loader.load_all()?;
    let countries = populate_countries(conn, &territories)?;
    let seas = populate_seas(conn, &seas)?;
    log::info!("Lookup tables populated: {countries} countries, {seas} seas");
    Ok((countries, seas))
}

/// Reads the `sea` table into a name → id lookup.
///
/// # Errors
///
/// Returns [`DbError`] if the query fails.
pub fn load_sea_lookup(conn: &Connection) -> Result<SeaLookup, DbError> {
    Ok(SeaLookup::from_rows(&db::load_seas(conn)?))
}

fn write_countries(conn: &Connection, pairs: &[(String, String)]) -> Result<u64, DbError> {
    let rows: Vec<Country> = pairs
        .iter()
        .map(|(iso, name)| Country {
            iso: iso.clone(),
            name: name.clone(),
        })
        .collect();
    db::upsert_countries(conn, &rows)
}
