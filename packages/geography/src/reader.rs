//! Polygon source readers.
//!
//! A source file is opened once with [`open_layer`], which resolves its
//! format, layer, attribute columns and coordinate reference system into a
//! [`LayerSchema`]. Callers check the schema for the attributes they need
//! and then [`OpenLayer::read`] exactly those columns plus the geometry,
//! already converted to WGS84 longitude/latitude.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use duckdb::Connection;
use geo::MultiPolygon;
use geojson::{FeatureCollection, GeoJson};
use quake_map_spatial::{into_multipolygon, parse_geojson_to_multipolygon};

use crate::LayerError;

/// Layer to read from multi-layer `GeoPackage` files when present.
pub const PREFERRED_LAYER: &str = "ocean";

/// On-disk polygon formats, chosen by file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// ESRI shapefile (`.shp` plus `.shx`/`.dbf` sidecars).
    Shapefile,
    /// OGC `GeoPackage` (`.gpkg`).
    GeoPackage,
    /// `GeoJSON` feature collection (`.geojson` / `.json`).
    GeoJson,
}

impl SourceFormat {
    /// Detects the format from the file extension (case-insensitive).
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "shp" => Some(Self::Shapefile),
            "gpkg" => Some(Self::GeoPackage),
            "geojson" | "json" => Some(Self::GeoJson),
            _ => None,
        }
    }
}

/// A coordinate reference system identified by authority and code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCrs {
    /// Authority name (e.g. `EPSG`).
    pub auth_name: String,
    /// Authority code (e.g. `4326`).
    pub auth_code: String,
}

impl SourceCrs {
    /// Whether this is geographic WGS84 with longitude/latitude axes.
    #[must_use]
    pub fn is_wgs84(&self) -> bool {
        let name = self.auth_name.to_ascii_uppercase();
        (name == "EPSG" && self.auth_code == "4326") || (name == "OGC" && self.auth_code == "CRS84")
    }

    /// `AUTH:CODE` identifier.
    #[must_use]
    pub fn identifier(&self) -> String {
        format!("{}:{}", self.auth_name, self.auth_code)
    }
}

/// What a source file contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerSchema {
    /// File the layer was read from.
    pub path: PathBuf,
    /// File format.
    pub format: SourceFormat,
    /// Layer name inside the file, for multi-layer formats.
    pub layer: Option<String>,
    /// Attribute column names in source order (geometry excluded).
    pub columns: Vec<String>,
    /// Declared CRS, if the source carries one.
    pub crs: Option<SourceCrs>,
}

impl LayerSchema {
    /// Whether an attribute column with exactly this name exists.
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Finds a column by case-insensitive name, returning its actual name.
    #[must_use]
    pub fn find_column(&self, name: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| c.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    fn needs_reprojection(&self) -> bool {
        self.crs.as_ref().is_some_and(|crs| !crs.is_wgs84())
    }
}

/// One feature read from a source: the requested attributes (stringified)
/// and its areal geometry in WGS84.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// Requested attribute values; `None` for SQL/JSON nulls.
    pub attributes: BTreeMap<String, Option<String>>,
    /// Geometry, or `None` if missing or not a (multi)polygon.
    pub geometry: Option<MultiPolygon<f64>>,
}

impl SourceRow {
    /// Attribute value by column name.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&str> {
        self.attributes.get(column).and_then(|v| v.as_deref())
    }
}

enum Backend {
    DuckDb {
        conn: Connection,
        geometry_column: String,
    },
    GeoJson(FeatureCollection),
}

/// A polygon source opened for reading.
pub struct OpenLayer {
    schema: LayerSchema,
    backend: Backend,
}

/// Opens a polygon source and resolves its schema.
///
/// # Errors
///
/// Returns [`LayerError`] if the format is unknown, the file cannot be
/// parsed, it has no layers, or it declares an unsupported CRS.
pub fn open_layer(path: &Path) -> Result<OpenLayer, LayerError> {
    let format = SourceFormat::from_path(path).ok_or_else(|| LayerError::Conversion {
        message: format!("Unrecognized polygon file type: {}", path.display()),
    })?;

    match format {
        SourceFormat::Shapefile | SourceFormat::GeoPackage => open_duckdb(path, format),
        SourceFormat::GeoJson => open_geojson(path),
    }
}

impl OpenLayer {
    /// The resolved schema.
    #[must_use]
    pub const fn schema(&self) -> &LayerSchema {
        &self.schema
    }

    /// Reads every feature, keeping only `columns` as attributes.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError`] if a requested column does not exist or the
    /// underlying read fails.
    pub fn read(&self, columns: &[&str]) -> Result<Vec<SourceRow>, LayerError> {
        for column in columns {
            if !self.schema.has_column(column) {
                return Err(LayerError::Conversion {
                    message: format!(
                        "Column {column:?} not present in {}",
                        self.schema.path.display()
                    ),
                });
            }
        }

        match &self.backend {
            Backend::DuckDb {
                conn,
                geometry_column,
            } => read_duckdb(conn, &self.schema, geometry_column, columns),
            Backend::GeoJson(collection) => Ok(read_geojson(collection, columns)),
        }
    }
}

// ============================================================
// DuckDB spatial backend (shapefile, GeoPackage)
// ============================================================

fn open_duckdb(path: &Path, format: SourceFormat) -> Result<OpenLayer, LayerError> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("INSTALL spatial; LOAD spatial;")?;

    let path_lit = sql_literal(&path.display().to_string());

    let mut layers: Vec<(String, Option<SourceCrs>)> = Vec::new();
    {
        let mut stmt = conn.prepare(&format!(
            "SELECT l.name,
                    l.geometry_fields[1].crs.auth_name,
                    l.geometry_fields[1].crs.auth_code
             FROM (SELECT UNNEST(layers) AS l FROM ST_Read_Meta('{path_lit}'))"
        ))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let auth_name: Option<String> = row.get(1)?;
            let auth_code: Option<String> = row.get(2)?;
            let crs = match (auth_name, auth_code) {
                (Some(auth_name), Some(auth_code)) => Some(SourceCrs {
                    auth_name,
                    auth_code,
                }),
                _ => None,
            };
            layers.push((name, crs));
        }
    }

    let (layer, crs) = choose_layer(layers, format).ok_or_else(|| LayerError::Conversion {
        message: format!("No layers found in {}", path.display()),
    })?;

    if crs.is_none() {
        log::warn!(
            "{} (layer {layer}) declares no CRS; assuming WGS84",
            path.display()
        );
    }

    let mut columns = Vec::new();
    let mut geometry_column = None;
    {
        let mut stmt = conn.prepare(&format!(
            "DESCRIBE SELECT * FROM ST_Read('{path_lit}', layer = '{}')",
            sql_literal(&layer)
        ))?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let name: String = row.get(0)?;
            let column_type: String = row.get(1)?;
            if column_type.eq_ignore_ascii_case("GEOMETRY") && geometry_column.is_none() {
                geometry_column = Some(name);
            } else {
                columns.push(name);
            }
        }
    }

    let geometry_column = geometry_column.ok_or_else(|| LayerError::Conversion {
        message: format!("Layer {layer} in {} has no geometry column", path.display()),
    })?;

    Ok(OpenLayer {
        schema: LayerSchema {
            path: path.to_path_buf(),
            format,
            layer: Some(layer),
            columns,
            crs,
        },
        backend: Backend::DuckDb {
            conn,
            geometry_column,
        },
    })
}

/// `GeoPackage` files may carry several layers; prefer [`PREFERRED_LAYER`],
/// otherwise the first one.
fn choose_layer(
    layers: Vec<(String, Option<SourceCrs>)>,
    format: SourceFormat,
) -> Option<(String, Option<SourceCrs>)> {
    if format == SourceFormat::GeoPackage
        && let Some(preferred) = layers.iter().find(|(name, _)| name == PREFERRED_LAYER)
    {
        return Some(preferred.clone());
    }
    layers.into_iter().next()
}

fn read_duckdb(
    conn: &Connection,
    schema: &LayerSchema,
    geometry_column: &str,
    columns: &[&str],
) -> Result<Vec<SourceRow>, LayerError> {
    let geom = quote_ident(geometry_column);
    let geom_expr = match &schema.crs {
        Some(crs) if schema.needs_reprojection() => {
            log::info!(
                "Reprojecting {} from {} to EPSG:4326",
                schema.path.display(),
                crs.identifier()
            );
            format!(
                "ST_Transform({geom}, '{}', 'EPSG:4326', true)",
                sql_literal(&crs.identifier())
            )
        }
        _ => geom,
    };

    let mut select: Vec<String> = columns
        .iter()
        .map(|c| format!("CAST({} AS VARCHAR)", quote_ident(c)))
        .collect();
    select.push(format!("CAST(ST_AsGeoJSON({geom_expr}) AS VARCHAR)"));

    let sql = format!(
        "SELECT {} FROM ST_Read('{}', layer = '{}')",
        select.join(", "),
        sql_literal(&schema.path.display().to_string()),
        sql_literal(schema.layer.as_deref().unwrap_or_default()),
    );

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();

    while let Some(row) = rows.next()? {
        let mut attributes = BTreeMap::new();
        for (i, column) in columns.iter().enumerate() {
            let value: Option<String> = row.get(i)?;
            attributes.insert((*column).to_string(), value);
        }
        let geojson: Option<String> = row.get(columns.len())?;
        let geometry = geojson.as_deref().and_then(parse_geojson_to_multipolygon);
        out.push(SourceRow {
            attributes,
            geometry,
        });
    }

    Ok(out)
}

fn sql_literal(s: &str) -> String {
    s.replace('\'', "''")
}

fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

// ============================================================
// GeoJSON backend
// ============================================================

fn open_geojson(path: &Path) -> Result<OpenLayer, LayerError> {
    let text = std::fs::read_to_string(path)?;
    let geojson: GeoJson = text.parse()?;

    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(LayerError::Conversion {
            message: format!("{} is not a GeoJSON FeatureCollection", path.display()),
        });
    };

    // RFC 7946 data is always WGS84; only the legacy `crs` member can say
    // otherwise.
    if let Some(name) = legacy_crs_name(&collection)
        && !is_wgs84_urn(&name)
    {
        return Err(LayerError::UnsupportedCrs {
            crs: name,
            path: path.to_path_buf(),
        });
    }

    let mut columns: Vec<String> = Vec::new();
    for feature in &collection.features {
        if let Some(props) = &feature.properties {
            for key in props.keys() {
                if !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
    }

    Ok(OpenLayer {
        schema: LayerSchema {
            path: path.to_path_buf(),
            format: SourceFormat::GeoJson,
            layer: None,
            columns,
            crs: Some(SourceCrs {
                auth_name: "OGC".to_string(),
                auth_code: "CRS84".to_string(),
            }),
        },
        backend: Backend::GeoJson(collection),
    })
}

fn legacy_crs_name(collection: &FeatureCollection) -> Option<String> {
    collection
        .foreign_members
        .as_ref()?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()
        .map(str::to_string)
}

fn is_wgs84_urn(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    upper.ends_with("CRS84")
        || upper == "EPSG:4326"
        || upper.ends_with("EPSG::4326")
        || upper.ends_with("EPSG:4326")
}

fn read_geojson(collection: &FeatureCollection, columns: &[&str]) -> Vec<SourceRow> {
    collection
        .features
        .iter()
        .map(|feature| {
            let attributes = columns
                .iter()
                .map(|column| {
                    let value = feature
                        .properties
                        .as_ref()
                        .and_then(|props| props.get(*column))
                        .and_then(json_to_text);
                    ((*column).to_string(), value)
                })
                .collect();

            let geometry = feature
                .geometry
                .clone()
                .and_then(|g| geo::Geometry::<f64>::try_from(g).ok())
                .and_then(into_multipolygon);

            SourceRow {
                attributes,
                geometry,
            }
        })
        .collect()
}

fn json_to_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
