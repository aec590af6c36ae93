//! Loading of the territory (EEZ/land union) and sea (GOaS) layers.
//!
//! The sea layer ships as several chunk files split from one source
//! layer. Splitting loses the original row order, so each chunk row
//! carries a stable `__row_id__` attribute written at split time; the
//! merged layer is sorted by it before anything downstream assigns ids.

use std::path::{Path, PathBuf};

use geo::MultiPolygon;

use crate::LayerError;
use crate::reader::{SourceFormat, SourceRow, open_layer};

/// Directory (under `data/`) holding the territory shapefile set.
pub const TERRITORY_DIR: &str = "EEZ_land_union_v4_202410";

/// Territory shapefile name inside [`TERRITORY_DIR`].
pub const TERRITORY_FILE: &str = "EEZ_land_union_v4_202410.shp";

/// Directory (under `data/`) holding the sea layer chunks.
pub const SEA_CHUNK_DIR: &str = "GOaS_v1_20211214_gpkg/split";

/// Territory attribute holding the sovereignty ISO code.
pub const TERRITORY_CODE_COLUMN: &str = "ISO_SOV1";

/// Territory attribute holding the sovereignty name.
pub const TERRITORY_NAME_COLUMN: &str = "SOVEREIGN1";

/// Sea attribute holding the pre-split row position.
pub const SEA_ROW_ID_COLUMN: &str = "__row_id__";

/// Sea attribute holding the display name (matched case-insensitively).
pub const SEA_NAME_COLUMN: &str = "name";

/// Shapefile sidecars that must sit next to the `.shp`.
const SHAPEFILE_SIDECARS: &[&str] = &["shx", "dbf"];

/// Attribute values treated as null.
const NULL_TOKENS: &[&str] = &["", "NONE", "NA", "N/A", "NAN", "NULL"];

/// A territory polygon with its sovereignty attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct TerritoryFeature {
    /// Uppercase ISO sovereignty code.
    pub iso: String,
    /// Sovereignty display name.
    pub name: String,
    /// Geometry in WGS84.
    pub geometry: MultiPolygon<f64>,
}

/// A sea polygon with its stable source position.
#[derive(Debug, Clone, PartialEq)]
pub struct SeaFeature {
    /// Row position in the unsplit source layer.
    pub row_id: i64,
    /// Sea display name.
    pub name: String,
    /// Geometry in WGS84.
    pub geometry: MultiPolygon<f64>,
}

/// Where the polygon sources live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerPaths {
    /// Top-level data directory.
    pub data_dir: PathBuf,
    /// Territory source file.
    pub territory: PathBuf,
    /// Directory of sea chunk files.
    pub sea_chunks: PathBuf,
}

impl LayerPaths {
    /// Standard layout under a data directory.
    #[must_use]
    pub fn from_data_dir(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            territory: data_dir.join(TERRITORY_DIR).join(TERRITORY_FILE),
            sea_chunks: data_dir.join(SEA_CHUNK_DIR),
        }
    }
}

/// Reads and normalizes the two polygon layers.
#[derive(Debug, Clone)]
pub struct DataLoader {
    paths: LayerPaths,
}

impl DataLoader {
    /// Creates a loader for explicit paths.
    #[must_use]
    pub const fn new(paths: LayerPaths) -> Self {
        Self { paths }
    }

    /// Creates a loader for the standard layout under `data_dir`.
    #[must_use]
    pub fn from_data_dir(data_dir: &Path) -> Self {
        Self::new(LayerPaths::from_data_dir(data_dir))
    }

    /// The configured source paths.
    #[must_use]
    pub const fn paths(&self) -> &LayerPaths {
        &self.paths
    }

    /// Loads the territory layer in source order.
    ///
    /// Rows without a usable code, name, or polygon geometry are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::MissingData`] naming every absent file,
    /// [`LayerError::Schema`] if the code or name attribute is missing,
    /// or a read error from the underlying source.
    pub fn load_territory_layer(&self) -> Result<Vec<TerritoryFeature>, LayerError> {
        self.require_territory_files()?;

        let path = &self.paths.territory;
        let layer = open_layer(path)?;

        let missing: Vec<&str> = [TERRITORY_CODE_COLUMN, TERRITORY_NAME_COLUMN]
            .into_iter()
            .filter(|c| !layer.schema().has_column(c))
            .collect();
        if !missing.is_empty() {
            return Err(LayerError::Schema {
                layer: "territory",
                message: format!(
                    "{} must contain {} (missing: {})",
                    path.display(),
                    [TERRITORY_CODE_COLUMN, TERRITORY_NAME_COLUMN].join(", "),
                    missing.join(", ")
                ),
            });
        }

        let rows = layer.read(&[TERRITORY_CODE_COLUMN, TERRITORY_NAME_COLUMN])?;
        let total = rows.len();

        let features: Vec<TerritoryFeature> = rows
            .into_iter()
            .filter_map(|row| {
                let iso = normalize_code(row.get(TERRITORY_CODE_COLUMN))?;
                let name = normalize_name(row.get(TERRITORY_NAME_COLUMN))?;
                Some(TerritoryFeature {
                    iso,
                    name,
                    geometry: row.geometry?,
                })
            })
            .collect();

        if features.len() < total {
            log::warn!(
                "Territory layer: skipped {} of {total} rows without code, name, or polygon",
                total - features.len()
            );
        }
        log::info!(
            "Loaded {} territory polygons from {}",
            features.len(),
            path.display()
        );

        Ok(features)
    }

    /// Loads and merges every sea chunk, restored to source row order.
    ///
    /// # Errors
    ///
    /// Returns [`LayerError::MissingData`] if the chunk directory or any
    /// chunk file is absent, [`LayerError::Schema`] if a chunk lacks the
    /// row-id or name attribute (or a row id is not an integer), or a read
    /// error from the underlying source.
    pub fn load_sea_layer(&self) -> Result<Vec<SeaFeature>, LayerError> {
        let chunks = self.sea_chunk_files()?;

        let mut features = Vec::new();
        let mut skipped = 0usize;

        for chunk in &chunks {
            let layer = open_layer(chunk)?;
            let schema = layer.schema();

            if !schema.has_column(SEA_ROW_ID_COLUMN) {
                return Err(LayerError::Schema {
                    layer: "sea",
                    message: format!(
                        "missing {SEA_ROW_ID_COLUMN:?} in {}; add it to the unsplit layer \
                         (one integer per original row) before splitting",
                        chunk.display()
                    ),
                });
            }
            let Some(name_column) = schema.find_column(SEA_NAME_COLUMN).map(str::to_string)
            else {
                return Err(LayerError::Schema {
                    layer: "sea",
                    message: format!("missing {SEA_NAME_COLUMN:?} column in {}", chunk.display()),
                });
            };

            let rows = layer.read(&[SEA_ROW_ID_COLUMN, &name_column])?;
            log::debug!("{}: {} rows", chunk.display(), rows.len());

            for row in rows {
                let row_id = parse_row_id(&row, chunk)?;
                match (normalize_name(row.get(&name_column)), row.geometry) {
                    (Some(name), Some(geometry)) => features.push(SeaFeature {
                        row_id,
                        name,
                        geometry,
                    }),
                    _ => skipped += 1,
                }
            }
        }

        if skipped > 0 {
            log::warn!("Sea layer: skipped {skipped} rows without name or polygon");
        }

        features.sort_by_key(|f| f.row_id);

        log::info!(
            "Loaded {} sea polygons from {} chunk file(s)",
            features.len(),
            chunks.len()
        );

        Ok(features)
    }

    /// Loads both layers.
    ///
    /// # Errors
    ///
    /// Returns the first [`LayerError`] from either layer.
    pub fn load_all(&self) -> Result<(Vec<TerritoryFeature>, Vec<SeaFeature>), LayerError> {
        Ok((self.load_territory_layer()?, self.load_sea_layer()?))
    }

    fn require_territory_files(&self) -> Result<(), LayerError> {
        let territory = &self.paths.territory;
        let mut expected = vec![self.paths.data_dir.clone()];
        if let Some(parent) = territory.parent() {
            expected.push(parent.to_path_buf());
        }
        expected.push(territory.clone());
        if SourceFormat::from_path(territory) == Some(SourceFormat::Shapefile) {
            for ext in SHAPEFILE_SIDECARS {
                expected.push(territory.with_extension(ext));
            }
        }

        let missing: Vec<PathBuf> = expected.into_iter().filter(|p| !p.exists()).collect();
        if missing.is_empty() {
            return Ok(());
        }

        Err(LayerError::MissingData {
            paths: missing,
            hint: format!(
                "Expected the complete territory shapefile set (.shp, .shx, .dbf) under {}",
                territory
                    .parent()
                    .unwrap_or(&self.paths.data_dir)
                    .display()
            ),
        })
    }

    /// Chunk files in the sea directory, sorted by file name.
    fn sea_chunk_files(&self) -> Result<Vec<PathBuf>, LayerError> {
        let dir = &self.paths.sea_chunks;
        if !dir.is_dir() {
            return Err(LayerError::MissingData {
                paths: vec![dir.clone()],
                hint: format!(
                    "Expected sea layer chunk files (*.gpkg or *.geojson) under {}",
                    dir.display()
                ),
            });
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && matches!(
                        SourceFormat::from_path(path),
                        Some(SourceFormat::GeoPackage | SourceFormat::GeoJson)
                    )
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(LayerError::MissingData {
                paths: vec![dir.join("*.gpkg")],
                hint: format!("No sea layer chunk files found in {}", dir.display()),
            });
        }

        Ok(files)
    }
}

/// Deduplicated sea names in row-id order (first appearance wins).
///
/// Index `i` of the result is the sea id `i`.
#[must_use]
pub fn distinct_sea_names(features: &[SeaFeature]) -> Vec<String> {
    let mut sorted: Vec<&SeaFeature> = features.iter().collect();
    sorted.sort_by_key(|f| f.row_id);

    let mut names: Vec<String> = Vec::new();
    for feature in sorted {
        if !names.contains(&feature.name) {
            names.push(feature.name.clone());
        }
    }
    names
}

/// Deduplicated `(iso, name)` pairs in layer order (first appearance wins).
#[must_use]
pub fn distinct_territories(features: &[TerritoryFeature]) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = Vec::new();
    for feature in features {
        if !out.iter().any(|(iso, _)| iso == &feature.iso) {
            out.push((feature.iso.clone(), feature.name.clone()));
        }
    }
    out
}

fn parse_row_id(row: &SourceRow, chunk: &Path) -> Result<i64, LayerError> {
    let raw = row.get(SEA_ROW_ID_COLUMN).map(str::trim);
    let parsed = raw.and_then(|s| {
        s.parse::<i64>().ok().or_else(|| {
            s.parse::<f64>()
                .ok()
                .filter(|f| f.fract() == 0.0 && f.is_finite())
                .map(|f| {
                    #[allow(clippy::cast_possible_truncation)]
                    let id = f as i64;
                    id
                })
        })
    });

    parsed.ok_or_else(|| LayerError::Schema {
        layer: "sea",
        message: format!(
            "{SEA_ROW_ID_COLUMN:?} must be an integer, got {raw:?} in {}",
            chunk.display()
        ),
    })
}

fn is_null_token(s: &str) -> bool {
    NULL_TOKENS.iter().any(|t| t.eq_ignore_ascii_case(s))
}

fn normalize_code(value: Option<&str>) -> Option<String> {
    let code = value?.trim().to_uppercase();
    (!is_null_token(&code)).then_some(code)
}

fn normalize_name(value: Option<&str>) -> Option<String> {
    let name = value?.trim();
    (!is_null_token(name)).then(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;

    const SQUARE: &str = r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,1],[0,0]]]}"#;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("quake_map_loader_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn collection(features: &[String]) -> String {
        format!(
            r#"{{"type":"FeatureCollection","features":[{}]}}"#,
            features.join(",")
        )
    }

    fn sea_feature_json(row_id: i64, name: &str) -> String {
        format!(
            r#"{{"type":"Feature","properties":{{"__row_id__":{row_id},"name":"{name}"}},"geometry":{SQUARE}}}"#
        )
    }

    fn geojson_paths(dir: &Path) -> LayerPaths {
        LayerPaths {
            data_dir: dir.to_path_buf(),
            territory: dir.join("territory").join("eez.geojson"),
            sea_chunks: dir.join("split"),
        }
    }

    #[test]
    fn standard_layout() {
        let paths = LayerPaths::from_data_dir(Path::new("/data"));
        assert_eq!(
            paths.territory,
            Path::new("/data/EEZ_land_union_v4_202410/EEZ_land_union_v4_202410.shp")
        );
        assert_eq!(
            paths.sea_chunks,
            Path::new("/data/GOaS_v1_20211214_gpkg/split")
        );
    }

    #[test]
    fn missing_shapefile_set_names_every_path() {
        let dir = temp_dir("missing_shp");
        let shp_dir = dir.join(TERRITORY_DIR);
        std::fs::create_dir_all(&shp_dir).unwrap();
        std::fs::write(shp_dir.join(TERRITORY_FILE), b"").unwrap();

        let loader = DataLoader::from_data_dir(&dir);
        let err = loader.load_territory_layer().unwrap_err();
        let LayerError::MissingData { paths, hint } = err else {
            panic!("expected MissingData, got {err:?}");
        };
        assert_eq!(
            paths,
            vec![
                shp_dir.join("EEZ_land_union_v4_202410.shx"),
                shp_dir.join("EEZ_land_union_v4_202410.dbf"),
            ]
        );
        assert!(hint.contains(TERRITORY_DIR));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_data_dir_is_reported() {
        let dir = std::env::temp_dir().join("quake_map_loader_test_nonexistent");
        let _ = std::fs::remove_dir_all(&dir);
        let loader = DataLoader::from_data_dir(&dir);

        let Err(LayerError::MissingData { paths, .. }) = loader.load_territory_layer() else {
            panic!("expected MissingData");
        };
        assert_eq!(paths[0], dir);

        let Err(LayerError::MissingData { paths, .. }) = loader.load_sea_layer() else {
            panic!("expected MissingData");
        };
        assert_eq!(paths, vec![dir.join(SEA_CHUNK_DIR)]);
    }

    #[test]
    fn empty_chunk_dir_is_missing_data() {
        let dir = temp_dir("empty_chunks");
        std::fs::create_dir_all(dir.join("split")).unwrap();
        std::fs::write(dir.join("split").join("README.txt"), b"not a chunk").unwrap();

        let loader = DataLoader::new(geojson_paths(&dir));
        assert!(matches!(
            loader.load_sea_layer(),
            Err(LayerError::MissingData { .. })
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn sea_chunks_merge_in_row_id_order() {
        let dir = temp_dir("merge_order");
        let split = dir.join("split");
        std::fs::create_dir_all(&split).unwrap();
        std::fs::write(
            split.join("a_pacific.geojson"),
            collection(&[
                sea_feature_json(2, "South Pacific Ocean"),
                sea_feature_json(0, "North Pacific Ocean"),
            ]),
        )
        .unwrap();
        std::fs::write(
            split.join("b_atlantic.geojson"),
            collection(&[
                sea_feature_json(1, "North Atlantic Ocean"),
                sea_feature_json(3, "North Pacific Ocean"),
            ]),
        )
        .unwrap();

        let loader = DataLoader::new(geojson_paths(&dir));
        let first = loader.load_sea_layer().unwrap();
        let ids: Vec<i64> = first.iter().map(|f| f.row_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);

        let names = distinct_sea_names(&first);
        assert_eq!(
            names,
            vec![
                "North Pacific Ocean".to_string(),
                "North Atlantic Ocean".to_string(),
                "South Pacific Ocean".to_string(),
            ]
        );

        // Reloading the same chunks yields the same assignment.
        let second = loader.load_sea_layer().unwrap();
        assert_eq!(distinct_sea_names(&second), names);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn sea_chunk_without_row_id_is_schema_error() {
        let dir = temp_dir("no_row_id");
        let split = dir.join("split");
        std::fs::create_dir_all(&split).unwrap();
        std::fs::write(
            split.join("chunk.geojson"),
            collection(&[format!(
                r#"{{"type":"Feature","properties":{{"name":"Arctic Ocean"}},"geometry":{SQUARE}}}"#
            )]),
        )
        .unwrap();

        let loader = DataLoader::new(geojson_paths(&dir));
        assert!(matches!(
            loader.load_sea_layer(),
            Err(LayerError::Schema { layer: "sea", .. })
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn sea_chunk_without_name_is_schema_error() {
        let dir = temp_dir("no_name");
        let split = dir.join("split");
        std::fs::create_dir_all(&split).unwrap();
        std::fs::write(
            split.join("chunk.geojson"),
            collection(&[format!(
                r#"{{"type":"Feature","properties":{{"__row_id__":0,"label":"x"}},"geometry":{SQUARE}}}"#
            )]),
        )
        .unwrap();

        let loader = DataLoader::new(geojson_paths(&dir));
        let Err(LayerError::Schema { message, .. }) = loader.load_sea_layer() else {
            panic!("expected Schema error");
        };
        assert!(message.contains("name"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn sea_name_column_is_case_insensitive() {
        let dir = temp_dir("upper_name");
        let split = dir.join("split");
        std::fs::create_dir_all(&split).unwrap();
        std::fs::write(
            split.join("chunk.geojson"),
            collection(&[format!(
                r#"{{"type":"Feature","properties":{{"__row_id__":"7","NAME":" Baltic Sea "}},"geometry":{SQUARE}}}"#
            )]),
        )
        .unwrap();

        let loader = DataLoader::new(geojson_paths(&dir));
        let seas = loader.load_sea_layer().unwrap();
        assert_eq!(seas.len(), 1);
        assert_eq!(seas[0].row_id, 7);
        assert_eq!(seas[0].name, "Baltic Sea");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn territory_schema_and_normalization() {
        let dir = temp_dir("territory");
        std::fs::create_dir_all(dir.join("territory")).unwrap();
        let paths = geojson_paths(&dir);

        std::fs::write(
            &paths.territory,
            collection(&[format!(
                r#"{{"type":"Feature","properties":{{"ISO_SOV1":"USA"}},"geometry":{SQUARE}}}"#
            )]),
        )
        .unwrap();
        let loader = DataLoader::new(paths.clone());
        let Err(LayerError::Schema { layer, message }) = loader.load_territory_layer() else {
            panic!("expected Schema error");
        };
        assert_eq!(layer, "territory");
        assert!(message.contains(TERRITORY_NAME_COLUMN));

        std::fs::write(
            &paths.territory,
            collection(&[
                format!(
                    r#"{{"type":"Feature","properties":{{"ISO_SOV1":" usa ","SOVEREIGN1":"United States "}},"geometry":{SQUARE}}}"#
                ),
                format!(
                    r#"{{"type":"Feature","properties":{{"ISO_SOV1":"N/A","SOVEREIGN1":"Disputed"}},"geometry":{SQUARE}}}"#
                ),
                r#"{"type":"Feature","properties":{"ISO_SOV1":"CAN","SOVEREIGN1":"Canada"},"geometry":null}"#
                    .to_string(),
            ]),
        )
        .unwrap();
        let territories = loader.load_territory_layer().unwrap();
        assert_eq!(territories.len(), 1);
        assert_eq!(territories[0].iso, "USA");
        assert_eq!(territories[0].name, "United States");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn distinct_territories_first_seen_wins() {
        let geometry = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
        ]]);
        let features = vec![
            TerritoryFeature {
                iso: "FRA".to_string(),
                name: "France".to_string(),
                geometry: geometry.clone(),
            },
            TerritoryFeature {
                iso: "FRA".to_string(),
                name: "France (overseas)".to_string(),
                geometry,
            },
        ];
        assert_eq!(
            distinct_territories(&features),
            vec![("FRA".to_string(), "France".to_string())]
        );
    }

    #[test]
    fn null_tokens() {
        assert_eq!(normalize_code(Some(" gbr ")), Some("GBR".to_string()));
        assert_eq!(normalize_code(Some("none")), None);
        assert_eq!(normalize_code(None), None);
        assert_eq!(normalize_name(Some("  ")), None);
        assert_eq!(normalize_name(Some("Nauru")), Some("Nauru".to_string()));
    }
}
