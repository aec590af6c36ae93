#![allow(clippy::module_name_repetitions)]
//! Canonical file paths for the data directory.
//!
//! All paths are relative to the project root's `data/` directory unless
//! `QUAKE_MAP_DATA_DIR` points somewhere else.

use std::path::{Path, PathBuf};

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "QUAKE_MAP_DATA_DIR";

/// Returns the workspace root directory.
///
/// Resolved at compile time from `CARGO_MANIFEST_DIR`; falls back to the
/// current directory for relocated binaries.
#[must_use]
pub fn project_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Returns the `data/` directory path.
#[must_use]
pub fn data_dir() -> PathBuf {
    std::env::var_os(DATA_DIR_ENV)
        .filter(|v| !v.is_empty())
        .map_or_else(|| project_root().join("data"), PathBuf::from)
}

/// Returns the path of the event store under `data_dir`.
#[must_use]
pub fn store_path_in(data_dir: &Path) -> PathBuf {
    data_dir.join("quakes.duckdb")
}

/// Returns the default event store path.
#[must_use]
pub fn store_path() -> PathBuf {
    store_path_in(&data_dir())
}

/// Returns the default Parquet lake root for landed months.
#[must_use]
pub fn lake_dir() -> PathBuf {
    data_dir().join("lake").join("quakes")
}

/// Returns the partition file for one month under a lake root
/// (`date=YYYY-MM/part-00000.parquet`).
#[must_use]
pub fn lake_partition_path(lake_root: &Path, year: i32, month: u32) -> PathBuf {
    lake_root
        .join(format!("date={year:04}-{month:02}"))
        .join("part-00000.parquet")
}

/// Ensures a directory exists, creating it if necessary.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created.
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lake_partition_layout() {
        assert_eq!(
            lake_partition_path(Path::new("/lake/quakes"), 2025, 3),
            Path::new("/lake/quakes/date=2025-03/part-00000.parquet")
        );
    }

    #[test]
    fn store_file_name() {
        assert_eq!(
            store_path_in(Path::new("/srv/data")),
            Path::new("/srv/data/quakes.duckdb")
        );
    }
}
