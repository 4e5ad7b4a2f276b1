//! Derived hazard geometry caches stored in `DuckDB`.
//!
//! Each cache is a single-table `DuckDB` file holding healed WGS84
//! geometries as `GeoJSON` text. Caches are written to a temporary file and
//! renamed into place, so a cache that exists is always complete.

use std::path::Path;

use duckdb::Connection;
use launch_risk_models::{HazardSource, MatchedTag};
use launch_risk_spatial::{multipolygon_to_geojson, parse_geojson_to_multipolygon};

use crate::{HazardError, HazardGeometry};

fn create_schema(conn: &Connection) -> Result<(), HazardError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS hazards (
            id INTEGER NOT NULL PRIMARY KEY,
            source TEXT NOT NULL,
            tag_key TEXT,
            tag_value TEXT,
            geometry_geojson TEXT NOT NULL
        );",
    )?;
    Ok(())
}

/// Writes `hazards` to a fresh cache at `path`, replacing any existing one.
///
/// # Errors
///
/// Returns [`HazardError`] if the database cannot be written or moved into
/// place.
pub fn write_cache(path: &Path, hazards: &[HazardGeometry]) -> Result<(), HazardError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| HazardError::io(parent, e))?;
    }

    let tmp_path = path.with_extension("duckdb.tmp");
    remove_if_exists(&tmp_path)?;
    remove_if_exists(&wal_path(&tmp_path))?;

    {
        let conn = Connection::open(&tmp_path)?;
        create_schema(&conn)?;
        conn.execute_batch("BEGIN TRANSACTION;")?;
        {
            let mut stmt = conn.prepare(
                "INSERT INTO hazards (id, source, tag_key, tag_value, geometry_geojson)
                 VALUES (?, ?, ?, ?, ?)",
            )?;
            for (id, hazard) in hazards.iter().enumerate() {
                let id = i64::try_from(id).unwrap_or(i64::MAX);
                let (key, value) = hazard
                    .tag
                    .as_ref()
                    .map_or((None, None), |t| (Some(t.key.as_str()), Some(t.value.as_str())));
                stmt.execute(duckdb::params![
                    id,
                    hazard.source.as_str(),
                    key,
                    value,
                    multipolygon_to_geojson(&hazard.geometry),
                ])?;
            }
        }
        conn.execute_batch("COMMIT; CHECKPOINT;")?;
    }

    std::fs::rename(&tmp_path, path).map_err(|e| HazardError::io(path, e))?;
    log::info!("Cached {} hazard geometries in {}", hazards.len(), path.display());
    Ok(())
}

/// Reads every geometry from the cache at `path`, in insertion order.
///
/// # Errors
///
/// Returns [`HazardError::CorruptCache`] if any row has an unknown source
/// or a geometry that no longer parses, or [`HazardError::Database`] if the
/// database cannot be opened or queried.
pub fn read_cache(path: &Path) -> Result<Vec<HazardGeometry>, HazardError> {
    let conn = Connection::open(path)?;
    let mut stmt = conn.prepare(
        "SELECT id, source, tag_key, tag_value, geometry_geojson FROM hazards ORDER BY id",
    )?;
    let mut rows = stmt.query([])?;
    let mut hazards = Vec::new();

    while let Some(row) = rows.next()? {
        let id: i64 = row.get(0)?;
        let source: String = row.get(1)?;
        let tag_key: Option<String> = row.get(2)?;
        let tag_value: Option<String> = row.get(3)?;
        let geojson_str: String = row.get(4)?;

        let corrupt = |message: String| HazardError::CorruptCache {
            path: path.display().to_string(),
            row: id,
            message,
        };
        let source = HazardSource::from_str_tag(&source)
            .ok_or_else(|| corrupt(format!("unknown hazard source '{source}'")))?;
        let geometry = parse_geojson_to_multipolygon(&geojson_str)
            .ok_or_else(|| corrupt("geometry is not a valid GeoJSON polygon".to_string()))?;
        let tag = match (tag_key, tag_value) {
            (Some(key), Some(value)) => Some(MatchedTag { key, value }),
            _ => None,
        };

        hazards.push(HazardGeometry {
            source,
            tag,
            geometry,
        });
    }

    log::debug!("Read {} cached geometries from {}", hazards.len(), path.display());
    Ok(hazards)
}

fn wal_path(path: &Path) -> std::path::PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".wal");
    name.into()
}

fn remove_if_exists(path: &Path) -> Result<(), HazardError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(HazardError::io(path, e)),
    }
}
