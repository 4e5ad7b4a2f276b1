//! Raw data acquisition and cache building.
//!
//! Everything lives under the configured data directory:
//!
//! | File | Contents |
//! |------|----------|
//! | `countries.geojson` | Country outlines; the boundary is picked by `ADMIN` name |
//! | `land_use.osm.pbf` / `land_use.geojson` | Tagged land-use polygons |
//! | `water.geojson` | Sea and lake polygons |
//! | `hazards.duckdb` | Filtered, healed land-use hazards |
//! | `water.duckdb` | Clipped, healed water polygons |
//!
//! Readiness is an existence check over all five. Missing downloads are
//! fetched, missing caches are rebuilt from the downloads.

use std::path::{Path, PathBuf};

use geo::{BooleanOps, BoundingRect, Coord, Intersects, MultiPolygon, Rect};
use launch_risk_http::{RetryPolicy, download_file};
use launch_risk_models::{Crs, HazardSource, HazardStoreConfig};
use launch_risk_spatial::{geometry_to_multipolygon, heal_multi_polygon, project_coord};

use crate::cache::write_cache;
use crate::land_use::{LandUseFormat, read_feature_collection, read_land_use};
use crate::{HazardError, HazardFilter, HazardGeometry};

/// Paths of every file in the data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    /// The data directory itself.
    pub dir: PathBuf,
    /// Country outlines.
    pub countries: PathBuf,
    /// Land-use source.
    pub land_use: PathBuf,
    /// Format of [`Self::land_use`].
    pub land_use_format: LandUseFormat,
    /// Water polygons.
    pub water: PathBuf,
    /// Land-use hazard cache.
    pub hazards_cache: PathBuf,
    /// Water hazard cache.
    pub water_cache: PathBuf,
}

impl DataPaths {
    /// Lays out the data directory for `config`.
    #[must_use]
    pub fn new(config: &HazardStoreConfig) -> Self {
        let dir = config.data_dir.clone();
        let land_use_format = LandUseFormat::from_url(&config.land_use_url);
        Self {
            countries: dir.join("countries.geojson"),
            land_use: dir.join(land_use_format.file_name()),
            land_use_format,
            water: dir.join("water.geojson"),
            hazards_cache: dir.join("hazards.duckdb"),
            water_cache: dir.join("water.duckdb"),
            dir,
        }
    }

    /// Every file that must exist for the store to load.
    #[must_use]
    pub fn required(&self) -> [&Path; 5] {
        [
            &self.countries,
            &self.land_use,
            &self.water,
            &self.hazards_cache,
            &self.water_cache,
        ]
    }
}

/// Downloads raw data and builds the derived caches.
#[derive(Debug, Clone)]
pub struct DataPreparer {
    config: HazardStoreConfig,
    paths: DataPaths,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl DataPreparer {
    /// Creates a preparer. Downloads retry with `policy`, the same policy
    /// used for elevation lookups.
    #[must_use]
    pub fn new(config: HazardStoreConfig, client: reqwest::Client, policy: RetryPolicy) -> Self {
        Self {
            paths: DataPaths::new(&config),
            config,
            client,
            policy,
        }
    }

    /// Data directory layout.
    #[must_use]
    pub const fn paths(&self) -> &DataPaths {
        &self.paths
    }

    /// Store configuration.
    #[must_use]
    pub const fn config(&self) -> &HazardStoreConfig {
        &self.config
    }

    /// Whether every required file exists.
    #[must_use]
    pub fn data_ready(&self) -> bool {
        self.paths.required().iter().all(|p| p.exists())
    }

    /// Fetches and builds whatever is missing.
    ///
    /// # Errors
    ///
    /// Returns [`HazardError::DataUnavailable`] wrapping the first failure,
    /// or if files are still missing afterwards.
    pub async fn prepare(&self) -> Result<(), HazardError> {
        if self.data_ready() {
            log::debug!("Hazard data ready in {}", self.paths.dir.display());
            return Ok(());
        }

        log::info!("Preparing hazard data in {}", self.paths.dir.display());
        tokio::fs::create_dir_all(&self.paths.dir)
            .await
            .map_err(|e| HazardError::io(&self.paths.dir, e))?;

        let downloads = [
            (&self.config.countries_url, &self.paths.countries, "countries"),
            (&self.config.land_use_url, &self.paths.land_use, "land use"),
            (&self.config.water_url, &self.paths.water, "water"),
        ];
        for (url, path, label) in downloads {
            if path.exists() {
                log::info!("{label} data already downloaded to {}", path.display());
                continue;
            }
            download_file(&self.client, &self.policy, url, path)
                .await
                .map_err(|e| HazardError::unavailable(format!("{label} download failed"), e.into()))?;
        }

        if !self.paths.hazards_cache.exists() {
            let paths = self.paths.clone();
            let filter = HazardFilter::new(
                self.config.deny_list.clone(),
                self.config.missing_keys_policy,
            );
            tokio::task::spawn_blocking(move || build_land_use_cache(&paths, &filter))
                .await?
                .map_err(|e| HazardError::unavailable("land-use cache build failed", e))?;
        }

        if !self.paths.water_cache.exists() {
            let paths = self.paths.clone();
            let country = self.config.country_name.clone();
            let margin = self.config.water_clip_margin;
            tokio::task::spawn_blocking(move || {
                let boundary = load_boundary(&paths.countries, &country)?;
                build_water_cache(&paths, &boundary, margin)
            })
            .await?
            .map_err(|e| HazardError::unavailable("water cache build failed", e))?;
        }

        if !self.data_ready() {
            let missing: Vec<String> = self
                .paths
                .required()
                .iter()
                .filter(|p| !p.exists())
                .map(|p| p.display().to_string())
                .collect();
            return Err(HazardError::DataUnavailable {
                reason: format!("still missing after preparation: {}", missing.join(", ")),
                source: None,
            });
        }

        log::info!("Hazard data ready");
        Ok(())
    }

    /// Deletes the derived caches so the next [`Self::prepare`] rebuilds
    /// them from the raw files already on disk.
    ///
    /// # Errors
    ///
    /// Returns [`HazardError::Io`] if a cache exists but cannot be removed.
    pub async fn discard_caches(&self) -> Result<(), HazardError> {
        for path in [&self.paths.hazards_cache, &self.paths.water_cache] {
            match tokio::fs::remove_file(path).await {
                Ok(()) => log::info!("Discarded hazard cache {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(HazardError::io(path, e)),
            }
        }
        Ok(())
    }

    /// Deletes the whole data directory. Missing directories are fine.
    ///
    /// # Errors
    ///
    /// Returns [`HazardError::Io`] if the directory exists but cannot be
    /// removed.
    pub async fn wipe(&self) -> Result<(), HazardError> {
        match tokio::fs::remove_dir_all(&self.paths.dir).await {
            Ok(()) => {
                log::info!("Wiped hazard data in {}", self.paths.dir.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(HazardError::io(&self.paths.dir, e)),
        }
    }
}

/// Reads the boundary polygon whose `ADMIN` property is `country`.
///
/// # Errors
///
/// Returns [`HazardError::DataUnavailable`] if no such feature exists, or
/// a read/parse error.
pub fn load_boundary(path: &Path, country: &str) -> Result<MultiPolygon<f64>, HazardError> {
    let collection = read_feature_collection(path)?;

    let geometry = collection
        .features
        .into_iter()
        .find(|f| {
            f.property("ADMIN")
                .and_then(serde_json::Value::as_str)
                .is_some_and(|name| name == country)
        })
        .and_then(|f| f.geometry)
        .and_then(|g| geo::Geometry::<f64>::try_from(g).ok())
        .and_then(geometry_to_multipolygon)
        .ok_or_else(|| HazardError::DataUnavailable {
            reason: format!("no boundary for '{country}' in {}", path.display()),
            source: None,
        })?;

    Ok(heal_multi_polygon(geometry))
}

/// Extracts, filters and heals land use, then writes the hazard cache.
///
/// # Errors
///
/// Returns [`HazardError`] if the source cannot be read or the cache
/// cannot be written.
pub fn build_land_use_cache(paths: &DataPaths, filter: &HazardFilter) -> Result<usize, HazardError> {
    let keys = filter.rule_keys();
    let polygons = read_land_use(&paths.land_use, paths.land_use_format, &keys)?;
    let hazards: Vec<HazardGeometry> = filter
        .apply(polygons)
        .into_iter()
        .filter_map(|h| {
            let geometry = heal_multi_polygon(h.geometry);
            (!geometry.0.is_empty()).then_some(HazardGeometry { geometry, ..h })
        })
        .collect();

    write_cache(&paths.hazards_cache, &hazards)?;
    Ok(hazards.len())
}

/// Clips water polygons to the neighbourhood of `boundary`, heals them,
/// and writes the water cache.
///
/// # Errors
///
/// Returns [`HazardError`] if the source cannot be read or the cache
/// cannot be written.
pub fn build_water_cache(
    paths: &DataPaths,
    boundary: &MultiPolygon<f64>,
    margin: f64,
) -> Result<usize, HazardError> {
    let extent = clip_extent(boundary, margin).ok_or_else(|| HazardError::DataUnavailable {
        reason: "boundary polygon is empty".to_string(),
        source: None,
    })?;
    let clip = extent.to_polygon();
    log::info!(
        "Clipping water to ({:.4}, {:.4}) - ({:.4}, {:.4})",
        extent.min().x,
        extent.min().y,
        extent.max().x,
        extent.max().y
    );

    let collection = read_feature_collection(&paths.water)?;
    let total = collection.features.len();
    let water: Vec<HazardGeometry> = collection
        .features
        .into_iter()
        .filter_map(|f| f.geometry)
        .filter_map(|g| geo::Geometry::<f64>::try_from(g).ok())
        .filter_map(geometry_to_multipolygon)
        .filter(|mp| mp.intersects(&extent))
        .filter_map(|mp| {
            let clipped = heal_multi_polygon(mp).intersection(&clip);
            (!clipped.0.is_empty()).then_some(HazardGeometry {
                source: HazardSource::Water,
                tag: None,
                geometry: clipped,
            })
        })
        .collect();

    log::info!("Kept {} of {total} water features after clipping", water.len());
    write_cache(&paths.water_cache, &water)?;
    Ok(water.len())
}

/// Boundary bounding box grown by `margin` times its longest edge on every
/// side, measured in Web Mercator and returned in WGS84.
#[must_use]
pub fn clip_extent(boundary: &MultiPolygon<f64>, margin: f64) -> Option<Rect<f64>> {
    let bbox = boundary.bounding_rect()?;
    let min = project_coord(bbox.min(), Crs::Wgs84, Crs::WebMercator);
    let max = project_coord(bbox.max(), Crs::Wgs84, Crs::WebMercator);
    let grow = margin * (max.x - min.x).max(max.y - min.y);

    let grown_min = Coord {
        x: min.x - grow,
        y: min.y - grow,
    };
    let grown_max = Coord {
        x: max.x + grow,
        y: max.y + grow,
    };
    Some(Rect::new(
        project_coord(grown_min, Crs::WebMercator, Crs::Wgs84),
        project_coord(grown_max, Crs::WebMercator, Crs::Wgs84),
    ))
}
