//! Immutable loaded hazard data with lazily built per-CRS indexes.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use geo::MultiPolygon;
use launch_risk_models::Crs;
use launch_risk_spatial::{GeometryIndex, reproject};

use crate::HazardGeometry;

/// One loaded generation of hazard data.
///
/// Geometries are stored once in WGS84. A spatial index is built on the
/// first request for each working CRS and reused afterwards; a snapshot
/// never changes its geometries, so cached indexes stay valid for its whole
/// life.
pub struct HazardSnapshot {
    hazards: Vec<HazardGeometry>,
    boundary: MultiPolygon<f64>,
    indexes: RwLock<BTreeMap<Crs, Arc<GeometryIndex>>>,
}

impl HazardSnapshot {
    /// Combines land-use and water hazards. Ids are positions in the
    /// combined list, land use first.
    #[must_use]
    pub fn new(
        land_use: Vec<HazardGeometry>,
        water: Vec<HazardGeometry>,
        boundary: MultiPolygon<f64>,
    ) -> Self {
        let mut hazards = land_use;
        hazards.extend(water);
        Self::from_parts(hazards, boundary)
    }

    /// Wraps an already combined hazard list.
    #[must_use]
    pub const fn from_parts(hazards: Vec<HazardGeometry>, boundary: MultiPolygon<f64>) -> Self {
        Self {
            hazards,
            boundary,
            indexes: RwLock::new(BTreeMap::new()),
        }
    }

    /// All hazards, indexed by id.
    #[must_use]
    pub fn hazards(&self) -> &[HazardGeometry] {
        &self.hazards
    }

    /// Hazard with the given id.
    #[must_use]
    pub fn hazard(&self, id: usize) -> Option<&HazardGeometry> {
        self.hazards.get(id)
    }

    /// Country boundary in WGS84.
    #[must_use]
    pub const fn boundary(&self) -> &MultiPolygon<f64> {
        &self.boundary
    }

    /// Country boundary in `crs`.
    #[must_use]
    pub fn boundary_in(&self, crs: Crs) -> MultiPolygon<f64> {
        reproject(&self.boundary, Crs::Wgs84, crs)
    }

    /// Spatial index over every hazard in `crs`.
    ///
    /// Built on first request. Concurrent first requests may both build,
    /// but only the first insert is kept and returned to everyone.
    pub fn hazard_index(&self, crs: Crs) -> Arc<GeometryIndex> {
        if let Some(index) = self
            .indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&crs)
        {
            return Arc::clone(index);
        }

        log::info!(
            "Building hazard index for {} ({} geometries)",
            crs.key(),
            self.hazards.len()
        );
        let built = Arc::new(GeometryIndex::build(
            crs,
            self.hazards
                .iter()
                .enumerate()
                .map(|(id, h)| (id, reproject(&h.geometry, Crs::Wgs84, crs))),
        ));

        let mut indexes = self
            .indexes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(indexes.entry(crs).or_insert(built))
    }

    /// Working CRSs that already have an index.
    #[must_use]
    pub fn cached_crs(&self) -> Vec<Crs> {
        self.indexes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect()
    }
}

impl std::fmt::Debug for HazardSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HazardSnapshot")
            .field("hazards", &self.hazards.len())
            .field("cached_crs", &self.cached_crs())
            .finish_non_exhaustive()
    }
}
