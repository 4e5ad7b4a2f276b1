//! Process-wide hazard store.
//!
//! Holds the current [`HazardSnapshot`] behind an `Arc`. Loading and
//! refreshing are serialized; readers clone the `Arc` and never block on a
//! refresh in progress.

use std::sync::{Arc, PoisonError, RwLock};

use geo::MultiPolygon;
use launch_risk_http::RetryPolicy;
use launch_risk_models::{Crs, HazardStoreConfig};
use launch_risk_spatial::GeometryIndex;

use crate::cache::read_cache;
use crate::prepare::{DataPaths, DataPreparer, load_boundary};
use crate::{HazardError, HazardSnapshot};

/// Lazily loaded, refreshable hazard data.
#[derive(Debug)]
pub struct HazardStore {
    preparer: DataPreparer,
    current: RwLock<Option<Arc<HazardSnapshot>>>,
    guard: tokio::sync::Mutex<()>,
}

impl HazardStore {
    /// Creates a store. Nothing is downloaded or read until first use.
    #[must_use]
    pub fn new(config: HazardStoreConfig, client: reqwest::Client, retry: RetryPolicy) -> Self {
        Self {
            preparer: DataPreparer::new(config, client, retry),
            current: RwLock::new(None),
            guard: tokio::sync::Mutex::new(()),
        }
    }

    /// Creates a store that starts with `snapshot` already loaded.
    #[must_use]
    pub fn with_snapshot(
        config: HazardStoreConfig,
        client: reqwest::Client,
        retry: RetryPolicy,
        snapshot: HazardSnapshot,
    ) -> Self {
        let store = Self::new(config, client, retry);
        store.install(Arc::new(snapshot));
        store
    }

    /// Data preparer backing this store.
    #[must_use]
    pub const fn preparer(&self) -> &DataPreparer {
        &self.preparer
    }

    /// Currently loaded snapshot, if any, without loading.
    #[must_use]
    pub fn current(&self) -> Option<Arc<HazardSnapshot>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Current snapshot, preparing and loading data on first use.
    ///
    /// # Errors
    ///
    /// Returns [`HazardError::DataUnavailable`] if data cannot be prepared
    /// or read.
    pub async fn snapshot(&self) -> Result<Arc<HazardSnapshot>, HazardError> {
        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }

        let _guard = self.guard.lock().await;
        // Another task may have loaded while we waited.
        if let Some(snapshot) = self.current() {
            return Ok(snapshot);
        }
        self.load_locked().await
    }

    /// Spatial index over all hazards in `crs`, built on first request.
    ///
    /// # Errors
    ///
    /// Returns [`HazardError`] if the snapshot cannot be loaded.
    pub async fn hazard_index(&self, crs: Crs) -> Result<Arc<GeometryIndex>, HazardError> {
        let snapshot = self.snapshot().await?;
        Ok(tokio::task::spawn_blocking(move || snapshot.hazard_index(crs)).await?)
    }

    /// Country boundary in `crs`.
    ///
    /// # Errors
    ///
    /// Returns [`HazardError`] if the snapshot cannot be loaded.
    pub async fn boundary(&self, crs: Crs) -> Result<MultiPolygon<f64>, HazardError> {
        Ok(self.snapshot().await?.boundary_in(crs))
    }

    /// Deletes all downloaded and derived data, fetches it again, and swaps
    /// in a new snapshot with empty index caches.
    ///
    /// Evaluations holding the previous snapshot finish against it. If the
    /// reload fails, the previous snapshot stays current.
    ///
    /// # Errors
    ///
    /// Returns [`HazardError`] if wiping or reloading fails.
    pub async fn refresh(&self) -> Result<Arc<HazardSnapshot>, HazardError> {
        let _guard = self.guard.lock().await;
        log::info!("Refreshing hazard data");
        self.preparer.wipe().await?;
        self.load_locked().await
    }

    /// Prepares and reads data. A cache that fails to decode is discarded
    /// and rebuilt once from the raw files.
    async fn load_locked(&self) -> Result<Arc<HazardSnapshot>, HazardError> {
        self.preparer.prepare().await?;

        let snapshot = match self.read_prepared().await {
            Err(e) if e.is_corrupt_cache() => {
                log::warn!("{e}, rebuilding hazard caches");
                self.preparer.discard_caches().await?;
                self.preparer.prepare().await?;
                self.read_prepared().await
            }
            result => result,
        }
        .map_err(|e| HazardError::unavailable("failed to read hazard caches", e))?;

        let snapshot = Arc::new(snapshot);
        self.install(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    async fn read_prepared(&self) -> Result<HazardSnapshot, HazardError> {
        let paths = self.preparer.paths().clone();
        let country = self.preparer.config().country_name.clone();
        tokio::task::spawn_blocking(move || read_snapshot(&paths, &country)).await?
    }

    fn install(&self, snapshot: Arc<HazardSnapshot>) {
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }
}

fn read_snapshot(paths: &DataPaths, country: &str) -> Result<HazardSnapshot, HazardError> {
    let boundary = load_boundary(&paths.countries, country)?;
    let land_use = read_cache(&paths.hazards_cache)?;
    let water = read_cache(&paths.water_cache)?;
    log::info!(
        "Loaded {} land-use and {} water hazards from {}",
        land_use.len(),
        water.len(),
        paths.dir.display()
    );
    Ok(HazardSnapshot::new(land_use, water, boundary))
}
