#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hazard geometry store.
//!
//! Prepares raw data on first use (country boundaries, an OSM land-use
//! extract, water polygons), filters land use through the tag deny-list,
//! heals every polygon, and caches the result in `DuckDB` files so later
//! process starts skip the expensive extraction.
//!
//! Loaded data lives in an immutable [`HazardSnapshot`]. The
//! [`HazardStore`] swaps in a new snapshot on refresh, so evaluations that
//! already hold a snapshot keep a consistent view.

pub mod cache;
pub mod filter;
pub mod land_use;
pub mod prepare;
pub mod snapshot;
pub mod store;

use geo::MultiPolygon;
use launch_risk_http::HttpError;
use launch_risk_models::{HazardSource, MatchedTag};
use thiserror::Error;

pub use filter::{HazardFilter, TaggedPolygon};
pub use prepare::{DataPaths, DataPreparer};
pub use snapshot::HazardSnapshot;
pub use store::HazardStore;

/// A polygon that is unsafe to land in, in WGS84.
#[derive(Debug, Clone, PartialEq)]
pub struct HazardGeometry {
    /// Dataset the polygon came from.
    pub source: HazardSource,
    /// Deny-list tag that selected it. `None` for water polygons and for
    /// land use kept because no deny-list key was present.
    pub tag: Option<MatchedTag>,
    /// Healed geometry.
    pub geometry: MultiPolygon<f64>,
}

/// Errors from hazard data preparation and loading.
#[derive(Debug, Error)]
pub enum HazardError {
    /// Required data is missing and could not be prepared.
    #[error("Hazard data unavailable: {reason}")]
    DataUnavailable {
        /// What was missing or failed.
        reason: String,
        /// Underlying failure, if any.
        #[source]
        source: Option<Box<Self>>,
    },

    /// Download failed.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// `DuckDB` cache read or write failed.
    #[error("Database error: {0}")]
    Database(#[from] duckdb::Error),

    /// Filesystem error.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A `GeoJSON` file could not be parsed.
    #[error("Invalid GeoJSON in {path}: {message}")]
    GeoJson {
        /// File that failed to parse.
        path: String,
        /// Error description.
        message: String,
    },

    /// A derived cache holds a row that cannot be decoded.
    #[error("Corrupt hazard cache {path} at row {row}: {message}")]
    CorruptCache {
        /// Cache file.
        path: String,
        /// Row id that failed to decode.
        row: i64,
        /// Error description.
        message: String,
    },

    /// The OSM extract could not be read.
    #[error("OSM PBF parse error in {path}: {message}")]
    Osm {
        /// Path to the PBF file.
        path: String,
        /// Error description.
        message: String,
    },

    /// A blocking worker panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl HazardError {
    /// Wraps any preparation failure as [`Self::DataUnavailable`].
    #[must_use]
    pub fn unavailable(reason: impl Into<String>, source: Self) -> Self {
        Self::DataUnavailable {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Whether the root cause is a network failure that outlasted retries.
    #[must_use]
    pub fn is_transient_network(&self) -> bool {
        match self {
            Self::Http(e) => e.is_transient(),
            Self::DataUnavailable {
                source: Some(inner),
                ..
            } => inner.is_transient_network(),
            _ => false,
        }
    }

    /// Whether a derived cache failed to decode and should be rebuilt.
    #[must_use]
    pub const fn is_corrupt_cache(&self) -> bool {
        matches!(self, Self::CorruptCache { .. })
    }

    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
