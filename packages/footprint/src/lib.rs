#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Probability-mass footprints of scattered landing points.
//!
//! A Gaussian KDE is evaluated on a regular grid covering the points plus
//! three bandwidths of margin. The density level whose superlevel set holds
//! `coverage` of the grid's total mass is found by sorting the grid values,
//! and the region above that level is traced into polygons.
//!
//! Points must all be in one planar CRS; the footprint comes back in the
//! same CRS.

pub mod contour;
pub mod kde;

use geo::{Coord, MultiPolygon};
use thiserror::Error;

pub use contour::{Grid, iso_region};
pub use kde::GaussianKde;

/// Probability mass enclosed by the standard risk footprint.
pub const DEFAULT_COVERAGE: f64 = 0.95;

/// Samples per axis of the density grid.
pub const DEFAULT_GRID_SIZE: usize = 200;

/// Grid margin beyond the data, in kernel bandwidths.
pub const DEFAULT_CUT: f64 = 3.0;

/// Errors from footprint construction.
#[derive(Debug, Error)]
pub enum FootprintError {
    /// Too few points, or points that do not span two dimensions.
    #[error("Insufficient spread: {points} points do not support a 2-D density estimate")]
    InsufficientSpread {
        /// Number of points supplied.
        points: usize,
    },

    /// A point has a NaN or infinite coordinate.
    #[error("Point {index} has a non-finite coordinate")]
    NonFinitePoint {
        /// Position of the offending point.
        index: usize,
    },

    /// Coverage outside the open interval `(0, 1)`.
    #[error("Coverage must be in (0, 1), got {coverage}")]
    InvalidCoverage {
        /// Rejected value.
        coverage: f64,
    },

    /// The traced region came out empty.
    #[error("Density contour at level {level} enclosed no area")]
    EmptyContour {
        /// Density level that was traced.
        level: f64,
    },
}

/// Footprint builder with a fixed coverage and grid resolution.
#[derive(Debug, Clone, Copy)]
pub struct DensityFootprint {
    coverage: f64,
    grid_size: usize,
    cut: f64,
}

impl Default for DensityFootprint {
    fn default() -> Self {
        Self {
            coverage: DEFAULT_COVERAGE,
            grid_size: DEFAULT_GRID_SIZE,
            cut: DEFAULT_CUT,
        }
    }
}

impl DensityFootprint {
    /// Creates a builder enclosing `coverage` of the probability mass.
    ///
    /// # Errors
    ///
    /// Returns [`FootprintError::InvalidCoverage`] unless `0 < coverage < 1`.
    pub fn new(coverage: f64) -> Result<Self, FootprintError> {
        if !(coverage > 0.0 && coverage < 1.0) {
            return Err(FootprintError::InvalidCoverage { coverage });
        }
        Ok(Self {
            coverage,
            ..Self::default()
        })
    }

    /// Overrides the per-axis grid resolution (minimum 2).
    #[must_use]
    pub fn with_grid_size(self, grid_size: usize) -> Self {
        Self {
            grid_size: grid_size.max(2),
            ..self
        }
    }

    /// Configured coverage.
    #[must_use]
    pub const fn coverage(&self) -> f64 {
        self.coverage
    }

    /// Computes the footprint polygon(s) of `points`.
    ///
    /// The result may have several parts and holes.
    ///
    /// # Errors
    ///
    /// Returns [`FootprintError::InsufficientSpread`] for degenerate point
    /// sets and [`FootprintError::NonFinitePoint`] for NaN input.
    pub fn compute(&self, points: &[Coord<f64>]) -> Result<MultiPolygon<f64>, FootprintError> {
        let kde = GaussianKde::fit(points)?;
        let grid = self.density_grid(&kde);
        let level = density_level(&grid.values, self.coverage);

        log::debug!(
            "Footprint of {} points: {n}x{n} grid, level {level:e}",
            points.len(),
            n = self.grid_size
        );

        let region = iso_region(&grid, level);
        if region.0.is_empty() {
            return Err(FootprintError::EmptyContour { level });
        }
        Ok(region)
    }

    /// Samples `kde` on a grid spanning the data plus `cut` bandwidths.
    #[must_use]
    pub fn density_grid(&self, kde: &GaussianKde) -> Grid {
        let (bw_x, bw_y) = kde.bandwidth();
        let points = kde.points();
        let (min_x, max_x) = min_max(points.iter().map(|p| p.x));
        let (min_y, max_y) = min_max(points.iter().map(|p| p.y));

        let xs = linspace(min_x - self.cut * bw_x, max_x + self.cut * bw_x, self.grid_size);
        let ys = linspace(min_y - self.cut * bw_y, max_y + self.cut * bw_y, self.grid_size);

        let mut values = Vec::with_capacity(xs.len() * ys.len());
        for &y in &ys {
            for &x in &xs {
                values.push(kde.density(Coord { x, y }));
            }
        }

        Grid { xs, ys, values }
    }
}

/// Computes the footprint with the default grid.
///
/// # Errors
///
/// See [`DensityFootprint::new`] and [`DensityFootprint::compute`].
pub fn compute(points: &[Coord<f64>], coverage: f64) -> Result<MultiPolygon<f64>, FootprintError> {
    DensityFootprint::new(coverage)?.compute(points)
}

/// Density level whose superlevel set holds `coverage` of the total mass.
///
/// Values are sorted descending and accumulated; the level is the first
/// value at which the normalised running sum reaches `coverage`.
#[must_use]
pub fn density_level(values: &[f64], coverage: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return 0.0;
    }
    sorted.sort_unstable_by(|a, b| b.total_cmp(a));

    let total: f64 = sorted.iter().sum();
    if total <= 0.0 {
        return sorted[0];
    }

    let mut running = 0.0;
    for &value in &sorted {
        running += value;
        if running / total >= coverage {
            return value;
        }
    }
    sorted[sorted.len() - 1]
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    #[allow(clippy::cast_precision_loss)]
    let step = (end - start) / (n - 1) as f64;
    #[allow(clippy::cast_precision_loss)]
    (0..n).map(|i| start + step * i as f64).collect()
}
