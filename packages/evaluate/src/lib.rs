#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hazard ratio of a landing footprint.
//!
//! The footprint is simplified only to pick hazard candidates from the
//! snapshot's index. Areas always come from exact intersections with the
//! unsimplified footprint, unioned so overlapping hazards count once.

pub mod result;

use chrono::{DateTime, Utc};
use geo::{Area, BooleanOps, Coord, MultiPolygon, Simplify};
use launch_risk_hazard::HazardSnapshot;
use launch_risk_models::{Crs, ScanSettings};
use thiserror::Error;

pub use result::{HazardHit, RiskResult, RiskSummary};

/// Errors from risk evaluation.
#[derive(Debug, Error)]
pub enum EvaluateError {
    /// The footprint cannot be scored.
    #[error("Geometry error: {message}")]
    Geometry {
        /// What was wrong with the geometry.
        message: String,
    },

    /// Result serialisation failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Scores footprints against a hazard snapshot in one working CRS.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskEvaluator {
    crs: Crs,
    simplify_tolerance: f64,
}

impl RiskEvaluator {
    /// Creates an evaluator working in `crs`. `simplify_tolerance` is in
    /// `crs` units.
    #[must_use]
    pub const fn new(crs: Crs, simplify_tolerance: f64) -> Self {
        Self {
            crs,
            simplify_tolerance,
        }
    }

    /// Creates an evaluator from scan settings.
    #[must_use]
    pub const fn from_settings(settings: &ScanSettings) -> Self {
        Self::new(settings.working_crs, settings.simplify_tolerance)
    }

    /// Working CRS.
    #[must_use]
    pub const fn crs(&self) -> Crs {
        self.crs
    }

    /// Scores `footprint` against every hazard in `snapshot`.
    ///
    /// `landing_points` and `footprint` must be in the evaluator's working
    /// CRS. They are carried into the result unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluateError::Geometry`] if the footprint has no area.
    pub fn evaluate(
        &self,
        launch_time: DateTime<Utc>,
        landing_points: Vec<Coord<f64>>,
        footprint: MultiPolygon<f64>,
        snapshot: &HazardSnapshot,
    ) -> Result<RiskResult, EvaluateError> {
        let footprint_area = footprint.unsigned_area();
        if !footprint_area.is_finite() || footprint_area <= 0.0 {
            return Err(EvaluateError::Geometry {
                message: format!("footprint area is {footprint_area}"),
            });
        }

        let simplified = footprint.simplify(self.simplify_tolerance);
        let query = if simplified.unsigned_area() > 0.0 {
            &simplified
        } else {
            &footprint
        };

        let index = snapshot.hazard_index(self.crs);
        let candidates = index.intersecting(query);

        let hazards: Vec<HazardHit> = candidates
            .into_iter()
            .filter_map(|(id, geometry)| {
                let intersection = geometry.intersection(&footprint);
                let area = intersection.unsigned_area();
                if area <= 0.0 {
                    return None;
                }
                let hazard = snapshot.hazard(id)?;
                Some(HazardHit {
                    id,
                    source: hazard.source,
                    tag: hazard.tag.clone(),
                    intersection,
                    area,
                })
            })
            .collect();

        let hazard_area = if hazards.is_empty() {
            0.0
        } else {
            geo::unary_union(hazards.iter().map(|h| &h.intersection)).unsigned_area()
        };
        let risk_ratio = (hazard_area / footprint_area).clamp(0.0, 1.0);

        log::debug!(
            "{launch_time}: {} hazards intersect the footprint, ratio {risk_ratio:.4}",
            hazards.len()
        );

        Ok(RiskResult {
            launch_time,
            crs: self.crs,
            landing_points,
            footprint,
            hazards,
            footprint_area,
            hazard_area,
            risk_ratio,
        })
    }
}
