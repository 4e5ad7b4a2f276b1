//! Risk evaluation results and their `GeoJSON` rendering.

use chrono::{DateTime, Utc};
use geo::{Coord, MultiPolygon, Point};
use geojson::{Feature, FeatureCollection};
use launch_risk_models::{Crs, HazardSource, MatchedTag};
use launch_risk_spatial::reproject;
use serde::Serialize;

use crate::EvaluateError;

/// Part of one hazard that falls inside the footprint.
#[derive(Debug, Clone, PartialEq)]
pub struct HazardHit {
    /// Hazard id within the snapshot.
    pub id: usize,
    /// Dataset the hazard came from.
    pub source: HazardSource,
    /// Deny-list tag that selected it.
    pub tag: Option<MatchedTag>,
    /// Hazard clipped to the footprint, in the working CRS.
    pub intersection: MultiPolygon<f64>,
    /// Area of [`Self::intersection`].
    pub area: f64,
}

/// Outcome of scoring one launch time.
///
/// `risk_ratio` is zero exactly when `hazards` is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskResult {
    /// Candidate launch time.
    pub launch_time: DateTime<Utc>,
    /// CRS of every geometry below.
    pub crs: Crs,
    /// Pooled simulated landing points.
    pub landing_points: Vec<Coord<f64>>,
    /// Density footprint.
    pub footprint: MultiPolygon<f64>,
    /// Hazards intersecting the footprint.
    pub hazards: Vec<HazardHit>,
    /// Footprint area.
    pub footprint_area: f64,
    /// Area of the union of all hazard intersections.
    pub hazard_area: f64,
    /// `hazard_area / footprint_area`, in `[0, 1]`.
    pub risk_ratio: f64,
}

/// Scalar fields of a [`RiskResult`], for line-oriented output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskSummary {
    /// Candidate launch time.
    pub launch_time: DateTime<Utc>,
    /// Hazard share of the footprint.
    pub risk_ratio: f64,
    /// Whether the ratio is below the configured maximum.
    pub acceptable: bool,
    /// Number of hazards intersecting the footprint.
    pub hazard_count: usize,
    /// Footprint area in working CRS units.
    pub footprint_area: f64,
    /// Hazard area in working CRS units.
    pub hazard_area: f64,
    /// Number of pooled landing points.
    pub landing_points: usize,
    /// Working CRS identifier.
    pub crs: String,
}

impl RiskResult {
    /// Whether the hazard share is below `max_ratio`.
    #[must_use]
    pub fn is_acceptable(&self, max_ratio: f64) -> bool {
        self.risk_ratio < max_ratio
    }

    /// Scalar summary, judged against `max_ratio`.
    #[must_use]
    pub fn summary(&self, max_ratio: f64) -> RiskSummary {
        RiskSummary {
            launch_time: self.launch_time,
            risk_ratio: self.risk_ratio,
            acceptable: self.is_acceptable(max_ratio),
            hazard_count: self.hazards.len(),
            footprint_area: self.footprint_area,
            hazard_area: self.hazard_area,
            landing_points: self.landing_points.len(),
            crs: self.crs.key(),
        }
    }

    /// Renders the result as JSON with the landing points, footprint and
    /// hazard intersections as WGS84 `GeoJSON` feature collections.
    ///
    /// # Errors
    ///
    /// Returns [`EvaluateError::Json`] if serialisation fails.
    pub fn to_geojson(&self) -> Result<serde_json::Value, EvaluateError> {
        let points: FeatureCollection = self
            .landing_points
            .iter()
            .map(|c| {
                let p: Point<f64> = reproject(&Point::from(*c), self.crs, Crs::Wgs84);
                Feature::from(geojson::Geometry::new(geojson::Value::from(&p)))
            })
            .collect();

        let footprint: FeatureCollection = std::iter::once(self.wgs84_feature(&self.footprint))
            .collect();

        let hazards: FeatureCollection = self
            .hazards
            .iter()
            .map(|hit| {
                let mut feature = self.wgs84_feature(&hit.intersection);
                feature.set_property("id", hit.id);
                feature.set_property("source", hit.source.as_str());
                if let Some(tag) = &hit.tag {
                    feature.set_property("tag_key", tag.key.clone());
                    feature.set_property("tag_value", tag.value.clone());
                }
                feature.set_property("area", hit.area);
                feature
            })
            .collect();

        Ok(serde_json::json!({
            "launch_time": self.launch_time.to_rfc3339(),
            "crs": self.crs.key(),
            "risk_ratio": self.risk_ratio,
            "footprint_area": self.footprint_area,
            "hazard_area": self.hazard_area,
            "landing_points": serde_json::to_value(&points)?,
            "footprint": serde_json::to_value(&footprint)?,
            "hazards": serde_json::to_value(&hazards)?,
        }))
    }

    fn wgs84_feature(&self, geometry: &MultiPolygon<f64>) -> Feature {
        let wgs84 = reproject(geometry, self.crs, Crs::Wgs84);
        Feature::from(geojson::Geometry::new(geojson::Value::from(&wgs84)))
    }
}
