//! Validity repair for polygon data from third-party sources.
//!
//! OSM and Natural Earth polygons occasionally self-intersect or carry
//! bow-tie rings. Running an invalid polygon through a boolean union
//! resolves the crossings into a valid polygon set, which is the `geo`
//! equivalent of a zero-width buffer.

use geo::{Area, MultiPolygon, Polygon, Validation, unary_union};

/// Rings with less area than this (in squared CRS units) are dropped.
const MIN_AREA: f64 = 1e-12;

/// Repairs a single polygon. Returns an empty multipolygon if nothing with
/// positive area survives.
#[must_use]
pub fn heal_polygon(polygon: Polygon<f64>) -> MultiPolygon<f64> {
    if polygon.exterior().0.len() < 4 {
        return MultiPolygon(vec![]);
    }
    if polygon.is_valid() {
        return drop_slivers(MultiPolygon(vec![polygon]));
    }
    drop_slivers(unary_union(std::iter::once(&polygon)))
}

/// Repairs every member of a multipolygon and merges overlapping parts.
#[must_use]
pub fn heal_multi_polygon(mp: MultiPolygon<f64>) -> MultiPolygon<f64> {
    if mp.is_valid() {
        return drop_slivers(mp);
    }
    let parts: Vec<Polygon<f64>> = mp.0.into_iter().flat_map(|p| heal_polygon(p).0).collect();
    drop_slivers(unary_union(parts.iter()))
}

fn drop_slivers(mp: MultiPolygon<f64>) -> MultiPolygon<f64> {
    MultiPolygon(
        mp.0
            .into_iter()
            .filter(|p| p.unsigned_area() > MIN_AREA)
            .collect(),
    )
}
