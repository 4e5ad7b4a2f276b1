//! Conversions between `GeoJSON` values and `geo` polygons.

use geo::{BoundingRect, Geometry, MultiPolygon};
use geojson::GeoJson;
use rstar::AABB;

/// Parse a `GeoJSON` string into a [`MultiPolygon`].
///
/// Accepts a bare geometry, a feature, or a feature collection whose
/// polygonal members are merged. Returns `None` when nothing polygonal is
/// found.
#[must_use]
pub fn parse_geojson_to_multipolygon(geojson_str: &str) -> Option<MultiPolygon<f64>> {
    let geojson: GeoJson = geojson_str.parse().ok()?;
    let geometries: Vec<geojson::Geometry> = match geojson {
        GeoJson::Geometry(geom) => vec![geom],
        GeoJson::Feature(feature) => feature.geometry.into_iter().collect(),
        GeoJson::FeatureCollection(fc) => fc
            .features
            .into_iter()
            .filter_map(|f| f.geometry)
            .collect(),
    };

    let mut polygons = Vec::new();
    for geom in geometries {
        let geo_geom: Geometry<f64> = geom.try_into().ok()?;
        if let Some(mp) = geometry_to_multipolygon(geo_geom) {
            polygons.extend(mp.0);
        }
    }

    if polygons.is_empty() {
        None
    } else {
        Some(MultiPolygon(polygons))
    }
}

/// Extracts the polygonal part of a `geo` geometry.
///
/// Lines and points are dropped; collections are flattened.
#[must_use]
pub fn geometry_to_multipolygon(geometry: Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::MultiPolygon(mp) => Some(mp),
        Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        Geometry::Rect(r) => Some(MultiPolygon(vec![r.to_polygon()])),
        Geometry::Triangle(t) => Some(MultiPolygon(vec![t.to_polygon()])),
        Geometry::GeometryCollection(gc) => {
            let polygons: Vec<_> = gc
                .0
                .into_iter()
                .filter_map(geometry_to_multipolygon)
                .flat_map(|mp| mp.0)
                .collect();
            if polygons.is_empty() {
                None
            } else {
                Some(MultiPolygon(polygons))
            }
        }
        _ => None,
    }
}

/// Serialises a [`MultiPolygon`] to a `GeoJSON` geometry string.
#[must_use]
pub fn multipolygon_to_geojson(mp: &MultiPolygon<f64>) -> String {
    geojson::Geometry::new(geojson::Value::from(mp)).to_string()
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
#[must_use]
pub fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
