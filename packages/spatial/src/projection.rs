//! Forward and inverse projections between the supported CRSs.
//!
//! All conversions go through WGS84 longitude/latitude. Coordinates are
//! `x = longitude` / `y = latitude` in degrees for [`Crs::Wgs84`] and
//! easting/northing in meters otherwise.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use geo::{Coord, MapCoords};
use launch_risk_models::Crs;

/// Web Mercator sphere radius (WGS84 semi-major axis).
const MERCATOR_RADIUS: f64 = 6_378_137.0;

/// Latitude limit where Web Mercator is square (arctan(sinh(π))).
const MERCATOR_MAX_LAT: f64 = 85.051_128_779_806_59;

/// GRS80 semi-major axis.
const GRS80_A: f64 = 6_378_137.0;

/// GRS80 flattening.
const GRS80_F: f64 = 1.0 / 298.257_222_101;

/// EPSG:3035 natural origin and false origin.
const LAEA_LAT0_DEG: f64 = 52.0;
const LAEA_LON0_DEG: f64 = 10.0;
const LAEA_FALSE_EASTING: f64 = 4_321_000.0;
const LAEA_FALSE_NORTHING: f64 = 3_210_000.0;

/// Converts a single coordinate from one CRS to another.
#[must_use]
pub fn project_coord(coord: Coord<f64>, from: Crs, to: Crs) -> Coord<f64> {
    if from == to {
        return coord;
    }
    let lonlat = match from {
        Crs::Wgs84 => coord,
        Crs::WebMercator => mercator_inverse(coord),
        Crs::EtrsLaea => Laea::etrs().inverse(coord),
    };
    match to {
        Crs::Wgs84 => lonlat,
        Crs::WebMercator => mercator_forward(lonlat),
        Crs::EtrsLaea => Laea::etrs().forward(lonlat),
    }
}

/// Reprojects any `geo` geometry from `from` into `to`.
///
/// Returns a clone when the two CRSs are the same.
#[must_use]
pub fn reproject<G>(geometry: &G, from: Crs, to: Crs) -> G
where
    G: MapCoords<f64, f64, Output = G> + Clone,
{
    if from == to {
        return geometry.clone();
    }
    let laea = Laea::etrs();
    geometry.map_coords(move |c| {
        let lonlat = match from {
            Crs::Wgs84 => c,
            Crs::WebMercator => mercator_inverse(c),
            Crs::EtrsLaea => laea.inverse(c),
        };
        match to {
            Crs::Wgs84 => lonlat,
            Crs::WebMercator => mercator_forward(lonlat),
            Crs::EtrsLaea => laea.forward(lonlat),
        }
    })
}

fn mercator_forward(lonlat: Coord<f64>) -> Coord<f64> {
    let lat = lonlat.y.clamp(-MERCATOR_MAX_LAT, MERCATOR_MAX_LAT).to_radians();
    Coord {
        x: MERCATOR_RADIUS * lonlat.x.to_radians(),
        y: MERCATOR_RADIUS * (FRAC_PI_4 + lat / 2.0).tan().ln(),
    }
}

fn mercator_inverse(xy: Coord<f64>) -> Coord<f64> {
    Coord {
        x: (xy.x / MERCATOR_RADIUS).to_degrees(),
        y: (2.0 * (xy.y / MERCATOR_RADIUS).exp().atan() - FRAC_PI_2).to_degrees(),
    }
}

/// Ellipsoidal Lambert azimuthal equal-area (oblique aspect).
///
/// Constants are precomputed once per construction; the struct is `Copy`
/// so it can be captured by the `map_coords` closure.
#[derive(Debug, Clone, Copy)]
struct Laea {
    e: f64,
    e2: f64,
    lat0: f64,
    lon0: f64,
    false_easting: f64,
    false_northing: f64,
    qp: f64,
    rq: f64,
    d: f64,
    sin_beta0: f64,
    cos_beta0: f64,
}

impl Laea {
    fn etrs() -> Self {
        Self::new(
            GRS80_A,
            GRS80_F,
            LAEA_LAT0_DEG,
            LAEA_LON0_DEG,
            LAEA_FALSE_EASTING,
            LAEA_FALSE_NORTHING,
        )
    }

    fn new(a: f64, f: f64, lat0_deg: f64, lon0_deg: f64, fe: f64, fn_: f64) -> Self {
        let e2 = 2.0 * f - f * f;
        let e = e2.sqrt();
        let lat0 = lat0_deg.to_radians();
        let qp = authalic_q(FRAC_PI_2, e, e2);
        let q0 = authalic_q(lat0, e, e2);
        let beta0 = (q0 / qp).clamp(-1.0, 1.0).asin();
        let rq = a * (qp / 2.0).sqrt();
        let d = a * lat0.cos() / ((1.0 - e2 * lat0.sin().powi(2)).sqrt() * rq * beta0.cos());

        Self {
            e,
            e2,
            lat0,
            lon0: lon0_deg.to_radians(),
            false_easting: fe,
            false_northing: fn_,
            qp,
            rq,
            d,
            sin_beta0: beta0.sin(),
            cos_beta0: beta0.cos(),
        }
    }

    fn forward(&self, lonlat: Coord<f64>) -> Coord<f64> {
        let lat = lonlat.y.to_radians();
        let dlon = lonlat.x.to_radians() - self.lon0;
        let q = authalic_q(lat, self.e, self.e2);
        let beta = (q / self.qp).clamp(-1.0, 1.0).asin();
        let (sin_b, cos_b) = beta.sin_cos();

        let denom = 1.0 + self.sin_beta0 * sin_b + self.cos_beta0 * cos_b * dlon.cos();
        let b = self.rq * (2.0 / denom).sqrt();

        Coord {
            x: self.false_easting + b * self.d * cos_b * dlon.sin(),
            y: self.false_northing
                + (b / self.d) * (self.cos_beta0 * sin_b - self.sin_beta0 * cos_b * dlon.cos()),
        }
    }

    fn inverse(&self, xy: Coord<f64>) -> Coord<f64> {
        let de = xy.x - self.false_easting;
        let dn = xy.y - self.false_northing;
        let rho = ((de / self.d).powi(2) + (self.d * dn).powi(2)).sqrt();

        if rho < 1e-12 {
            return Coord {
                x: self.lon0.to_degrees(),
                y: self.lat0.to_degrees(),
            };
        }

        let c = 2.0 * (rho / (2.0 * self.rq)).clamp(-1.0, 1.0).asin();
        let (sin_c, cos_c) = c.sin_cos();
        let beta = (cos_c * self.sin_beta0 + self.d * dn * sin_c * self.cos_beta0 / rho)
            .clamp(-1.0, 1.0)
            .asin();
        let lon = self.lon0
            + (de * sin_c).atan2(
                self.d * rho * self.cos_beta0 * cos_c
                    - self.d * self.d * dn * self.sin_beta0 * sin_c,
            );

        let e4 = self.e2 * self.e2;
        let e6 = e4 * self.e2;
        let lat = beta
            + (self.e2 / 3.0 + 31.0 * e4 / 180.0 + 517.0 * e6 / 5040.0) * (2.0 * beta).sin()
            + (23.0 * e4 / 360.0 + 251.0 * e6 / 3780.0) * (4.0 * beta).sin()
            + (761.0 * e6 / 45360.0) * (6.0 * beta).sin();

        Coord {
            x: lon.to_degrees(),
            y: lat.to_degrees(),
        }
    }
}

/// Authalic `q` function of geodetic latitude.
fn authalic_q(lat: f64, e: f64, e2: f64) -> f64 {
    let sin_lat = lat.sin();
    let es = e * sin_lat;
    (1.0 - e2) * (sin_lat / (1.0 - e2 * sin_lat * sin_lat) - (1.0 / (2.0 * e)) * ((1.0 - es) / (1.0 + es)).ln())
}
