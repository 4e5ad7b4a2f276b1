//! Coordinate reference system identifiers.
//!
//! Only the identifiers live here; the projection math is in
//! `launch_risk_spatial::projection`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The coordinate reference systems the pipeline knows how to use.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub enum Crs {
    /// Geographic WGS84 longitude/latitude in degrees (EPSG:4326).
    Wgs84,
    /// Spherical Web Mercator in meters (EPSG:3857).
    #[default]
    WebMercator,
    /// ETRS89 Lambert azimuthal equal-area, Europe (EPSG:3035).
    EtrsLaea,
}

impl Crs {
    /// EPSG code of this CRS.
    #[must_use]
    pub const fn epsg(self) -> u32 {
        match self {
            Self::Wgs84 => 4326,
            Self::WebMercator => 3857,
            Self::EtrsLaea => 3035,
        }
    }

    /// Normalised identifier, e.g. `"EPSG:3857"`.
    #[must_use]
    pub fn key(self) -> String {
        format!("EPSG:{}", self.epsg())
    }

    /// Whether coordinates are planar (meters) rather than degrees.
    #[must_use]
    pub const fn is_projected(self) -> bool {
        !matches!(self, Self::Wgs84)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

/// Error returned when a CRS identifier is not supported.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported CRS: {0}")]
pub struct UnsupportedCrs(pub String);

impl FromStr for Crs {
    type Err = UnsupportedCrs;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let code = trimmed
            .get(..5)
            .filter(|prefix| prefix.eq_ignore_ascii_case("EPSG:"))
            .map_or(trimmed, |_| &trimmed[5..]);

        match code.trim() {
            "4326" => Ok(Self::Wgs84),
            "3857" | "900913" => Ok(Self::WebMercator),
            "3035" => Ok(Self::EtrsLaea),
            _ => Err(UnsupportedCrs(s.to_string())),
        }
    }
}

impl TryFrom<String> for Crs {
    type Error = UnsupportedCrs;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Crs> for String {
    fn from(value: Crs) -> Self {
        value.key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_epsg_identifiers_case_insensitively() {
        assert_eq!("EPSG:4326".parse::<Crs>().unwrap(), Crs::Wgs84);
        assert_eq!("epsg:3857".parse::<Crs>().unwrap(), Crs::WebMercator);
        assert_eq!(" 3035 ".parse::<Crs>().unwrap(), Crs::EtrsLaea);
        assert!("EPSG:32635".parse::<Crs>().is_err());
    }

    #[test]
    fn key_is_normalised() {
        let parsed: Crs = "epsg:900913".parse().unwrap();
        assert_eq!(parsed.key(), "EPSG:3857");
        assert_eq!(parsed.to_string(), parsed.key());
    }
}
