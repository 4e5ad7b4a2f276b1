#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Shared types for launch risk evaluation.
//!
//! This crate contains only data types, configuration structs, and simple
//! parsing. It has no heavyweight dependencies (no geometry, no I/O beyond
//! reading a config file).

pub mod config;
pub mod crs;
pub mod tags;

use serde::{Deserialize, Serialize};

pub use config::{
    ElevationConfig, FlightProfile, HazardStoreConfig, LaunchRiskConfig, LaunchSite,
    RetrySettings, ScanSettings, SimulatorConfig,
};
pub use crs::Crs;
pub use tags::{MissingKeysPolicy, TagRule, TagValue};

/// Which dataset a hazard geometry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardSource {
    /// OSM polygons selected by the tag deny-list.
    LandUse,
    /// Dedicated water-polygon dataset. Hazardous unconditionally.
    Water,
}

impl HazardSource {
    /// String tag used in the on-disk caches.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LandUse => "land_use",
            Self::Water => "water",
        }
    }

    /// Parses from the stored string tag.
    #[must_use]
    pub fn from_str_tag(s: &str) -> Option<Self> {
        match s {
            "land_use" => Some(Self::LandUse),
            "water" => Some(Self::Water),
            _ => None,
        }
    }
}

/// A single `(key, value)` tag that made a geometry hazardous.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchedTag {
    /// OSM key, e.g. `landuse`.
    pub key: String,
    /// OSM value actually carried by the geometry, e.g. `industrial`.
    pub value: String,
}
