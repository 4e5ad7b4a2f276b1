#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry plumbing shared by the hazard store and the risk evaluator.
//!
//! Provides reprojection between the supported CRSs, polygon healing,
//! `GeoJSON` conversion, and an R-tree index over hazard polygons that is
//! built once per CRS and queried with footprint geometries.

pub mod convert;
pub mod heal;
pub mod index;
pub mod projection;

pub use convert::{
    compute_envelope, geometry_to_multipolygon, multipolygon_to_geojson,
    parse_geojson_to_multipolygon,
};
pub use heal::{heal_multi_polygon, heal_polygon};
pub use index::GeometryIndex;
pub use projection::{project_coord, reproject};
