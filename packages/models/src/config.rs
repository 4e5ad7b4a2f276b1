//! TOML configuration for the launch risk toolchain.
//!
//! Every field has a default, so an empty document is a valid config.
//! Sections mirror the pipeline: `[data]` feeds the hazard store,
//! `[launch_site]` and `[flight]` feed the simulator, `[scan]` drives the
//! launch window scan.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Crs, MissingKeysPolicy, TagRule};

/// Default Natural Earth admin-0 countries dataset (`GeoJSON`).
pub const DEFAULT_COUNTRIES_URL: &str = "https://raw.githubusercontent.com/nvkelso/natural-earth-vector/master/geojson/ne_110m_admin_0_countries.geojson";

/// Default land-use source: the Geofabrik OSM extract.
pub const DEFAULT_LAND_USE_URL: &str = "https://download.geofabrik.de/europe/finland-latest.osm.pbf";

/// Default water polygon dataset (`GeoJSON`).
pub const DEFAULT_WATER_URL: &str = "https://raw.githubusercontent.com/nvkelso/natural-earth-vector/master/geojson/ne_10m_ocean.geojson";

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchRiskConfig {
    /// Hazard data store settings.
    pub data: HazardStoreConfig,
    /// Where the balloon is launched from.
    pub launch_site: LaunchSite,
    /// Balloon, parachute and payload parameters.
    pub flight: FlightProfile,
    /// Launch window scan settings.
    pub scan: ScanSettings,
    /// External trajectory simulator.
    pub simulator: SimulatorConfig,
    /// Elevation lookup service.
    pub elevation: ElevationConfig,
    /// Retry policy for all outbound HTTP calls.
    pub retry: RetrySettings,
}

impl LaunchRiskConfig {
    /// Parses a config from a TOML string and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the TOML is malformed or a value is out
    /// of range.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&text)
    }

    /// Checks value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scan = &self.scan;
        if !(scan.coverage > 0.0 && scan.coverage < 1.0) {
            return Err(ConfigError::invalid(format!(
                "scan.coverage must be in (0, 1), got {}",
                scan.coverage
            )));
        }
        if scan.increment_hours <= 0 {
            return Err(ConfigError::invalid(format!(
                "scan.increment_hours must be positive, got {}",
                scan.increment_hours
            )));
        }
        if scan.window_hours < 0 {
            return Err(ConfigError::invalid(format!(
                "scan.window_hours must not be negative, got {}",
                scan.window_hours
            )));
        }
        if scan.ensemble_invocations == 0 {
            return Err(ConfigError::invalid("scan.ensemble_invocations must be at least 1"));
        }
        if scan.max_concurrent_steps == 0 {
            return Err(ConfigError::invalid("scan.max_concurrent_steps must be at least 1"));
        }
        if !scan.working_crs.is_projected() {
            return Err(ConfigError::invalid(
                "scan.working_crs must be a projected CRS (areas in degrees are meaningless)",
            ));
        }
        if self.flight.number_of_sim_runs == 0 {
            return Err(ConfigError::invalid("flight.number_of_sim_runs must be at least 1"));
        }
        if !(-90.0..=90.0).contains(&self.launch_site.latitude)
            || !(-180.0..=180.0).contains(&self.launch_site.longitude)
        {
            return Err(ConfigError::invalid(format!(
                "launch_site ({}, {}) is not a valid coordinate",
                self.launch_site.latitude, self.launch_site.longitude
            )));
        }
        Ok(())
    }
}

/// Hazard data store configuration, injected at store construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HazardStoreConfig {
    /// Directory holding raw downloads and derived caches.
    pub data_dir: PathBuf,
    /// Country boundaries `GeoJSON` URL.
    pub countries_url: String,
    /// Land-use source URL: an OSM PBF extract (`.pbf`) or a `GeoJSON`
    /// export whose feature properties are OSM tags.
    pub land_use_url: String,
    /// Water polygon `GeoJSON` URL.
    pub water_url: String,
    /// Value of the `ADMIN` property selecting the boundary polygon.
    pub country_name: String,
    /// Tags that make an OSM polygon hazardous.
    pub deny_list: Vec<TagRule>,
    /// Behaviour when a dataset carries none of the deny-list keys.
    pub missing_keys_policy: MissingKeysPolicy,
    /// Water polygons are clipped to the boundary bbox grown by this
    /// multiple of its longest edge.
    pub water_clip_margin: f64,
}

impl Default for HazardStoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            countries_url: DEFAULT_COUNTRIES_URL.to_string(),
            land_use_url: DEFAULT_LAND_USE_URL.to_string(),
            water_url: DEFAULT_WATER_URL.to_string(),
            country_name: "Finland".to_string(),
            deny_list: TagRule::default_deny_list(),
            missing_keys_policy: MissingKeysPolicy::default(),
            water_clip_margin: 1.0,
        }
    }
}

/// Launch site coordinates (WGS84).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaunchSite {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Elevation in meters. Looked up once per scan when absent.
    pub elevation: Option<f64>,
}

impl Default for LaunchSite {
    fn default() -> Self {
        // Vantinlaakso, Espoo
        Self {
            latitude: 60.184_101,
            longitude: 24.623_690,
            elevation: None,
        }
    }
}

/// Balloon flight train parameters passed to the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightProfile {
    /// Balloon model identifier.
    pub balloon_model: String,
    /// Lifting gas identifier.
    pub gas_type: String,
    /// Nozzle lift in kg.
    pub nozzle_lift_kg: f64,
    /// Payload train weight in kg.
    pub payload_train_weight_kg: f64,
    /// Parachute model identifier.
    pub parachute_model: String,
    /// Monte Carlo runs per simulator invocation.
    pub number_of_sim_runs: u32,
    /// Equivalent sphere diameter of the train in meters.
    pub train_equiv_sphere_diam: f64,
    /// Gas temperature at inflation in degrees Celsius.
    pub inflation_temperature: f64,
    /// Force the simulator to skip high-definition forecasts.
    pub force_non_hd: bool,
}

impl Default for FlightProfile {
    fn default() -> Self {
        Self {
            balloon_model: "SFB800".to_string(),
            gas_type: "gt96He".to_string(),
            nozzle_lift_kg: 1.6,
            payload_train_weight_kg: 0.604,
            parachute_model: "SFP800".to_string(),
            number_of_sim_runs: 5,
            train_equiv_sphere_diam: 0.285,
            inflation_temperature: 10.0,
            force_non_hd: false,
        }
    }
}

/// Launch window scan settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Window length after the first launch time, in hours.
    pub window_hours: i64,
    /// Step between candidate launch times, in hours.
    pub increment_hours: i64,
    /// Simulator invocations pooled per launch time.
    pub ensemble_invocations: u32,
    /// Probability mass enclosed by the density footprint.
    pub coverage: f64,
    /// Footprint simplification tolerance (working CRS units) used only
    /// to pre-filter hazard candidates.
    pub simplify_tolerance: f64,
    /// Planar CRS all area and intersection work happens in.
    pub working_crs: Crs,
    /// Launch times evaluated concurrently. Results stay in time order.
    pub max_concurrent_steps: usize,
    /// Ratio above which a launch time is reported as unacceptable.
    pub max_hazard_ratio: f64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            window_hours: 240,
            increment_hours: 24,
            ensemble_invocations: 1,
            coverage: 0.95,
            simplify_tolerance: 10.0,
            working_crs: Crs::WebMercator,
            max_concurrent_steps: 1,
            max_hazard_ratio: 0.15,
        }
    }
}

/// External simulator invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Program to execute.
    pub program: String,
    /// Extra arguments placed before the request file path.
    pub args: Vec<String>,
    /// Kill the simulator after this many seconds.
    pub timeout_secs: u64,
    /// Ask the simulator for verbose output.
    pub debug: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            program: "balloon-sim".to_string(),
            args: Vec::new(),
            timeout_secs: 1800,
            debug: false,
        }
    }
}

/// Elevation lookup service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElevationConfig {
    /// Endpoint accepting `lat`, `lon` and `dataSet` query parameters.
    pub url: String,
    /// Elevation dataset name.
    pub dataset: String,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            url: "https://api.elevationapi.com/api/Elevation".to_string(),
            dataset: "FABDEM".to_string(),
        }
    }
}

/// Retry policy settings for outbound HTTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// First backoff delay; doubled on each retry.
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 2000,
        }
    }
}

/// Errors from loading a config.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The TOML could not be parsed.
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid config: {message}")]
    Invalid {
        /// Description of what went wrong.
        message: String,
    },
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TagValue;

    #[test]
    fn empty_document_yields_defaults() {
        let config = LaunchRiskConfig::from_toml_str("").unwrap();
        assert_eq!(config, LaunchRiskConfig::default());
        assert!((config.scan.coverage - 0.95).abs() < f64::EPSILON);
        assert_eq!(config.scan.working_crs, Crs::WebMercator);
        assert_eq!(config.flight.number_of_sim_runs, 5);
        assert_eq!(config.data.data_dir, PathBuf::from("data"));
    }

    #[test]
    fn parses_deny_list_and_crs_strings() {
        let config = LaunchRiskConfig::from_toml_str(
            r#"
            [data]
            data_dir = "/tmp/hazards"
            deny_list = ["landuse=industrial", "building=*"]
            missing_keys_policy = "reject_all"

            [scan]
            working_crs = "EPSG:3035"
            increment_hours = 6
            "#,
        )
        .unwrap();

        assert_eq!(config.data.deny_list.len(), 2);
        assert_eq!(config.data.deny_list[1].value, TagValue::Any);
        assert_eq!(config.data.missing_keys_policy, MissingKeysPolicy::RejectAll);
        assert_eq!(config.scan.working_crs, Crs::EtrsLaea);
        assert_eq!(config.scan.increment_hours, 6);
        assert_eq!(config.scan.window_hours, 240);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(LaunchRiskConfig::from_toml_str("[scan]\ncoverage = 1.0").is_err());
        assert!(LaunchRiskConfig::from_toml_str("[scan]\nincrement_hours = 0").is_err());
        assert!(LaunchRiskConfig::from_toml_str("[scan]\nworking_crs = \"EPSG:4326\"").is_err());
        assert!(LaunchRiskConfig::from_toml_str("[data]\ndeny_list = [\"landuse\"]").is_err());
    }
}
