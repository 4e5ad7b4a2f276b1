//! Trajectory simulator collaborator.
//!
//! The simulator is opaque: it takes launch and flight parameters and
//! returns predicted landing coordinates. [`CommandSimulator`] drives an
//! external program through a JSON request file and reads the
//! `landingMarkers` it writes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geo::Coord;
use launch_risk_models::{FlightProfile, LaunchSite, SimulatorConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from a simulator invocation.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Filesystem error around the request or output files.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path that caused the error.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The simulator program could not be started.
    #[error("Failed to start simulator '{program}': {source}")]
    Spawn {
        /// Program that was executed.
        program: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The simulator exited unsuccessfully.
    #[error("Simulator '{program}' failed ({status}): {stderr}")]
    Failed {
        /// Program that was executed.
        program: String,
        /// Exit status description.
        status: String,
        /// Tail of the simulator's stderr.
        stderr: String,
    },

    /// The simulator ran past its time limit and was killed.
    #[error("Simulator '{program}' timed out after {secs}s")]
    Timeout {
        /// Program that was executed.
        program: String,
        /// Time limit in seconds.
        secs: u64,
    },

    /// The output file is missing or not valid JSON.
    #[error("Invalid simulator output at {path}: {message}")]
    InvalidOutput {
        /// Output file path.
        path: String,
        /// What was wrong with it.
        message: String,
    },

    /// The output parsed but holds no landing markers.
    #[error("Simulator output at {path} has no landing markers")]
    NoLandingPoints {
        /// Output file path.
        path: String,
    },
}

/// Launch conditions for one simulated launch time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchParams {
    /// Launch site latitude in degrees.
    pub launch_site_lat: f64,
    /// Launch site longitude in degrees.
    pub launch_site_lon: f64,
    /// Launch site elevation in meters.
    pub launch_site_elev: f64,
    /// Launch time.
    pub launch_time: DateTime<Utc>,
    /// Gas temperature at inflation in degrees Celsius.
    pub inflation_temperature: f64,
    /// Skip high-definition forecasts.
    #[serde(rename = "forceNonHD")]
    pub force_non_hd: bool,
}

/// Balloon flight train description.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlightParams {
    /// Lifting gas identifier.
    pub balloon_gas_type: String,
    /// Balloon model identifier.
    pub balloon_model: String,
    /// Nozzle lift in kg.
    pub nozzle_lift: f64,
    /// Payload train weight in kg.
    pub payload_train_weight: f64,
    /// Parachute model identifier.
    pub parachute_model: String,
    /// Monte Carlo runs in this invocation.
    pub number_of_sim_runs: u32,
    /// Equivalent sphere diameter of the train in meters.
    pub train_equiv_sphere_diam: f64,
    /// Verbose simulator output.
    pub debugging: bool,
}

/// Everything a simulator needs for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationRequest {
    /// Launch conditions.
    pub launch: LaunchParams,
    /// Flight train.
    pub flight: FlightParams,
}

impl SimulationRequest {
    /// Builds a request for `launch_time` from the configured site and
    /// flight profile. `elevation` overrides the site's own value.
    #[must_use]
    pub fn new(
        site: &LaunchSite,
        elevation: f64,
        flight: &FlightProfile,
        launch_time: DateTime<Utc>,
        debug: bool,
    ) -> Self {
        Self {
            launch: LaunchParams {
                launch_site_lat: site.latitude,
                launch_site_lon: site.longitude,
                launch_site_elev: elevation,
                launch_time,
                inflation_temperature: flight.inflation_temperature,
                force_non_hd: flight.force_non_hd,
            },
            flight: FlightParams {
                balloon_gas_type: flight.gas_type.clone(),
                balloon_model: flight.balloon_model.clone(),
                nozzle_lift: flight.nozzle_lift_kg,
                payload_train_weight: flight.payload_train_weight_kg,
                parachute_model: flight.parachute_model.clone(),
                number_of_sim_runs: flight.number_of_sim_runs,
                train_equiv_sphere_diam: flight.train_equiv_sphere_diam,
                debugging: debug,
            },
        }
    }

    /// Same request at a different launch time.
    #[must_use]
    pub fn at(&self, launch_time: DateTime<Utc>) -> Self {
        let mut request = self.clone();
        request.launch.launch_time = launch_time;
        request
    }
}

/// A trajectory simulator.
///
/// Implementations return landing points as WGS84 longitude/latitude.
#[async_trait]
pub trait Simulator: Send + Sync {
    /// Runs one invocation and returns every landing point it predicts.
    ///
    /// # Errors
    ///
    /// Returns [`SimulationError`] if no usable landing points were
    /// produced.
    async fn simulate(&self, request: &SimulationRequest) -> Result<Vec<Coord<f64>>, SimulationError>;
}

/// Request file as written for [`CommandSimulator`].
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestFile<'a> {
    launch: &'a LaunchParams,
    flight: &'a FlightParams,
    output_path: &'a Path,
    output_formats: [&'static str; 1],
}

/// Runs an external simulator program.
///
/// Each invocation gets a fresh temporary directory holding
/// `request.json`; the program is called as `<program> <args..>
/// <request.json>` and must write `<outputPath>/out.json`. The directory is
/// removed afterwards whether or not the run succeeded.
#[derive(Debug, Clone)]
pub struct CommandSimulator {
    config: SimulatorConfig,
}

impl CommandSimulator {
    /// Creates a simulator from its configuration.
    #[must_use]
    pub const fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }

    async fn run(&self, request: &SimulationRequest, dir: &Path) -> Result<PathBuf, SimulationError> {
        let output_path = dir.join("sim_out");
        let request_path = dir.join("request.json");
        let body = RequestFile {
            launch: &request.launch,
            flight: &request.flight,
            output_path: &output_path,
            output_formats: ["json"],
        };
        let json = serde_json::to_vec_pretty(&body).map_err(|e| SimulationError::InvalidOutput {
            path: request_path.display().to_string(),
            message: e.to_string(),
        })?;
        tokio::fs::write(&request_path, json)
            .await
            .map_err(|e| io_error(&request_path, e))?;

        let program = &self.config.program;
        log::debug!(
            "Running {program} for {}",
            request.launch.launch_time.to_rfc3339()
        );
        let child = tokio::process::Command::new(program)
            .args(&self.config.args)
            .arg(&request_path)
            .current_dir(dir)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SimulationError::Spawn {
                program: program.clone(),
                source,
            })?;

        let limit = Duration::from_secs(self.config.timeout_secs);
        let output = tokio::time::timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| SimulationError::Timeout {
                program: program.clone(),
                secs: self.config.timeout_secs,
            })?
            .map_err(|source| SimulationError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(20).collect();
            return Err(SimulationError::Failed {
                program: program.clone(),
                status: output.status.to_string(),
                stderr: tail.into_iter().rev().collect::<Vec<_>>().join("\n"),
            });
        }

        Ok(output_path.join("out.json"))
    }
}

#[async_trait]
impl Simulator for CommandSimulator {
    async fn simulate(&self, request: &SimulationRequest) -> Result<Vec<Coord<f64>>, SimulationError> {
        let dir = tempfile::Builder::new()
            .prefix("launch-risk-sim-")
            .tempdir()
            .map_err(|e| io_error(&std::env::temp_dir(), e))?;

        let out_file = self.run(request, dir.path()).await?;
        let text = tokio::fs::read_to_string(&out_file)
            .await
            .map_err(|e| SimulationError::InvalidOutput {
                path: out_file.display().to_string(),
                message: e.to_string(),
            })?;
        parse_landing_markers(&text, &out_file)
    }
}

#[derive(Deserialize)]
struct SimulatorOutput {
    #[serde(rename = "landingMarkers")]
    landing_markers: Vec<LandingMarker>,
}

#[derive(Deserialize)]
struct LandingMarker {
    lat: f64,
    lon: f64,
}

/// Extracts `landingMarkers[*].{lat,lon}` as longitude/latitude points.
///
/// # Errors
///
/// Returns [`SimulationError::InvalidOutput`] for malformed JSON and
/// [`SimulationError::NoLandingPoints`] for an empty marker list.
pub fn parse_landing_markers(text: &str, path: &Path) -> Result<Vec<Coord<f64>>, SimulationError> {
    let output: SimulatorOutput =
        serde_json::from_str(text).map_err(|e| SimulationError::InvalidOutput {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    if output.landing_markers.is_empty() {
        return Err(SimulationError::NoLandingPoints {
            path: path.display().to_string(),
        });
    }

    Ok(output
        .landing_markers
        .into_iter()
        .map(|m| Coord { x: m.lon, y: m.lat })
        .collect())
}

fn io_error(path: &Path, source: std::io::Error) -> SimulationError {
    SimulationError::Io {
        path: path.display().to_string(),
        source,
    }
}
