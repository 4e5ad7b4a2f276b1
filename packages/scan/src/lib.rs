#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Launch window scanning.
//!
//! For each launch time on a grid the scanner runs the simulator ensemble,
//! pools the landing points, fits a density footprint in the working CRS,
//! and scores it against one hazard snapshot taken when the scan starts.
//!
//! Results come back as a stream in grid order. A failing step yields a
//! [`StepError`] for that launch time and the scan moves on; only setup
//! failures (no hazard data, no elevation) abort the whole scan.

pub mod elevation;
pub mod sampler;
pub mod simulator;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use futures::{Stream, StreamExt as _, future::try_join_all, stream};
use geo::{Contains, Coord, Point};
use launch_risk_evaluate::{EvaluateError, RiskEvaluator, RiskResult};
use launch_risk_footprint::{DensityFootprint, FootprintError};
use launch_risk_hazard::{HazardError, HazardSnapshot, HazardStore};
use launch_risk_models::{Crs, FlightProfile, LaunchSite, ScanSettings};
use launch_risk_spatial::project_coord;
use thiserror::Error;

pub use elevation::{ElevationError, ElevationLookup};
pub use simulator::{CommandSimulator, SimulationError, SimulationRequest, Simulator};

/// Errors that abort a whole scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The time window cannot produce a grid.
    #[error("Invalid scan window: {message}")]
    InvalidWindow {
        /// What was wrong with it.
        message: String,
    },

    /// The coverage setting was rejected.
    #[error(transparent)]
    Footprint(#[from] FootprintError),

    /// Hazard data could not be loaded.
    #[error(transparent)]
    Hazard(#[from] HazardError),

    /// The launch site elevation could not be looked up.
    #[error(transparent)]
    Elevation(#[from] ElevationError),
}

/// Stage of a grid step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepPhase {
    /// Running the simulator ensemble.
    Simulating,
    /// Fitting the footprint and scoring it.
    Scoring,
}

impl fmt::Display for StepPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simulating => write!(f, "simulating"),
            Self::Scoring => write!(f, "scoring"),
        }
    }
}

/// Why a grid step failed.
#[derive(Debug, Error)]
pub enum StepFailure {
    /// The simulator produced no usable landing points.
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    /// The landing points do not support a footprint.
    #[error(transparent)]
    Footprint(#[from] FootprintError),

    /// The footprint could not be scored.
    #[error(transparent)]
    Evaluate(#[from] EvaluateError),

    /// The scoring worker panicked.
    #[error("Scoring task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// One failed grid step. The scan continues past it.
#[derive(Debug, Error)]
#[error("Launch time {launch_time} failed while {phase}: {failure}")]
pub struct StepError {
    /// Grid point that failed.
    pub launch_time: DateTime<Utc>,
    /// Stage it failed in.
    pub phase: StepPhase,
    /// Underlying failure.
    #[source]
    pub failure: StepFailure,
}

/// Launch time grid: `start`, `start + increment`, ... up to and including
/// `start + window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    /// First launch time.
    pub start: DateTime<Utc>,
    /// Span after `start` covered by the grid.
    pub window: TimeDelta,
    /// Step between launch times.
    pub increment: TimeDelta,
}

impl ScanWindow {
    /// Window starting at `start` with lengths from `settings`.
    #[must_use]
    pub fn from_settings(start: DateTime<Utc>, settings: &ScanSettings) -> Self {
        Self {
            start,
            window: TimeDelta::hours(settings.window_hours),
            increment: TimeDelta::hours(settings.increment_hours),
        }
    }

    /// Every launch time in the window, in increasing order.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidWindow`] for a non-positive increment, a
    /// negative window, or an end time out of range.
    pub fn grid(&self) -> Result<Vec<DateTime<Utc>>, ScanError> {
        if self.increment <= TimeDelta::zero() {
            return Err(ScanError::InvalidWindow {
                message: format!("increment must be positive, got {}", self.increment),
            });
        }
        if self.window < TimeDelta::zero() {
            return Err(ScanError::InvalidWindow {
                message: format!("window must not be negative, got {}", self.window),
            });
        }
        let end = self
            .start
            .checked_add_signed(self.window)
            .ok_or_else(|| ScanError::InvalidWindow {
                message: format!("{} + {} is out of range", self.start, self.window),
            })?;

        let mut times = Vec::new();
        let mut t = self.start;
        while t <= end {
            times.push(t);
            match t.checked_add_signed(self.increment) {
                Some(next) => t = next,
                None => break,
            }
        }
        Ok(times)
    }
}

/// Shared, read-only state for every step of one scan.
struct ScanContext {
    snapshot: Arc<HazardSnapshot>,
    request: SimulationRequest,
    footprint: DensityFootprint,
    evaluator: RiskEvaluator,
}

/// Scores launch times over a window.
pub struct LaunchWindowScanner {
    simulator: Arc<dyn Simulator>,
    store: Arc<HazardStore>,
    elevation: ElevationLookup,
    site: LaunchSite,
    flight: FlightProfile,
    settings: ScanSettings,
    debug: bool,
}

impl LaunchWindowScanner {
    /// Creates a scanner.
    #[must_use]
    pub fn new(
        simulator: Arc<dyn Simulator>,
        store: Arc<HazardStore>,
        elevation: ElevationLookup,
        site: LaunchSite,
        flight: FlightProfile,
        settings: ScanSettings,
    ) -> Self {
        Self {
            simulator,
            store,
            elevation,
            site,
            flight,
            settings,
            debug: false,
        }
    }

    /// Asks the simulator for verbose output.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Scan settings in effect.
    #[must_use]
    pub const fn settings(&self) -> &ScanSettings {
        &self.settings
    }

    /// Starts a scan over `window`.
    ///
    /// Setup (grid validation, hazard loading, elevation lookup) happens
    /// before this returns. Steps then run as the stream is polled, up to
    /// `max_concurrent_steps` at a time, and are yielded in grid order.
    /// Dropping the stream cancels the remaining steps.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError`] if setup fails.
    pub async fn scan(
        &self,
        window: ScanWindow,
    ) -> Result<impl Stream<Item = Result<RiskResult, StepError>> + '_, ScanError> {
        let grid = window.grid()?;
        let footprint = DensityFootprint::new(self.settings.coverage)?;
        let snapshot = self.store.snapshot().await?;
        let elevation = self.site_elevation().await?;
        self.check_site(&snapshot);

        log::info!(
            "Scanning {} launch times from {} every {}",
            grid.len(),
            window.start.to_rfc3339(),
            window.increment
        );

        let context = Arc::new(ScanContext {
            snapshot,
            request: SimulationRequest::new(
                &self.site,
                elevation,
                &self.flight,
                window.start,
                self.debug,
            ),
            footprint,
            evaluator: RiskEvaluator::from_settings(&self.settings),
        });
        let concurrency = self.settings.max_concurrent_steps.max(1);

        Ok(stream::iter(grid)
            .map(move |launch_time| {
                let context = Arc::clone(&context);
                async move { self.run_step(&context, launch_time).await }
            })
            .buffered(concurrency))
    }

    /// Deletes and re-fetches hazard data. Scans already running keep the
    /// snapshot they started with.
    ///
    /// # Errors
    ///
    /// Returns [`HazardError`] if the refresh fails.
    pub async fn refresh_data(&self) -> Result<(), HazardError> {
        self.store.refresh().await.map(|_| ())
    }

    async fn site_elevation(&self) -> Result<f64, ElevationError> {
        match self.site.elevation {
            Some(elevation) => Ok(elevation),
            None => {
                self.elevation
                    .elevation(self.site.latitude, self.site.longitude)
                    .await
            }
        }
    }

    fn check_site(&self, snapshot: &HazardSnapshot) {
        let site = Point::new(self.site.longitude, self.site.latitude);
        if !snapshot.boundary().contains(&site) {
            log::warn!(
                "Launch site ({}, {}) is outside the boundary polygon",
                self.site.latitude,
                self.site.longitude
            );
        }
    }

    async fn run_step(
        &self,
        context: &Arc<ScanContext>,
        launch_time: DateTime<Utc>,
    ) -> Result<RiskResult, StepError> {
        let fail = |phase: StepPhase| {
            move |failure: StepFailure| StepError {
                launch_time,
                phase,
                failure,
            }
        };

        log::debug!("{}: simulating", launch_time.to_rfc3339());
        let request = context.request.at(launch_time);
        let runs = (0..self.settings.ensemble_invocations).map(|_| self.simulator.simulate(&request));
        let points: Vec<Coord<f64>> = try_join_all(runs)
            .await
            .map_err(|e| fail(StepPhase::Simulating)(e.into()))?
            .into_iter()
            .flatten()
            .collect();

        log::debug!(
            "{}: scoring {} pooled landing points",
            launch_time.to_rfc3339(),
            points.len()
        );
        let context = Arc::clone(context);
        let result = tokio::task::spawn_blocking(move || score(&context, launch_time, &points))
            .await
            .map_err(|e| fail(StepPhase::Scoring)(e.into()))?
            .map_err(fail(StepPhase::Scoring))?;

        log::info!(
            "{}: risk ratio {:.4} ({} hazards)",
            launch_time.to_rfc3339(),
            result.risk_ratio,
            result.hazards.len()
        );
        Ok(result)
    }
}

fn score(
    context: &ScanContext,
    launch_time: DateTime<Utc>,
    points: &[Coord<f64>],
) -> Result<RiskResult, StepFailure> {
    let crs = context.evaluator.crs();
    let projected: Vec<Coord<f64>> = points
        .iter()
        .map(|&c| project_coord(c, Crs::Wgs84, crs))
        .collect();
    let footprint = context.footprint.compute(&projected)?;
    Ok(context
        .evaluator
        .evaluate(launch_time, projected, footprint, &context.snapshot)?)
}

impl fmt::Debug for LaunchWindowScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaunchWindowScanner")
            .field("site", &self.site)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn grid_includes_both_ends() {
        let window = ScanWindow {
            start: t0(),
            window: TimeDelta::days(2),
            increment: TimeDelta::days(1),
        };
        assert_eq!(
            window.grid().unwrap(),
            vec![t0(), t0() + TimeDelta::days(1), t0() + TimeDelta::days(2)]
        );
    }

    #[test]
    fn uneven_window_stops_before_end() {
        let window = ScanWindow {
            start: t0(),
            window: TimeDelta::hours(50),
            increment: TimeDelta::hours(24),
        };
        assert_eq!(window.grid().unwrap().len(), 3);

        let single = ScanWindow {
            window: TimeDelta::zero(),
            ..window
        };
        assert_eq!(single.grid().unwrap(), vec![t0()]);
    }

    #[test]
    fn non_positive_increment_is_rejected() {
        for increment in [TimeDelta::zero(), TimeDelta::hours(-1)] {
            let window = ScanWindow {
                start: t0(),
                window: TimeDelta::days(1),
                increment,
            };
            assert!(matches!(window.grid(), Err(ScanError::InvalidWindow { .. })));
        }
    }

    #[test]
    fn settings_are_hours() {
        let window = ScanWindow::from_settings(t0(), &ScanSettings::default());
        assert_eq!(window.window, TimeDelta::days(10));
        assert_eq!(window.grid().unwrap().len(), 11);
    }
}
