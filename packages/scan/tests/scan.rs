//! End-to-end scans with an in-process simulator and an in-memory hazard
//! snapshot.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone as _, Utc};
use futures::StreamExt as _;
use geo::{Coord, MultiPolygon, polygon};
use launch_risk_footprint::FootprintError;
use launch_risk_hazard::{HazardError, HazardGeometry, HazardSnapshot, HazardStore};
use launch_risk_http::RetryPolicy;
use launch_risk_models::{
    Crs, ElevationConfig, FlightProfile, HazardSource, HazardStoreConfig, LaunchSite, MatchedTag,
    ScanSettings,
};
use launch_risk_scan::sampler::{DEFAULT_COVARIANCE, sample_landing_points};
use launch_risk_scan::{
    ElevationLookup, LaunchWindowScanner, ScanError, ScanWindow, SimulationError, SimulationRequest,
    Simulator, StepFailure, StepPhase,
};
use launch_risk_spatial::project_coord;
use rand::SeedableRng as _;
use rand::rngs::StdRng;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn square(x0: f64, y0: f64, x1: f64, y1: f64) -> MultiPolygon<f64> {
    MultiPolygon(vec![polygon![
        (x: x0, y: y0),
        (x: x1, y: y0),
        (x: x1, y: y1),
        (x: x0, y: y1),
        (x: x0, y: y0),
    ]])
}

/// Residential block around (24.5, 60.25); Finland-sized boundary.
fn snapshot() -> HazardSnapshot {
    HazardSnapshot::new(
        vec![HazardGeometry {
            source: HazardSource::LandUse,
            tag: Some(MatchedTag {
                key: "landuse".to_string(),
                value: "residential".to_string(),
            }),
            geometry: square(24.0, 60.0, 25.0, 60.5),
        }],
        vec![],
        square(20.0, 59.0, 31.0, 70.0),
    )
}

const INSIDE_HAZARD: Coord<f64> = Coord { x: 24.5, y: 60.25 };
const FAR_FROM_HAZARDS: Coord<f64> = Coord { x: 28.0, y: 65.0 };

/// Scatters landing points around a fixed WGS84 centre.
struct ScriptedSimulator {
    center: Coord<f64>,
    points_per_run: usize,
    calls: AtomicUsize,
    fail_at: Option<DateTime<Utc>>,
    degenerate: bool,
    /// Earlier launch times take longer, so concurrent steps finish out of
    /// order.
    slow_early_steps: bool,
}

impl ScriptedSimulator {
    fn around(center: Coord<f64>) -> Self {
        Self {
            center,
            points_per_run: 40,
            calls: AtomicUsize::new(0),
            fail_at: None,
            degenerate: false,
            slow_early_steps: false,
        }
    }
}

#[async_trait]
impl Simulator for ScriptedSimulator {
    async fn simulate(&self, request: &SimulationRequest) -> Result<Vec<Coord<f64>>, SimulationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let launch_time = request.launch.launch_time;

        if self.slow_early_steps {
            let hours = u64::try_from((launch_time - t0()).num_hours()).unwrap();
            tokio::time::sleep(Duration::from_millis(40 * 5u64.saturating_sub(hours))).await;
        }
        if self.fail_at == Some(launch_time) {
            return Err(SimulationError::NoLandingPoints {
                path: "out.json".to_string(),
            });
        }
        if self.degenerate {
            return Ok(vec![self.center; self.points_per_run]);
        }

        let seed = u64::try_from(launch_time.timestamp()).unwrap() + u64::try_from(call).unwrap();
        let mut rng = StdRng::seed_from_u64(seed);
        let mean = project_coord(self.center, Crs::Wgs84, Crs::WebMercator);
        let points = sample_landing_points(self.points_per_run, mean, DEFAULT_COVARIANCE, &mut rng)
            .unwrap()
            .into_iter()
            .map(|c| project_coord(c, Crs::WebMercator, Crs::Wgs84))
            .collect();
        Ok(points)
    }
}

fn offline_config() -> HazardStoreConfig {
    HazardStoreConfig {
        data_dir: std::env::temp_dir().join("launch_risk_scan_offline"),
        countries_url: "http://127.0.0.1:1/countries.geojson".to_string(),
        land_use_url: "http://127.0.0.1:1/land_use.geojson".to_string(),
        water_url: "http://127.0.0.1:1/water.geojson".to_string(),
        ..HazardStoreConfig::default()
    }
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_retries: 0,
        base_delay: Duration::from_millis(1),
        ..RetryPolicy::default()
    }
}

fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

fn scanner_with(
    simulator: Arc<ScriptedSimulator>,
    store: HazardStore,
    settings: ScanSettings,
) -> LaunchWindowScanner {
    LaunchWindowScanner::new(
        simulator,
        Arc::new(store),
        ElevationLookup::new(
            client(),
            fast_retry(),
            ElevationConfig {
                url: "http://127.0.0.1:1/api/Elevation".to_string(),
                ..ElevationConfig::default()
            },
        ),
        LaunchSite {
            elevation: Some(20.0),
            ..LaunchSite::default()
        },
        FlightProfile::default(),
        settings,
    )
}

fn scanner(simulator: Arc<ScriptedSimulator>, settings: ScanSettings) -> LaunchWindowScanner {
    let store = HazardStore::with_snapshot(offline_config(), client(), fast_retry(), snapshot());
    scanner_with(simulator, store, settings)
}

fn two_day_window() -> ScanWindow {
    ScanWindow {
        start: t0(),
        window: TimeDelta::days(2),
        increment: TimeDelta::days(1),
    }
}

#[tokio::test]
async fn two_day_window_emits_three_results_in_order() {
    let simulator = Arc::new(ScriptedSimulator::around(INSIDE_HAZARD));
    let scanner = scanner(simulator.clone(), ScanSettings::default());

    let results: Vec<_> = scanner
        .scan(two_day_window())
        .await
        .unwrap()
        .collect()
        .await;

    let times: Vec<DateTime<Utc>> = results
        .iter()
        .map(|r| r.as_ref().unwrap().launch_time)
        .collect();
    assert_eq!(
        times,
        vec![t0(), t0() + TimeDelta::days(1), t0() + TimeDelta::days(2)]
    );
    assert_eq!(simulator.calls.load(Ordering::SeqCst), 3);

    for result in results {
        let result = result.unwrap();
        assert!(result.risk_ratio > 0.999, "ratio {}", result.risk_ratio);
        assert!(result.risk_ratio <= 1.0);
        assert_eq!(result.crs, Crs::WebMercator);
        assert_eq!(result.landing_points.len(), 40);
    }
}

#[tokio::test]
async fn footprint_away_from_hazards_scores_zero() {
    let simulator = Arc::new(ScriptedSimulator::around(FAR_FROM_HAZARDS));
    let scanner = scanner(simulator, ScanSettings::default());

    let results: Vec<_> = scanner
        .scan(two_day_window())
        .await
        .unwrap()
        .collect()
        .await;

    for result in results {
        let result = result.unwrap();
        assert!(result.risk_ratio.abs() < f64::EPSILON);
        assert!(result.hazards.is_empty());
        assert!(result.footprint_area > 0.0);
    }
}

#[tokio::test]
async fn simulator_failure_is_reported_for_its_step_only() {
    let simulator = Arc::new(ScriptedSimulator {
        fail_at: Some(t0() + TimeDelta::days(1)),
        ..ScriptedSimulator::around(INSIDE_HAZARD)
    });
    let scanner = scanner(simulator, ScanSettings::default());

    let results: Vec<_> = scanner
        .scan(two_day_window())
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(results[2].is_ok());

    let err = results[1].as_ref().unwrap_err();
    assert_eq!(err.launch_time, t0() + TimeDelta::days(1));
    assert_eq!(err.phase, StepPhase::Simulating);
    assert!(matches!(err.failure, StepFailure::Simulation(_)));
}

#[tokio::test]
async fn degenerate_points_fail_scoring() {
    let simulator = Arc::new(ScriptedSimulator {
        degenerate: true,
        ..ScriptedSimulator::around(INSIDE_HAZARD)
    });
    let scanner = scanner(simulator, ScanSettings::default());

    let results: Vec<_> = scanner
        .scan(two_day_window())
        .await
        .unwrap()
        .collect()
        .await;

    for result in results {
        let err = result.unwrap_err();
        assert_eq!(err.phase, StepPhase::Scoring);
        assert!(matches!(
            err.failure,
            StepFailure::Footprint(FootprintError::InsufficientSpread { .. })
        ));
    }
}

#[tokio::test]
async fn ensemble_invocations_are_pooled() {
    let simulator = Arc::new(ScriptedSimulator::around(INSIDE_HAZARD));
    let settings = ScanSettings {
        ensemble_invocations: 3,
        ..ScanSettings::default()
    };
    let scanner = scanner(simulator.clone(), settings);

    let window = ScanWindow {
        window: TimeDelta::zero(),
        ..two_day_window()
    };
    let results: Vec<_> = scanner.scan(window).await.unwrap().collect().await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].as_ref().unwrap().landing_points.len(), 120);
    assert_eq!(simulator.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn concurrent_steps_still_arrive_in_time_order() {
    let simulator = Arc::new(ScriptedSimulator {
        slow_early_steps: true,
        ..ScriptedSimulator::around(FAR_FROM_HAZARDS)
    });
    let settings = ScanSettings {
        max_concurrent_steps: 4,
        ..ScanSettings::default()
    };
    let scanner = scanner(simulator, settings);

    let window = ScanWindow {
        start: t0(),
        window: TimeDelta::hours(4),
        increment: TimeDelta::hours(1),
    };
    let times: Vec<DateTime<Utc>> = scanner
        .scan(window)
        .await
        .unwrap()
        .map(|r| r.unwrap().launch_time)
        .collect()
        .await;

    assert_eq!(times.len(), 5);
    assert!(times.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn dropping_the_stream_stops_the_scan() {
    let simulator = Arc::new(ScriptedSimulator::around(FAR_FROM_HAZARDS));
    let settings = ScanSettings {
        max_concurrent_steps: 1,
        ..ScanSettings::default()
    };
    let scanner = scanner(simulator.clone(), settings);

    let first: Vec<_> = scanner
        .scan(ScanWindow::from_settings(t0(), &ScanSettings::default()))
        .await
        .unwrap()
        .take(1)
        .collect()
        .await;

    assert_eq!(first.len(), 1);
    assert_eq!(simulator.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn invalid_window_is_rejected_before_simulating() {
    let simulator = Arc::new(ScriptedSimulator::around(INSIDE_HAZARD));
    let scanner = scanner(simulator.clone(), ScanSettings::default());

    let window = ScanWindow {
        increment: TimeDelta::zero(),
        ..two_day_window()
    };
    assert!(matches!(
        scanner.scan(window).await,
        Err(ScanError::InvalidWindow { .. })
    ));
    assert_eq!(simulator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_hazard_data_aborts_the_scan() {
    let simulator = Arc::new(ScriptedSimulator::around(INSIDE_HAZARD));
    let config = HazardStoreConfig {
        data_dir: std::env::temp_dir().join("launch_risk_scan_missing_data"),
        ..offline_config()
    };
    let _ = std::fs::remove_dir_all(&config.data_dir);
    let store = HazardStore::new(config.clone(), client(), fast_retry());
    let scanner = scanner_with(simulator.clone(), store, ScanSettings::default());

    let err = scanner.scan(two_day_window()).await.err().unwrap();
    assert!(matches!(
        err,
        ScanError::Hazard(HazardError::DataUnavailable { .. })
    ));
    assert_eq!(simulator.calls.load(Ordering::SeqCst), 0);

    let _ = std::fs::remove_dir_all(&config.data_dir);
}
