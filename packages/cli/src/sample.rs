//! Risk of a synthetic landing cloud, without the simulator.

use chrono::Utc;
use launch_risk_evaluate::{RiskEvaluator, RiskResult};
use launch_risk_footprint::DensityFootprint;
use launch_risk_hazard::{HazardSnapshot, HazardStore};
use launch_risk_models::ScanSettings;
use launch_risk_scan::sampler::{DEFAULT_COVARIANCE, random_point_in, sample_landing_points};
use rand::SeedableRng as _;
use rand::rngs::StdRng;

/// Candidate means drawn before giving up on the boundary.
const MAX_ATTEMPTS: usize = 10_000;

/// Draws `count` landing points around a random spot inside the boundary
/// and scores their footprint against current hazard data.
pub async fn run(
    store: &HazardStore,
    settings: &ScanSettings,
    count: usize,
    seed: Option<u64>,
) -> Result<RiskResult, Box<dyn std::error::Error>> {
    let snapshot = store.snapshot().await?;
    let footprint = DensityFootprint::new(settings.coverage)?;
    let evaluator = RiskEvaluator::from_settings(settings);
    let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

    let result = tokio::task::spawn_blocking(move || {
        sample_and_score(&snapshot, footprint, &evaluator, count, rng)
    })
    .await?
    .map_err(|e| -> Box<dyn std::error::Error> { e })?;

    log::info!(
        "Synthetic footprint risk ratio {:.4} ({} hazards)",
        result.risk_ratio,
        result.hazards.len()
    );
    Ok(result)
}

fn sample_and_score(
    snapshot: &HazardSnapshot,
    footprint: DensityFootprint,
    evaluator: &RiskEvaluator,
    count: usize,
    mut rng: StdRng,
) -> Result<RiskResult, Box<dyn std::error::Error + Send + Sync>> {
    let crs = evaluator.crs();
    let boundary = snapshot.boundary_in(crs);
    let mean = random_point_in(&boundary, &mut rng, MAX_ATTEMPTS)?;
    log::info!(
        "Sampling {count} landing points around ({:.0}, {:.0}) in {}",
        mean.x,
        mean.y,
        crs.key()
    );

    let points = sample_landing_points(count, mean, DEFAULT_COVARIANCE, &mut rng)?;
    let polygon = footprint.compute(&points)?;
    Ok(evaluator.evaluate(Utc::now(), points, polygon, snapshot)?)
}

#[cfg(test)]
mod tests {
    use geo::{MultiPolygon, polygon};
    use launch_risk_hazard::HazardGeometry;
    use launch_risk_http::RetryPolicy;
    use launch_risk_models::{HazardSource, HazardStoreConfig};

    use super::*;

    fn store() -> HazardStore {
        let area = MultiPolygon(vec![polygon![
            (x: 24.0, y: 60.0),
            (x: 25.0, y: 60.0),
            (x: 25.0, y: 60.5),
            (x: 24.0, y: 60.5),
            (x: 24.0, y: 60.0),
        ]]);
        let snapshot = HazardSnapshot::new(
            vec![HazardGeometry {
                source: HazardSource::LandUse,
                tag: None,
                geometry: area.clone(),
            }],
            vec![],
            area,
        );
        HazardStore::with_snapshot(
            HazardStoreConfig::default(),
            reqwest::Client::new(),
            RetryPolicy::default(),
            snapshot,
        )
    }

    #[tokio::test]
    async fn seeded_samples_are_reproducible() {
        let store = store();
        let settings = ScanSettings::default();

        let a = run(&store, &settings, 150, Some(11)).await.unwrap();
        let b = run(&store, &settings, 150, Some(11)).await.unwrap();

        assert_eq!(a.landing_points.len(), 150);
        assert_eq!(a.landing_points, b.landing_points);
        assert!((a.risk_ratio - b.risk_ratio).abs() < 1e-12);
        assert!(a.risk_ratio > 0.0 && a.risk_ratio <= 1.0);
    }

    #[tokio::test]
    async fn too_few_points_fail() {
        let store = store();
        assert!(run(&store, &ScanSettings::default(), 2, Some(1)).await.is_err());
    }
}
