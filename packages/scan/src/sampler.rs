//! Synthetic landing point sets.
//!
//! Stand-ins for simulator output: a bivariate normal cloud around a mean
//! picked uniformly inside the boundary. Used to exercise the scoring path
//! without running the simulator.

use geo::{BoundingRect, Contains, Coord, MultiPolygon, Point};
use rand::Rng;
use rand_distr::StandardNormal;
use thiserror::Error;

/// Spread of the synthetic cloud in working CRS units squared.
pub const DEFAULT_COVARIANCE: [[f64; 2]; 2] = [[6e6, 4e6], [4e6, 3.5e6]];

/// Errors from synthetic sampling.
#[derive(Debug, Error)]
pub enum SampleError {
    /// The covariance matrix is not symmetric positive definite.
    #[error("Covariance {covariance:?} is not positive definite")]
    InvalidCovariance {
        /// Rejected matrix.
        covariance: [[f64; 2]; 2],
    },

    /// No point inside the boundary was found.
    #[error("No point inside the boundary after {attempts} attempts")]
    NoPointInBoundary {
        /// Candidates drawn.
        attempts: usize,
    },
}

/// Draws `count` points from a bivariate normal distribution.
///
/// # Errors
///
/// Returns [`SampleError::InvalidCovariance`] if `covariance` has no
/// Cholesky factor.
pub fn sample_landing_points<R: Rng + ?Sized>(
    count: usize,
    mean: Coord<f64>,
    covariance: [[f64; 2]; 2],
    rng: &mut R,
) -> Result<Vec<Coord<f64>>, SampleError> {
    let [[sxx, sxy], [syx, syy]] = covariance;
    let invalid = || SampleError::InvalidCovariance { covariance };

    if (sxy - syx).abs() > f64::EPSILON * sxy.abs().max(1.0) || sxx <= 0.0 {
        return Err(invalid());
    }
    let l11 = sxx.sqrt();
    let l21 = sxy / l11;
    let rest = syy - l21 * l21;
    if rest <= 0.0 {
        return Err(invalid());
    }
    let l22 = rest.sqrt();

    Ok((0..count)
        .map(|_| {
            let z1: f64 = rng.sample(StandardNormal);
            let z2: f64 = rng.sample(StandardNormal);
            Coord {
                x: l11.mul_add(z1, mean.x),
                y: l22.mul_add(z2, l21.mul_add(z1, mean.y)),
            }
        })
        .collect())
}

/// Rejection-samples a point uniformly inside `boundary`.
///
/// # Errors
///
/// Returns [`SampleError::NoPointInBoundary`] if `max_attempts` candidates
/// from the bounding box all miss.
pub fn random_point_in<R: Rng + ?Sized>(
    boundary: &MultiPolygon<f64>,
    rng: &mut R,
    max_attempts: usize,
) -> Result<Coord<f64>, SampleError> {
    let miss = SampleError::NoPointInBoundary {
        attempts: max_attempts,
    };
    let Some(bbox) = boundary.bounding_rect() else {
        return Err(miss);
    };
    let (min, max) = (bbox.min(), bbox.max());
    if !(min.x < max.x && min.y < max.y) {
        return Err(miss);
    }

    for _ in 0..max_attempts {
        let candidate = Coord {
            x: rng.gen_range(min.x..max.x),
            y: rng.gen_range(min.y..max.y),
        };
        if boundary.contains(&Point::from(candidate)) {
            return Ok(candidate);
        }
    }
    Err(miss)
}

#[cfg(test)]
mod tests {
    use geo::polygon;
    use rand::SeedableRng as _;
    use rand::rngs::StdRng;

    use super::*;

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn sample_moments_match_parameters() {
        let mut rng = StdRng::seed_from_u64(7);
        let mean = Coord {
            x: 2_700_000.0,
            y: 8_450_000.0,
        };
        let points = sample_landing_points(20_000, mean, DEFAULT_COVARIANCE, &mut rng).unwrap();
        let n = points.len() as f64;

        let mx = points.iter().map(|p| p.x).sum::<f64>() / n;
        let my = points.iter().map(|p| p.y).sum::<f64>() / n;
        let cxx = points.iter().map(|p| (p.x - mx).powi(2)).sum::<f64>() / n;
        let cxy = points.iter().map(|p| (p.x - mx) * (p.y - my)).sum::<f64>() / n;

        assert!((mx - mean.x).abs() < 100.0);
        assert!((my - mean.y).abs() < 100.0);
        assert!((cxx / 6e6 - 1.0).abs() < 0.05);
        assert!((cxy / 4e6 - 1.0).abs() < 0.08);
    }

    #[test]
    fn rejects_indefinite_covariance() {
        let mut rng = StdRng::seed_from_u64(1);
        let origin = Coord { x: 0.0, y: 0.0 };
        assert!(sample_landing_points(10, origin, [[1.0, 2.0], [2.0, 1.0]], &mut rng).is_err());
        assert!(sample_landing_points(10, origin, [[1.0, 0.5], [0.0, 1.0]], &mut rng).is_err());
    }

    #[test]
    fn random_points_fall_inside_boundary() {
        // An L shape, so the bbox has a large empty corner.
        let boundary = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 2.0),
            (x: 2.0, y: 2.0),
            (x: 2.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ]]);
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..50 {
            let p = random_point_in(&boundary, &mut rng, 1000).unwrap();
            assert!(boundary.contains(&Point::from(p)));
        }

        assert!(matches!(
            random_point_in(&MultiPolygon(vec![]), &mut rng, 10),
            Err(SampleError::NoPointInBoundary { .. })
        ));
    }
}
