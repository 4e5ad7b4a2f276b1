//! Bivariate Gaussian kernel density estimate with Scott's-rule bandwidth.

use std::f64::consts::PI;

use geo::Coord;

use crate::FootprintError;

/// Minimum number of points for a non-singular 2-D sample covariance.
pub const MIN_POINTS: usize = 3;

/// Relative determinant below which the covariance is treated as singular
/// (all points identical or collinear).
const SINGULAR_TOLERANCE: f64 = 1e-10;

/// A fitted Gaussian KDE.
///
/// The kernel covariance is the sample covariance scaled by the squared
/// bandwidth factor `n^(-1/6)`.
#[derive(Debug, Clone)]
pub struct GaussianKde {
    points: Vec<Coord<f64>>,
    covariance: [[f64; 2]; 2],
    inverse: [[f64; 2]; 2],
    norm: f64,
}

impl GaussianKde {
    /// Fits a KDE to `points`.
    ///
    /// # Errors
    ///
    /// Returns [`FootprintError::NonFinitePoint`] for NaN or infinite
    /// coordinates and [`FootprintError::InsufficientSpread`] if there are
    /// fewer than [`MIN_POINTS`] points or they do not span two dimensions.
    pub fn fit(points: &[Coord<f64>]) -> Result<Self, FootprintError> {
        if let Some(index) = points.iter().position(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(FootprintError::NonFinitePoint { index });
        }
        if points.len() < MIN_POINTS {
            return Err(FootprintError::InsufficientSpread {
                points: points.len(),
            });
        }

        #[allow(clippy::cast_precision_loss)]
        let n = points.len() as f64;
        let mean_x = points.iter().map(|p| p.x).sum::<f64>() / n;
        let mean_y = points.iter().map(|p| p.y).sum::<f64>() / n;

        let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
        for p in points {
            let dx = p.x - mean_x;
            let dy = p.y - mean_y;
            sxx += dx * dx;
            syy += dy * dy;
            sxy += dx * dy;
        }
        let data_cov = [[sxx / (n - 1.0), sxy / (n - 1.0)], [sxy / (n - 1.0), syy / (n - 1.0)]];

        let data_det = data_cov[0][0] * data_cov[1][1] - data_cov[0][1] * data_cov[1][0];
        if data_cov[0][0] <= 0.0
            || data_cov[1][1] <= 0.0
            || data_det <= SINGULAR_TOLERANCE * data_cov[0][0] * data_cov[1][1]
        {
            return Err(FootprintError::InsufficientSpread {
                points: points.len(),
            });
        }

        let factor_sq = scott_factor(points.len()).powi(2);
        let covariance = [
            [data_cov[0][0] * factor_sq, data_cov[0][1] * factor_sq],
            [data_cov[1][0] * factor_sq, data_cov[1][1] * factor_sq],
        ];
        let det = covariance[0][0] * covariance[1][1] - covariance[0][1] * covariance[1][0];
        let inverse = [
            [covariance[1][1] / det, -covariance[0][1] / det],
            [-covariance[1][0] / det, covariance[0][0] / det],
        ];

        Ok(Self {
            points: points.to_vec(),
            covariance,
            inverse,
            norm: 1.0 / (n * 2.0 * PI * det.sqrt()),
        })
    }

    /// Kernel covariance matrix.
    #[must_use]
    pub const fn covariance(&self) -> [[f64; 2]; 2] {
        self.covariance
    }

    /// Kernel standard deviation along x and y.
    #[must_use]
    pub fn bandwidth(&self) -> (f64, f64) {
        (self.covariance[0][0].sqrt(), self.covariance[1][1].sqrt())
    }

    /// Sample points the estimate was fitted to.
    #[must_use]
    pub fn points(&self) -> &[Coord<f64>] {
        &self.points
    }

    /// Density at `at`.
    #[must_use]
    pub fn density(&self, at: Coord<f64>) -> f64 {
        let [[a, b], [_, d]] = self.inverse;
        let sum: f64 = self
            .points
            .iter()
            .map(|p| {
                let dx = at.x - p.x;
                let dy = at.y - p.y;
                (-0.5 * (a * dx * dx + 2.0 * b * dx * dy + d * dy * dy)).exp()
            })
            .sum();
        sum * self.norm
    }
}

/// Scott's rule bandwidth factor for 2-D data.
#[must_use]
pub fn scott_factor(n: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let n = n as f64;
    n.powf(-1.0 / 6.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scatter() -> Vec<Coord<f64>> {
        vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 2.0, y: 1.0 },
            Coord { x: 1.0, y: 3.0 },
            Coord { x: -1.0, y: 2.0 },
            Coord { x: 0.5, y: -1.0 },
        ]
    }

    #[test]
    fn scott_factor_matches_closed_form() {
        assert!((scott_factor(64) - 0.5).abs() < 1e-12);
        assert!((scott_factor(1) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn kernel_covariance_is_scaled_sample_covariance() {
        let kde = GaussianKde::fit(&scatter()).unwrap();
        // Sample variance of x: mean 0.5, squared deviations sum to 5.0
        let expected = 5.0 / 4.0 * scott_factor(5).powi(2);
        assert!((kde.covariance()[0][0] - expected).abs() < 1e-12);
        assert!((kde.bandwidth().0 - expected.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn density_peaks_near_the_data() {
        let kde = GaussianKde::fit(&scatter()).unwrap();
        let near = kde.density(Coord { x: 0.5, y: 1.0 });
        let far = kde.density(Coord { x: 30.0, y: 30.0 });
        assert!(near > 0.0);
        assert!(near > far * 1e6);
    }

    #[test]
    fn density_integrates_to_one() {
        let kde = GaussianKde::fit(&scatter()).unwrap();
        let step = 0.05;
        let mut total = 0.0;
        for i in -300..=300 {
            for j in -300..=300 {
                let at = Coord {
                    x: 0.5 + f64::from(i) * step,
                    y: 1.0 + f64::from(j) * step,
                };
                total += kde.density(at) * step * step;
            }
        }
        assert!((total - 1.0).abs() < 1e-3, "integral {total}");
    }

    #[test]
    fn degenerate_inputs_are_rejected() {
        let same = vec![Coord { x: 1.0, y: 1.0 }; 10];
        assert!(matches!(
            GaussianKde::fit(&same),
            Err(FootprintError::InsufficientSpread { points: 10 })
        ));

        let two = vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }];
        assert!(matches!(
            GaussianKde::fit(&two),
            Err(FootprintError::InsufficientSpread { points: 2 })
        ));

        let collinear: Vec<_> = (0..6)
            .map(|i| Coord {
                x: f64::from(i),
                y: 2.0 * f64::from(i) + 1.0,
            })
            .collect();
        assert!(matches!(
            GaussianKde::fit(&collinear),
            Err(FootprintError::InsufficientSpread { .. })
        ));

        let nan = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: f64::NAN, y: 1.0 },
            Coord { x: 1.0, y: 0.0 },
        ];
        assert!(matches!(
            GaussianKde::fit(&nan),
            Err(FootprintError::NonFinitePoint { index: 1 })
        ));
    }
}
