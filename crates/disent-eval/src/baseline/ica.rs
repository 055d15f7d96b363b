// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use super::linalg::inverse_sqrt_symmetric;
use super::pca::principal_axes;
use super::{check_width, subsample_with_replacement, Representation};
use crate::error::{EvalError, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};

/// Iteration budget of [`FastIca::fit`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IcaSettings {
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Subspace iterations of the whitening PCA.
    pub power_iterations: usize,
}

impl Default for IcaSettings {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            tolerance: 1e-4,
            power_iterations: 6,
        }
    }
}

/// `(W Wᵀ)^{-1/2} W`
fn symmetric_decorrelation(unmixing: &Array2<f64>) -> Result<Array2<f64>> {
    let gram = unmixing.dot(&unmixing.t());
    let inverse_sqrt = inverse_sqrt_symmetric(&gram).ok_or_else(|| EvalError::Degenerate {
        representation: "ICA",
        reason: "unmixing matrix lost full rank".into(),
    })?;
    Ok(inverse_sqrt.dot(unmixing))
}

/// FastICA with the logcosh contrast and symmetric decorrelation.
#[derive(Debug, Clone)]
pub struct FastIca {
    mean: Array1<f64>,
    /// `pixels × k`: whitening followed by unmixing.
    projection: Array2<f64>,
    iterations: usize,
}

impl FastIca {
    pub fn fit(
        data: ArrayView2<'_, f64>,
        components: usize,
        settings: IcaSettings,
        rng: &mut dyn RngCore,
    ) -> Result<Self> {
        let axes = principal_axes("ICA", data, components, settings.power_iterations, rng)?;
        let whitening = &axes.directions / &axes.variance.mapv(f64::sqrt);
        let whitened = (&data - &axes.mean).dot(&whitening);
        let samples = whitened.nrows() as f64;

        let initial: Array2<f64> = Array2::from_shape_simple_fn((components, components), || {
            StandardNormal.sample(&mut *rng)
        });
        let mut unmixing = symmetric_decorrelation(&initial)?;
        let mut last_change = f64::INFINITY;
        let mut converged_at = None;
        for iteration in 1..=settings.max_iterations {
            let sources = whitened.dot(&unmixing.t());
            let g = sources.mapv(f64::tanh);
            let g_prime_mean = g
                .mapv(|v| 1.0 - v * v)
                .mean_axis(Axis(0))
                .ok_or(EvalError::EmptyInput("ICA training data"))?;
            let target = g.t().dot(&whitened) / samples;
            let mut updated = target - &(&unmixing * &g_prime_mean.insert_axis(Axis(1)));
            updated = symmetric_decorrelation(&updated)?;

            last_change = updated
                .dot(&unmixing.t())
                .diag()
                .iter()
                .map(|v| (v.abs() - 1.0).abs())
                .fold(0.0, f64::max);
            unmixing = updated;
            if last_change < settings.tolerance {
                converged_at = Some(iteration);
                break;
            }
        }
        let Some(iterations) = converged_at else {
            return Err(EvalError::IcaNotConverged {
                iterations: settings.max_iterations,
                tolerance: settings.tolerance,
                last_change,
            });
        };

        Ok(Self {
            mean: axes.mean,
            projection: whitening.dot(&unmixing.t()),
            iterations,
        })
    }

    /// Fits on `samples` rows drawn uniformly with replacement.
    pub fn fit_subsample(
        images: ArrayView2<'_, f64>,
        samples: usize,
        components: usize,
        settings: IcaSettings,
        rng: &mut dyn RngCore,
    ) -> Result<Self> {
        let subset = subsample_with_replacement(images, samples, rng)?;
        Self::fit(subset.view(), components, settings, rng)
    }

    /// Fixed-point iterations needed to converge.
    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

impl Representation for FastIca {
    fn name(&self) -> &str {
        "ICA"
    }

    fn dim(&self) -> usize {
        self.projection.ncols()
    }

    fn transform(&self, images: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        check_width("FastIca::transform", images, self.mean.len())?;
        Ok((&images - &self.mean).dot(&self.projection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn correlation(a: ndarray::ArrayView1<'_, f64>, b: ndarray::ArrayView1<'_, f64>) -> f64 {
        let (ma, mb) = (a.mean().unwrap(), b.mean().unwrap());
        let cov: f64 = a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum();
        let va: f64 = a.iter().map(|x| (x - ma).powi(2)).sum();
        let vb: f64 = b.iter().map(|y| (y - mb).powi(2)).sum();
        cov / (va * vb).sqrt()
    }

    fn mixed_sources(rng: &mut StdRng) -> (Array2<f64>, Array2<f64>) {
        let sources = Array2::from_shape_fn((2000, 2), |(_, j)| {
            let u: f64 = rng.gen_range(-1.0..1.0);
            if j == 0 {
                u
            } else {
                u.signum() * u * u
            }
        });
        let mixing = array![[1.0, 0.5, 0.2], [0.4, 1.0, -0.6]];
        (sources.clone(), sources.dot(&mixing))
    }

    #[test]
    fn unmixes_non_gaussian_sources() {
        let mut rng = StdRng::seed_from_u64(12);
        let (sources, observed) = mixed_sources(&mut rng);
        let ica = FastIca::fit(observed.view(), 2, IcaSettings::default(), &mut rng).unwrap();
        assert!(ica.iterations() <= 200);
        let recovered = ica.transform(observed.view()).unwrap();
        for source in sources.axis_iter(Axis(1)) {
            let best = recovered
                .axis_iter(Axis(1))
                .map(|column| correlation(source, column).abs())
                .fold(0.0, f64::max);
            assert!(best > 0.95, "best correlation {best}");
        }
    }

    #[test]
    fn exhausted_budget_reports_non_convergence() {
        let mut rng = StdRng::seed_from_u64(12);
        let (_, observed) = mixed_sources(&mut rng);
        let settings = IcaSettings {
            max_iterations: 1,
            tolerance: 1e-14,
            ..IcaSettings::default()
        };
        let err = FastIca::fit(observed.view(), 2, settings, &mut rng).unwrap_err();
        assert!(matches!(err, EvalError::IcaNotConverged { iterations: 1, .. }));
    }
}
