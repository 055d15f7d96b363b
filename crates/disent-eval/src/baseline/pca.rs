// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use super::linalg::{center, orthonormalize, symmetric_eigen_descending, EIGEN_FLOOR};
use super::{check_width, subsample_with_replacement, Representation};
use crate::error::{EvalError, Result};
use ndarray::{s, Array1, Array2, ArrayView2};
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};

const OVERSAMPLING: usize = 10;

/// Leading principal directions of centred data.
#[derive(Debug, Clone)]
pub(crate) struct PrincipalAxes {
    pub(crate) mean: Array1<f64>,
    /// `pixels × k`, orthonormal columns.
    pub(crate) directions: Array2<f64>,
    /// Sample variance (ddof = 1) along each direction, descending.
    pub(crate) variance: Array1<f64>,
}

/// Randomised subspace iteration followed by a Rayleigh-Ritz step.
///
/// Only `n × l` and `pixels × l` matrices are formed, with
/// `l = min(k + 10, n, pixels)`.
pub(crate) fn principal_axes(
    representation: &'static str,
    data: ArrayView2<'_, f64>,
    components: usize,
    power_iterations: usize,
    rng: &mut dyn RngCore,
) -> Result<PrincipalAxes> {
    let (rows, pixels) = data.dim();
    if rows < 2 || pixels == 0 {
        return Err(EvalError::Degenerate {
            representation,
            reason: format!("need at least 2 samples with pixels, got {rows} x {pixels}"),
        });
    }
    if components == 0 || components > pixels.min(rows) {
        return Err(EvalError::Degenerate {
            representation,
            reason: format!(
                "cannot extract {components} components from {rows} samples of {pixels} pixels"
            ),
        });
    }
    let (centred, mean) = center(data).ok_or(EvalError::EmptyInput("baseline training data"))?;

    let width = (components + OVERSAMPLING).min(rows).min(pixels);
    let probe: Array2<f64> =
        Array2::from_shape_simple_fn((pixels, width), || StandardNormal.sample(&mut *rng));
    let mut basis = orthonormalize(&centred.dot(&probe));
    for _ in 0..power_iterations {
        let row_space = orthonormalize(&centred.t().dot(&basis));
        basis = orthonormalize(&centred.dot(&row_space));
    }
    let row_space = orthonormalize(&centred.t().dot(&basis));

    let projected = centred.dot(&row_space);
    let gram = projected.t().dot(&projected) / (rows as f64 - 1.0);
    let (values, vectors) = symmetric_eigen_descending(&gram);
    let variance = values.slice(s![..components]).to_owned();
    if let Some((idx, value)) = variance
        .iter()
        .enumerate()
        .find(|&(_, &v)| !(v > EIGEN_FLOOR))
    {
        return Err(EvalError::Degenerate {
            representation,
            reason: format!("component {idx} has variance {value:.3e}"),
        });
    }
    let directions = row_space.dot(&vectors.slice(s![.., ..components]));
    Ok(PrincipalAxes {
        mean,
        directions,
        variance,
    })
}

/// Whitened PCA projection onto `k` components.
#[derive(Debug, Clone)]
pub struct PcaProjector {
    mean: Array1<f64>,
    /// Directions pre-scaled by `1 / sqrt(variance)`.
    projection: Array2<f64>,
    explained_variance: Array1<f64>,
}

impl PcaProjector {
    pub fn fit(
        data: ArrayView2<'_, f64>,
        components: usize,
        power_iterations: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Self> {
        let axes = principal_axes("PCA", data, components, power_iterations, rng)?;
        let projection = &axes.directions / &axes.variance.mapv(f64::sqrt);
        Ok(Self {
            mean: axes.mean,
            projection,
            explained_variance: axes.variance,
        })
    }

    /// Fits on `samples` rows drawn uniformly with replacement.
    pub fn fit_subsample(
        images: ArrayView2<'_, f64>,
        samples: usize,
        components: usize,
        power_iterations: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Self> {
        let subset = subsample_with_replacement(images, samples, rng)?;
        Self::fit(subset.view(), components, power_iterations, rng)
    }

    pub fn explained_variance(&self) -> &Array1<f64> {
        &self.explained_variance
    }
}

impl Representation for PcaProjector {
    fn name(&self) -> &str {
        "PCA"
    }

    fn dim(&self) -> usize {
        self.projection.ncols()
    }

    fn transform(&self, images: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        check_width("PcaProjector::transform", images, self.mean.len())?;
        Ok((&images - &self.mean).dot(&self.projection))
    }
}
