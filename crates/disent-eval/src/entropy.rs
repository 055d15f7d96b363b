// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Monte Carlo estimates of latent entropies under the aggregate posterior.
//!
//! With `q(z_j) = 1/N Σ_n q(z_j | x_n)` and diagonal Gaussian components,
//! `H(z_j) = E[-log q(z_j)]` is estimated from pivot samples `z ~ q(z | x_p)`:
//!
//! ```text
//! -log q(z_j) = log N - logsumexp_n log N(z_j; μ_nj, σ²_nj)
//! ```
//!
//! Conditional entropies `H(z_j | v_k)` repeat the estimate on every slice of
//! the factor grid where `v_k` is fixed and weight the slices by their size.

use crate::config::EntropyConfig;
use crate::error::{EvalError, Result};
use crate::factors::FactorSpec;
use crate::posterior::PosteriorTable;
use ndarray::{Array1, Array2, ArrayView1, Axis, Zip};
use rand::seq::index;
use rand::RngCore;
use std::f64::consts::TAU;
use tracing::{debug, Span};

/// Log-density of `N(mean, exp(log_var))` at `x`.
pub fn log_density_gaussian(x: f64, mean: f64, log_var: f64) -> f64 {
    let diff = x - mean;
    let quad = if diff == 0.0 {
        0.0
    } else {
        diff * diff * (-log_var).exp()
    };
    -0.5 * (TAU.ln() + log_var + quad)
}

/// Closed-form differential entropy of `N(·, exp(log_var))`.
pub fn gaussian_entropy(log_var: f64) -> f64 {
    0.5 * (TAU.ln() + 1.0 + log_var)
}

/// Numerically stable `log Σ exp(v)`. Returns `-∞` for an empty input.
pub fn logsumexp(values: ArrayView1<'_, f64>) -> f64 {
    let max = values.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|&v| (v - max).exp()).sum();
    max + sum.ln()
}

/// Marginal and factor-conditional entropies of one posterior table.
#[derive(Debug, Clone, PartialEq)]
pub struct EntropyEstimate {
    /// `H(z_j)`, length D.
    pub marginal: Array1<f64>,
    /// `H(z_j | v_k)`, K × D.
    pub conditional: Array2<f64>,
    /// Mean closed-form entropy of the individual posteriors, length D.
    pub component: Array1<f64>,
    /// `E[log q(z_j | x) - log q(z_j)]` over the marginal pivots, length D.
    ///
    /// Both terms are scored on the same samples, so this stays finite and
    /// at most `ln N` however far the posterior variances collapse; it is
    /// exactly 0 when every posterior coincides.
    pub excess: Array1<f64>,
}

/// `log N(z; mu, 1 / precision)` with the normaliser `norm` precomputed.
fn log_component(z: f64, mu: f64, norm: f64, precision: f64) -> f64 {
    let diff = z - mu;
    let quad = if diff == 0.0 {
        0.0
    } else {
        diff * diff * precision
    };
    norm - 0.5 * quad
}

/// Per-dimension column caches used while scoring pivots.
struct Components {
    mean: Array2<f64>,
    norm: Array2<f64>,
    precision: Array2<f64>,
}

impl Components {
    fn new(table: &PosteriorTable) -> Self {
        // Columns become rows so each inner logsumexp runs over contiguous memory.
        let mean = table.mean.t().as_standard_layout().into_owned();
        let norm = table
            .log_var
            .t()
            .mapv(|lv| -0.5 * (TAU.ln() + lv))
            .as_standard_layout()
            .into_owned();
        let precision = table
            .log_var
            .t()
            .mapv(|lv| (-lv).exp())
            .as_standard_layout()
            .into_owned();
        Self {
            mean,
            norm,
            precision,
        }
    }

    /// `-log q(z_j)` for one pivot value in dimension `dim`.
    fn neg_log_marginal(&self, dim: usize, z: f64, scratch: &mut Array1<f64>) -> f64 {
        Zip::from(scratch.view_mut())
            .and(self.mean.row(dim))
            .and(self.norm.row(dim))
            .and(self.precision.row(dim))
            .for_each(|out, &mu, &norm, &precision| {
                *out = log_component(z, mu, norm, precision);
            });
        (scratch.len() as f64).ln() - logsumexp(scratch.view())
    }

    /// `-log q(z_j | x_n)` under the pivot's own posterior.
    fn neg_log_own(&self, dim: usize, n: usize, z: f64) -> f64 {
        let [mu, norm, precision] =
            [&self.mean, &self.norm, &self.precision].map(|column| column[[dim, n]]);
        -log_component(z, mu, norm, precision)
    }
}

/// Pivot-sampling entropy estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntropyEstimator {
    n_pivots: usize,
    minibatch: usize,
}

impl EntropyEstimator {
    pub fn new(n_pivots: usize, minibatch: usize) -> Result<Self> {
        if n_pivots == 0 || minibatch == 0 {
            return Err(EvalError::Config(format!(
                "entropy estimator needs n_pivots > 0 and minibatch > 0 (got {n_pivots}, {minibatch})"
            )));
        }
        Ok(Self {
            n_pivots,
            minibatch,
        })
    }

    pub fn from_config(config: &EntropyConfig) -> Result<Self> {
        Self::new(config.n_pivots, config.minibatch)
    }

    pub fn n_pivots(&self) -> usize {
        self.n_pivots
    }

    /// `H(z_j)` for every latent dimension of `table`.
    ///
    /// Pivots are drawn without replacement; at most `min(n_pivots, N)` are
    /// used. Contributions are accumulated pivot by pivot, so the minibatch
    /// size never changes the result.
    pub fn marginal(&self, table: &PosteriorTable, rng: &mut dyn RngCore) -> Result<Array1<f64>> {
        Ok(self.score_pivots(table, rng)?.0)
    }

    /// Marginal entropies and the mean `-log q(z_j | x_p)` of the same pivots.
    fn score_pivots(
        &self,
        table: &PosteriorTable,
        rng: &mut dyn RngCore,
    ) -> Result<(Array1<f64>, Array1<f64>)> {
        let (len, latent) = table.mean.dim();
        if len == 0 {
            return Err(EvalError::EmptyInput("posterior table"));
        }
        if latent == 0 {
            return Err(EvalError::EmptyInput("latent dimension"));
        }
        let count = self.n_pivots.min(len);
        let pivots = index::sample(rng, len, count).into_vec();

        let components = Components::new(table);
        let mut scratch = Array1::zeros(len);
        let mut entropies = Array1::<f64>::zeros(latent);
        let mut own = Array1::<f64>::zeros(latent);
        let mut block = Array2::<f64>::zeros((self.minibatch, latent));
        let mut own_block = Array2::<f64>::zeros((self.minibatch, latent));
        for chunk in pivots.chunks(self.minibatch) {
            for (row, &pivot) in chunk.iter().enumerate() {
                for dim in 0..latent {
                    let z = table.samples[[pivot, dim]];
                    block[[row, dim]] = components.neg_log_marginal(dim, z, &mut scratch);
                    own_block[[row, dim]] = components.neg_log_own(dim, pivot, z);
                }
            }
            for row in block.axis_iter(Axis(0)).take(chunk.len()) {
                entropies += &row;
            }
            for row in own_block.axis_iter(Axis(0)).take(chunk.len()) {
                own += &row;
            }
        }
        entropies /= count as f64;
        own /= count as f64;
        Ok((entropies, own))
    }

    /// `H(z_j | v_k)` as a K × D matrix.
    ///
    /// `table` must be indexed like the dense factor grid.
    pub fn conditional(
        &self,
        table: &PosteriorTable,
        factors: &FactorSpec,
        rng: &mut dyn RngCore,
        span: &Span,
    ) -> Result<Array2<f64>> {
        factors.validate_len(table.len())?;
        let total = table.len() as f64;
        let mut conditional = Array2::zeros((factors.len(), table.latent_dim()));
        for (k, factor) in factors.factors().iter().enumerate() {
            let mut row = conditional.row_mut(k);
            for value in 0..factor.cardinality {
                debug!(
                    parent: span,
                    factor = %factor.name,
                    value,
                    "estimating conditional entropies"
                );
                let slice = factors.indices_where(k, value)?;
                let weight = slice.len() as f64 / total;
                let entropies = self.marginal(&table.select(&slice), rng)?;
                row.scaled_add(weight, &entropies);
            }
        }
        Ok(conditional)
    }

    /// Marginal, conditional and component entropies in one pass.
    pub fn estimate(
        &self,
        table: &PosteriorTable,
        factors: &FactorSpec,
        rng: &mut dyn RngCore,
        span: &Span,
    ) -> Result<EntropyEstimate> {
        let (marginal, own) = self.score_pivots(table, rng)?;
        let excess = &marginal - &own;
        let conditional = self.conditional(table, factors, rng, span)?;
        let component = table
            .log_var
            .mapv(gaussian_entropy)
            .mean_axis(Axis(0))
            .ok_or(EvalError::EmptyInput("posterior table"))?;
        Ok(EntropyEstimate {
            marginal,
            conditional,
            component,
            excess,
        })
    }
}
