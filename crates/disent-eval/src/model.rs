// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Narrow model interfaces consumed by the evaluator.

use crate::error::{EvalError, Result};
use ndarray::{Array1, Array2, ArrayView2, Zip};
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};

/// Stochastic encoder producing a diagonal Gaussian posterior per example.
pub trait Encoder {
    fn latent_dim(&self) -> usize;

    /// Returns `(mean, log_var)`, both `batch × latent_dim`.
    fn encode(&self, batch: ArrayView2<'_, f64>) -> Result<(Array2<f64>, Array2<f64>)>;

    /// One sample per row: `mean + ε · exp(0.5 · log_var)`.
    fn reparameterize(
        &self,
        mean: &Array2<f64>,
        log_var: &Array2<f64>,
        rng: &mut dyn RngCore,
    ) -> Result<Array2<f64>> {
        reparameterize(mean, log_var, rng)
    }
}

/// Output of a full encode/sample/decode pass.
#[derive(Debug, Clone)]
pub struct ForwardPass {
    pub reconstruction: Array2<f64>,
    pub mean: Array2<f64>,
    pub log_var: Array2<f64>,
    pub sample: Array2<f64>,
}

/// Encoder with a decoder attached.
pub trait VaeModel: Encoder {
    /// Maps latent codes back to flattened images.
    fn decode(&self, latent: &Array2<f64>) -> Result<Array2<f64>>;

    fn forward(&self, batch: ArrayView2<'_, f64>, rng: &mut dyn RngCore) -> Result<ForwardPass> {
        let (mean, log_var) = self.encode(batch)?;
        let sample = self.reparameterize(&mean, &log_var, rng)?;
        let reconstruction = self.decode(&sample)?;
        if reconstruction.dim() != batch.dim() {
            return Err(EvalError::Shape {
                context: "VaeModel::decode",
                expected: batch.dim(),
                got: reconstruction.dim(),
            });
        }
        Ok(ForwardPass {
            reconstruction,
            mean,
            log_var,
            sample,
        })
    }
}

/// Gaussian reparameterisation shared by every [`Encoder`].
pub fn reparameterize(
    mean: &Array2<f64>,
    log_var: &Array2<f64>,
    rng: &mut dyn RngCore,
) -> Result<Array2<f64>> {
    if mean.dim() != log_var.dim() {
        return Err(EvalError::Shape {
            context: "reparameterize",
            expected: mean.dim(),
            got: log_var.dim(),
        });
    }
    let mut sample = Array2::zeros(mean.dim());
    Zip::from(&mut sample)
        .and(mean)
        .and(log_var)
        .for_each(|out, &mu, &lv| {
            let eps: f64 = StandardNormal.sample(&mut *rng);
            *out = mu + eps * (0.5 * lv).exp();
        });
    Ok(sample)
}

/// Affine Gaussian encoder with a logistic linear decoder.
///
/// `mean = x · W + b` with a constant log-variance per latent dimension; the
/// decoder is `sigmoid(z · Wᵀ)`. Handy as a reference model for synthetic
/// factor grids where the ideal latent code is known in closed form.
#[derive(Debug, Clone)]
pub struct LinearGaussianModel {
    weights: Array2<f64>,
    bias: Array1<f64>,
    log_var: Array1<f64>,
}

impl LinearGaussianModel {
    /// `weights` is `pixels × latent_dim`.
    pub fn new(weights: Array2<f64>, bias: Array1<f64>, log_var: Array1<f64>) -> Result<Self> {
        let latent = weights.ncols();
        if latent == 0 || weights.nrows() == 0 {
            return Err(EvalError::EmptyInput("LinearGaussianModel weights"));
        }
        for vector in [&bias, &log_var] {
            if vector.len() != latent {
                return Err(EvalError::Shape {
                    context: "LinearGaussianModel::new",
                    expected: (1, latent),
                    got: (1, vector.len()),
                });
            }
        }
        Ok(Self {
            weights,
            bias,
            log_var,
        })
    }

    pub fn pixels(&self) -> usize {
        self.weights.nrows()
    }
}

impl Encoder for LinearGaussianModel {
    fn latent_dim(&self) -> usize {
        self.weights.ncols()
    }

    fn encode(&self, batch: ArrayView2<'_, f64>) -> Result<(Array2<f64>, Array2<f64>)> {
        if batch.ncols() != self.pixels() {
            return Err(EvalError::Shape {
                context: "LinearGaussianModel::encode",
                expected: (batch.nrows(), self.pixels()),
                got: batch.dim(),
            });
        }
        let mean = batch.dot(&self.weights) + &self.bias;
        let log_var = Array2::from_shape_fn((batch.nrows(), self.latent_dim()), |(_, j)| {
            self.log_var[j]
        });
        Ok((mean, log_var))
    }
}

impl VaeModel for LinearGaussianModel {
    fn decode(&self, latent: &Array2<f64>) -> Result<Array2<f64>> {
        if latent.ncols() != self.latent_dim() {
            return Err(EvalError::Shape {
                context: "LinearGaussianModel::decode",
                expected: (latent.nrows(), self.latent_dim()),
                got: latent.dim(),
            });
        }
        Ok(latent
            .dot(&self.weights.t())
            .mapv(|v| 1.0 / (1.0 + (-v).exp())))
    }
}
