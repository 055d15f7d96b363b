// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::dataset::FactorDataset;
use crate::error::{EvalError, Result};
use crate::model::Encoder;
use ndarray::{s, Array2, Axis};
use rand::RngCore;

/// Posterior statistics and one sample per dataset example, indexed by
/// dataset position.
#[derive(Debug, Clone, PartialEq)]
pub struct PosteriorTable {
    pub mean: Array2<f64>,
    pub log_var: Array2<f64>,
    pub samples: Array2<f64>,
}

impl PosteriorTable {
    pub fn new(mean: Array2<f64>, log_var: Array2<f64>, samples: Array2<f64>) -> Result<Self> {
        let others = [
            ("PosteriorTable::log_var", &log_var),
            ("PosteriorTable::samples", &samples),
        ];
        for (context, other) in others {
            if other.dim() != mean.dim() {
                return Err(EvalError::Shape {
                    context,
                    expected: mean.dim(),
                    got: other.dim(),
                });
            }
        }
        Ok(Self {
            mean,
            log_var,
            samples,
        })
    }

    pub fn len(&self) -> usize {
        self.mean.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn latent_dim(&self) -> usize {
        self.mean.ncols()
    }

    /// Rows at `indices`, in the given order.
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            mean: self.mean.select(Axis(0), indices),
            log_var: self.log_var.select(Axis(0), indices),
            samples: self.samples.select(Axis(0), indices),
        }
    }
}

/// Encodes the whole dataset in order and draws one reparameterised sample
/// per example.
pub fn sample_posteriors<E, D>(
    encoder: &E,
    dataset: &D,
    batch_size: usize,
    rng: &mut dyn RngCore,
) -> Result<PosteriorTable>
where
    E: Encoder + ?Sized,
    D: FactorDataset + ?Sized,
{
    let len = dataset.len();
    let latent = encoder.latent_dim();
    if len == 0 {
        return Err(EvalError::EmptyInput("dataset"));
    }
    if latent == 0 {
        return Err(EvalError::EmptyInput("latent dimension"));
    }

    let mut mean = Array2::zeros((len, latent));
    let mut log_var = Array2::zeros((len, latent));
    for (batch, range) in dataset.batches(batch_size) {
        let (batch_mean, batch_log_var) = encoder.encode(batch)?;
        let expected = (range.len(), latent);
        let checks = [
            ("Encoder::encode mean", &batch_mean),
            ("Encoder::encode log_var", &batch_log_var),
        ];
        for (context, stats) in checks {
            if stats.dim() != expected {
                return Err(EvalError::Shape {
                    context,
                    expected,
                    got: stats.dim(),
                });
            }
        }
        mean.slice_mut(s![range.clone(), ..]).assign(&batch_mean);
        log_var.slice_mut(s![range, ..]).assign(&batch_log_var);
    }

    let samples = encoder.reparameterize(&mean, &log_var, rng)?;
    PosteriorTable::new(mean, log_var, samples)
}
