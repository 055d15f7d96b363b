// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! VAE objectives scored by the evaluator's test-loss pass.

use crate::error::{EvalError, Result};
use crate::model::{ForwardPass, VaeModel};
use ndarray::{ArrayView2, Axis, Zip};
use rand::RngCore;
use std::collections::BTreeMap;

/// Per-batch values of every named loss term.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LossStorer {
    terms: BTreeMap<String, Vec<f64>>,
}

impl LossStorer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, key: impl Into<String>, value: f64) {
        self.terms.entry(key.into()).or_default().push(value);
    }

    pub fn values(&self, key: &str) -> Option<&[f64]> {
        self.terms.get(key).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Sum of every term divided by `batches`.
    pub fn averages(&self, batches: usize) -> BTreeMap<String, f64> {
        let denom = batches.max(1) as f64;
        self.terms
            .iter()
            .map(|(key, values)| (key.clone(), values.iter().sum::<f64>() / denom))
            .collect()
    }
}

/// A VAE training objective.
///
/// Losses that fit auxiliary networks of their own (a total-correlation
/// discriminator, say) cannot be scored from a forward pass alone. They set
/// [`VaeLoss::requires_auxiliary_optimizer`] and implement
/// [`VaeLoss::evaluate_with_model`] instead.
pub trait VaeLoss {
    fn name(&self) -> &'static str;

    fn requires_auxiliary_optimizer(&self) -> bool {
        false
    }

    /// Scores one batch, recording its terms into `storer`.
    fn evaluate(
        &self,
        data: ArrayView2<'_, f64>,
        pass: &ForwardPass,
        storer: &mut LossStorer,
    ) -> Result<f64>;

    fn evaluate_with_model(
        &self,
        _data: ArrayView2<'_, f64>,
        _model: &dyn VaeModel,
        _rng: &mut dyn RngCore,
        _storer: &mut LossStorer,
    ) -> Result<f64> {
        Err(EvalError::AuxiliaryOptimizerRequired(self.name()))
    }
}

/// Pixel likelihood of the decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconstruction {
    /// Binary cross-entropy on pixel intensities in `[0, 1]`.
    Bernoulli,
    /// Squared error.
    Gaussian,
}

/// `reconstruction + β · KL(q(z|x) || N(0, I))`, summed over pixels and
/// latent dimensions and averaged over the batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaVaeLoss {
    pub beta: f64,
    pub reconstruction: Reconstruction,
}

impl Default for BetaVaeLoss {
    fn default() -> Self {
        Self {
            beta: 1.0,
            reconstruction: Reconstruction::Bernoulli,
        }
    }
}

impl BetaVaeLoss {
    pub fn new(beta: f64, reconstruction: Reconstruction) -> Self {
        Self {
            beta,
            reconstruction,
        }
    }

    fn reconstruction_loss(&self, data: ArrayView2<'_, f64>, pass: &ForwardPass) -> f64 {
        const EPS: f64 = 1e-12;
        let mut total = 0.0;
        Zip::from(&data)
            .and(&pass.reconstruction)
            .for_each(|&x, &p| {
                total += match self.reconstruction {
                    Reconstruction::Bernoulli => {
                        let p = p.clamp(EPS, 1.0 - EPS);
                        -(x * p.ln() + (1.0 - x) * (1.0 - p).ln())
                    }
                    Reconstruction::Gaussian => (x - p) * (x - p),
                };
            });
        total / data.nrows() as f64
    }
}

impl VaeLoss for BetaVaeLoss {
    fn name(&self) -> &'static str {
        "betaH"
    }

    fn evaluate(
        &self,
        data: ArrayView2<'_, f64>,
        pass: &ForwardPass,
        storer: &mut LossStorer,
    ) -> Result<f64> {
        if data.nrows() == 0 {
            return Err(EvalError::EmptyInput("loss batch"));
        }
        if pass.reconstruction.dim() != data.dim() {
            return Err(EvalError::Shape {
                context: "BetaVaeLoss::evaluate",
                expected: data.dim(),
                got: pass.reconstruction.dim(),
            });
        }
        let recon = self.reconstruction_loss(data, pass);
        let mut kl = pass.log_var.clone();
        Zip::from(&mut kl)
            .and(&pass.mean)
            .for_each(|out, &mu| {
                let lv = *out;
                *out = 0.5 * (-1.0 - lv + mu * mu + lv.exp());
            });
        let kl_per_dim = kl
            .mean_axis(Axis(0))
            .ok_or(EvalError::EmptyInput("loss batch"))?;
        let kl_total = kl_per_dim.sum();
        let loss = recon + self.beta * kl_total;

        storer.record("recon_loss", recon);
        storer.record("kl_loss", kl_total);
        for (dim, value) in kl_per_dim.iter().enumerate() {
            storer.record(format!("kl_loss_{dim}"), *value);
        }
        storer.record("loss", loss);
        Ok(loss)
    }
}
