// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::{NnError, NnResult};
use ndarray::{Array2, Zip};

/// Fixed-learning-rate update rules supported by [`crate::Parameter::apply_step`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Optimizer {
    /// Plain gradient descent.
    Sgd { learning_rate: f64 },
    /// Adam with bias-corrected first and second moments.
    Adam {
        learning_rate: f64,
        beta1: f64,
        beta2: f64,
        epsilon: f64,
    },
}

fn validate_rate(learning_rate: f64) -> NnResult<()> {
    if learning_rate <= 0.0 || !learning_rate.is_finite() {
        return Err(NnError::NonPositiveLearningRate {
            rate: learning_rate,
        });
    }
    Ok(())
}

impl Optimizer {
    /// Builds an SGD optimiser while validating the learning rate.
    pub fn sgd(learning_rate: f64) -> NnResult<Self> {
        validate_rate(learning_rate)?;
        Ok(Self::Sgd { learning_rate })
    }

    /// Builds an Adam optimiser with the usual `(0.9, 0.999, 1e-8)` constants.
    pub fn adam(learning_rate: f64) -> NnResult<Self> {
        validate_rate(learning_rate)?;
        Ok(Self::Adam {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        })
    }

    /// Returns the step size shared by every parameter.
    pub fn learning_rate(&self) -> f64 {
        match *self {
            Self::Sgd { learning_rate } | Self::Adam { learning_rate, .. } => learning_rate,
        }
    }
}

/// Running Adam moments kept next to a parameter.
#[derive(Debug, Clone)]
pub(crate) struct Moments {
    first: Array2<f64>,
    second: Array2<f64>,
    step: i32,
}

impl Moments {
    pub(crate) fn zeros(dim: (usize, usize)) -> Self {
        Self {
            first: Array2::zeros(dim),
            second: Array2::zeros(dim),
            step: 0,
        }
    }

    /// Folds `grad` into the moments and returns the bias-corrected direction.
    pub(crate) fn adam_update(
        &mut self,
        grad: &Array2<f64>,
        beta1: f64,
        beta2: f64,
        epsilon: f64,
    ) -> Array2<f64> {
        self.step += 1;
        let correction1 = 1.0 - beta1.powi(self.step);
        let correction2 = 1.0 - beta2.powi(self.step);
        let mut direction = Array2::zeros(grad.dim());
        Zip::from(&mut direction)
            .and(&mut self.first)
            .and(&mut self.second)
            .and(grad)
            .for_each(|out, m, v, &g| {
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / correction1;
                let v_hat = *v / correction2;
                *out = m_hat / (v_hat.sqrt() + epsilon);
            });
        direction
    }
}
