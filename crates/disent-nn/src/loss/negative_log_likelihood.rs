// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use super::Loss;
use crate::{NnError, NnResult};
use ndarray::Array2;

/// Negative log-likelihood over log-probabilities and integer class labels.
///
/// Paired with [`crate::LogSoftmax`] this is the usual cross entropy.
#[derive(Debug, Default, Clone, Copy)]
pub struct NllLoss;

impl NllLoss {
    /// Creates the loss.
    pub fn new() -> Self {
        Self
    }

    fn check(prediction: &Array2<f64>, target: &[usize]) -> NnResult<()> {
        let (rows, classes) = prediction.dim();
        if rows == 0 {
            return Err(NnError::EmptyInput("nll_loss::prediction"));
        }
        if rows != target.len() {
            return Err(NnError::ShapeMismatch {
                left: (rows, classes),
                right: (target.len(), 1),
            });
        }
        if let Some(&label) = target.iter().find(|&&label| label >= classes) {
            return Err(NnError::LabelOutOfRange { label, classes });
        }
        Ok(())
    }
}

impl Loss for NllLoss {
    type Target = [usize];

    fn forward(&mut self, prediction: &Array2<f64>, target: &[usize]) -> NnResult<f64> {
        Self::check(prediction, target)?;
        let total: f64 = target
            .iter()
            .enumerate()
            .map(|(row, &label)| -prediction[[row, label]])
            .sum();
        let value = total / target.len() as f64;
        if !value.is_finite() {
            return Err(NnError::NonFiniteValue {
                label: "nll_loss",
                value,
            });
        }
        Ok(value)
    }

    fn backward(&mut self, prediction: &Array2<f64>, target: &[usize]) -> NnResult<Array2<f64>> {
        Self::check(prediction, target)?;
        let inv_batch = 1.0 / target.len() as f64;
        let mut grad = Array2::zeros(prediction.dim());
        for (row, &label) in target.iter().enumerate() {
            grad[[row, label]] = -inv_batch;
        }
        Ok(grad)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn nll_matches_manual() {
        let mut loss = NllLoss::new();
        let log_probs = array![[0.1f64, 0.6, 0.3], [0.8, 0.1, 0.1]].mapv(f64::ln);
        let value = loss.forward(&log_probs, &[1, 0]).unwrap();
        assert_abs_diff_eq!(value, (-0.6f64.ln() - 0.8f64.ln()) / 2.0, epsilon = 1e-12);

        let grad = loss.backward(&log_probs, &[1, 0]).unwrap();
        assert_eq!(grad, array![[0.0, -0.5, 0.0], [-0.5, 0.0, 0.0]]);
    }

    #[test]
    fn nll_rejects_bad_labels() {
        let mut loss = NllLoss::new();
        let log_probs = Array2::zeros((1, 2));
        assert_eq!(
            loss.forward(&log_probs, &[2]),
            Err(NnError::LabelOutOfRange {
                label: 2,
                classes: 2
            })
        );
        assert!(loss.forward(&log_probs, &[0, 1]).is_err());
    }
}
