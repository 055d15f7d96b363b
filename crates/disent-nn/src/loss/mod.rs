// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

mod negative_log_likelihood;

use crate::NnResult;
use ndarray::Array2;

pub use negative_log_likelihood::NllLoss;

/// Trait implemented by differentiable losses over batched predictions.
pub trait Loss {
    /// Target representation accepted by the loss.
    type Target: ?Sized;

    /// Computes the batch-mean loss value.
    fn forward(&mut self, prediction: &Array2<f64>, target: &Self::Target) -> NnResult<f64>;

    /// Returns the gradient of the loss with respect to the predictions.
    fn backward(
        &mut self,
        prediction: &Array2<f64>,
        target: &Self::Target,
    ) -> NnResult<Array2<f64>>;
}
