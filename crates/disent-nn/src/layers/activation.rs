// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter};
use crate::{shape_of, NnError, NnResult};
use ndarray::{Array2, Axis, Zip};

/// Stateless ReLU activation.
#[derive(Debug, Default, Clone, Copy)]
pub struct Relu;

impl Relu {
    /// Creates a new ReLU layer.
    pub fn new() -> Self {
        Self
    }
}

fn check_same_shape(input: &Array2<f64>, grad_output: &Array2<f64>) -> NnResult<()> {
    if input.dim() != grad_output.dim() {
        return Err(NnError::ShapeMismatch {
            left: shape_of(input),
            right: shape_of(grad_output),
        });
    }
    Ok(())
}

impl Module for Relu {
    fn forward(&self, input: &Array2<f64>) -> NnResult<Array2<f64>> {
        Ok(input.mapv(|value| value.max(0.0)))
    }

    fn backward(
        &mut self,
        input: &Array2<f64>,
        grad_output: &Array2<f64>,
    ) -> NnResult<Array2<f64>> {
        check_same_shape(input, grad_output)?;
        let mut grad = grad_output.clone();
        Zip::from(&mut grad).and(input).for_each(|g, &x| {
            if x <= 0.0 {
                *g = 0.0;
            }
        });
        Ok(grad)
    }

    fn visit_parameters(
        &self,
        _visitor: &mut dyn FnMut(&Parameter) -> NnResult<()>,
    ) -> NnResult<()> {
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        _visitor: &mut dyn FnMut(&mut Parameter) -> NnResult<()>,
    ) -> NnResult<()> {
        Ok(())
    }
}

/// Row-wise log-softmax, turning logits into log-probabilities.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSoftmax;

impl LogSoftmax {
    /// Creates a new log-softmax layer.
    pub fn new() -> Self {
        Self
    }
}

impl Module for LogSoftmax {
    fn forward(&self, input: &Array2<f64>) -> NnResult<Array2<f64>> {
        let mut out = input.clone();
        for mut row in out.axis_iter_mut(Axis(0)) {
            let max = row.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v));
            let log_norm = max + row.iter().map(|&v| (v - max).exp()).sum::<f64>().ln();
            row.mapv_inplace(|v| v - log_norm);
        }
        Ok(out)
    }

    fn backward(
        &mut self,
        input: &Array2<f64>,
        grad_output: &Array2<f64>,
    ) -> NnResult<Array2<f64>> {
        check_same_shape(input, grad_output)?;
        let log_probs = self.forward(input)?;
        let mut grad = grad_output.clone();
        for (mut g_row, lp_row) in grad.axis_iter_mut(Axis(0)).zip(log_probs.axis_iter(Axis(0))) {
            let total: f64 = g_row.sum();
            Zip::from(&mut g_row)
                .and(&lp_row)
                .for_each(|g, &lp| *g -= lp.exp() * total);
        }
        Ok(grad)
    }

    fn visit_parameters(
        &self,
        _visitor: &mut dyn FnMut(&Parameter) -> NnResult<()>,
    ) -> NnResult<()> {
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        _visitor: &mut dyn FnMut(&mut Parameter) -> NnResult<()>,
    ) -> NnResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn relu_forward_backward() {
        let mut relu = Relu::new();
        let input = array![[-1.0, -0.5, 0.2, 1.5]];
        let output = relu.forward(&input).unwrap();
        assert_eq!(output, array![[0.0, 0.0, 0.2, 1.5]]);

        let grad_output = array![[0.3, 0.4, 0.5, 0.6]];
        let grad_input = relu.backward(&input, &grad_output).unwrap();
        assert_eq!(grad_input, array![[0.0, 0.0, 0.5, 0.6]]);
    }

    #[test]
    fn log_softmax_rows_normalise() {
        let layer = LogSoftmax::new();
        let out = layer.forward(&array![[1.0, 2.0, 3.0], [1000.0, 1000.0, 1000.0]]).unwrap();
        for row in out.axis_iter(Axis(0)) {
            let mass: f64 = row.iter().map(|v| v.exp()).sum();
            assert_abs_diff_eq!(mass, 1.0, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(out[[1, 0]], -(3.0f64).ln(), epsilon = 1e-12);
    }

    #[test]
    fn log_softmax_gradient_matches_finite_difference() {
        let mut layer = LogSoftmax::new();
        let input = array![[0.3, -1.2, 0.8]];
        let upstream = array![[0.0, -1.0, 0.0]];
        let analytic = layer.backward(&input, &upstream).unwrap();
        let h = 1e-6;
        for c in 0..3 {
            let mut plus = input.clone();
            plus[[0, c]] += h;
            let mut minus = input.clone();
            minus[[0, c]] -= h;
            let f = |x: &Array2<f64>| -layer.forward(x).unwrap()[[0, 1]];
            let numeric = (f(&plus) - f(&minus)) / (2.0 * h);
            assert_abs_diff_eq!(analytic[[0, c]], numeric, epsilon = 1e-5);
        }
    }
}
