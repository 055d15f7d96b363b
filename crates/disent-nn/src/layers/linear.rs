// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::module::{Module, Parameter};
use crate::{shape_of, NnError, NnResult};
use ndarray::{Array2, Axis};
use rand::{Rng, RngCore};

/// Fully-connected layer computing `input · weight + bias`.
#[derive(Debug)]
pub struct Linear {
    weight: Parameter,
    bias: Parameter,
}

fn uniform_init<R: Rng + ?Sized>(rows: usize, cols: usize, bound: f64, rng: &mut R) -> Array2<f64> {
    Array2::from_shape_simple_fn((rows, cols), || rng.gen_range(-bound..=bound))
}

impl Linear {
    /// Creates a new layer with weights drawn from `U(-1/sqrt(in), 1/sqrt(in))`.
    pub fn new<R: Rng + ?Sized>(
        name: impl Into<String>,
        input_dim: usize,
        output_dim: usize,
        rng: &mut R,
    ) -> NnResult<Self> {
        if input_dim == 0 || output_dim == 0 {
            return Err(NnError::InvalidDimensions {
                rows: input_dim,
                cols: output_dim,
            });
        }
        let name = name.into();
        let bound = Self::init_bound(input_dim);
        let weight = uniform_init(input_dim, output_dim, bound, rng);
        let bias = uniform_init(1, output_dim, bound, rng);
        Ok(Self {
            weight: Parameter::new(format!("{name}::weight"), weight),
            bias: Parameter::new(format!("{name}::bias"), bias),
        })
    }

    fn init_bound(input_dim: usize) -> f64 {
        1.0 / (input_dim as f64).sqrt()
    }

    /// Returns a reference to the weight parameter.
    pub fn weight(&self) -> &Parameter {
        &self.weight
    }

    /// Returns a reference to the bias parameter.
    pub fn bias(&self) -> &Parameter {
        &self.bias
    }
}

impl Module for Linear {
    fn forward(&self, input: &Array2<f64>) -> NnResult<Array2<f64>> {
        if input.ncols() != self.weight.value().nrows() {
            return Err(NnError::ShapeMismatch {
                left: shape_of(input),
                right: shape_of(self.weight.value()),
            });
        }
        Ok(input.dot(self.weight.value()) + self.bias.value())
    }

    fn backward(
        &mut self,
        input: &Array2<f64>,
        grad_output: &Array2<f64>,
    ) -> NnResult<Array2<f64>> {
        if input.nrows() != grad_output.nrows() {
            return Err(NnError::ShapeMismatch {
                left: shape_of(input),
                right: shape_of(grad_output),
            });
        }
        let grad_w = input.t().dot(grad_output);
        self.weight.accumulate(&grad_w)?;
        let grad_b = grad_output.sum_axis(Axis(0)).insert_axis(Axis(0));
        self.bias.accumulate(&grad_b)?;
        Ok(grad_output.dot(&self.weight.value().t()))
    }

    fn reset_parameters(&mut self, rng: &mut dyn RngCore) -> NnResult<()> {
        let (input_dim, output_dim) = shape_of(self.weight.value());
        let bound = Self::init_bound(input_dim);
        self.weight
            .reset(uniform_init(input_dim, output_dim, bound, rng))?;
        self.bias.reset(uniform_init(1, output_dim, bound, rng))
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> NnResult<()>,
    ) -> NnResult<()> {
        visitor(&self.weight)?;
        visitor(&self.bias)?;
        Ok(())
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> NnResult<()>,
    ) -> NnResult<()> {
        visitor(&mut self.weight)?;
        visitor(&mut self.bias)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::Optimizer;
    use ndarray::array;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn linear_forward_matches_manual() {
        let mut rng = StdRng::seed_from_u64(3);
        let layer = Linear::new("fc", 3, 2, &mut rng).unwrap();
        let input = array![[1.0, -2.0, 0.5]];
        let output = layer.forward(&input).unwrap();
        let expected = input.dot(layer.weight().value()) + layer.bias().value();
        assert_eq!(output, expected);
    }

    #[test]
    fn rejects_zero_sized_layers() {
        let mut rng = StdRng::seed_from_u64(3);
        assert!(matches!(
            Linear::new("fc", 0, 2, &mut rng),
            Err(NnError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn backward_step_changes_weights() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut layer = Linear::new("fc", 4, 3, &mut rng).unwrap();
        let input = array![[0.1, 0.2, -0.3, 0.4], [-0.5, 0.6, 0.7, -0.8]];
        let output = layer.forward(&input).unwrap();
        let grad = output / 2.0;
        let grad_input = layer.backward(&input, &grad).unwrap();
        assert_eq!(grad_input.dim(), (2, 4));
        let before = layer.weight().value().clone();
        layer.apply_step(&Optimizer::sgd(0.1).unwrap()).unwrap();
        assert_ne!(before, *layer.weight().value());
    }

    #[test]
    fn reset_is_reproducible_from_seed() {
        let mut layer = Linear::new("fc", 5, 2, &mut StdRng::seed_from_u64(1)).unwrap();
        let initial = layer.weight().value().clone();
        layer.reset_parameters(&mut StdRng::seed_from_u64(9)).unwrap();
        assert_ne!(initial, *layer.weight().value());
        layer.reset_parameters(&mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(initial, *layer.weight().value());
    }
}
