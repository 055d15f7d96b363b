// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::optim::{Moments, Optimizer};
use crate::{shape_of, NnError, NnResult};
use ndarray::Array2;
use rand::RngCore;

/// Trainable parameter with a local gradient buffer and optional optimiser
/// moments.
pub struct Parameter {
    name: String,
    value: Array2<f64>,
    gradient: Option<Array2<f64>>,
    moments: Option<Moments>,
}

impl core::fmt::Debug for Parameter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let (rows, cols) = shape_of(&self.value);
        write!(
            f,
            "Parameter(name={},shape=({},{}),has_grad={},has_moments={})",
            self.name,
            rows,
            cols,
            self.gradient.is_some(),
            self.moments.is_some()
        )
    }
}

impl Parameter {
    /// Creates a new parameter with the provided value.
    pub fn new(name: impl Into<String>, value: Array2<f64>) -> Self {
        Self {
            name: name.into(),
            value,
            gradient: None,
            moments: None,
        }
    }

    /// Returns the identifier assigned to the parameter.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provides an immutable view into the underlying value.
    pub fn value(&self) -> &Array2<f64> {
        &self.value
    }

    /// Returns the currently accumulated gradient, if any.
    pub fn gradient(&self) -> Option<&Array2<f64>> {
        self.gradient.as_ref()
    }

    fn assert_shape(&self, other: &Array2<f64>) -> NnResult<()> {
        if self.value.dim() != other.dim() {
            return Err(NnError::ShapeMismatch {
                left: shape_of(&self.value),
                right: shape_of(other),
            });
        }
        Ok(())
    }

    /// Adds `update` to the gradient buffer.
    pub fn accumulate(&mut self, update: &Array2<f64>) -> NnResult<()> {
        self.assert_shape(update)?;
        match self.gradient.as_mut() {
            Some(existing) => *existing += update,
            None => self.gradient = Some(update.clone()),
        }
        Ok(())
    }

    /// Clears the gradient buffer without touching optimiser moments.
    pub fn zero_gradient(&mut self) {
        if let Some(grad) = self.gradient.as_mut() {
            grad.fill(0.0);
        }
    }

    /// Applies the accumulated gradient and clears it afterwards.
    pub fn apply_step(&mut self, optimizer: &Optimizer) -> NnResult<()> {
        let Some(grad) = self.gradient.as_mut() else {
            return Ok(());
        };
        match *optimizer {
            Optimizer::Sgd { learning_rate } => {
                self.value.scaled_add(-learning_rate, grad);
            }
            Optimizer::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => {
                let moments = self
                    .moments
                    .get_or_insert_with(|| Moments::zeros(self.value.dim()));
                let update = moments.adam_update(grad, beta1, beta2, epsilon);
                self.value.scaled_add(-learning_rate, &update);
            }
        }
        grad.fill(0.0);
        Ok(())
    }

    /// Replaces the value and forgets every gradient and moment, returning
    /// the parameter to its untrained state.
    pub fn reset(&mut self, value: Array2<f64>) -> NnResult<()> {
        self.assert_shape(&value)?;
        self.value = value;
        self.gradient = None;
        self.moments = None;
        Ok(())
    }
}

/// High-level module trait inspired by PyTorch's `nn.Module`.
pub trait Module {
    /// Runs a forward pass.
    fn forward(&self, input: &Array2<f64>) -> NnResult<Array2<f64>>;

    /// Propagates a gradient backwards. Implementations populate the relevant
    /// parameter accumulators before returning the gradient with respect to
    /// `input`.
    fn backward(&mut self, input: &Array2<f64>, grad_output: &Array2<f64>)
        -> NnResult<Array2<f64>>;

    /// Visits immutable parameters.
    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> NnResult<()>,
    ) -> NnResult<()>;

    /// Visits mutable parameters.
    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> NnResult<()>,
    ) -> NnResult<()>;

    /// Redraws the module's weights, returning it to an untrained state.
    /// Stateless modules keep the default no-op.
    fn reset_parameters(&mut self, _rng: &mut dyn RngCore) -> NnResult<()> {
        Ok(())
    }

    /// Applies every parameter update.
    fn apply_step(&mut self, optimizer: &Optimizer) -> NnResult<()> {
        self.visit_parameters_mut(&mut |param| param.apply_step(optimizer))
    }

    /// Clears accumulators across every parameter.
    fn zero_accumulators(&mut self) -> NnResult<()> {
        self.visit_parameters_mut(&mut |param| {
            param.zero_gradient();
            Ok(())
        })
    }

    /// Number of scalar weights held by the module.
    fn parameter_count(&self) -> NnResult<usize> {
        let mut total = 0;
        self.visit_parameters(&mut |param| {
            total += param.value().len();
            Ok(())
        })?;
        Ok(total)
    }
}

/// Copies every parameter value in visiting order.
#[cfg(test)]
pub(crate) fn snapshot<M: Module + ?Sized>(module: &M) -> Vec<Array2<f64>> {
    let mut values = Vec::new();
    module
        .visit_parameters(&mut |param| {
            values.push(param.value().clone());
            Ok(())
        })
        .unwrap();
    values
}
