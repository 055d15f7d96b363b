// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::layers::{Linear, LogSoftmax, Relu, Sequential};
use crate::module::{Module, Parameter};
use crate::{NnError, NnResult};
use ndarray::{Array2, Axis};
use rand::RngCore;

/// Layer sizes of a [`Classifier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierShape {
    pub input_dim: usize,
    pub hidden_dim: usize,
    pub classes: usize,
    /// Inserts a ReLU between the two dense layers.
    pub non_linear: bool,
}

/// Two-layer feed-forward classifier emitting log-probabilities.
///
/// Without the ReLU the network collapses to a linear map, which is the
/// setting used for the linear disentanglement probe.
#[derive(Debug)]
pub struct Classifier {
    shape: ClassifierShape,
    net: Sequential,
}

impl Classifier {
    pub fn new(shape: ClassifierShape, rng: &mut dyn RngCore) -> NnResult<Self> {
        if shape.classes == 0 {
            return Err(NnError::InvalidDimensions {
                rows: shape.hidden_dim,
                cols: shape.classes,
            });
        }
        let mut net = Sequential::new();
        net.push(Linear::new("classifier::hidden", shape.input_dim, shape.hidden_dim, rng)?);
        if shape.non_linear {
            net.push(Relu::new());
        }
        net.push(Linear::new("classifier::output", shape.hidden_dim, shape.classes, rng)?);
        net.push(LogSoftmax::new());
        Ok(Self { shape, net })
    }

    pub fn shape(&self) -> ClassifierShape {
        self.shape
    }

    /// Most likely class per row.
    pub fn predict(&self, features: &Array2<f64>) -> NnResult<Vec<usize>> {
        let log_probs = self.forward(features)?;
        Ok(log_probs
            .axis_iter(Axis(0))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f64::NEG_INFINITY), |best, (idx, &value)| {
                        if value > best.1 {
                            (idx, value)
                        } else {
                            best
                        }
                    })
                    .0
            })
            .collect())
    }

    /// Fraction of rows whose prediction equals the label.
    pub fn accuracy(&self, features: &Array2<f64>, labels: &[usize]) -> NnResult<f64> {
        if labels.is_empty() {
            return Err(NnError::EmptyInput("classifier::accuracy"));
        }
        let predictions = self.predict(features)?;
        if predictions.len() != labels.len() {
            return Err(NnError::ShapeMismatch {
                left: (predictions.len(), self.shape.classes),
                right: (labels.len(), 1),
            });
        }
        let correct = predictions
            .iter()
            .zip(labels)
            .filter(|(prediction, label)| prediction == label)
            .count();
        Ok(correct as f64 / labels.len() as f64)
    }
}

impl Module for Classifier {
    fn forward(&self, input: &Array2<f64>) -> NnResult<Array2<f64>> {
        self.net.forward(input)
    }

    fn backward(
        &mut self,
        input: &Array2<f64>,
        grad_output: &Array2<f64>,
    ) -> NnResult<Array2<f64>> {
        self.net.backward(input, grad_output)
    }

    fn reset_parameters(&mut self, rng: &mut dyn RngCore) -> NnResult<()> {
        self.net.reset_parameters(rng)
    }

    fn visit_parameters(
        &self,
        visitor: &mut dyn FnMut(&Parameter) -> NnResult<()>,
    ) -> NnResult<()> {
        self.net.visit_parameters(visitor)
    }

    fn visit_parameters_mut(
        &mut self,
        visitor: &mut dyn FnMut(&mut Parameter) -> NnResult<()>,
    ) -> NnResult<()> {
        self.net.visit_parameters_mut(visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::NllLoss;
    use crate::module::snapshot;
    use crate::optim::Optimizer;
    use crate::trainer::ModuleTrainer;
    use ndarray::array;
    use rand::{rngs::StdRng, SeedableRng};

    fn shape(non_linear: bool) -> ClassifierShape {
        ClassifierShape {
            input_dim: 2,
            hidden_dim: 8,
            classes: 2,
            non_linear,
        }
    }

    #[test]
    fn learns_axis_aligned_split() {
        let mut rng = StdRng::seed_from_u64(17);
        let mut model = Classifier::new(shape(false), &mut rng).unwrap();
        let features = array![[0.0, 1.0], [0.0, 2.0], [1.5, 0.0], [0.7, 0.0], [0.0, 0.4], [2.0, 0.0]];
        let labels = [0, 0, 1, 1, 0, 1];
        let trainer = ModuleTrainer::new(Optimizer::adam(0.05).unwrap());
        let mut loss = NllLoss::new();
        let first = trainer
            .train_batch(&mut model, &mut loss, &features, &labels)
            .unwrap();
        let mut last = first;
        for _ in 0..200 {
            last = trainer
                .train_batch(&mut model, &mut loss, &features, &labels)
                .unwrap();
        }
        assert!(last < first);
        assert_eq!(model.accuracy(&features, &labels).unwrap(), 1.0);
    }

    #[test]
    fn reset_restores_seeded_initialisation() {
        let mut model = Classifier::new(shape(true), &mut StdRng::seed_from_u64(4)).unwrap();
        let initial = snapshot(&model);
        let features = array![[1.0, 0.0]];
        let trainer = ModuleTrainer::new(Optimizer::sgd(0.5).unwrap());
        trainer
            .train_batch(&mut model, &mut NllLoss::new(), &features, &[1])
            .unwrap();
        assert_ne!(initial, snapshot(&model));
        model.reset_parameters(&mut StdRng::seed_from_u64(4)).unwrap();
        assert_eq!(initial, snapshot(&model));
    }
}
