// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! `nn.Module` style surface over `ndarray` matrices.
//!
//! Only what the disentanglement probes need lives here: dense layers, a
//! ReLU, row-wise log-softmax, the negative log-likelihood loss and a
//! fixed-learning-rate optimiser. Every tensor is a row-major batch
//! (`rows = samples`, `cols = features`).

pub mod classifier;
pub mod layers;
pub mod loss;
pub mod module;
pub mod optim;
pub mod trainer;

pub use classifier::{Classifier, ClassifierShape};
pub use layers::{Linear, LogSoftmax, Relu, Sequential};
pub use loss::{Loss, NllLoss};
pub use module::{Module, Parameter};
pub use optim::Optimizer;
pub use trainer::{EpochStats, ModuleTrainer};

use thiserror::Error;

/// Errors surfaced by the module stack.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum NnError {
    /// A layer was asked for a zero-sized axis.
    #[error("invalid dimensions ({rows} x {cols}); both axes must be non-zero")]
    InvalidDimensions { rows: usize, cols: usize },
    /// Operands cannot be combined.
    #[error("shape mismatch: left={left:?}, right={right:?} cannot be combined")]
    ShapeMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
    /// Learning rates must be positive and finite.
    #[error("learning rate must be positive, got {rate}")]
    NonPositiveLearningRate { rate: f64 },
    /// A numeric guard caught a NaN or infinity.
    #[error("{label} produced a non-finite value ({value})")]
    NonFiniteValue { label: &'static str, value: f64 },
    /// Computation received an empty input.
    #[error("{0} must not be empty for this computation")]
    EmptyInput(&'static str),
    /// A class label exceeded the number of outputs.
    #[error("label {label} is out of range for {classes} classes")]
    LabelOutOfRange { label: usize, classes: usize },
}

pub type NnResult<T> = std::result::Result<T, NnError>;

pub(crate) fn shape_of(matrix: &ndarray::Array2<f64>) -> (usize, usize) {
    (matrix.nrows(), matrix.ncols())
}
