// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use disent_nn::NnError;
use thiserror::Error;

/// Errors surfaced while computing disentanglement metrics.
///
/// Every failure is terminal for the current metrics computation; nothing in
/// this crate retries.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The dataset does not expose ground-truth factors of variation.
    #[error("dataset '{dataset}' needs known factors of variation to compute the metrics")]
    MissingFactors { dataset: String },
    /// Factor metadata disagrees with the dataset it describes.
    #[error("factor specification mismatch: {0}")]
    FactorMismatch(String),
    /// A baseline name outside {VAE, PCA, ICA} was requested.
    #[error("unknown representation '{0}'; expected one of VAE, PCA, ICA")]
    UnknownRepresentation(String),
    /// Matrices that must line up do not.
    #[error("shape mismatch in {context}: expected {expected:?}, got {got:?}")]
    Shape {
        context: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },
    /// Computation received an empty input.
    #[error("{0} must not be empty")]
    EmptyInput(&'static str),
    /// A fit produced a representation that cannot be used.
    #[error("{representation} fit is degenerate: {reason}")]
    Degenerate {
        representation: &'static str,
        reason: String,
    },
    /// FastICA ran out of iterations.
    #[error(
        "ICA did not converge after {iterations} iterations (last change {last_change:.3e}, tolerance {tolerance:.1e})"
    )]
    IcaNotConverged {
        iterations: usize,
        tolerance: f64,
        last_change: f64,
    },
    /// The probe loss became NaN or infinite.
    #[error("classifier for {representation} diverged at epoch {epoch}: {source}")]
    ClassifierDiverged {
        representation: String,
        epoch: usize,
        #[source]
        source: NnError,
    },
    /// The configured loss can only be evaluated with its own optimiser.
    #[error("loss '{0}' requires an auxiliary optimiser but provides no model-level evaluation")]
    AuxiliaryOptimizerRequired(&'static str),
    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("i/o failure on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("serialisation failure: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Nn(#[from] NnError),
}

pub type Result<T> = std::result::Result<T, EvalError>;

impl EvalError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        EvalError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}
