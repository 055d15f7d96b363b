// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Disentanglement metrics for VAE latent spaces.
//!
//! The [`Evaluator`] ties everything together: it samples the encoder's
//! posteriors over a dense factorial dataset, estimates marginal and
//! factor-conditional latent entropies, turns them into the Mutual
//! Information Gap and the Axis-Aligned Metric, and trains classifier probes
//! on paired-sample differences for the VAE and the PCA/ICA baselines.
//!
//! FastICA runs for at most `baseline.ica_max_iterations` fixed-point
//! updates. A fit that is still above `baseline.ica_tolerance` after that
//! fails the whole metrics pass with [`EvalError::IcaNotConverged`] and
//! nothing is written. Raise the cap, loosen the tolerance, or drop `"ICA"`
//! from `representations` to score the other representations.

pub mod baseline;
pub mod config;
pub mod dataset;
pub mod entropy;
pub mod error;
pub mod evaluator;
pub mod factors;
pub mod io;
pub mod losses;
pub mod model;
pub mod mutual_info;
pub mod paired;
pub mod posterior;
pub mod probe;
pub mod tracking;

pub use baseline::{
    FastIca, IcaSettings, PcaProjector, Representation, RepresentationKind, VaeRepresentation,
};
pub use config::EvaluatorConfig;
pub use dataset::{FactorDataset, InMemoryDataset};
pub use entropy::EntropyEstimate;
pub use error::{EvalError, Result};
pub use evaluator::{Evaluation, Evaluator, LossRecord, MetricsRecord};
pub use factors::{Factor, FactorSpec};
pub use losses::{BetaVaeLoss, LossStorer, Reconstruction, VaeLoss};
pub use model::{Encoder, ForwardPass, LinearGaussianModel, VaeModel};
pub use mutual_info::ScoreSummary;
pub use posterior::PosteriorTable;
pub use tracking::{ExperimentTracker, JsonlTracker};
