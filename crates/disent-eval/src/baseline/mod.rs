// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Representations compared by the classifier probe: the VAE's posterior
//! means and the PCA/ICA projections of raw pixels.

mod ica;
mod linalg;
mod pca;

pub use ica::{FastIca, IcaSettings};
pub use pca::PcaProjector;

use crate::error::{EvalError, Result};
use crate::model::Encoder;
use ndarray::{Array2, ArrayView2, Axis};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Deterministic map from flattened images to feature vectors.
pub trait Representation {
    fn name(&self) -> &str;

    /// Width of the produced features.
    fn dim(&self) -> usize;

    fn transform(&self, images: ArrayView2<'_, f64>) -> Result<Array2<f64>>;
}

/// Representation names accepted by the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RepresentationKind {
    Vae,
    Pca,
    Ica,
}

impl RepresentationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vae => "VAE",
            Self::Pca => "PCA",
            Self::Ica => "ICA",
        }
    }

    /// Parses every name, failing on the first unknown one.
    pub fn parse_all<S: AsRef<str>>(names: &[S]) -> Result<Vec<Self>> {
        names.iter().map(|name| name.as_ref().parse()).collect()
    }
}

impl fmt::Display for RepresentationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepresentationKind {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "VAE" => Ok(Self::Vae),
            "PCA" => Ok(Self::Pca),
            "ICA" => Ok(Self::Ica),
            _ => Err(EvalError::UnknownRepresentation(s.to_string())),
        }
    }
}

/// Posterior means of a borrowed encoder.
pub struct VaeRepresentation<'a, E: Encoder + ?Sized> {
    encoder: &'a E,
}

impl<'a, E: Encoder + ?Sized> VaeRepresentation<'a, E> {
    pub fn new(encoder: &'a E) -> Self {
        Self { encoder }
    }
}

impl<E: Encoder + ?Sized> Representation for VaeRepresentation<'_, E> {
    fn name(&self) -> &str {
        "VAE"
    }

    fn dim(&self) -> usize {
        self.encoder.latent_dim()
    }

    fn transform(&self, images: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let (mean, _) = self.encoder.encode(images)?;
        Ok(mean)
    }
}

pub(crate) fn check_width(
    context: &'static str,
    images: ArrayView2<'_, f64>,
    pixels: usize,
) -> Result<()> {
    if images.ncols() != pixels {
        return Err(EvalError::Shape {
            context,
            expected: (images.nrows(), pixels),
            got: images.dim(),
        });
    }
    Ok(())
}

/// `samples` rows drawn uniformly with replacement.
pub(crate) fn subsample_with_replacement(
    images: ArrayView2<'_, f64>,
    samples: usize,
    rng: &mut dyn RngCore,
) -> Result<Array2<f64>> {
    if images.nrows() == 0 {
        return Err(EvalError::EmptyInput("baseline training images"));
    }
    let indices: Vec<usize> = (0..samples)
        .map(|_| rng.gen_range(0..images.nrows()))
        .collect();
    Ok(images.select(Axis(0), &indices))
}
