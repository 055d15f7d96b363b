// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Paired-sample datasets for the classifier probe.
//!
//! One example fixes a randomly chosen factor `k` to shared values across
//! two batches of images while every other factor is drawn independently
//! per batch. The mean absolute difference of the two batches' features is
//! labelled with `k`: a disentangled representation leaves a visible zero
//! in the coordinate that tracks `k`.

use crate::baseline::Representation;
use crate::dataset::FactorDataset;
use crate::error::{EvalError, Result};
use crate::factors::FactorSpec;
use ndarray::{Array2, Axis};
use rand::{Rng, RngCore};

/// Difference vectors and their fixed-factor labels.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeDataset {
    pub features: Array2<f64>,
    pub labels: Vec<usize>,
}

impl ProbeDataset {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Training and held-out data of one representation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeSplit {
    pub train: ProbeDataset,
    pub test: ProbeDataset,
}

/// Dataset indices of the two batches of one paired example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedIndices {
    pub factor: usize,
    pub first: Vec<usize>,
    pub second: Vec<usize>,
}

/// Draws paired image batches from a dense factorial dataset.
pub struct PairedSampleBuilder<'a, D: FactorDataset + ?Sized> {
    dataset: &'a D,
    factors: &'a FactorSpec,
    sample_size: usize,
}

impl<'a, D: FactorDataset + ?Sized> PairedSampleBuilder<'a, D> {
    pub fn new(dataset: &'a D, sample_size: usize) -> Result<Self> {
        let factors = dataset.factors().ok_or_else(|| EvalError::MissingFactors {
            dataset: dataset.name().to_string(),
        })?;
        factors.validate_len(dataset.len())?;
        if sample_size == 0 {
            return Err(EvalError::EmptyInput("paired sample size"));
        }
        Ok(Self {
            dataset,
            factors,
            sample_size,
        })
    }

    /// Picks the fixed factor and both batches of grid indices.
    pub fn draw_indices(&self, rng: &mut dyn RngCore) -> Result<PairedIndices> {
        let factor = rng.gen_range(0..self.factors.len());
        let shared: Vec<usize> = (0..self.sample_size)
            .map(|_| rng.gen_range(0..self.factors.factor(factor).cardinality))
            .collect();

        let mut first = vec![vec![0usize; self.factors.len()]; self.sample_size];
        let mut second = first.clone();
        for (k, spec) in self.factors.factors().iter().enumerate() {
            for batch in [&mut first, &mut second] {
                for (row, values) in batch.iter_mut().enumerate() {
                    values[k] = if k == factor {
                        shared[row]
                    } else {
                        rng.gen_range(0..spec.cardinality)
                    };
                }
            }
        }
        let encode = |batch: Vec<Vec<usize>>| -> Result<Vec<usize>> {
            batch.iter().map(|values| self.factors.encode(values)).collect()
        };
        Ok(PairedIndices {
            factor,
            first: encode(first)?,
            second: encode(second)?,
        })
    }

    /// Generates `count` labelled difference vectors for every representation.
    ///
    /// All representations see the same image pairs; the result is ordered
    /// like `representations`.
    pub fn build(
        &self,
        representations: &[&dyn Representation],
        count: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<ProbeDataset>> {
        let mut datasets: Vec<ProbeDataset> = representations
            .iter()
            .map(|rep| ProbeDataset {
                features: Array2::zeros((count, rep.dim())),
                labels: Vec::with_capacity(count),
            })
            .collect();

        for example in 0..count {
            let pair = self.draw_indices(rng)?;
            let first = self.dataset.gather(&pair.first)?;
            let second = self.dataset.gather(&pair.second)?;
            for (rep, data) in representations.iter().zip(datasets.iter_mut()) {
                let z1 = rep.transform(first.view())?;
                let z2 = rep.transform(second.view())?;
                let expected = (self.sample_size, rep.dim());
                for z in [&z1, &z2] {
                    if z.dim() != expected {
                        return Err(EvalError::Shape {
                            context: "Representation::transform",
                            expected,
                            got: z.dim(),
                        });
                    }
                }
                let diff = (z1 - z2)
                    .mapv(f64::abs)
                    .mean_axis(Axis(0))
                    .ok_or(EvalError::EmptyInput("paired sample"))?;
                data.features.row_mut(example).assign(&diff);
                data.labels.push(pair.factor);
            }
        }
        Ok(datasets)
    }

    /// Training set of `train_size` and a freshly drawn held-out set of
    /// `test_size` examples per representation.
    pub fn build_splits(
        &self,
        representations: &[&dyn Representation],
        train_size: usize,
        test_size: usize,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<ProbeSplit>> {
        let train = self.build(representations, train_size, rng)?;
        let test = self.build(representations, test_size, rng)?;
        Ok(train
            .into_iter()
            .zip(test)
            .map(|(train, test)| ProbeSplit { train, test })
            .collect())
    }
}
