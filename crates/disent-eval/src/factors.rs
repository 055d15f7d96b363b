// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Ground-truth factors of variation and the mixed-radix index over them.
//!
//! Every metric in this crate assumes a *dense factorial* dataset: each
//! combination of factor values appears exactly once and example `i` sits at
//! the mixed-radix index of its values, with the last factor varying fastest.
//! [`FactorSpec::validate_len`] enforces the size half of that precondition;
//! a sparse or re-ordered dataset cannot be detected from metadata alone and
//! produces meaningless conditional entropies.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};

/// A single discrete generative factor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Factor {
    pub name: String,
    pub cardinality: usize,
}

impl Factor {
    pub fn new(name: impl Into<String>, cardinality: usize) -> Self {
        Self {
            name: name.into(),
            cardinality,
        }
    }
}

/// Ordered factors of a dense factorial dataset.
///
/// Serialises as the plain factor list; the index is rebuilt on load.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Factor>", into = "Vec<Factor>")]
pub struct FactorSpec {
    factors: Vec<Factor>,
    basis: Vec<usize>,
    total: usize,
}

impl TryFrom<Vec<Factor>> for FactorSpec {
    type Error = EvalError;

    fn try_from(factors: Vec<Factor>) -> Result<Self> {
        Self::new(factors)
    }
}

impl From<FactorSpec> for Vec<Factor> {
    fn from(spec: FactorSpec) -> Self {
        spec.factors
    }
}

impl FactorSpec {
    pub fn new(factors: Vec<Factor>) -> Result<Self> {
        if factors.is_empty() {
            return Err(EvalError::EmptyInput("factor specification"));
        }
        if let Some(factor) = factors.iter().find(|f| f.cardinality == 0) {
            return Err(EvalError::FactorMismatch(format!(
                "factor '{}' has cardinality 0",
                factor.name
            )));
        }
        let mut basis = vec![1usize; factors.len()];
        let mut total = 1usize;
        for (idx, factor) in factors.iter().enumerate().rev() {
            basis[idx] = total;
            total = total.checked_mul(factor.cardinality).ok_or_else(|| {
                EvalError::FactorMismatch("product of cardinalities overflows usize".into())
            })?;
        }
        Ok(Self {
            factors,
            basis,
            total,
        })
    }

    /// Builds a specification from parallel name/cardinality lists.
    pub fn from_sizes(names: &[&str], sizes: &[usize]) -> Result<Self> {
        if names.len() != sizes.len() {
            return Err(EvalError::FactorMismatch(format!(
                "{} factor names for {} cardinalities",
                names.len(),
                sizes.len()
            )));
        }
        Self::new(
            names
                .iter()
                .zip(sizes)
                .map(|(name, &size)| Factor::new(*name, size))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub fn factor(&self, index: usize) -> &Factor {
        &self.factors[index]
    }

    pub fn cardinalities(&self) -> Vec<usize> {
        self.factors.iter().map(|f| f.cardinality).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.factors.iter().map(|f| f.name.as_str()).collect()
    }

    /// Number of examples of the dense grid.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Mixed-radix strides; the last factor has stride 1.
    pub fn basis(&self) -> &[usize] {
        &self.basis
    }

    /// Checks that a dataset of `len` examples can be the dense grid.
    pub fn validate_len(&self, len: usize) -> Result<()> {
        if len != self.total {
            return Err(EvalError::FactorMismatch(format!(
                "dataset holds {len} examples but the factor grid {:?} needs {}",
                self.cardinalities(),
                self.total
            )));
        }
        Ok(())
    }

    /// Maps a tuple of factor values to its dataset index.
    pub fn encode(&self, values: &[usize]) -> Result<usize> {
        if values.len() != self.factors.len() {
            return Err(EvalError::FactorMismatch(format!(
                "expected {} factor values, got {}",
                self.factors.len(),
                values.len()
            )));
        }
        let mut index = 0;
        for ((value, factor), stride) in values.iter().zip(&self.factors).zip(&self.basis) {
            if *value >= factor.cardinality {
                return Err(EvalError::FactorMismatch(format!(
                    "value {value} out of range for factor '{}' ({} values)",
                    factor.name, factor.cardinality
                )));
            }
            index += value * stride;
        }
        Ok(index)
    }

    /// Inverse of [`FactorSpec::encode`].
    pub fn decode(&self, index: usize) -> Result<Vec<usize>> {
        if index >= self.total {
            return Err(EvalError::FactorMismatch(format!(
                "index {index} outside the factor grid of {} examples",
                self.total
            )));
        }
        Ok(self
            .factors
            .iter()
            .zip(&self.basis)
            .map(|(factor, stride)| (index / stride) % factor.cardinality)
            .collect())
    }

    /// Ascending dataset indices whose `factor` equals `value`.
    pub fn indices_where(&self, factor: usize, value: usize) -> Result<Vec<usize>> {
        let Some(spec) = self.factors.get(factor) else {
            return Err(EvalError::FactorMismatch(format!(
                "factor index {factor} out of range for {} factors",
                self.factors.len()
            )));
        };
        if value >= spec.cardinality {
            return Err(EvalError::FactorMismatch(format!(
                "value {value} out of range for factor '{}' ({} values)",
                spec.name, spec.cardinality
            )));
        }
        let stride = self.basis[factor];
        let block = stride * spec.cardinality;
        let mut indices = Vec::with_capacity(self.total / spec.cardinality);
        for outer in (0..self.total).step_by(block) {
            let start = outer + value * stride;
            indices.extend(start..start + stride);
        }
        Ok(indices)
    }
}
