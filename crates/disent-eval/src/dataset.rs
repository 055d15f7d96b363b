// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{EvalError, Result};
use crate::factors::FactorSpec;
use ndarray::{s, Array2, ArrayView2, Axis};
use std::ops::Range;

/// Image dataset, optionally annotated with its factors of variation.
///
/// Images are stored flattened, one example per row, in dataset order.
pub trait FactorDataset {
    fn name(&self) -> &str;

    fn images(&self) -> ArrayView2<'_, f64>;

    /// Ground-truth factors, when the dataset is a known factorial grid.
    fn factors(&self) -> Option<&FactorSpec>;

    fn len(&self) -> usize {
        self.images().nrows()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattened pixels per example.
    fn pixels(&self) -> usize {
        self.images().ncols()
    }

    /// Sequential, unshuffled batches of at most `batch_size` examples.
    fn batches(&self, batch_size: usize) -> Batches<'_> {
        Batches {
            images: self.images(),
            batch_size: batch_size.max(1),
            cursor: 0,
        }
    }

    /// Copies the rows at `indices` into a new matrix.
    fn gather(&self, indices: &[usize]) -> Result<Array2<f64>> {
        let len = self.len();
        if let Some(&bad) = indices.iter().find(|&&idx| idx >= len) {
            return Err(EvalError::FactorMismatch(format!(
                "index {bad} out of range for dataset '{}' of {len} examples",
                self.name()
            )));
        }
        Ok(self.images().select(Axis(0), indices))
    }
}

/// Iterator over `(images, dataset index range)` pairs.
#[derive(Debug, Clone)]
pub struct Batches<'a> {
    images: ArrayView2<'a, f64>,
    batch_size: usize,
    cursor: usize,
}

impl<'a> Iterator for Batches<'a> {
    type Item = (ArrayView2<'a, f64>, Range<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        let total = self.images.nrows();
        if self.cursor >= total {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(total);
        let range = self.cursor..end;
        self.cursor = end;
        let batch = self.images.slice_move(s![range.clone(), ..]);
        Some((batch, range))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.images.nrows().saturating_sub(self.cursor);
        let batches = (remaining + self.batch_size - 1) / self.batch_size;
        (batches, Some(batches))
    }
}

impl ExactSizeIterator for Batches<'_> {}

/// Dataset held entirely in memory.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    name: String,
    images: Array2<f64>,
    factors: Option<FactorSpec>,
}

impl InMemoryDataset {
    /// Wraps `images`, checking that `factors` describe exactly that many
    /// examples.
    pub fn new(
        name: impl Into<String>,
        images: Array2<f64>,
        factors: Option<FactorSpec>,
    ) -> Result<Self> {
        if let Some(spec) = &factors {
            spec.validate_len(images.nrows())?;
        }
        Ok(Self {
            name: name.into(),
            images,
            factors,
        })
    }

    /// Renders one image per grid cell, in mixed-radix order.
    pub fn from_factor_grid<F>(
        name: impl Into<String>,
        factors: FactorSpec,
        pixels: usize,
        mut render: F,
    ) -> Result<Self>
    where
        F: FnMut(&[usize]) -> Vec<f64>,
    {
        let mut images = Array2::zeros((factors.total(), pixels));
        for (index, mut row) in images.axis_iter_mut(Axis(0)).enumerate() {
            let values = factors.decode(index)?;
            let image = render(&values);
            if image.len() != pixels {
                return Err(EvalError::Shape {
                    context: "InMemoryDataset::from_factor_grid",
                    expected: (1, pixels),
                    got: (1, image.len()),
                });
            }
            row.assign(&ndarray::ArrayView1::from(&image));
        }
        Self::new(name, images, Some(factors))
    }
}

impl FactorDataset for InMemoryDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn images(&self) -> ArrayView2<'_, f64> {
        self.images.view()
    }

    fn factors(&self) -> Option<&FactorSpec> {
        self.factors.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> InMemoryDataset {
        let spec = FactorSpec::from_sizes(&["a", "b"], &[2, 3]).unwrap();
        InMemoryDataset::from_factor_grid("grid", spec, 2, |v| vec![v[0] as f64, v[1] as f64])
            .unwrap()
    }

    #[test]
    fn grid_rows_follow_mixed_radix_order() {
        let data = grid();
        assert_eq!(data.len(), 6);
        assert_eq!(data.images().row(4).to_vec(), vec![1.0, 1.0]);
        assert_eq!(data.gather(&[5, 0]).unwrap().row(0).to_vec(), vec![1.0, 2.0]);
        assert!(data.gather(&[6]).is_err());
    }

    #[test]
    fn batches_cover_dataset_in_order() {
        let data = grid();
        let batches: Vec<_> = data.batches(4).collect();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].1, 0..4);
        assert_eq!(batches[1].1, 4..6);
        assert_eq!(batches[1].0.nrows(), 2);
        assert_eq!(data.batches(4).len(), 2);
    }

    #[test]
    fn rejects_factor_size_mismatch() {
        let spec = FactorSpec::from_sizes(&["a"], &[3]).unwrap();
        let err = InMemoryDataset::new("bad", Array2::zeros((4, 1)), Some(spec)).unwrap_err();
        assert!(matches!(err, EvalError::FactorMismatch(_)));
    }
}
