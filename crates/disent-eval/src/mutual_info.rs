// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Mutual information between factors and latent dimensions, and the scores
//! derived from it.

use crate::error::{EvalError, Result};
use crate::factors::FactorSpec;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Overall score and its per-factor breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub score: f64,
    pub per_factor: Vec<f64>,
}

impl ScoreSummary {
    fn from_per_factor(per_factor: Vec<f64>) -> Self {
        let score = if per_factor.is_empty() {
            0.0
        } else {
            per_factor.iter().sum::<f64>() / per_factor.len() as f64
        };
        Self { score, per_factor }
    }
}

/// `I(z_j; v_k) = H(z_j) - H(z_j | v_k)` as a K × D matrix.
pub fn mutual_information(marginal: &Array1<f64>, conditional: &Array2<f64>) -> Result<Array2<f64>> {
    if conditional.ncols() != marginal.len() {
        return Err(EvalError::Shape {
            context: "mutual_information",
            expected: (conditional.nrows(), marginal.len()),
            got: conditional.dim(),
        });
    }
    Ok(marginal - conditional)
}

/// Sorts every row in descending order and clamps negatives to zero.
pub fn sort_descending_clamped(mutual_info: &Array2<f64>) -> Array2<f64> {
    let mut sorted = mutual_info.mapv(|v| if v > 0.0 { v } else { 0.0 });
    for mut row in sorted.axis_iter_mut(Axis(0)) {
        let mut values = row.to_vec();
        values.sort_by(|a, b| b.total_cmp(a));
        row.assign(&Array1::from(values));
    }
    sorted
}

/// Mutual Information Gap over row-sorted mutual information.
///
/// Each factor contributes `(top1 - top2) / ln |V_k|`, the entropy of a
/// uniform factor. A single-valued factor carries no information and
/// contributes 0; with one latent dimension `top2` is 0.
pub fn mig(sorted: &Array2<f64>, factors: &FactorSpec) -> Result<ScoreSummary> {
    if sorted.nrows() != factors.len() {
        return Err(EvalError::Shape {
            context: "mig",
            expected: (factors.len(), sorted.ncols()),
            got: sorted.dim(),
        });
    }
    if sorted.ncols() == 0 {
        return Err(EvalError::EmptyInput("mutual information"));
    }
    let per_factor = sorted
        .axis_iter(Axis(0))
        .zip(factors.factors())
        .map(|(row, factor)| {
            if factor.cardinality <= 1 {
                return 0.0;
            }
            let top1 = row[0];
            let top2 = row.get(1).copied().unwrap_or(0.0);
            (top1 - top2) / (factor.cardinality as f64).ln()
        })
        .collect();
    Ok(ScoreSummary::from_per_factor(per_factor))
}

/// Axis-Aligned Metric over row-sorted mutual information.
///
/// Each factor contributes `max(top1 - Σ rest, 0) / top1`, or 0 when the
/// factor shares no information with any dimension.
pub fn aam(sorted: &Array2<f64>) -> Result<ScoreSummary> {
    if sorted.ncols() == 0 {
        return Err(EvalError::EmptyInput("mutual information"));
    }
    let per_factor = sorted
        .axis_iter(Axis(0))
        .map(|row| {
            let top1 = row[0];
            let rest: f64 = row.iter().skip(1).sum();
            let ratio = (top1 - rest).max(0.0) / top1;
            if ratio.is_finite() {
                ratio
            } else {
                0.0
            }
        })
        .collect();
    Ok(ScoreSummary::from_per_factor(per_factor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn sorting_is_descending_and_clamped() {
        let sorted = sort_descending_clamped(&array![[0.1, -0.2, 0.5], [0.0, 0.3, 0.2]]);
        assert_eq!(sorted, array![[0.5, 0.1, 0.0], [0.3, 0.2, 0.0]]);
    }

    #[test]
    fn perfectly_aligned_information_scores_one() {
        let factors = FactorSpec::from_sizes(&["a", "b"], &[4, 6]).unwrap();
        let marginal = array![4f64.ln(), 6f64.ln()];
        let conditional = array![[0.0, 6f64.ln()], [4f64.ln(), 0.0]];
        let mi = mutual_information(&marginal, &conditional).unwrap();
        let sorted = sort_descending_clamped(&mi);
        let mig = mig(&sorted, &factors).unwrap();
        let aam = aam(&sorted).unwrap();
        assert_abs_diff_eq!(mig.score, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(aam.score, 1.0, epsilon = 1e-12);
        assert_eq!(mig.per_factor.len(), 2);
    }

    #[test]
    fn entangled_information_lowers_both_scores() {
        let factors = FactorSpec::from_sizes(&["a"], &[2]).unwrap();
        let sorted = sort_descending_clamped(&array![[0.3, 0.3]]);
        assert_abs_diff_eq!(mig(&sorted, &factors).unwrap().score, 0.0);
        assert_abs_diff_eq!(aam(&sorted).unwrap().score, 0.0);
    }

    #[test]
    fn zero_rows_never_produce_nan() {
        let sorted = array![[0.0, 0.0], [0.4, 0.1]];
        let summary = aam(&sorted).unwrap();
        assert_eq!(summary.per_factor[0], 0.0);
        assert_abs_diff_eq!(summary.per_factor[1], 0.75);
        assert!(!summary.score.is_nan());
    }

    #[test]
    fn single_latent_and_single_valued_factor_edge_cases() {
        let factors = FactorSpec::from_sizes(&["constant", "b"], &[1, 3]).unwrap();
        let sorted = array![[0.0], [3f64.ln()]];
        let summary = mig(&sorted, &factors).unwrap();
        assert_eq!(summary.per_factor[0], 0.0);
        assert_abs_diff_eq!(summary.per_factor[1], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(summary.score, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn shape_errors_are_reported() {
        let factors = FactorSpec::from_sizes(&["a"], &[2]).unwrap();
        assert!(mig(&array![[0.1], [0.2]], &factors).is_err());
        assert!(mutual_information(&array![0.0], &array![[0.0, 1.0]]).is_err());
    }
}
