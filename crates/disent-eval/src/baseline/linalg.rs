// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Bridges between `ndarray` data and the `nalgebra` decompositions.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use nalgebra::{DMatrix, SymmetricEigen};

pub(crate) const EIGEN_FLOOR: f64 = 1e-12;

pub(crate) fn to_dmatrix(array: ArrayView2<'_, f64>) -> DMatrix<f64> {
    DMatrix::from_fn(array.nrows(), array.ncols(), |i, j| array[[i, j]])
}

pub(crate) fn to_array(matrix: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((matrix.nrows(), matrix.ncols()), |(i, j)| matrix[(i, j)])
}

/// Column means and the centred copy of `data`.
pub(crate) fn center(data: ArrayView2<'_, f64>) -> Option<(Array2<f64>, Array1<f64>)> {
    let mean = data.mean_axis(Axis(0))?;
    let centred = &data - &mean;
    Some((centred, mean))
}

/// Orthonormal basis of the column space of `basis` (thin QR).
pub(crate) fn orthonormalize(basis: &Array2<f64>) -> Array2<f64> {
    let qr = to_dmatrix(basis.view()).qr();
    to_array(&qr.q())
}

/// Eigen-decomposition of a symmetric matrix with eigenvalues sorted in
/// descending order; eigenvectors are the columns of the second value.
pub(crate) fn symmetric_eigen_descending(matrix: &Array2<f64>) -> (Array1<f64>, Array2<f64>) {
    let eigen = SymmetricEigen::new(to_dmatrix(matrix.view()));
    let mut order: Vec<usize> = (0..eigen.eigenvalues.len()).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
    let values = order.iter().map(|&idx| eigen.eigenvalues[idx]).collect();
    let vectors = Array2::from_shape_fn((matrix.nrows(), order.len()), |(i, j)| {
        eigen.eigenvectors[(i, order[j])]
    });
    (values, vectors)
}

/// `M^{-1/2}` of a symmetric positive-definite matrix, or `None` when an
/// eigenvalue falls below [`EIGEN_FLOOR`].
pub(crate) fn inverse_sqrt_symmetric(matrix: &Array2<f64>) -> Option<Array2<f64>> {
    let (values, vectors) = symmetric_eigen_descending(matrix);
    if values.iter().any(|&v| !(v > EIGEN_FLOOR)) {
        return None;
    }
    let scaled = &vectors * &values.mapv(|v| 1.0 / v.sqrt());
    Some(scaled.dot(&vectors.t()))
}
