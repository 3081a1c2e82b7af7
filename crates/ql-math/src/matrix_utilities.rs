//! Matrix decompositions used for factor reduction (translates
//! `ql/math/matrixutilities/pseudosqrt.hpp` and
//! `ql/math/matrixutilities/symmetricschurdecomposition.hpp`).
//!
//! The central routine is [`rank_reduced_sqrt`], which turns a symmetric
//! covariance (or correlation) matrix into a rectangular pseudo-root with at
//! most `max_rank` columns.  How a matrix that is not positive
//! semi-definite gets repaired is controlled by a [`SalvagingAlgorithm`].

use crate::matrix::Matrix;
use ql_core::{
    ensure,
    errors::{Error, Result},
    Real,
};

/// Relative size of a negative eigenvalue still attributed to round-off.
const NEGATIVE_EIGENVALUE_TOLERANCE: Real = 1e-12;

/// Default absolute tolerance used by [`check_symmetry`] callers.
pub const SYMMETRY_TOLERANCE: Real = 1e-12;

/// Policy applied to negative eigenvalues before taking square roots.
///
/// Corresponds to `QuantLib::SalvagingAlgorithm::Type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SalvagingAlgorithm {
    /// Negative eigenvalues beyond round-off are an error.
    #[default]
    None,
    /// Negative eigenvalues are floored at zero.
    Spectral,
}

/// Eigen-decomposition of a symmetric matrix.
///
/// Returns `(eigenvalues, eigenvectors)` with the eigenvalues sorted in
/// **descending** order and the `k`-th column of the eigenvector matrix
/// matching the `k`-th eigenvalue.
///
/// Corresponds to `QuantLib::SymmetricSchurDecomposition`.
pub fn symmetric_schur(m: &Matrix) -> Result<(Vec<Real>, Matrix)> {
    ensure!(m.is_square(), "matrix must be square, got {}×{}", m.rows(), m.cols());
    check_symmetry(m, SYMMETRY_TOLERANCE)?;

    let n = m.rows();
    let eigen = m.inner().clone().symmetric_eigen();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let values = order.iter().map(|&k| eigen.eigenvalues[k]).collect();
    let vectors = Matrix::from_fn(n, n, |i, j| eigen.eigenvectors[(i, order[j])]);
    Ok((values, vectors))
}

/// Fail unless `|m(i,j) - m(j,i)| <= tolerance` for every pair.
pub fn check_symmetry(m: &Matrix, tolerance: Real) -> Result<()> {
    ensure!(m.is_square(), "matrix must be square, got {}×{}", m.rows(), m.cols());
    let worst = m.asymmetry();
    ensure!(
        worst <= tolerance,
        "matrix is not symmetric (largest asymmetry {worst:e})"
    );
    Ok(())
}

/// Smallest eigenvalue of a symmetric matrix.
pub fn min_eigenvalue(m: &Matrix) -> Result<Real> {
    let (values, _) = symmetric_schur(m)?;
    Ok(values.last().copied().unwrap_or(0.0))
}

/// Rank-reduced pseudo square root of a symmetric matrix.
///
/// Returns `S` (`n × r`, `r <= max_rank`) such that `S·Sᵀ` approximates `m`
/// using the `r` largest principal components, where `r` is the smallest
/// number of components explaining `component_retained_percentage` of the
/// total variance (capped at `max_rank`).  Rows are rescaled afterwards so
/// that the diagonal of `S·Sᵀ` reproduces the diagonal of `m` exactly.
///
/// Corresponds to `QuantLib::rankReducedSqrt`.
pub fn rank_reduced_sqrt(
    m: &Matrix,
    max_rank: usize,
    component_retained_percentage: Real,
    salvaging: SalvagingAlgorithm,
) -> Result<Matrix> {
    ensure!(
        component_retained_percentage > 0.0,
        "no eigenvalues retained"
    );
    ensure!(
        component_retained_percentage <= 1.0,
        "percentage to be retained > 100%"
    );
    ensure!(max_rank >= 1, "max rank required < 1");
    ensure!(m.rows() > 0, "empty matrix given");

    let (mut values, vectors) = symmetric_schur(m)?;
    let size = values.len();

    let largest = values[0];
    let smallest = values[size - 1];
    match salvaging {
        SalvagingAlgorithm::None => {
            if smallest < -NEGATIVE_EIGENVALUE_TOLERANCE * (1.0 + largest.abs()) {
                return Err(Error::NegativeEigenvalue(smallest));
            }
        }
        SalvagingAlgorithm::Spectral => {}
    }
    for v in values.iter_mut() {
        *v = v.max(0.0);
    }

    let total: Real = values.iter().sum();
    let mut enough = component_retained_percentage * total;
    if component_retained_percentage == 1.0 {
        // round-off must not discard genuine factors
        enough *= 1.1;
    }
    let mut components = values[0];
    let mut retained = 1;
    while components < enough && retained < size {
        components += values[retained];
        retained += 1;
    }
    let retained = retained.min(max_rank);

    let mut root = Matrix::from_fn(size, retained, |i, j| vectors[(i, j)] * values[j].sqrt());
    normalize_pseudo_root(m, &mut root);
    Ok(root)
}

/// Full-rank pseudo square root (`S·Sᵀ = m`, `S` square).
///
/// Corresponds to `QuantLib::pseudoSqrt`.
pub fn pseudo_sqrt(m: &Matrix, salvaging: SalvagingAlgorithm) -> Result<Matrix> {
    rank_reduced_sqrt(m, m.rows(), 1.0, salvaging)
}

/// Rescale each row of `root` so that `(root·rootᵀ)(i,i) == m(i,i)`.
///
/// Rows with zero norm are left untouched.
pub fn normalize_pseudo_root(m: &Matrix, root: &mut Matrix) {
    for i in 0..root.rows() {
        let norm: Real = (0..root.cols()).map(|j| root[(i, j)] * root[(i, j)]).sum();
        if norm > 0.0 {
            let adjustment = (m[(i, i)] / norm).sqrt();
            for j in 0..root.cols() {
                root[(i, j)] *= adjustment;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn exponential_correlation(n: usize, beta: Real) -> Matrix {
        Matrix::from_fn(n, n, |i, j| (-beta * (i as Real - j as Real).abs()).exp())
    }

    #[test]
    fn eigenvalues_are_sorted_descending() {
        let m = Matrix::from_row_slice(3, 3, &[2.0, 0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 1.0]);
        let (vals, vecs) = symmetric_schur(&m).unwrap();
        assert_abs_diff_eq!(vals[0], 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(vals[1], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(vals[2], 1.0, epsilon = 1e-12);
        // first eigenvector is ±e_1
        assert_abs_diff_eq!(vecs[(1, 0)].abs(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn full_rank_root_reproduces_matrix() {
        let m = exponential_correlation(5, 0.2);
        let s = pseudo_sqrt(&m, SalvagingAlgorithm::None).unwrap();
        assert_eq!(s.cols(), 5);
        let back = s.mul_transpose();
        for i in 0..5 {
            for j in 0..5 {
                assert_abs_diff_eq!(back[(i, j)], m[(i, j)], epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn reduced_root_has_requested_rank_and_exact_diagonal() {
        let m = exponential_correlation(6, 0.1);
        let s = rank_reduced_sqrt(&m, 2, 1.0, SalvagingAlgorithm::None).unwrap();
        assert_eq!((s.rows(), s.cols()), (6, 2));
        let back = s.mul_transpose();
        for i in 0..6 {
            assert_abs_diff_eq!(back[(i, i)], 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn rank_one_matrix_keeps_requested_columns() {
        let m = Matrix::from_fn(4, 4, |_, _| 0.0225);
        let s = rank_reduced_sqrt(&m, 3, 1.0, SalvagingAlgorithm::None).unwrap();
        assert_eq!(s.cols(), 3);
        let back = s.mul_transpose();
        assert_abs_diff_eq!(back[(0, 3)], 0.0225, epsilon = 1e-12);
    }

    #[test]
    fn negative_eigenvalue_is_rejected_without_salvaging() {
        // |rho| > 1 in a 2x2 "correlation" matrix
        let m = Matrix::from_row_slice(2, 2, &[1.0, 1.5, 1.5, 1.0]);
        match rank_reduced_sqrt(&m, 2, 1.0, SalvagingAlgorithm::None) {
            Err(Error::NegativeEigenvalue(v)) => assert!(v < -0.4),
            other => panic!("expected negative eigenvalue error, got {other:?}"),
        }
        let salvaged = rank_reduced_sqrt(&m, 2, 1.0, SalvagingAlgorithm::Spectral).unwrap();
        let back = salvaged.mul_transpose();
        assert_abs_diff_eq!(back[(0, 0)], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn asymmetric_input_is_rejected() {
        let m = Matrix::from_row_slice(2, 2, &[1.0, 0.5, 0.4, 1.0]);
        assert!(rank_reduced_sqrt(&m, 2, 1.0, SalvagingAlgorithm::None).is_err());
    }

    #[test]
    fn invalid_arguments() {
        let m = Matrix::identity(2);
        assert!(rank_reduced_sqrt(&m, 0, 1.0, SalvagingAlgorithm::None).is_err());
        assert!(rank_reduced_sqrt(&m, 2, 0.0, SalvagingAlgorithm::None).is_err());
        assert!(rank_reduced_sqrt(&m, 2, 1.5, SalvagingAlgorithm::None).is_err());
    }

    #[test]
    fn min_eigenvalue_of_identity() {
        assert_abs_diff_eq!(min_eigenvalue(&Matrix::identity(3)).unwrap(), 1.0, epsilon = 1e-14);
    }
}
