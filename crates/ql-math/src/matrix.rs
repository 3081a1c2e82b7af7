//! `Matrix`: a two-dimensional matrix of reals (translates `ql/math/matrix.hpp`).
//!
//! A thin newtype around `nalgebra::DMatrix<f64>`.  Besides the usual
//! indexing and products it carries the handful of row-oriented helpers the
//! market-model code needs on pseudo-roots: row/vector dot products, row
//! zeroing and the `A·Aᵀ` product that turns a pseudo-root back into a
//! covariance matrix.

use nalgebra::DMatrix;
use ql_core::Real;
use std::ops::{Add, Index, IndexMut, Mul};

/// A dynamically-sized 2D matrix of `Real` values.
///
/// Corresponds to `QuantLib::Matrix`.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix(DMatrix<Real>);

impl Matrix {
    /// Create a zero-filled `rows × cols` matrix.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self(DMatrix::zeros(rows, cols))
    }

    /// Create an identity matrix of size `n × n`.
    pub fn identity(n: usize) -> Self {
        Self(DMatrix::identity(n, n))
    }

    /// Create from a row-major data slice.
    pub fn from_row_slice(rows: usize, cols: usize, data: &[Real]) -> Self {
        Self(DMatrix::from_row_slice(rows, cols, data))
    }

    /// Create a `rows × cols` matrix whose `(i, j)` entry is `f(i, j)`.
    pub fn from_fn<F: FnMut(usize, usize) -> Real>(rows: usize, cols: usize, f: F) -> Self {
        Self(DMatrix::from_fn(rows, cols, f))
    }

    /// Number of rows.
    pub fn rows(&self) -> usize {
        self.0.nrows()
    }

    /// Number of columns.
    pub fn cols(&self) -> usize {
        self.0.ncols()
    }

    /// Return `true` if the matrix is square.
    pub fn is_square(&self) -> bool {
        self.0.nrows() == self.0.ncols()
    }

    /// Borrow the inner `DMatrix`.
    pub fn inner(&self) -> &DMatrix<Real> {
        &self.0
    }

    /// Transpose.
    pub fn transpose(&self) -> Self {
        Self(self.0.transpose())
    }

    /// `self · selfᵀ`, i.e. the covariance implied by a pseudo-root.
    pub fn mul_transpose(&self) -> Self {
        Self(&self.0 * self.0.transpose())
    }

    /// Dot product of row `i` with `v` (`v.len()` must equal `cols()`).
    #[inline]
    pub fn row_dot(&self, i: usize, v: &[Real]) -> Real {
        debug_assert_eq!(v.len(), self.0.ncols());
        v.iter()
            .enumerate()
            .map(|(j, &x)| self.0[(i, j)] * x)
            .sum()
    }

    /// `true` if every entry of row `i` is exactly zero.
    pub fn is_row_zero(&self, i: usize) -> bool {
        self.0.row(i).iter().all(|&x| x == 0.0)
    }

    /// Overwrite row `i` with zeros.
    pub fn zero_row(&mut self, i: usize) {
        self.0.row_mut(i).fill(0.0);
    }

    /// Largest absolute difference between `self` and its transpose.
    pub fn asymmetry(&self) -> Real {
        let n = self.rows().min(self.cols());
        let mut worst: Real = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                worst = worst.max((self.0[(i, j)] - self.0[(j, i)]).abs());
            }
        }
        worst
    }
}

// ── Indexing ──────────────────────────────────────────────────────────────────

impl Index<(usize, usize)> for Matrix {
    type Output = Real;
    fn index(&self, (i, j): (usize, usize)) -> &Real {
        &self.0[(i, j)]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut Real {
        &mut self.0[(i, j)]
    }
}

// ── Arithmetic ────────────────────────────────────────────────────────────────

impl Mul for &Matrix {
    type Output = Matrix;
    fn mul(self, rhs: &Matrix) -> Matrix {
        Matrix(&self.0 * &rhs.0)
    }
}

impl Add for &Matrix {
    type Output = Matrix;
    fn add(self, rhs: &Matrix) -> Matrix {
        Matrix(&self.0 + &rhs.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_transpose_recovers_covariance() {
        let a = Matrix::from_row_slice(2, 2, &[1.0, 0.0, 0.5, 2.0]);
        let c = a.mul_transpose();
        assert_eq!(c[(0, 0)], 1.0);
        assert_eq!(c[(0, 1)], 0.5);
        assert_eq!(c[(1, 0)], 0.5);
        assert_eq!(c[(1, 1)], 4.25);
    }

    #[test]
    fn row_helpers() {
        let mut m = Matrix::from_row_slice(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(m.row_dot(1, &[1.0, 1.0, 1.0]), 15.0);
        assert!(!m.is_row_zero(0));
        m.zero_row(0);
        assert!(m.is_row_zero(0));
        assert_eq!(m.row_dot(1, &[1.0, 0.0, 0.0]), 4.0);
    }

    #[test]
    fn asymmetry_detects_mismatch() {
        let sym = Matrix::from_row_slice(2, 2, &[1.0, 0.3, 0.3, 1.0]);
        assert_eq!(sym.asymmetry(), 0.0);
        let asym = Matrix::from_row_slice(2, 2, &[1.0, 0.3, 0.2, 1.0]);
        assert!((asym.asymmetry() - 0.1).abs() < 1e-15);
    }

    #[test]
    fn from_fn_and_products() {
        let m = Matrix::from_fn(2, 2, |i, j| (i * 2 + j) as Real);
        let i2 = Matrix::identity(2);
        assert_eq!(&m * &i2, m);
        assert_eq!(m.transpose()[(0, 1)], 2.0);
    }
}
