//! # ql-math
//!
//! Mathematical utilities for the market-model engine: a matrix newtype over
//! nalgebra, symmetric eigen-decomposition and rank-reduced square roots,
//! Mersenne Twister based random numbers (with `statrs` supplying the
//! inverse normal), and statistics accumulators.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// ── Modules ───────────────────────────────────────────────────────────────────

/// Dense real matrix.
pub mod matrix;

/// Eigen-decomposition, pseudo square roots and factor reduction.
pub mod matrix_utilities;

/// Random number generators.
pub mod random_numbers;

/// Statistics accumulators.
pub mod statistics;

// ── Convenience re-exports ────────────────────────────────────────────────────

pub use matrix::Matrix;
pub use matrix_utilities::{pseudo_sqrt, rank_reduced_sqrt, SalvagingAlgorithm};
pub use random_numbers::{InverseCumulativeNormalRng, MersenneTwisterUniformRng};
pub use statistics::{SequenceStatistics, Statistics};
