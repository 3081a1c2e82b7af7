//! No-arbitrage drifts of the simulated rates (translates
//! `ql/models/marketmodels/driftcomputation/`).
//!
//! A drift calculator is built once per evolution step from that step's
//! pseudo-root, the accrual fractions, the displacements, the step
//! numeraire and the first alive rate.  Its `compute` methods write into a
//! caller-supplied buffer and reuse internal scratch space, so they never
//! allocate; each evolver owns its calculators.
//!
//! Two algorithms are provided for every flavour:
//!
//! * **plain**: uses the full step covariance, `O(n²)`;
//! * **reduced**: works on the `n × F` factor loadings, `O(n·F)`.
//!
//! Both give the same answer up to rounding when no factor reduction took
//! place.

mod lmm;
mod smm;

pub use lmm::LmmDriftCalculator;
pub use smm::SmmDriftCalculator;

use ql_core::{ensure, errors::Result, Size, Spread, Time};
use ql_math::Matrix;

/// Which drift algorithm an evolver uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriftMethod {
    /// Full covariance.
    Plain,
    /// Factor loadings.
    #[default]
    Reduced,
}

/// Dynamics of the simulated forward rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateDynamics {
    /// `log(f + d)` diffuses; pseudo-roots are displaced log-volatilities.
    #[default]
    Lognormal,
    /// `f` diffuses additively; pseudo-roots are absolute volatilities.
    Normal,
}

// Inputs shared by every calculator, checked once.
fn check_calculator_inputs(
    pseudo: &Matrix,
    displacements: &[Spread],
    taus: &[Time],
    numeraire: Size,
    alive: Size,
) -> Result<()> {
    let n = taus.len();
    ensure!(
        pseudo.rows() == n,
        "pseudo-root has {} rows, {n} rates given",
        pseudo.rows()
    );
    ensure!(
        displacements.len() == n,
        "displacements mismatch: {n} required, {} provided",
        displacements.len()
    );
    ensure!(numeraire <= n, "numeraire ({numeraire}) out of range [0, {n}]");
    ensure!(
        alive <= numeraire,
        "numeraire ({numeraire}) has already expired (first alive rate is {alive})"
    );
    ensure!(pseudo.cols() >= 1, "pseudo-root has no factors");
    Ok(())
}
