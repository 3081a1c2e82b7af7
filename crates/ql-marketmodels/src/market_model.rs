//! The market-model interface (translates `ql/models/marketmodels/marketmodel.hpp`).
//!
//! A market model is the frozen, read-only output of calibration: initial
//! rates, displacements and one pseudo-root per evolution step.  Evolvers,
//! drift calculators and adapters only ever see it through this trait, and
//! every simulation thread shares one instance.

use crate::evolution_description::EvolutionDescription;
use ql_core::{ensure, ensure_index, errors::Result, Rate, Size, Spread};
use ql_math::Matrix;

/// Step-wise factor loadings of a multi-factor rate model.
///
/// `pseudo_root(k)` is `n × F` and its product with its transpose is the
/// covariance of the displaced log-rates accrued over step `k`.
///
/// Corresponds to `QuantLib::MarketModel`.
pub trait MarketModel: Send + Sync {
    /// Rates at time zero.
    fn initial_rates(&self) -> &[Rate];

    /// Per-rate displacements `d` (the diffused quantity is `rate + d`).
    fn displacements(&self) -> &[Spread];

    /// Evolution description the pseudo-roots are defined on.
    fn evolution(&self) -> &EvolutionDescription;

    /// Number of factors `F`.
    fn number_of_factors(&self) -> Size;

    /// Pseudo-root for step `step`.
    fn pseudo_root(&self, step: Size) -> Result<&Matrix>;

    /// Number of rates `n`.
    fn number_of_rates(&self) -> Size {
        self.initial_rates().len()
    }

    /// Number of evolution steps.
    fn number_of_steps(&self) -> Size {
        self.evolution().number_of_steps()
    }

    /// Covariance accrued over step `step`.
    fn covariance(&self, step: Size) -> Result<Matrix> {
        Ok(self.pseudo_root(step)?.mul_transpose())
    }

    /// Covariance accrued from time zero up to and including step
    /// `end_index`.
    fn total_covariance(&self, end_index: Size) -> Result<Matrix> {
        ensure_index!(end_index, self.number_of_steps());
        let n = self.number_of_rates();
        let mut total = Matrix::zeros(n, n);
        for step in 0..=end_index {
            total = &total + &self.covariance(step)?;
        }
        Ok(total)
    }
}

/// Check the shapes every market model must satisfy.
pub(crate) fn check_model_inputs(
    evolution: &EvolutionDescription,
    initial_rates: &[Rate],
    displacements: &[Spread],
    number_of_factors: Size,
) -> Result<()> {
    let n = evolution.number_of_rates();
    ensure!(
        initial_rates.len() == n,
        "initial rates mismatch: {n} required, {} provided",
        initial_rates.len()
    );
    ensure!(
        displacements.len() == n,
        "displacements mismatch: {n} required, {} provided",
        displacements.len()
    );
    ensure!(
        number_of_factors >= 1 && number_of_factors <= n,
        "number of factors ({number_of_factors}) must be in [1, {n}]"
    );
    Ok(())
}
