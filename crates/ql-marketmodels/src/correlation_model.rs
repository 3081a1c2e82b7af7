//! Flat-volatility market model with a parametric or explicit correlation
//! (translates `ql/models/marketmodels/models/flatvol.hpp` and
//! `ql/models/marketmodels/correlations/expcorrelations.hpp`).
//!
//! For every evolution step the covariance accrued by the alive rates over
//! the step is assembled from per-rate volatilities and a correlation
//! structure, then factor-reduced with
//! [`rank_reduced_sqrt`](ql_math::rank_reduced_sqrt).  Rates that have
//! already reset at the end of a step get a zero row.

use crate::{
    evolution_description::EvolutionDescription,
    market_model::{check_model_inputs, MarketModel},
};
use ql_core::{
    ensure, ensure_index,
    errors::{Error, Result},
    Rate, Real, Size, Spread, Time, Volatility,
};
use ql_math::{
    matrix_utilities::{check_symmetry, min_eigenvalue, SYMMETRY_TOLERANCE},
    rank_reduced_sqrt, Matrix, SalvagingAlgorithm,
};
use tracing::debug;

/// Correlation between the rates of a market model.
#[derive(Debug, Clone, PartialEq)]
pub enum CorrelationStructure {
    /// `ρ(i,j) = L + (1 - L)·exp(-β·|T_i - T_j|)` on the reset times.
    Exponential {
        /// Long-term correlation `L` in `[0, 1]`.
        long_term_correlation: Real,
        /// Decay `β >= 0`.
        beta: Real,
    },
    /// Explicit `n × n` correlation matrix.
    Matrix(Matrix),
}

impl CorrelationStructure {
    /// Full `n × n` correlation between the rates resetting at
    /// `reset_times`.
    pub fn correlation_matrix(&self, reset_times: &[Time]) -> Result<Matrix> {
        let n = reset_times.len();
        match self {
            Self::Exponential {
                long_term_correlation,
                beta,
            } => {
                let (l, beta) = (*long_term_correlation, *beta);
                ensure!(
                    (0.0..=1.0).contains(&l),
                    "long-term correlation ({l}) outside [0, 1]"
                );
                ensure!(beta >= 0.0, "negative correlation decay ({beta})");
                Ok(Matrix::from_fn(n, n, |i, j| {
                    l + (1.0 - l) * (-beta * (reset_times[i] - reset_times[j]).abs()).exp()
                }))
            }
            Self::Matrix(m) => {
                ensure!(
                    m.rows() == n && m.cols() == n,
                    "correlation matrix is {}×{}, {n}×{n} required",
                    m.rows(),
                    m.cols()
                );
                check_symmetry(m, SYMMETRY_TOLERANCE)?;
                for i in 0..n {
                    ensure!(
                        (m[(i, i)] - 1.0).abs() <= SYMMETRY_TOLERANCE,
                        "correlation diagonal entry {i} is {} instead of 1",
                        m[(i, i)]
                    );
                    for j in 0..n {
                        ensure!(
                            (-1.0..=1.0).contains(&m[(i, j)]),
                            "correlation entry ({i}, {j}) = {} outside [-1, 1]",
                            m[(i, j)]
                        );
                    }
                }
                let smallest = min_eigenvalue(m)?;
                if smallest < -1e-10 {
                    return Err(Error::NegativeEigenvalue(smallest));
                }
                Ok(m.clone())
            }
        }
    }
}

/// Builder for [`CorrelationModel`].
#[derive(Debug, Clone)]
pub struct CorrelationModelBuilder {
    evolution: EvolutionDescription,
    volatilities: Vec<Volatility>,
    correlation: CorrelationStructure,
    initial_rates: Vec<Rate>,
    displacements: Option<Vec<Spread>>,
    number_of_factors: Size,
    salvaging: SalvagingAlgorithm,
    component_retained_percentage: Real,
}

impl CorrelationModelBuilder {
    /// Displacements (zero by default).
    pub fn with_displacements(mut self, displacements: Vec<Spread>) -> Self {
        self.displacements = Some(displacements);
        self
    }

    /// Repair policy for correlations that are not positive semi-definite.
    pub fn with_salvaging(mut self, salvaging: SalvagingAlgorithm) -> Self {
        self.salvaging = salvaging;
        self
    }

    /// Share of the total variance the retained factors must explain
    /// (`1.0` by default).
    pub fn with_component_retained_percentage(mut self, percentage: Real) -> Self {
        self.component_retained_percentage = percentage;
        self
    }

    /// Validate the inputs and compute every pseudo-root.
    pub fn build(self) -> Result<CorrelationModel> {
        let n = self.evolution.number_of_rates();
        let displacements = self.displacements.unwrap_or_else(|| vec![0.0; n]);
        check_model_inputs(
            &self.evolution,
            &self.initial_rates,
            &displacements,
            self.number_of_factors,
        )?;
        ensure!(
            self.volatilities.len() == n,
            "volatilities mismatch: {n} required, {} provided",
            self.volatilities.len()
        );
        for (i, &vol) in self.volatilities.iter().enumerate() {
            ensure!(vol >= 0.0, "negative volatility ({vol}) for rate {i}");
        }

        let correlation = self
            .correlation
            .correlation_matrix(&self.evolution.rate_times()[..n])?;

        let mut pseudo_roots = Vec::with_capacity(self.evolution.number_of_steps());
        let mut previous_stop = vec![0.0; n];
        for step in 0..self.evolution.number_of_steps() {
            let stop = self.evolution.effective_stop_time(step);
            let first = self.evolution.first_alive_rate()[step];
            let (root, retained) = step_pseudo_root(
                step,
                first,
                &self.volatilities,
                &correlation,
                &previous_stop,
                stop,
                self.number_of_factors,
                self.salvaging,
                self.component_retained_percentage,
            )?;
            debug!(
                step,
                first_alive = first,
                factors = retained,
                "pseudo-root built"
            );
            pseudo_roots.push(root);
            previous_stop.copy_from_slice(stop);
        }

        Ok(CorrelationModel {
            evolution: self.evolution,
            volatilities: self.volatilities,
            correlation,
            initial_rates: self.initial_rates,
            displacements,
            number_of_factors: self.number_of_factors,
            pseudo_roots,
        })
    }
}

/// Flat-volatility market model.
///
/// Each rate `i` has a constant instantaneous volatility `σ_i` until its
/// reset time; correlations come from a [`CorrelationStructure`].
///
/// # Example
///
/// ```
/// use ql_marketmodels::{CorrelationModel, CorrelationStructure, EvolutionDescription, MarketModel};
///
/// let evolution = EvolutionDescription::new(
///     vec![0.0, 1.0, 2.0, 3.0],
///     vec![1.0, 2.0],
///     None,
///     None,
/// )
/// .unwrap();
/// let model = CorrelationModel::builder(
///     evolution,
///     vec![0.2; 3],
///     CorrelationStructure::Exponential { long_term_correlation: 0.5, beta: 0.1 },
///     vec![0.03; 3],
///     2,
/// )
/// .build()
/// .unwrap();
/// assert_eq!(model.pseudo_root(1).unwrap().cols(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct CorrelationModel {
    evolution: EvolutionDescription,
    volatilities: Vec<Volatility>,
    correlation: Matrix,
    initial_rates: Vec<Rate>,
    displacements: Vec<Spread>,
    number_of_factors: Size,
    pseudo_roots: Vec<Matrix>,
}

impl CorrelationModel {
    /// Start building a model.
    pub fn builder(
        evolution: EvolutionDescription,
        volatilities: Vec<Volatility>,
        correlation: CorrelationStructure,
        initial_rates: Vec<Rate>,
        number_of_factors: Size,
    ) -> CorrelationModelBuilder {
        CorrelationModelBuilder {
            evolution,
            volatilities,
            correlation,
            initial_rates,
            displacements: None,
            number_of_factors,
            salvaging: SalvagingAlgorithm::None,
            component_retained_percentage: 1.0,
        }
    }

    /// Build a model with default salvaging and zero displacements.
    pub fn new(
        evolution: EvolutionDescription,
        volatilities: Vec<Volatility>,
        correlation: CorrelationStructure,
        initial_rates: Vec<Rate>,
        number_of_factors: Size,
    ) -> Result<Self> {
        Self::builder(
            evolution,
            volatilities,
            correlation,
            initial_rates,
            number_of_factors,
        )
        .build()
    }

    /// Per-rate volatilities.
    pub fn volatilities(&self) -> &[Volatility] {
        &self.volatilities
    }

    /// Full correlation matrix between the rates.
    pub fn correlation(&self) -> &Matrix {
        &self.correlation
    }
}

impl MarketModel for CorrelationModel {
    fn initial_rates(&self) -> &[Rate] {
        &self.initial_rates
    }

    fn displacements(&self) -> &[Spread] {
        &self.displacements
    }

    fn evolution(&self) -> &EvolutionDescription {
        &self.evolution
    }

    fn number_of_factors(&self) -> Size {
        self.number_of_factors
    }

    fn pseudo_root(&self, step: Size) -> Result<&Matrix> {
        ensure_index!(step, self.pseudo_roots.len());
        Ok(&self.pseudo_roots[step])
    }
}

// Covariance of the rates alive at the end of the step, reduced to
// `factors` columns and embedded into an n × factors matrix.
#[allow(clippy::too_many_arguments)]
fn step_pseudo_root(
    step: Size,
    first: Size,
    volatilities: &[Volatility],
    correlation: &Matrix,
    start: &[Time],
    stop: &[Time],
    factors: Size,
    salvaging: SalvagingAlgorithm,
    component_retained_percentage: Real,
) -> Result<(Matrix, Size)> {
    let n = volatilities.len();
    let mut root = Matrix::zeros(n, factors);
    let alive = n - first;
    if alive == 0 {
        return Ok((root, 0));
    }

    let covariance = Matrix::from_fn(alive, alive, |a, b| {
        let (i, j) = (first + a, first + b);
        let overlap = (stop[i].min(stop[j]) - start[i].max(start[j])).max(0.0);
        correlation[(i, j)] * volatilities[i] * volatilities[j] * overlap
    });
    let total_variance: Real = (0..alive).map(|a| covariance[(a, a)]).sum();
    if total_variance == 0.0 {
        return Ok((root, 0));
    }

    let reduced = rank_reduced_sqrt(
        &covariance,
        factors,
        component_retained_percentage,
        salvaging,
    )?;
    let expected = factors.min(alive);
    if reduced.cols() != expected {
        return Err(Error::FactorReduction {
            step,
            requested: factors,
            achieved: reduced.cols(),
        });
    }
    for a in 0..alive {
        for f in 0..expected {
            root[(first + a, f)] = reduced[(a, f)];
        }
    }
    Ok((root, expected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn evolution() -> EvolutionDescription {
        EvolutionDescription::new(
            vec![0.5, 1.0, 1.5, 2.0, 2.5, 3.0],
            vec![0.5, 1.0, 1.5, 2.0, 2.5],
            None,
            None,
        )
        .unwrap()
    }

    fn exponential(l: Real, beta: Real) -> CorrelationStructure {
        CorrelationStructure::Exponential {
            long_term_correlation: l,
            beta,
        }
    }

    #[test]
    fn expired_rows_are_zero() {
        let model =
            CorrelationModel::new(evolution(), vec![0.2; 5], exponential(0.5, 0.2), vec![0.04; 5], 3)
                .unwrap();
        for step in 0..model.number_of_steps() {
            let root = model.pseudo_root(step).unwrap();
            assert_eq!((root.rows(), root.cols()), (5, 3));
            let first = model.evolution().first_alive_rate()[step];
            for i in 0..first {
                assert!(root.is_row_zero(i), "row {i} of step {step}");
            }
        }
    }

    #[test]
    fn full_factor_root_reproduces_step_covariance() {
        let model =
            CorrelationModel::new(evolution(), vec![0.1, 0.15, 0.2, 0.25, 0.3], exponential(0.3, 0.5), vec![0.04; 5], 5)
                .unwrap();
        let rho = model.correlation().clone();
        let cov = model.covariance(2).unwrap();
        // step 2 runs from 1.0 to 1.5; rates 2..5 diffuse over the full step
        for i in 2..5 {
            for j in 2..5 {
                let expected = rho[(i, j)] * model.volatilities()[i] * model.volatilities()[j] * 0.5;
                assert_abs_diff_eq!(cov[(i, j)], expected, epsilon = 1e-12);
            }
        }
        let total = model.total_covariance(4).unwrap();
        // rate 4 resets at 2.5 and diffuses up to the last evolution time
        assert_abs_diff_eq!(total[(4, 4)], 0.09 * 2.5, epsilon = 1e-12);
    }

    #[test]
    fn retained_factors_follow_the_alive_rates() {
        let evolution = evolution();
        let stop = evolution.effective_stop_time(4).to_vec();
        let start = evolution.effective_stop_time(3).to_vec();
        let rho = exponential(0.5, 0.2)
            .correlation_matrix(&evolution.rate_times()[..5])
            .unwrap();
        let vols = [0.2; 5];
        let retained = |vols: &[Real], first: Size| {
            step_pseudo_root(4, first, vols, &rho, &start, &stop, 3, SalvagingAlgorithm::None, 1.0)
                .unwrap()
                .1
        };
        // only the last rate is alive over the last step
        assert_eq!(retained(&vols, 4), 1);
        assert_eq!(retained(&vols, 5), 0);
        assert_eq!(retained(&[0.0; 5], 4), 0);
    }

    #[test]
    fn full_correlation_collapses_to_one_factor() {
        let model =
            CorrelationModel::new(evolution(), vec![0.15; 5], exponential(1.0, 0.0), vec![0.03; 5], 1)
                .unwrap();
        let root = model.pseudo_root(1).unwrap();
        let v = root[(1, 0)].abs();
        for i in 1..5 {
            assert_abs_diff_eq!(root[(i, 0)].abs(), v, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(v * v, 0.0225 * 0.5, epsilon = 1e-14);
    }

    #[test]
    fn explicit_correlation_is_validated() {
        let good = Matrix::from_fn(5, 5, |i, j| if i == j { 1.0 } else { 0.4 });
        assert!(CorrelationModel::new(
            evolution(),
            vec![0.2; 5],
            CorrelationStructure::Matrix(good),
            vec![0.04; 5],
            2
        )
        .is_ok());

        let mut asymmetric = Matrix::identity(5);
        asymmetric[(0, 1)] = 0.3;
        let bad_diagonal = Matrix::from_fn(5, 5, |i, j| if i == j { 0.9 } else { 0.0 });
        let out_of_range = Matrix::from_fn(5, 5, |i, j| if i == j { 1.0 } else { 1.2 });
        let indefinite = Matrix::from_fn(5, 5, |i, j| if i == j { 1.0 } else { -0.9 });
        for m in [asymmetric, bad_diagonal, out_of_range] {
            assert!(CorrelationModel::new(
                evolution(),
                vec![0.2; 5],
                CorrelationStructure::Matrix(m),
                vec![0.04; 5],
                2
            )
            .is_err());
        }
        assert!(matches!(
            CorrelationModel::new(
                evolution(),
                vec![0.2; 5],
                CorrelationStructure::Matrix(indefinite),
                vec![0.04; 5],
                2
            ),
            Err(Error::NegativeEigenvalue(_))
        ));
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let build = |vols: Vec<Real>, rates: Vec<Real>, factors: Size, corr| {
            CorrelationModel::new(evolution(), vols, corr, rates, factors)
        };
        assert!(build(vec![0.2; 4], vec![0.04; 5], 2, exponential(0.5, 0.1)).is_err());
        assert!(build(vec![0.2; 5], vec![0.04; 4], 2, exponential(0.5, 0.1)).is_err());
        assert!(build(vec![0.2; 5], vec![0.04; 5], 0, exponential(0.5, 0.1)).is_err());
        assert!(build(vec![0.2; 5], vec![0.04; 5], 6, exponential(0.5, 0.1)).is_err());
        assert!(build(vec![0.2; 5], vec![0.04; 5], 2, exponential(1.5, 0.1)).is_err());
        assert!(build(vec![0.2; 5], vec![0.04; 5], 2, exponential(0.5, -0.1)).is_err());
        assert!(build(vec![-0.2; 5], vec![0.04; 5], 2, exponential(0.5, 0.1)).is_err());
    }

    #[test]
    fn partial_retention_below_requested_factors_fails() {
        let result = CorrelationModel::builder(
            evolution(),
            vec![0.2; 5],
            exponential(0.9, 0.01),
            vec![0.04; 5],
            3,
        )
        .with_component_retained_percentage(0.5)
        .build();
        assert!(matches!(
            result,
            Err(Error::FactorReduction {
                requested: 3,
                achieved: 1,
                ..
            })
        ));
    }
}
