//! Forward-rate drifts (translates
//! `ql/models/marketmodels/driftcomputation/lmmdriftcalculator.hpp` and
//! `lmmnormaldriftcalculator.hpp`).

use super::{check_calculator_inputs, DriftMethod, RateDynamics};
use crate::curve_state::{CurveState, LmmCurveState};
use ql_core::{errors::Result, Rate, Real, Size, Spread, Time};
use ql_math::Matrix;

/// Drift of the forward rates under the bond numeraire `P_N`.
///
/// With `C` the step covariance and
/// `w_j = (f_j + d_j)·τ_j / (1 + τ_j f_j)` (lognormal) or
/// `w_j = τ_j / (1 + τ_j f_j)` (normal):
///
/// ```text
/// μ_i =  Σ_{j=N}^{i}     w_j C_ij    for i >= N
/// μ_i = -Σ_{j=i+1}^{N-1} w_j C_ij    for i <  N
/// ```
///
/// Corresponds to `QuantLib::LMMDriftCalculator` and
/// `QuantLib::LMMNormalDriftCalculator`.
#[derive(Debug, Clone)]
pub struct LmmDriftCalculator {
    number_of_rates: Size,
    number_of_factors: Size,
    dynamics: RateDynamics,
    method: DriftMethod,
    numeraire: Size,
    alive: Size,
    displacements: Vec<Spread>,
    one_over_taus: Vec<Real>,
    pseudo: Matrix,
    covariance: Matrix,
    downs: Vec<Size>,
    ups: Vec<Size>,
    // scratch
    tmp: Vec<Real>,
    e: Matrix,
}

impl LmmDriftCalculator {
    /// Build a calculator for one step.
    pub fn new(
        pseudo: &Matrix,
        displacements: &[Spread],
        taus: &[Time],
        numeraire: Size,
        alive: Size,
        dynamics: RateDynamics,
        method: DriftMethod,
    ) -> Result<Self> {
        check_calculator_inputs(pseudo, displacements, taus, numeraire, alive)?;
        let n = taus.len();
        let factors = pseudo.cols();
        Ok(Self {
            number_of_rates: n,
            number_of_factors: factors,
            dynamics,
            method,
            numeraire,
            alive,
            displacements: displacements.to_vec(),
            one_over_taus: taus.iter().map(|t| 1.0 / t).collect(),
            pseudo: pseudo.clone(),
            covariance: pseudo.mul_transpose(),
            downs: (0..n).map(|j| (j + 1).min(numeraire)).collect(),
            ups: (0..n).map(|j| (j + 1).max(numeraire)).collect(),
            tmp: vec![0.0; n],
            e: Matrix::zeros(factors, n),
        })
    }

    /// Numeraire index the drifts refer to.
    pub fn numeraire(&self) -> Size {
        self.numeraire
    }

    /// Write the drifts of the alive rates of `cs` into `drifts`.
    pub fn compute(&mut self, cs: &LmmCurveState, drifts: &mut [Real]) {
        self.compute_from_rates(cs.forward_rates(), drifts);
    }

    /// Same as [`compute`](Self::compute), straight from forward rates.
    pub fn compute_from_rates(&mut self, forwards: &[Rate], drifts: &mut [Real]) {
        match self.method {
            DriftMethod::Plain => self.compute_plain(forwards, drifts),
            DriftMethod::Reduced => self.compute_reduced(forwards, drifts),
        }
    }

    fn fill_weights(&mut self, forwards: &[Rate]) {
        for i in self.alive..self.number_of_rates {
            self.tmp[i] = match self.dynamics {
                RateDynamics::Lognormal => {
                    (forwards[i] + self.displacements[i]) / (self.one_over_taus[i] + forwards[i])
                }
                RateDynamics::Normal => 1.0 / (self.one_over_taus[i] + forwards[i]),
            };
        }
    }

    /// Full-covariance algorithm.
    pub fn compute_plain(&mut self, forwards: &[Rate], drifts: &mut [Real]) {
        debug_assert_eq!(forwards.len(), self.number_of_rates);
        debug_assert_eq!(drifts.len(), self.number_of_rates);
        self.fill_weights(forwards);
        for i in self.alive..self.number_of_rates {
            let drift: Real = (self.downs[i]..self.ups[i])
                .map(|j| self.tmp[j] * self.covariance[(i, j)])
                .sum();
            drifts[i] = if self.numeraire > i { -drift } else { drift };
        }
    }

    /// Factor-loading algorithm.
    pub fn compute_reduced(&mut self, forwards: &[Rate], drifts: &mut [Real]) {
        debug_assert_eq!(forwards.len(), self.number_of_rates);
        debug_assert_eq!(drifts.len(), self.number_of_rates);
        self.fill_weights(forwards);
        let (n, factors, numeraire, alive) = (
            self.number_of_rates,
            self.number_of_factors,
            self.numeraire,
            self.alive,
        );

        // e(r, i) accumulates w_j A(j, r) away from the numeraire
        if numeraire > alive {
            for r in 0..factors {
                self.e[(r, numeraire - 1)] = 0.0;
            }
            drifts[numeraire - 1] = 0.0;
            for i in (alive..numeraire - 1).rev() {
                let mut drift = 0.0;
                for r in 0..factors {
                    let e = self.e[(r, i + 1)] + self.tmp[i + 1] * self.pseudo[(i + 1, r)];
                    self.e[(r, i)] = e;
                    drift -= e * self.pseudo[(i, r)];
                }
                drifts[i] = drift;
            }
        }
        for i in numeraire..n {
            let mut drift = 0.0;
            for r in 0..factors {
                let previous = if i == numeraire {
                    0.0
                } else {
                    self.e[(r, i - 1)]
                };
                let e = previous + self.tmp[i] * self.pseudo[(i, r)];
                self.e[(r, i)] = e;
                drift += e * self.pseudo[(i, r)];
            }
            drifts[i] = drift;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    const TAUS: [Time; 6] = [0.5; 6];

    fn random_root(n: usize, factors: usize, seed: u64) -> Matrix {
        let mut rng = StdRng::seed_from_u64(seed);
        Matrix::from_fn(n, factors, |_, _| rng.gen_range(-0.1..0.1))
    }

    fn forwards() -> Vec<Rate> {
        vec![0.03, 0.032, 0.035, 0.033, 0.04, 0.042]
    }

    #[test]
    fn plain_and_reduced_agree_for_every_numeraire() {
        let root = random_root(6, 6, 42);
        let f = forwards();
        for dynamics in [RateDynamics::Lognormal, RateDynamics::Normal] {
            for alive in 0..3 {
                for numeraire in alive..=6 {
                    let mut calc = LmmDriftCalculator::new(
                        &root,
                        &[0.01; 6],
                        &TAUS,
                        numeraire,
                        alive,
                        dynamics,
                        DriftMethod::Plain,
                    )
                    .unwrap();
                    let mut plain = vec![0.0; 6];
                    let mut reduced = vec![0.0; 6];
                    calc.compute_plain(&f, &mut plain);
                    calc.compute_reduced(&f, &mut reduced);
                    for i in alive..6 {
                        assert_relative_eq!(plain[i], reduced[i], max_relative = 1e-8, epsilon = 1e-14);
                    }
                }
            }
        }
    }

    #[test]
    fn drift_matches_covariance_with_the_numeraire_ratio() {
        // μ_i = Σ_m ∂log(P_N / P_{i+1}) / ∂log(f_m + d_m) · C_im
        let root = random_root(6, 3, 7);
        let cov = root.mul_transpose();
        let f = forwards();
        let d = [0.005; 6];
        let rate_times: Vec<Time> = (0..7).map(|i| 0.5 * i as Time).collect();
        let log_ratio = |rates: &[Rate], numeraire: usize, i: usize| {
            let mut cs = LmmCurveState::new(&rate_times).unwrap();
            cs.set_on_forward_rates(rates, 0).unwrap();
            cs.discount_ratio(numeraire, i + 1).unwrap().ln()
        };
        let h = 1e-6;
        for numeraire in [0, 3, 6] {
            let mut calc = LmmDriftCalculator::new(
                &root,
                &d,
                &TAUS,
                numeraire,
                0,
                RateDynamics::Lognormal,
                DriftMethod::Reduced,
            )
            .unwrap();
            let mut drifts = vec![0.0; 6];
            calc.compute_from_rates(&f, &mut drifts);
            for i in 0..6 {
                let mut expected = 0.0;
                for m in 0..6 {
                    let bump = |sign: Real| {
                        let mut g = f.clone();
                        g[m] = (f[m] + d[m]) * (sign * h).exp() - d[m];
                        log_ratio(&g, numeraire, i)
                    };
                    expected += (bump(1.0) - bump(-1.0)) / (2.0 * h) * cov[(i, m)];
                }
                assert_relative_eq!(drifts[i], expected, max_relative = 1e-6, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn numeraire_rate_has_zero_drift() {
        let root = random_root(6, 2, 3);
        let mut calc = LmmDriftCalculator::new(
            &root,
            &[0.0; 6],
            &TAUS,
            4,
            1,
            RateDynamics::Lognormal,
            DriftMethod::Reduced,
        )
        .unwrap();
        let mut drifts = vec![1.0; 6];
        calc.compute_from_rates(&forwards(), &mut drifts);
        assert_eq!(drifts[3], 0.0);
        // expired rates are not touched
        assert_eq!(drifts[0], 1.0);
    }

    #[test]
    fn invalid_configurations_are_rejected() {
        let root = random_root(6, 2, 1);
        let new = |numeraire, alive| {
            LmmDriftCalculator::new(
                &root,
                &[0.0; 6],
                &TAUS,
                numeraire,
                alive,
                RateDynamics::Lognormal,
                DriftMethod::Plain,
            )
        };
        assert!(new(7, 0).is_err());
        assert!(new(1, 2).is_err());
        assert!(LmmDriftCalculator::new(
            &root,
            &[0.0; 5],
            &TAUS,
            6,
            0,
            RateDynamics::Lognormal,
            DriftMethod::Plain
        )
        .is_err());
    }
}
