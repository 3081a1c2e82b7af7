//! Coterminal-swap-rate drifts (translates
//! `ql/models/marketmodels/driftcomputation/smmdriftcalculator.hpp`).

use super::{check_calculator_inputs, DriftMethod};
use crate::curve_state::{CoterminalSwapCurveState, CurveState};
use ql_core::{Real, Size, Spread, Time};
use ql_core::errors::Result;
use ql_math::Matrix;

/// Drift of the displaced log coterminal swap rates under the bond
/// numeraire `P_N`.
///
/// `S_j` is a martingale under its own annuity `A_j`, so under `P_N` its
/// displaced log has drift `d⟨log(S_j + d_j), log(P_N / A_j)⟩`.  In units of
/// the terminal bond the annuities follow
///
/// ```text
/// Ã_{n-1} = τ_{n-1},   Ã_j = Ã_{j+1}·(1 + τ_j S_{j+1}) + τ_j
/// D_N     = 1 + S_N Ã_N
/// ```
///
/// and differentiating this recursion gives the loadings of `log Ã_j` and
/// `log D_N` on the swap-rate factors.
///
/// Corresponds to `QuantLib::SMMDriftCalculator`.
#[derive(Debug, Clone)]
pub struct SmmDriftCalculator {
    number_of_rates: Size,
    number_of_factors: Size,
    method: DriftMethod,
    numeraire: Size,
    alive: Size,
    displacements: Vec<Spread>,
    taus: Vec<Time>,
    pseudo: Matrix,
    covariance: Matrix,
    // scratch
    w: Vec<Real>,
    annuity_sensitivities: Matrix,
    numeraire_sensitivities: Vec<Real>,
}

impl SmmDriftCalculator {
    /// Build a calculator for one step.
    pub fn new(
        pseudo: &Matrix,
        displacements: &[Spread],
        taus: &[Time],
        numeraire: Size,
        alive: Size,
        method: DriftMethod,
    ) -> Result<Self> {
        check_calculator_inputs(pseudo, displacements, taus, numeraire, alive)?;
        let n = taus.len();
        Ok(Self {
            number_of_rates: n,
            number_of_factors: pseudo.cols(),
            method,
            numeraire,
            alive,
            displacements: displacements.to_vec(),
            taus: taus.to_vec(),
            pseudo: pseudo.clone(),
            covariance: pseudo.mul_transpose(),
            w: vec![0.0; n],
            annuity_sensitivities: Matrix::zeros(n, n),
            numeraire_sensitivities: vec![0.0; n],
        })
    }

    /// Numeraire index the drifts refer to.
    pub fn numeraire(&self) -> Size {
        self.numeraire
    }

    /// Write the drifts of the alive swap rates of `cs` into `drifts`.
    pub fn compute(&mut self, cs: &CoterminalSwapCurveState, drifts: &mut [Real]) {
        match self.method {
            DriftMethod::Plain => self.compute_plain(cs, drifts),
            DriftMethod::Reduced => self.compute_reduced(cs, drifts),
        }
    }

    /// Full-covariance algorithm.
    ///
    /// Builds `∂Ã_j / ∂log(S_m + d_m)` explicitly and contracts it with the
    /// step covariance.
    pub fn compute_plain(&mut self, cs: &CoterminalSwapCurveState, drifts: &mut [Real]) {
        let (n, numeraire, alive) = (self.number_of_rates, self.numeraire, self.alive);
        debug_assert_eq!(drifts.len(), n);
        if alive == n {
            return;
        }
        let swaps = cs.coterminal_swap_rates();
        let annuities = cs.coterminal_swap_annuities();
        let discounts = cs.discount_ratios();

        let c = &mut self.annuity_sensitivities;
        for m in 0..n {
            c[(n - 1, m)] = 0.0;
        }
        for j in (alive..n - 1).rev() {
            let growth = 1.0 + self.taus[j] * swaps[j + 1];
            for m in alive..n {
                c[(j, m)] = c[(j + 1, m)] * growth;
            }
            c[(j, j + 1)] +=
                self.taus[j] * annuities[j + 1] * (swaps[j + 1] + self.displacements[j + 1]);
        }

        let b = &mut self.numeraire_sensitivities;
        if numeraire < n {
            let level = discounts[numeraire];
            for m in alive..n {
                b[m] = swaps[numeraire] * c[(numeraire, m)] / level;
            }
            b[numeraire] += (swaps[numeraire] + self.displacements[numeraire])
                * annuities[numeraire]
                / level;
        } else {
            b[alive..].fill(0.0);
        }

        for j in alive..n {
            drifts[j] = (alive..n)
                .map(|m| (b[m] - c[(j, m)] / annuities[j]) * self.covariance[(j, m)])
                .sum();
        }
    }

    /// Factor-loading algorithm.
    pub fn compute_reduced(&mut self, cs: &CoterminalSwapCurveState, drifts: &mut [Real]) {
        let (n, numeraire, alive) = (self.number_of_rates, self.numeraire, self.alive);
        debug_assert_eq!(drifts.len(), n);
        if alive == n {
            return;
        }
        let swaps = cs.coterminal_swap_rates();
        let annuities = cs.coterminal_swap_annuities();
        let discounts = cs.discount_ratios();

        drifts[alive..].fill(0.0);
        for k in 0..self.number_of_factors {
            // w_j: loading of Ã_j on factor k
            self.w[n - 1] = 0.0;
            for j in (alive..n - 1).rev() {
                self.w[j] = self.w[j + 1] * (1.0 + self.taus[j] * swaps[j + 1])
                    + self.taus[j]
                        * annuities[j + 1]
                        * (swaps[j + 1] + self.displacements[j + 1])
                        * self.pseudo[(j + 1, k)];
            }
            let v = if numeraire < n {
                ((swaps[numeraire] + self.displacements[numeraire])
                    * self.pseudo[(numeraire, k)]
                    * annuities[numeraire]
                    + swaps[numeraire] * self.w[numeraire])
                    / discounts[numeraire]
            } else {
                0.0
            };
            for j in alive..n {
                drifts[j] += self.pseudo[(j, k)] * (v - self.w[j] / annuities[j]);
            }
        }
    }
}
