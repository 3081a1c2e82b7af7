//! Sensitivities of swap rates to forward rates (translates
//! `ql/models/marketmodels/swapforwardmappings.hpp`).
//!
//! The "zed" matrix `Z(i,j) = (f_j + d_j) / (S_i + d_i) · ∂S_i/∂f_j` maps
//! displaced log-forward covariances into displaced log-swap covariances
//! and is used to re-express a forward-rate model in the swap-rate basis.

use crate::curve_state::CurveState;
use ql_core::{ensure, errors::Result, Rate, Real, Spread};
use ql_math::Matrix;

/// Jacobian `∂S_i/∂f_j` of the coterminal swap rates with respect to the
/// forward rates.
///
/// Rows and columns below the first valid index are zero; the matrix is
/// upper triangular.
pub fn coterminal_swap_forward_jacobian(cs: &dyn CurveState) -> Result<Matrix> {
    cm_swap_forward_jacobian(cs, cs.number_of_rates())
}

/// Jacobian of the constant-maturity swap rates spanning
/// `spanning_forwards` periods with respect to the forward rates.
pub fn cm_swap_forward_jacobian(cs: &dyn CurveState, spanning_forwards: usize) -> Result<Matrix> {
    ensure!(spanning_forwards > 0, "a swap must span at least one forward");
    let n = cs.number_of_rates();
    let first = cs.first_valid_index()?;
    let taus = cs.rate_taus();
    let d = cs.discount_ratios();
    let f = cs.forward_rates();

    let mut jacobian = Matrix::zeros(n, n);
    for i in first..n {
        let end = (i + spanning_forwards).min(n);
        let annuity: Real = (i..end).map(|k| taus[k] * d[k + 1]).sum();
        let numerator = d[i] - d[end];
        // tail[j] = Σ_{k=j}^{end-1} τ_k D_{k+1}, built backwards
        let mut tail = 0.0;
        for j in (i..end).rev() {
            tail += taus[j] * d[j + 1];
            let weight = taus[j] / (1.0 + taus[j] * f[j]);
            let d_numerator = d[end] * weight;
            let d_annuity = -weight * tail;
            jacobian[(i, j)] =
                (d_numerator * annuity - numerator * d_annuity) / (annuity * annuity);
        }
    }
    Ok(jacobian)
}

/// Zed matrix of the coterminal swap rates.
pub fn coterminal_swap_zed_matrix(cs: &dyn CurveState, displacements: &[Spread]) -> Result<Matrix> {
    let jacobian = coterminal_swap_forward_jacobian(cs)?;
    let first = cs.first_valid_index()?;
    let swap_rates = (first..cs.number_of_rates())
        .map(|i| cs.coterminal_swap_rate(i))
        .collect::<Result<Vec<_>>>()?;
    zed_from_jacobian(cs, jacobian, first, &swap_rates, displacements)
}

/// Zed matrix of the constant-maturity swap rates.
pub fn cm_swap_zed_matrix(
    cs: &dyn CurveState,
    spanning_forwards: usize,
    displacements: &[Spread],
) -> Result<Matrix> {
    let jacobian = cm_swap_forward_jacobian(cs, spanning_forwards)?;
    let first = cs.first_valid_index()?;
    let swap_rates = (first..cs.number_of_rates())
        .map(|i| cs.cm_swap_rate(i, spanning_forwards))
        .collect::<Result<Vec<_>>>()?;
    zed_from_jacobian(cs, jacobian, first, &swap_rates, displacements)
}

fn zed_from_jacobian(
    cs: &dyn CurveState,
    mut jacobian: Matrix,
    first: usize,
    swap_rates: &[Rate],
    displacements: &[Spread],
) -> Result<Matrix> {
    let n = cs.number_of_rates();
    ensure!(
        displacements.len() == n,
        "displacements mismatch: {n} required, {} provided",
        displacements.len()
    );
    let f = cs.forward_rates();
    for i in first..n {
        let swap = swap_rates[i - first] + displacements[i];
        for j in i..n {
            jacobian[(i, j)] *= (f[j] + displacements[j]) / swap;
        }
    }
    Ok(jacobian)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve_state::LmmCurveState;
    use approx::assert_abs_diff_eq;

    const RATE_TIMES: [f64; 6] = [0.5, 1.0, 1.5, 2.0, 2.5, 3.0];
    const RATES: [f64; 5] = [0.03, 0.031, 0.033, 0.036, 0.04];

    fn state(rates: &[f64], first: usize) -> LmmCurveState {
        let mut cs = LmmCurveState::new(&RATE_TIMES).unwrap();
        cs.set_on_forward_rates(rates, first).unwrap();
        cs
    }

    fn finite_difference_check(span: usize, first: usize) {
        let cs = state(&RATES, first);
        let jacobian = cm_swap_forward_jacobian(&cs, span).unwrap();
        let h = 1e-7;
        for j in first..5 {
            let mut up = RATES;
            up[j] += h;
            let mut down = RATES;
            down[j] -= h;
            let (up, down) = (state(&up, first), state(&down, first));
            for i in first..5 {
                let fd = (up.cm_swap_rate(i, span).unwrap() - down.cm_swap_rate(i, span).unwrap())
                    / (2.0 * h);
                assert_abs_diff_eq!(jacobian[(i, j)], fd, epsilon = 1e-7);
            }
        }
    }

    #[test]
    fn coterminal_jacobian_matches_finite_differences() {
        finite_difference_check(5, 0);
        finite_difference_check(5, 2);
    }

    #[test]
    fn cm_jacobian_matches_finite_differences() {
        finite_difference_check(2, 0);
        finite_difference_check(1, 1);
    }

    #[test]
    fn one_period_swaps_have_identity_jacobian() {
        let cs = state(&RATES, 0);
        let jacobian = cm_swap_forward_jacobian(&cs, 1).unwrap();
        for i in 0..5 {
            for j in 0..5 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(jacobian[(i, j)], expected, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn zed_rows_sum_to_one_on_a_flat_curve() {
        // S is a weighted average of the forwards, so on a flat curve
        // Σ_j ∂S/∂f_j = 1 and each zed row sums to one
        let cs = state(&[0.04; 5], 0);
        let zed = coterminal_swap_zed_matrix(&cs, &[0.0; 5]).unwrap();
        for i in 0..5 {
            let sum: f64 = (0..5).map(|j| zed[(i, j)]).sum();
            assert_abs_diff_eq!(sum, 1.0, epsilon = 1e-12);
        }
        assert!(coterminal_swap_zed_matrix(&cs, &[0.0; 4]).is_err());
    }
}
