//! Curve state built on coterminal swap rates (translates
//! `ql/models/marketmodels/curvestates/coterminalswapcurvestate.hpp`).

use super::{check_bond_index, check_rate_index, check_rate_times, CurveState};
use ql_core::{ensure, errors::Result, Rate, Real, Size, Time};

/// Curve state whose sufficient statistic is the vector of coterminal swap
/// rates.
///
/// Discount ratios are normalised on the terminal bond (`D(n) = 1`) and
/// rebuilt eagerly, together with annuities and forward rates, every time
/// the swap rates are set.
///
/// Corresponds to `QuantLib::CoterminalSwapCurveState`.
#[derive(Debug, Clone)]
pub struct CoterminalSwapCurveState {
    rate_times: Vec<Time>,
    rate_taus: Vec<Time>,
    first: Option<Size>,
    cot_swap_rates: Vec<Rate>,
    cot_annuities: Vec<Real>,
    discount_ratios: Vec<Real>,
    forward_rates: Vec<Rate>,
}

impl CoterminalSwapCurveState {
    /// An unset state on the given rate times.
    pub fn new(rate_times: &[Time]) -> Result<Self> {
        let rate_taus = check_rate_times(rate_times)?;
        let n = rate_taus.len();
        Ok(Self {
            rate_times: rate_times.to_vec(),
            rate_taus,
            first: None,
            cot_swap_rates: vec![0.0; n],
            cot_annuities: vec![0.0; n],
            discount_ratios: vec![1.0; n + 1],
            forward_rates: vec![0.0; n],
        })
    }

    /// Set the state from coterminal swap rates; entries below
    /// `first_valid_index` are ignored.
    pub fn set_on_coterminal_swap_rates(
        &mut self,
        rates: &[Rate],
        first_valid_index: Size,
    ) -> Result<()> {
        let n = self.rate_taus.len();
        ensure!(
            rates.len() == n,
            "rates mismatch: {n} required, {} provided",
            rates.len()
        );
        ensure!(
            first_valid_index <= n,
            "first valid index must not exceed {n}: {first_valid_index} not allowed"
        );

        self.first = Some(first_valid_index);
        self.cot_swap_rates[first_valid_index..].copy_from_slice(&rates[first_valid_index..]);

        // backward recursion from the terminal bond
        self.discount_ratios[n] = 1.0;
        let mut annuity = 0.0;
        for i in (first_valid_index..n).rev() {
            annuity += self.rate_taus[i] * self.discount_ratios[i + 1];
            self.cot_annuities[i] = annuity;
            self.discount_ratios[i] = 1.0 + self.cot_swap_rates[i] * annuity;
            self.forward_rates[i] = (self.discount_ratios[i] / self.discount_ratios[i + 1] - 1.0)
                / self.rate_taus[i];
        }
        Ok(())
    }

    /// Raw coterminal swap rates; only entries from the first valid index
    /// on are meaningful.
    pub fn coterminal_swap_rates(&self) -> &[Rate] {
        &self.cot_swap_rates
    }

    /// Raw coterminal annuities in units of the terminal bond.
    pub fn coterminal_swap_annuities(&self) -> &[Real] {
        &self.cot_annuities
    }

    fn first_alive(&self) -> Result<Size> {
        match self.first {
            Some(first) => Ok(first),
            None => ql_core::fail!("curve state not initialized yet"),
        }
    }
}

impl CurveState for CoterminalSwapCurveState {
    fn rate_times(&self) -> &[Time] {
        &self.rate_times
    }

    fn rate_taus(&self) -> &[Time] {
        &self.rate_taus
    }

    fn first_valid_index(&self) -> Result<Size> {
        self.first_alive()
    }

    fn discount_ratios(&self) -> &[Real] {
        &self.discount_ratios
    }

    fn forward_rates(&self) -> &[Rate] {
        &self.forward_rates
    }

    fn forward_rate(&self, i: Size) -> Result<Rate> {
        check_rate_index(self.first_alive()?, self.rate_taus.len(), i)?;
        Ok(self.forward_rates[i])
    }

    fn coterminal_swap_annuity(&self, numeraire: Size, i: Size) -> Result<Real> {
        let first = self.first_alive()?;
        let n = self.rate_taus.len();
        check_rate_index(first, n, i)?;
        check_bond_index(first, n, numeraire)?;
        Ok(self.cot_annuities[i] / self.discount_ratios[numeraire])
    }

    fn coterminal_swap_rate(&self, i: Size) -> Result<Rate> {
        check_rate_index(self.first_alive()?, self.rate_taus.len(), i)?;
        Ok(self.cot_swap_rates[i])
    }

    fn clone_box(&self) -> Box<dyn CurveState> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn flat_swap_curve_has_flat_forwards() {
        // with every coterminal rate equal the forwards are equal too
        let mut cs = CoterminalSwapCurveState::new(&[0.0, 1.0, 2.0, 3.0, 4.0]).unwrap();
        cs.set_on_coterminal_swap_rates(&[0.04; 4], 0).unwrap();
        for i in 0..4 {
            assert_relative_eq!(cs.forward_rate(i).unwrap(), 0.04, max_relative = 1e-12);
        }
        assert_relative_eq!(cs.discount_ratio(3, 4).unwrap(), 1.04, max_relative = 1e-14);
        assert_relative_eq!(cs.coterminal_swap_annuity(4, 3).unwrap(), 1.0, max_relative = 1e-14);
    }

    #[test]
    fn last_swap_rate_is_last_forward() {
        let mut cs = CoterminalSwapCurveState::new(&[0.0, 0.5, 1.0, 1.5]).unwrap();
        cs.set_on_coterminal_swap_rates(&[0.03, 0.035, 0.05], 1).unwrap();
        assert_relative_eq!(cs.forward_rate(2).unwrap(), 0.05, max_relative = 1e-12);
        assert_relative_eq!(cs.swap_rate(1, 3).unwrap(), 0.035, max_relative = 1e-12);
        assert!(cs.coterminal_swap_rate(0).is_err());
    }

    #[test]
    fn fully_expired_state_is_allowed() {
        let mut cs = CoterminalSwapCurveState::new(&[0.0, 1.0, 2.0]).unwrap();
        cs.set_on_coterminal_swap_rates(&[0.03, 0.03], 2).unwrap();
        assert_eq!(cs.discount_ratio(2, 2), Ok(1.0));
        assert!(cs.forward_rate(1).is_err());
        assert!(cs.set_on_coterminal_swap_rates(&[0.03, 0.03], 3).is_err());
        assert!(cs.set_on_coterminal_swap_rates(&[0.03], 0).is_err());
    }
}
