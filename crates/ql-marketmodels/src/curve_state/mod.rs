//! Curve states: the simulated term structure visible at one evolution step
//! (translates `ql/models/marketmodels/curvestate.hpp`).
//!
//! A curve state stores discount ratios between rate times (normalised
//! arbitrarily, only their ratios are meaningful) together with the
//! minimal sufficient statistic it was built from: forward rates for
//! [`LmmCurveState`], coterminal swap rates for [`CoterminalSwapCurveState`].
//! Derived quantities are computed on demand through the common
//! [`CurveState`] interface.
//!
//! Rates whose reset time has passed (indices below
//! [`first_valid_index`](CurveState::first_valid_index)) are never set again;
//! querying them is a caller error reported as [`Error::ExpiredRate`].

mod coterminal_swap;
mod lmm;

pub use coterminal_swap::CoterminalSwapCurveState;
pub use lmm::LmmCurveState;

use ql_core::{
    clone_trait_object, ensure, ensure_index,
    errors::{Error, Result},
    Rate, Real, Size, Time,
};

/// Common interface of all curve-state flavours.
///
/// Curve states carry lazily filled caches behind interior mutability, so
/// they are `Send` but not `Sync`: each simulation path owns its own.
///
/// Corresponds to `QuantLib::CurveState`.
pub trait CurveState: Send {
    /// The `n + 1` rate times.
    fn rate_times(&self) -> &[Time];

    /// The `n` accrual fractions.
    fn rate_taus(&self) -> &[Time];

    /// Number of forward rates `n`.
    fn number_of_rates(&self) -> Size {
        self.rate_taus().len()
    }

    /// First rate index the state was set on.
    ///
    /// Fails if the state has never been set.
    fn first_valid_index(&self) -> Result<Size>;

    /// Raw discount ratios; only entries `first_valid_index()..=n` are
    /// meaningful.
    fn discount_ratios(&self) -> &[Real];

    /// Raw forward rates; only entries `first_valid_index()..n` are
    /// meaningful.
    fn forward_rates(&self) -> &[Rate];

    /// Forward rate `i`, accruing from `rate_times[i]` to `rate_times[i+1]`.
    fn forward_rate(&self, i: Size) -> Result<Rate>;

    /// Annuity of the coterminal swap starting at `rate_times[i]`, expressed
    /// in units of the bond maturing at `rate_times[numeraire]`.
    fn coterminal_swap_annuity(&self, numeraire: Size, i: Size) -> Result<Real>;

    /// Fixed rate of the coterminal swap starting at `rate_times[i]`.
    fn coterminal_swap_rate(&self, i: Size) -> Result<Rate>;

    /// Deep copy behind a fresh box.
    fn clone_box(&self) -> Box<dyn CurveState>;

    /// `P(rate_times[i]) / P(rate_times[j])`.
    fn discount_ratio(&self, i: Size, j: Size) -> Result<Real> {
        let first = self.first_valid_index()?;
        let n = self.number_of_rates();
        check_bond_index(first, n, i)?;
        check_bond_index(first, n, j)?;
        let ratios = self.discount_ratios();
        Ok(ratios[i] / ratios[j])
    }

    /// Annuity of the swap paying over `[begin, end)`, in units of bond
    /// `numeraire`.
    fn swap_annuity(&self, numeraire: Size, begin: Size, end: Size) -> Result<Real> {
        let first = self.first_valid_index()?;
        let n = self.number_of_rates();
        check_span(first, n, begin, end)?;
        check_bond_index(first, n, numeraire)?;
        let ratios = self.discount_ratios();
        let taus = self.rate_taus();
        let annuity: Real = (begin..end).map(|k| taus[k] * ratios[k + 1]).sum();
        Ok(annuity / ratios[numeraire])
    }

    /// Par rate of the swap paying over `[begin, end)`.
    fn swap_rate(&self, begin: Size, end: Size) -> Result<Rate> {
        let ratios = self.discount_ratios();
        let annuity = self.swap_annuity(end, begin, end)?;
        Ok((ratios[begin] / ratios[end] - 1.0) / annuity)
    }

    /// Annuity of the constant-maturity swap starting at `i` and spanning
    /// `spanning_forwards` periods (truncated at the last rate time).
    fn cm_swap_annuity(&self, numeraire: Size, i: Size, spanning_forwards: Size) -> Result<Real> {
        ensure!(spanning_forwards > 0, "a swap must span at least one forward");
        let end = i.saturating_add(spanning_forwards).min(self.number_of_rates());
        self.swap_annuity(numeraire, i, end)
    }

    /// Par rate of the constant-maturity swap starting at `i` and spanning
    /// `spanning_forwards` periods (truncated at the last rate time).
    fn cm_swap_rate(&self, i: Size, spanning_forwards: Size) -> Result<Rate> {
        ensure!(spanning_forwards > 0, "a swap must span at least one forward");
        let end = i.saturating_add(spanning_forwards).min(self.number_of_rates());
        self.swap_rate(i, end)
    }
}

clone_trait_object!(CurveState);

/// Rate index `i` must be alive and below `n`.
pub(crate) fn check_rate_index(first: Size, n: Size, i: Size) -> Result<()> {
    ensure_index!(i, n);
    if i < first {
        return Err(Error::ExpiredRate {
            index: i,
            first_alive: first,
        });
    }
    Ok(())
}

/// Bond index `i` must be alive and at most `n`.
pub(crate) fn check_bond_index(first: Size, n: Size, i: Size) -> Result<()> {
    ensure_index!(i, n + 1);
    if i < first {
        return Err(Error::ExpiredRate {
            index: i,
            first_alive: first,
        });
    }
    Ok(())
}

fn check_span(first: Size, n: Size, begin: Size, end: Size) -> Result<()> {
    ensure!(begin < end, "empty swap span [{begin}, {end})");
    check_rate_index(first, n, begin)?;
    check_bond_index(first, n, end)
}

pub(crate) fn check_rate_times(rate_times: &[Time]) -> Result<Vec<Time>> {
    ensure!(
        rate_times.len() >= 2,
        "at least two rate times required, {} given",
        rate_times.len()
    );
    crate::utilities::check_increasing_times(rate_times, "rate time")?;
    Ok(rate_times.windows(2).map(|w| w[1] - w[0]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    const RATE_TIMES: [Time; 6] = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0];

    fn forward_state(first: Size) -> LmmCurveState {
        let mut cs = LmmCurveState::new(&RATE_TIMES).unwrap();
        cs.set_on_forward_rates(&[0.03, 0.032, 0.035, 0.037, 0.04], first)
            .unwrap();
        cs
    }

    #[test]
    fn swap_rate_over_one_period_is_the_forward() {
        let cs = forward_state(0);
        for i in 0..5 {
            assert_relative_eq!(
                cs.swap_rate(i, i + 1).unwrap(),
                cs.forward_rate(i).unwrap(),
                max_relative = 1e-13
            );
        }
    }

    #[test]
    fn cm_swap_is_truncated_at_the_last_rate() {
        let cs = forward_state(1);
        assert_relative_eq!(
            cs.cm_swap_rate(3, 4).unwrap(),
            cs.coterminal_swap_rate(3).unwrap(),
            max_relative = 1e-13
        );
        assert_relative_eq!(
            cs.cm_swap_annuity(5, 3, 10).unwrap(),
            cs.coterminal_swap_annuity(5, 3).unwrap(),
            max_relative = 1e-13
        );
        assert!(cs.cm_swap_rate(2, 0).is_err());
    }

    #[test]
    fn unbounded_span_means_coterminal() {
        let cs = forward_state(1);
        assert_relative_eq!(
            cs.cm_swap_rate(2, usize::MAX).unwrap(),
            cs.coterminal_swap_rate(2).unwrap(),
            max_relative = 1e-13
        );
        assert_relative_eq!(
            cs.cm_swap_annuity(4, 2, usize::MAX).unwrap(),
            cs.coterminal_swap_annuity(4, 2).unwrap(),
            max_relative = 1e-13
        );
    }

    #[test]
    fn expired_and_out_of_range_queries_fail() {
        let cs = forward_state(2);
        assert_eq!(
            cs.forward_rate(1),
            Err(Error::ExpiredRate {
                index: 1,
                first_alive: 2
            })
        );
        assert!(cs.discount_ratio(1, 3).is_err());
        assert!(cs.discount_ratio(2, 6).is_err());
        assert!(cs.forward_rate(5).is_err());
        assert!(cs.coterminal_swap_rate(5).is_err());
        assert!(cs.swap_rate(3, 3).is_err());
        assert!(cs.discount_ratio(5, 5).is_ok());
    }

    #[test]
    fn boxed_states_clone_deeply() {
        let boxed: Box<dyn CurveState> = Box::new(forward_state(0));
        let copy = boxed.clone();
        assert_eq!(
            copy.discount_ratio(0, 5).unwrap(),
            boxed.discount_ratio(0, 5).unwrap()
        );
    }

    proptest! {
        #[test]
        fn discount_ratio_consistency(
            rates in proptest::collection::vec(0.001f64..0.15, 5),
            first in 0usize..5,
            i in 0usize..6,
            j in 0usize..6,
            k in 0usize..6,
        ) {
            let mut cs = LmmCurveState::new(&RATE_TIMES).unwrap();
            cs.set_on_forward_rates(&rates, first).unwrap();
            let (i, j, k) = (i.max(first), j.max(first), k.max(first));
            prop_assert_eq!(cs.discount_ratio(i, i).unwrap(), 1.0);
            let direct = cs.discount_ratio(i, j).unwrap();
            let via_k = cs.discount_ratio(i, k).unwrap() / cs.discount_ratio(j, k).unwrap();
            prop_assert!((direct - via_k).abs() <= 1e-12 * direct.abs());
        }

        #[test]
        fn both_flavours_agree(
            rates in proptest::collection::vec(0.001f64..0.15, 5),
            first in 0usize..5,
        ) {
            let mut fwd = LmmCurveState::new(&RATE_TIMES).unwrap();
            fwd.set_on_forward_rates(&rates, first).unwrap();
            let swaps: Vec<Rate> = (0..5)
                .map(|i| if i < first { 0.0 } else { fwd.coterminal_swap_rate(i).unwrap() })
                .collect();
            let mut cot = CoterminalSwapCurveState::new(&RATE_TIMES).unwrap();
            cot.set_on_coterminal_swap_rates(&swaps, first).unwrap();
            for i in first..5 {
                let a = fwd.forward_rate(i).unwrap();
                let b = cot.forward_rate(i).unwrap();
                prop_assert!((a - b).abs() <= 1e-12);
                let a = fwd.coterminal_swap_annuity(first, i).unwrap();
                let b = cot.coterminal_swap_annuity(first, i).unwrap();
                prop_assert!((a - b).abs() <= 1e-12 * a.abs());
                let a = fwd.cm_swap_rate(i, 2).unwrap();
                let b = cot.cm_swap_rate(i, 2).unwrap();
                prop_assert!((a - b).abs() <= 1e-12);
            }
        }
    }
}
