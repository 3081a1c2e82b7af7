//! Curve state built on forward rates (translates
//! `ql/models/marketmodels/curvestates/lmmcurvestate.hpp`).

use super::{check_bond_index, check_rate_index, check_rate_times, CurveState};
use ql_core::{ensure, errors::Result, Rate, Real, Size, Time};
use std::cell::{Cell, RefCell};

/// Curve state whose sufficient statistic is the vector of forward rates.
///
/// Coterminal swap annuities and rates are derived lazily: the first query
/// for index `i` fills the cache from the last rate down to `i`, and later
/// queries for indices `>= i` are served from the cache.  Setting new rates
/// invalidates it.
///
/// Corresponds to `QuantLib::LMMCurveState`.
#[derive(Debug, Clone)]
pub struct LmmCurveState {
    rate_times: Vec<Time>,
    rate_taus: Vec<Time>,
    first: Option<Size>,
    forward_rates: Vec<Rate>,
    discount_ratios: Vec<Real>,
    cot_annuities: RefCell<Vec<Real>>,
    cot_swap_rates: RefCell<Vec<Rate>>,
    // lowest index with a valid cache entry; n means nothing cached
    first_cot_annuity_comp: Cell<Size>,
}

impl LmmCurveState {
    /// An unset state on the given rate times.
    pub fn new(rate_times: &[Time]) -> Result<Self> {
        let rate_taus = check_rate_times(rate_times)?;
        let n = rate_taus.len();
        Ok(Self {
            rate_times: rate_times.to_vec(),
            rate_taus,
            first: None,
            forward_rates: vec![0.0; n],
            discount_ratios: vec![1.0; n + 1],
            cot_annuities: RefCell::new(vec![0.0; n]),
            cot_swap_rates: RefCell::new(vec![0.0; n]),
            first_cot_annuity_comp: Cell::new(n),
        })
    }

    /// Set the state from forward rates; entries below `first_valid_index`
    /// are ignored.
    pub fn set_on_forward_rates(&mut self, rates: &[Rate], first_valid_index: Size) -> Result<()> {
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
        self.forward_rates[first_valid_index..].copy_from_slice(&rates[first_valid_index..]);

        self.discount_ratios[first_valid_index] = 1.0;
        for i in first_valid_index..n {
            self.discount_ratios[i + 1] =
                self.discount_ratios[i] / (1.0 + self.forward_rates[i] * self.rate_taus[i]);
        }
        self.first_cot_annuity_comp.set(n);
        Ok(())
    }

    /// Set the state from discount ratios (`n + 1` values, only the entries
    /// from `first_valid_index` on are used).
    pub fn set_on_discount_ratios(
        &mut self,
        discount_ratios: &[Real],
        first_valid_index: Size,
    ) -> Result<()> {
        let n = self.rate_taus.len();
        ensure!(
            discount_ratios.len() == n + 1,
            "too many discount ratios: {} required, {} provided",
            n + 1,
            discount_ratios.len()
        );
        ensure!(
            first_valid_index <= n,
            "first valid index must not exceed {n}: {first_valid_index} not allowed"
        );

        self.first = Some(first_valid_index);
        self.discount_ratios[first_valid_index..]
            .copy_from_slice(&discount_ratios[first_valid_index..]);
        for i in first_valid_index..n {
            self.forward_rates[i] = (self.discount_ratios[i] / self.discount_ratios[i + 1] - 1.0)
                / self.rate_taus[i];
        }
        self.first_cot_annuity_comp.set(n);
        Ok(())
    }

    /// Lowest index whose coterminal annuity is currently cached (`n` when
    /// the cache is empty).
    pub fn first_cached_coterminal_index(&self) -> Size {
        self.first_cot_annuity_comp.get()
    }

    fn first_alive(&self) -> Result<Size> {
        match self.first {
            Some(first) => Ok(first),
            None => ql_core::fail!("curve state not initialized yet"),
        }
    }

    // Extends the cache down to index `i`; entries above the watermark are
    // already valid and left untouched.
    fn fill_coterminal_cache(&self, i: Size) {
        let n = self.rate_taus.len();
        let watermark = self.first_cot_annuity_comp.get();
        if watermark <= i {
            return;
        }
        let mut annuities = self.cot_annuities.borrow_mut();
        let mut rates = self.cot_swap_rates.borrow_mut();
        let mut annuity = if watermark == n {
            0.0
        } else {
            annuities[watermark]
        };
        for k in (i..watermark).rev() {
            annuity += self.rate_taus[k] * self.discount_ratios[k + 1];
            annuities[k] = annuity;
            rates[k] = (self.discount_ratios[k] - self.discount_ratios[n]) / annuity;
        }
        self.first_cot_annuity_comp.set(i);
    }
}

impl CurveState for LmmCurveState {
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
        self.fill_coterminal_cache(i);
        Ok(self.cot_annuities.borrow()[i] / self.discount_ratios[numeraire])
    }

    fn coterminal_swap_rate(&self, i: Size) -> Result<Rate> {
        check_rate_index(self.first_alive()?, self.rate_taus.len(), i)?;
        self.fill_coterminal_cache(i);
        Ok(self.cot_swap_rates.borrow()[i])
    }

    fn clone_box(&self) -> Box<dyn CurveState> {
        Box::new(self.clone())
    }
}
