//! Discounting of cash flows paid between rate times (translates
//! `ql/models/marketmodels/discounter.hpp`).

use crate::curve_state::CurveState;
use ql_core::{ensure, errors::Result, Real, Size, Time};

/// Value of a unit payment in units of a numeraire bond.
///
/// Payment times falling between two rate times are discounted by
/// log-linear interpolation of the discount ratios of the enclosing bonds:
///
/// ```text
/// P(t) / P_N = (P_b / P_N)^w · (P_{b+1} / P_N)^(1-w),
/// w = 1 - (t - T_b) / (T_{b+1} - T_b)
/// ```
///
/// Corresponds to `QuantLib::MarketModelDiscounter`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarketModelDiscounter {
    before: Size,
    before_weight: Real,
}

impl MarketModelDiscounter {
    /// Discounter for a payment at `payment_time`, which must lie within
    /// the rate times.
    pub fn new(payment_time: Time, rate_times: &[Time]) -> Result<Self> {
        ensure!(rate_times.len() >= 2, "at least two rate times required");
        let n = rate_times.len() - 1;
        ensure!(
            payment_time >= rate_times[0] && payment_time <= rate_times[n],
            "payment time {payment_time} outside the rate times [{}, {}]",
            rate_times[0],
            rate_times[n]
        );
        let before = rate_times
            .partition_point(|&t| t <= payment_time)
            .saturating_sub(1)
            .min(n - 1);
        let before_weight = 1.0
            - (payment_time - rate_times[before]) / (rate_times[before + 1] - rate_times[before]);
        Ok(Self {
            before,
            before_weight,
        })
    }

    /// `P(payment_time) / P(rate_times[numeraire])` on `state`.
    pub fn numeraire_bonds(&self, state: &dyn CurveState, numeraire: Size) -> Result<Real> {
        let pre = state.discount_ratio(self.before, numeraire)?;
        if self.before_weight == 1.0 {
            return Ok(pre);
        }
        let post = state.discount_ratio(self.before + 1, numeraire)?;
        if self.before_weight == 0.0 {
            return Ok(post);
        }
        Ok(pre.powf(self.before_weight) * post.powf(1.0 - self.before_weight))
    }
}
