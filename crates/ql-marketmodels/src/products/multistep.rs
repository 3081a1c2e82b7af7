//! Products paying once per rate reset (translates
//! `ql/models/marketmodels/products/multistep/multistepforwards.hpp`,
//! `multistepcaplets.hpp`, `multistepswap.hpp` and `multistepnothing.hpp`).

use super::{check_per_rate_inputs, reset_time_evolution, CashFlow, MultiProduct};
use crate::{curve_state::CurveState, evolution_description::EvolutionDescription};
use ql_core::{ensure, errors::Result, Rate, Real, Size, Time};

fn clear(cash_flows: &mut [Vec<CashFlow>]) {
    cash_flows.iter_mut().for_each(Vec::clear);
}

/// One forward-rate agreement per rate: product `i` pays
/// `(f_i - K_i)·accrual_i` at its payment time, fixed at the reset of rate `i`.
///
/// Corresponds to `QuantLib::MultiStepForwards`.
#[derive(Debug, Clone)]
pub struct MultiStepForwards {
    evolution: EvolutionDescription,
    accruals: Vec<Time>,
    payment_times: Vec<Time>,
    strikes: Vec<Rate>,
    current_index: Size,
}

impl MultiStepForwards {
    /// Forwards on every rate of `rate_times`.
    pub fn new(
        rate_times: &[Time],
        accruals: Vec<Time>,
        payment_times: Vec<Time>,
        strikes: Vec<Rate>,
    ) -> Result<Self> {
        check_per_rate_inputs(rate_times, &accruals, &payment_times, "forwards")?;
        ensure!(
            strikes.len() == accruals.len(),
            "forwards: {} strikes given for {} rates",
            strikes.len(),
            accruals.len()
        );
        Ok(Self {
            evolution: reset_time_evolution(rate_times)?,
            accruals,
            payment_times,
            strikes,
            current_index: 0,
        })
    }
}

impl MultiProduct for MultiStepForwards {
    fn evolution(&self) -> &EvolutionDescription {
        &self.evolution
    }

    fn possible_cash_flow_times(&self) -> &[Time] {
        &self.payment_times
    }

    fn number_of_products(&self) -> Size {
        self.strikes.len()
    }

    fn max_number_of_cash_flows_per_product_per_step(&self) -> Size {
        1
    }

    fn reset(&mut self) {
        self.current_index = 0;
    }

    fn next_time_step(
        &mut self,
        state: &dyn CurveState,
        cash_flows: &mut [Vec<CashFlow>],
    ) -> Result<bool> {
        clear(cash_flows);
        let i = self.current_index;
        let rate = state.forward_rate(i)?;
        cash_flows[i].push(CashFlow::new(i, (rate - self.strikes[i]) * self.accruals[i]));
        self.current_index += 1;
        Ok(self.current_index == self.strikes.len())
    }

    fn clone_box(&self) -> Box<dyn MultiProduct> {
        Box::new(self.clone())
    }
}

/// One caplet per rate: product `i` pays `max(f_i - K_i, 0)·accrual_i`.
///
/// Corresponds to `QuantLib::MultiStepCaplets`.
#[derive(Debug, Clone)]
pub struct MultiStepCaplets {
    evolution: EvolutionDescription,
    accruals: Vec<Time>,
    payment_times: Vec<Time>,
    strikes: Vec<Rate>,
    current_index: Size,
}

impl MultiStepCaplets {
    /// Caplets on every rate of `rate_times`.
    pub fn new(
        rate_times: &[Time],
        accruals: Vec<Time>,
        payment_times: Vec<Time>,
        strikes: Vec<Rate>,
    ) -> Result<Self> {
        check_per_rate_inputs(rate_times, &accruals, &payment_times, "caplets")?;
        ensure!(
            strikes.len() == accruals.len(),
            "caplets: {} strikes given for {} rates",
            strikes.len(),
            accruals.len()
        );
        Ok(Self {
            evolution: reset_time_evolution(rate_times)?,
            accruals,
            payment_times,
            strikes,
            current_index: 0,
        })
    }
}

impl MultiProduct for MultiStepCaplets {
    fn evolution(&self) -> &EvolutionDescription {
        &self.evolution
    }

    fn possible_cash_flow_times(&self) -> &[Time] {
        &self.payment_times
    }

    fn number_of_products(&self) -> Size {
        self.strikes.len()
    }

    fn max_number_of_cash_flows_per_product_per_step(&self) -> Size {
        1
    }

    fn reset(&mut self) {
        self.current_index = 0;
    }

    fn next_time_step(
        &mut self,
        state: &dyn CurveState,
        cash_flows: &mut [Vec<CashFlow>],
    ) -> Result<bool> {
        clear(cash_flows);
        let i = self.current_index;
        let payoff = (state.forward_rate(i)? - self.strikes[i]).max(0.0) * self.accruals[i];
        if payoff > 0.0 {
            cash_flows[i].push(CashFlow::new(i, payoff));
        }
        self.current_index += 1;
        Ok(self.current_index == self.strikes.len())
    }

    fn clone_box(&self) -> Box<dyn MultiProduct> {
        Box::new(self.clone())
    }
}

/// A single fixed-for-floating swap whose periods are the rate periods.
///
/// Each step pays the fixed coupon `-K·fixed_accrual_i` and receives the
/// floating coupon `f_i·floating_accrual_i` (signs flipped for a receiver
/// swap), both at the payment time of period `i`.
///
/// Corresponds to `QuantLib::MultiStepSwap`.
#[derive(Debug, Clone)]
pub struct MultiStepSwap {
    evolution: EvolutionDescription,
    fixed_accruals: Vec<Time>,
    floating_accruals: Vec<Time>,
    payment_times: Vec<Time>,
    fixed_rate: Rate,
    multiplier: Real,
    current_index: Size,
}

impl MultiStepSwap {
    /// Payer (`payer == true`) or receiver swap at `fixed_rate`.
    pub fn new(
        rate_times: &[Time],
        fixed_accruals: Vec<Time>,
        floating_accruals: Vec<Time>,
        payment_times: Vec<Time>,
        fixed_rate: Rate,
        payer: bool,
    ) -> Result<Self> {
        check_per_rate_inputs(rate_times, &fixed_accruals, &payment_times, "swap")?;
        ensure!(
            floating_accruals.len() == fixed_accruals.len(),
            "swap: {} floating accruals given for {} rates",
            floating_accruals.len(),
            fixed_accruals.len()
        );
        Ok(Self {
            evolution: reset_time_evolution(rate_times)?,
            fixed_accruals,
            floating_accruals,
            payment_times,
            fixed_rate,
            multiplier: if payer { 1.0 } else { -1.0 },
            current_index: 0,
        })
    }
}

impl MultiProduct for MultiStepSwap {
    fn evolution(&self) -> &EvolutionDescription {
        &self.evolution
    }

    fn possible_cash_flow_times(&self) -> &[Time] {
        &self.payment_times
    }

    fn number_of_products(&self) -> Size {
        1
    }

    fn max_number_of_cash_flows_per_product_per_step(&self) -> Size {
        2
    }

    fn reset(&mut self) {
        self.current_index = 0;
    }

    fn next_time_step(
        &mut self,
        state: &dyn CurveState,
        cash_flows: &mut [Vec<CashFlow>],
    ) -> Result<bool> {
        clear(cash_flows);
        let i = self.current_index;
        let libor = state.forward_rate(i)?;
        cash_flows[0].push(CashFlow::new(
            i,
            -self.multiplier * self.fixed_rate * self.fixed_accruals[i],
        ));
        cash_flows[0].push(CashFlow::new(
            i,
            self.multiplier * libor * self.floating_accruals[i],
        ));
        self.current_index += 1;
        Ok(self.current_index == self.fixed_accruals.len())
    }

    fn clone_box(&self) -> Box<dyn MultiProduct> {
        Box::new(self.clone())
    }
}

/// Products that never pay, done after step `done_index`.
///
/// Serves as the underlying of a pure option and as the default rebate of
/// callable products.
///
/// Corresponds to `QuantLib::MultiStepNothing`.
#[derive(Debug, Clone)]
pub struct MultiStepNothing {
    evolution: EvolutionDescription,
    number_of_products: Size,
    done_index: Size,
    current_index: Size,
}

impl MultiStepNothing {
    /// `number_of_products` empty products over `evolution`.
    pub fn new(
        evolution: EvolutionDescription,
        number_of_products: Size,
        done_index: Size,
    ) -> Result<Self> {
        ensure!(number_of_products > 0, "at least one product required");
        ensure!(
            done_index < evolution.number_of_steps(),
            "done index {done_index} beyond the last of {} steps",
            evolution.number_of_steps()
        );
        Ok(Self {
            evolution,
            number_of_products,
            done_index,
            current_index: 0,
        })
    }

    /// Empty products that stay alive over the whole of `evolution`.
    pub fn over(evolution: EvolutionDescription, number_of_products: Size) -> Result<Self> {
        let last = evolution.number_of_steps().saturating_sub(1);
        Self::new(evolution, number_of_products, last)
    }
}

impl MultiProduct for MultiStepNothing {
    fn evolution(&self) -> &EvolutionDescription {
        &self.evolution
    }

    fn possible_cash_flow_times(&self) -> &[Time] {
        &[]
    }

    fn number_of_products(&self) -> Size {
        self.number_of_products
    }

    fn max_number_of_cash_flows_per_product_per_step(&self) -> Size {
        0
    }

    fn reset(&mut self) {
        self.current_index = 0;
    }

    fn next_time_step(
        &mut self,
        _state: &dyn CurveState,
        cash_flows: &mut [Vec<CashFlow>],
    ) -> Result<bool> {
        clear(cash_flows);
        let done = self.current_index >= self.done_index;
        self.current_index += 1;
        Ok(done)
    }

    fn clone_box(&self) -> Box<dyn MultiProduct> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve_state::LmmCurveState;
    use approx::assert_relative_eq;

    const RATE_TIMES: [Time; 4] = [1.0, 1.5, 2.0, 2.5];

    fn state(first: Size) -> LmmCurveState {
        let mut cs = LmmCurveState::new(&RATE_TIMES).unwrap();
        cs.set_on_forward_rates(&[0.03, 0.04, 0.05], first).unwrap();
        cs
    }

    fn run(product: &mut dyn MultiProduct) -> Vec<Vec<Vec<CashFlow>>> {
        product.reset();
        let mut buffers = crate::products::cash_flow_buffers(product);
        let mut steps = Vec::new();
        for step in 0..product.evolution().number_of_steps() {
            let done = product.next_time_step(&state(step), &mut buffers).unwrap();
            steps.push(buffers.clone());
            if done {
                break;
            }
        }
        steps
    }

    #[test]
    fn forwards_pay_one_flow_per_step() {
        let mut fwds =
            MultiStepForwards::new(&RATE_TIMES, vec![0.5; 3], vec![1.5, 2.0, 2.5], vec![0.04; 3])
                .unwrap();
        let steps = run(&mut fwds);
        assert_eq!(steps.len(), 3);
        assert_relative_eq!(steps[0][0][0].amount, -0.005, epsilon = 1e-15);
        assert!(steps[0][1].is_empty());
        assert_eq!(steps[2][2][0], CashFlow::new(2, 0.5 * (0.05 - 0.04)));
    }

    #[test]
    fn out_of_the_money_caplets_pay_nothing() {
        let mut caplets =
            MultiStepCaplets::new(&RATE_TIMES, vec![0.5; 3], vec![1.5, 2.0, 2.5], vec![0.04; 3])
                .unwrap();
        let steps = run(&mut caplets);
        assert!(steps[0][0].is_empty());
        assert!(steps[1][1].is_empty());
        assert_relative_eq!(steps[2][2][0].amount, 0.005, epsilon = 1e-15);
    }

    #[test]
    fn payer_and_receiver_swaps_mirror_each_other() {
        let build = |payer| {
            MultiStepSwap::new(
                &RATE_TIMES,
                vec![0.5; 3],
                vec![0.5; 3],
                vec![1.5, 2.0, 2.5],
                0.04,
                payer,
            )
            .unwrap()
        };
        let payer = run(&mut build(true));
        let receiver = run(&mut build(false));
        for (p, r) in payer.iter().zip(&receiver) {
            assert_eq!(p[0].len(), 2);
            for (a, b) in p[0].iter().zip(&r[0]) {
                assert_eq!(a.amount, -b.amount);
            }
        }
        assert_relative_eq!(payer[1][0][1].amount, 0.02, epsilon = 1e-15);
    }

    #[test]
    fn nothing_is_done_at_its_done_index() {
        let evolution = EvolutionDescription::new(RATE_TIMES.to_vec(), vec![1.0, 1.5, 2.0], None, None).unwrap();
        let mut nothing = MultiStepNothing::new(evolution.clone(), 2, 1).unwrap();
        let steps = run(&mut nothing);
        assert_eq!(steps.len(), 2);
        assert!(steps.iter().flatten().all(Vec::is_empty));
        assert_eq!(run(&mut MultiStepNothing::over(evolution.clone(), 1).unwrap()).len(), 3);
        assert!(MultiStepNothing::new(evolution, 1, 3).is_err());
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        assert!(MultiStepForwards::new(&RATE_TIMES, vec![0.5; 3], vec![1.5, 2.0, 2.5], vec![0.04; 2]).is_err());
        assert!(MultiStepSwap::new(&RATE_TIMES, vec![0.5; 3], vec![0.5; 2], vec![1.5, 2.0, 2.5], 0.04, true).is_err());
    }
}
