//! Callable products (translates
//! `ql/models/marketmodels/products/multistep/callspecifiedmultiproduct.hpp`).

use super::{cash_flow_buffers, CashFlow, MultiProduct, MultiStepNothing};
use crate::{
    curve_state::CurveState, evolution_description::EvolutionDescription,
    exercise::ExerciseStrategy, utilities::merge_times,
};
use ql_core::{ensure, errors::Result, Size, Time};

// Rows of the presence masks built by `merge_times`.
const UNDERLYING: usize = 0;
const EXERCISE: usize = 1;
const REBATE: usize = 2;
const STRATEGY: usize = 3;

/// Underlying cash flows until an exercise strategy calls the product, then
/// rebate cash flows.
///
/// The evolution merges the times of the underlying, the rebate and the
/// strategy.  At a step where the strategy calls, the rebate pays and the
/// underlying does not, and the path ends there: rebates settling later
/// express that through the time index of their cash flows.  Rebate cash
/// flows are indexed after those of the underlying.
///
/// Corresponds to `QuantLib::CallSpecifiedMultiProduct`.
#[derive(Clone)]
pub struct CallSpecifiedMultiProduct {
    underlying: Box<dyn MultiProduct>,
    strategy: Box<dyn ExerciseStrategy>,
    rebate: Box<dyn MultiProduct>,
    evolution: EvolutionDescription,
    is_present: Vec<Vec<bool>>,
    cash_flow_times: Vec<Time>,
    rebate_offset: Size,
    callable: bool,
    was_called: bool,
    current_index: Size,
    dummy_cash_flows: Vec<Vec<CashFlow>>,
}

impl CallSpecifiedMultiProduct {
    /// Callable version of `underlying`; `rebate` defaults to nothing.
    pub fn new(
        underlying: Box<dyn MultiProduct>,
        strategy: Box<dyn ExerciseStrategy>,
        rebate: Option<Box<dyn MultiProduct>>,
    ) -> Result<Self> {
        let products = underlying.number_of_products();
        let rebate = match rebate {
            Some(rebate) => rebate,
            None => Box::new(MultiStepNothing::over(
                underlying.evolution().clone(),
                products,
            )?),
        };
        let rate_times = underlying.evolution().rate_times();
        ensure!(
            rebate.evolution().rate_times() == rate_times,
            "rebate and underlying have different rate times"
        );
        ensure!(
            rebate.number_of_products() == products,
            "rebate has {} products, underlying {products}",
            rebate.number_of_products()
        );

        let (times, is_present) = merge_times(&[
            underlying.evolution().evolution_times(),
            strategy.exercise_times(),
            rebate.evolution().evolution_times(),
            strategy.relevant_times(),
        ]);
        let evolution = EvolutionDescription::new(rate_times.to_vec(), times, None, None)?;

        let mut cash_flow_times = underlying.possible_cash_flow_times().to_vec();
        let rebate_offset = cash_flow_times.len();
        cash_flow_times.extend_from_slice(rebate.possible_cash_flow_times());
        let dummy_cash_flows = cash_flow_buffers(rebate.as_ref());

        Ok(Self {
            underlying,
            strategy,
            rebate,
            evolution,
            is_present,
            cash_flow_times,
            rebate_offset,
            callable: true,
            was_called: false,
            current_index: 0,
            dummy_cash_flows,
        })
    }

    /// The underlying product.
    pub fn underlying(&self) -> &dyn MultiProduct {
        self.underlying.as_ref()
    }

    /// The exercise strategy.
    pub fn strategy(&self) -> &dyn ExerciseStrategy {
        self.strategy.as_ref()
    }

    /// The rebate paid once called.
    pub fn rebate(&self) -> &dyn MultiProduct {
        self.rebate.as_ref()
    }

    /// Ignore the strategy: the product is never called.
    pub fn disable_callability(&mut self) {
        self.callable = false;
    }

    /// Let the strategy call the product again.
    pub fn enable_callability(&mut self) {
        self.callable = true;
    }
}

impl MultiProduct for CallSpecifiedMultiProduct {
    fn evolution(&self) -> &EvolutionDescription {
        &self.evolution
    }

    fn possible_cash_flow_times(&self) -> &[Time] {
        &self.cash_flow_times
    }

    fn number_of_products(&self) -> Size {
        self.underlying.number_of_products()
    }

    fn max_number_of_cash_flows_per_product_per_step(&self) -> Size {
        self.underlying
            .max_number_of_cash_flows_per_product_per_step()
            .max(self.rebate.max_number_of_cash_flows_per_product_per_step())
    }

    fn reset(&mut self) {
        self.underlying.reset();
        self.rebate.reset();
        self.strategy.reset();
        self.current_index = 0;
        self.was_called = false;
    }

    fn next_time_step(
        &mut self,
        state: &dyn CurveState,
        cash_flows: &mut [Vec<CashFlow>],
    ) -> Result<bool> {
        cash_flows.iter_mut().for_each(Vec::clear);
        let step = self.current_index;
        let present = |row: usize| self.is_present[row][step];
        let (is_underlying_time, is_exercise_time, is_rebate_time, is_strategy_time) =
            (present(UNDERLYING), present(EXERCISE), present(REBATE), present(STRATEGY));

        if !self.was_called && is_strategy_time {
            self.strategy.next_step(state)?;
        }
        if !self.was_called && is_exercise_time && self.callable {
            self.was_called = self.strategy.exercise(state)?;
        }

        let mut done = false;
        if self.was_called {
            if is_rebate_time {
                self.rebate.next_time_step(state, cash_flows)?;
                for cf in cash_flows.iter_mut().flatten() {
                    cf.time_index += self.rebate_offset;
                }
            }
            done = true;
        } else {
            if is_rebate_time {
                self.rebate.next_time_step(state, &mut self.dummy_cash_flows)?;
            }
            if is_underlying_time {
                done = self.underlying.next_time_step(state, cash_flows)?;
            }
        }

        self.current_index += 1;
        Ok(done || self.current_index == self.evolution.number_of_steps())
    }

    fn clone_box(&self) -> Box<dyn MultiProduct> {
        Box::new(self.clone())
    }
}
