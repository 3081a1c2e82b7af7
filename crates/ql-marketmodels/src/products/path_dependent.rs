//! Products whose payments depend on the history of the path.
//!
//! Every step first records an observation of the current curve state and
//! then lets a payment rule look at the observations made so far.  Reading
//! an observation that has not been made yet is a causality violation and
//! fails with [`Error::NotAdapted`] instead of pricing with future
//! information.

use super::{CashFlow, MultiProduct};
use crate::{curve_state::CurveState, evolution_description::EvolutionDescription};
use ql_core::{
    ensure,
    errors::{Error, Result},
    Real, Size, Time,
};
use std::sync::Arc;

/// Quantity recorded at a step: `(step, state) -> value`.
pub type ObservationFn = Arc<dyn Fn(Size, &dyn CurveState) -> Result<Real> + Send + Sync>;

/// Payment rule run after each observation: `(step, history) -> cash flow`.
pub type PaymentFn =
    Arc<dyn Fn(Size, &PathObservations) -> Result<Option<CashFlow>> + Send + Sync>;

/// Observations recorded so far on the current path.
#[derive(Debug, Clone, PartialEq)]
pub struct PathObservations {
    values: Vec<Real>,
    current_step: Size,
}

impl PathObservations {
    fn new(steps: Size) -> Self {
        Self {
            values: vec![0.0; steps],
            current_step: 0,
        }
    }

    /// Step being processed.
    pub fn current_step(&self) -> Size {
        self.current_step
    }

    /// Observation made at `step`.
    ///
    /// Fails with [`Error::NotAdapted`] when `step` lies in the future of
    /// the step being processed.
    pub fn get(&self, step: Size) -> Result<Real> {
        if step > self.current_step {
            return Err(Error::NotAdapted {
                requested: step,
                current: self.current_step,
            });
        }
        Ok(self.values[step])
    }

    /// All observations up to and including the current step.
    pub fn history(&self) -> &[Real] {
        &self.values[..=self.current_step]
    }
}

/// A single product built from an observation rule and a payment rule.
///
/// ```
/// use std::sync::Arc;
/// use ql_core::errors::Result;
/// use ql_marketmodels::{CashFlow, CurveState, PathDependentProduct, PathObservations};
///
/// // pay the average of the fixings seen so far at the last step
/// let average = PathDependentProduct::new(
///     ql_marketmodels::EvolutionDescription::new(
///         vec![0.0, 1.0, 2.0, 3.0],
///         vec![0.0, 1.0, 2.0],
///         None,
///         None,
///     )?,
///     vec![3.0],
///     Arc::new(|step: usize, state: &dyn CurveState| state.forward_rate(step)),
///     Arc::new(|step: usize, seen: &PathObservations| -> Result<Option<CashFlow>> {
///         if step < 2 {
///             return Ok(None);
///         }
///         let history = seen.history();
///         let mean = history.iter().sum::<f64>() / history.len() as f64;
///         Ok(Some(CashFlow::new(0, mean)))
///     }),
/// )?;
/// # Ok::<(), ql_core::errors::Error>(())
/// ```
#[derive(Clone)]
pub struct PathDependentProduct {
    evolution: EvolutionDescription,
    payment_times: Vec<Time>,
    observe: ObservationFn,
    pay: PaymentFn,
    observations: PathObservations,
    current_index: Size,
}

impl PathDependentProduct {
    /// Product observing with `observe` and paying through `pay` at
    /// `payment_times`.
    pub fn new(
        evolution: EvolutionDescription,
        payment_times: Vec<Time>,
        observe: ObservationFn,
        pay: PaymentFn,
    ) -> Result<Self> {
        ensure!(!payment_times.is_empty(), "at least one payment time required");
        let steps = evolution.number_of_steps();
        Ok(Self {
            evolution,
            payment_times,
            observe,
            pay,
            observations: PathObservations::new(steps),
            current_index: 0,
        })
    }

    /// Observations of the current path.
    pub fn observations(&self) -> &PathObservations {
        &self.observations
    }
}

impl MultiProduct for PathDependentProduct {
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
        1
    }

    fn reset(&mut self) {
        self.observations.values.fill(0.0);
        self.observations.current_step = 0;
        self.current_index = 0;
    }

    fn next_time_step(
        &mut self,
        state: &dyn CurveState,
        cash_flows: &mut [Vec<CashFlow>],
    ) -> Result<bool> {
        cash_flows[0].clear();
        let step = self.current_index;
        if step >= self.evolution.number_of_steps() {
            return Err(Error::StepOutOfOrder {
                requested: step,
                current: self.evolution.number_of_steps(),
            });
        }
        self.observations.current_step = step;
        self.observations.values[step] = (self.observe)(step, state)?;
        if let Some(cf) = (self.pay)(step, &self.observations)? {
            ensure!(
                cf.time_index < self.payment_times.len(),
                "payment time index {} out of range ({} payment times)",
                cf.time_index,
                self.payment_times.len()
            );
            cash_flows[0].push(cf);
        }
        self.current_index += 1;
        Ok(self.current_index == self.evolution.number_of_steps())
    }

    fn clone_box(&self) -> Box<dyn MultiProduct> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve_state::LmmCurveState;

    fn evolution() -> EvolutionDescription {
        EvolutionDescription::new(vec![0.0, 1.0, 2.0, 3.0], vec![0.0, 1.0, 2.0], None, None).unwrap()
    }

    fn state(first: Size) -> LmmCurveState {
        let mut cs = LmmCurveState::new(&[0.0, 1.0, 2.0, 3.0]).unwrap();
        cs.set_on_forward_rates(&[0.01, 0.02, 0.03], first).unwrap();
        cs
    }

    fn fixing() -> ObservationFn {
        Arc::new(|step: Size, state: &dyn CurveState| state.forward_rate(step))
    }

    #[test]
    fn payments_see_the_history() {
        let pay: PaymentFn = Arc::new(|step: Size, seen: &PathObservations| -> Result<Option<CashFlow>> {
            let total: Real = seen.history().iter().sum();
            Ok((step == 2).then(|| CashFlow::new(0, total)))
        });
        let mut product = PathDependentProduct::new(evolution(), vec![3.0], fixing(), pay).unwrap();
        let mut buffers = vec![Vec::new()];
        product.reset();
        assert!(!product.next_time_step(&state(0), &mut buffers).unwrap());
        assert!(buffers[0].is_empty());
        assert!(!product.next_time_step(&state(1), &mut buffers).unwrap());
        assert!(product.next_time_step(&state(2), &mut buffers).unwrap());
        approx::assert_relative_eq!(buffers[0][0].amount, 0.06, max_relative = 1e-12);
        assert_eq!(product.observations().get(1).unwrap(), 0.02);
    }

    #[test]
    fn reading_the_future_is_not_adapted() {
        let pay: PaymentFn = Arc::new(|step: Size, seen: &PathObservations| -> Result<Option<CashFlow>> {
            let next = seen.get(step + 1)?;
            Ok(Some(CashFlow::new(0, next)))
        });
        let mut product = PathDependentProduct::new(evolution(), vec![3.0], fixing(), pay).unwrap();
        let mut buffers = vec![Vec::new()];
        product.reset();
        let err = product.next_time_step(&state(0), &mut buffers).unwrap_err();
        assert_eq!(
            err,
            Error::NotAdapted {
                requested: 1,
                current: 0
            }
        );
        assert!(err.to_string().starts_with("not adapted: looking into the future"));
    }

    #[test]
    fn payment_indices_are_checked() {
        let pay: PaymentFn = Arc::new(|_: Size, _: &PathObservations| -> Result<Option<CashFlow>> {
            Ok(Some(CashFlow::new(4, 1.0)))
        });
        let mut product = PathDependentProduct::new(evolution(), vec![3.0], fixing(), pay).unwrap();
        assert!(product.next_time_step(&state(0), &mut [Vec::new()]).is_err());
    }

    #[test]
    fn stepping_past_the_last_step_fails() {
        let pay: PaymentFn = Arc::new(|_: Size, _: &PathObservations| -> Result<Option<CashFlow>> {
            Ok(None)
        });
        let constant: ObservationFn = Arc::new(|_: Size, _: &dyn CurveState| Ok(1.0));
        let mut product = PathDependentProduct::new(evolution(), vec![3.0], constant, pay).unwrap();
        let mut buffers = vec![Vec::new()];
        product.reset();
        assert!(!product.next_time_step(&state(0), &mut buffers).unwrap());
        assert!(!product.next_time_step(&state(1), &mut buffers).unwrap());
        assert!(product.next_time_step(&state(2), &mut buffers).unwrap());
        assert_eq!(
            product.next_time_step(&state(2), &mut buffers).unwrap_err(),
            Error::StepOutOfOrder {
                requested: 3,
                current: 3
            }
        );

        product.reset();
        assert!(!product.next_time_step(&state(0), &mut buffers).unwrap());
    }
}
