//! An exercise value seen as a product (translates
//! `ql/models/marketmodels/products/multistep/exerciseadapter.hpp`).

use super::{CashFlow, MultiProduct};
use crate::{curve_state::CurveState, evolution_description::EvolutionDescription, exercise::ExerciseValue};
use ql_core::{errors::Result, Size, Time};

/// Pays the exercise value at every exercise time.
///
/// Mostly useful as the rebate of a [`CallSpecifiedMultiProduct`]: once
/// called, the holder receives the exercise value at the call step.
///
/// [`CallSpecifiedMultiProduct`]: super::CallSpecifiedMultiProduct
#[derive(Clone)]
pub struct ExerciseAdapter {
    exercise: Box<dyn ExerciseValue>,
    current_index: Size,
}

impl ExerciseAdapter {
    /// Wrap `exercise`.
    pub fn new(exercise: Box<dyn ExerciseValue>) -> Self {
        Self {
            exercise,
            current_index: 0,
        }
    }

    /// The wrapped exercise value.
    pub fn exercise_value(&self) -> &dyn ExerciseValue {
        self.exercise.as_ref()
    }
}

impl MultiProduct for ExerciseAdapter {
    fn evolution(&self) -> &EvolutionDescription {
        self.exercise.evolution()
    }

    fn possible_cash_flow_times(&self) -> &[Time] {
        self.exercise.possible_cash_flow_times()
    }

    fn number_of_products(&self) -> Size {
        1
    }

    fn max_number_of_cash_flows_per_product_per_step(&self) -> Size {
        1
    }

    fn reset(&mut self) {
        self.exercise.reset();
        self.current_index = 0;
    }

    fn next_time_step(
        &mut self,
        state: &dyn CurveState,
        cash_flows: &mut [Vec<CashFlow>],
    ) -> Result<bool> {
        cash_flows[0].clear();
        self.exercise.next_step(state)?;
        if self.exercise.is_exercise_time()[self.current_index] {
            cash_flows[0].push(self.exercise.value(state)?);
        }
        self.current_index += 1;
        Ok(self.current_index == self.exercise.evolution().number_of_steps())
    }

    fn clone_box(&self) -> Box<dyn MultiProduct> {
        Box::new(self.clone())
    }
}
