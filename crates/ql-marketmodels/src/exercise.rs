//! Exercise values and exercise strategies of callable products (translates
//! `ql/models/marketmodels/callability/exercisevalue.hpp`,
//! `bermudanswaptionexercisevalue.hpp`, `nothingexercisevalue.hpp`,
//! `ql/methods/montecarlo/exercisestrategy.hpp` and
//! `ql/models/marketmodels/callability/swapratetrigger.hpp`).
//!
//! Both traits follow the stepping protocol of the products: `reset` before
//! a path, `next_step` once per relevant step, then queries about the step
//! just taken.

use crate::{
    curve_state::CurveState, evolution_description::EvolutionDescription, products::CashFlow,
    utilities::{check_increasing_times, lower_index},
};
use ql_core::{clone_trait_object, ensure, errors::Result, fail, Rate, Size, Time};

/// What the holder receives when exercising.
///
/// Corresponds to `QuantLib::MarketModelExerciseValue`.
pub trait ExerciseValue: Send + Sync {
    /// Number of exercise opportunities.
    fn number_of_exercises(&self) -> Size {
        self.is_exercise_time().iter().filter(|&&b| b).count()
    }

    /// Rate times and evolution times the value is observed on.
    fn evolution(&self) -> &EvolutionDescription;

    /// Payment times referenced by [`value`](Self::value).
    fn possible_cash_flow_times(&self) -> &[Time];

    /// Rewind to the first evolution step.
    fn reset(&mut self);

    /// Move past the next evolution step.
    fn next_step(&mut self, state: &dyn CurveState) -> Result<()>;

    /// For every evolution step, whether exercise is possible there.
    fn is_exercise_time(&self) -> &[bool];

    /// Exercise value at the step just taken.
    fn value(&self, state: &dyn CurveState) -> Result<CashFlow>;

    /// Deep copy, including the position within the current path.
    fn clone_box(&self) -> Box<dyn ExerciseValue>;
}

clone_trait_object!(ExerciseValue);

/// Decides whether to exercise.
///
/// Corresponds to `QuantLib::ExerciseStrategy<CurveState>`.
pub trait ExerciseStrategy: Send + Sync {
    /// Times at which exercise may happen.
    fn exercise_times(&self) -> &[Time];

    /// Times at which the strategy must observe the state (a superset of the
    /// exercise times).
    fn relevant_times(&self) -> &[Time];

    /// Rewind to the first relevant time.
    fn reset(&mut self);

    /// Observe the state at the next relevant time.
    fn next_step(&mut self, state: &dyn CurveState) -> Result<()>;

    /// Whether to exercise at the relevant time just observed.
    fn exercise(&self, state: &dyn CurveState) -> Result<bool>;

    /// Deep copy, including the position within the current path.
    fn clone_box(&self) -> Box<dyn ExerciseStrategy>;
}

clone_trait_object!(ExerciseStrategy);

fn reset_time_evolution(rate_times: &[Time]) -> Result<EvolutionDescription> {
    ensure!(rate_times.len() >= 2, "at least two rate times required");
    let n = rate_times.len() - 1;
    EvolutionDescription::new(rate_times.to_vec(), rate_times[..n].to_vec(), None, None)
}

fn last_step(current_index: Size) -> Result<Size> {
    match current_index.checked_sub(1) {
        Some(step) => Ok(step),
        None => fail!("no step taken yet: call next_step first"),
    }
}

/// Exercise into nothing: a zero payment at the reset time of the step.
///
/// Corresponds to `QuantLib::NothingExerciseValue`.
#[derive(Debug, Clone)]
pub struct NothingExerciseValue {
    evolution: EvolutionDescription,
    cash_flow_times: Vec<Time>,
    is_exercise_time: Vec<bool>,
    current_index: Size,
}

impl NothingExerciseValue {
    /// Exercise possible at the reset of every rate flagged in
    /// `is_exercise_time` (every rate when `None`).
    pub fn new(rate_times: &[Time], is_exercise_time: Option<Vec<bool>>) -> Result<Self> {
        let evolution = reset_time_evolution(rate_times)?;
        let steps = evolution.number_of_steps();
        let is_exercise_time = is_exercise_time.unwrap_or_else(|| vec![true; steps]);
        ensure!(
            is_exercise_time.len() == steps,
            "{} exercise flags given for {steps} rates",
            is_exercise_time.len()
        );
        Ok(Self {
            cash_flow_times: evolution.evolution_times().to_vec(),
            evolution,
            is_exercise_time,
            current_index: 0,
        })
    }
}

impl ExerciseValue for NothingExerciseValue {
    fn evolution(&self) -> &EvolutionDescription {
        &self.evolution
    }

    fn possible_cash_flow_times(&self) -> &[Time] {
        &self.cash_flow_times
    }

    fn reset(&mut self) {
        self.current_index = 0;
    }

    fn next_step(&mut self, _state: &dyn CurveState) -> Result<()> {
        self.current_index += 1;
        Ok(())
    }

    fn is_exercise_time(&self) -> &[bool] {
        &self.is_exercise_time
    }

    fn value(&self, _state: &dyn CurveState) -> Result<CashFlow> {
        Ok(CashFlow::new(last_step(self.current_index)?, 0.0))
    }

    fn clone_box(&self) -> Box<dyn ExerciseValue> {
        Box::new(self.clone())
    }
}

/// Exercise into a payer coterminal swap.
///
/// Exercising at the reset of rate `i` pays
/// `max(S_i - K_i, 0)·A_i` at `rate_times[i]`, with `S_i` the coterminal
/// swap rate and `A_i` its annuity in units of the bond maturing then.
///
/// Corresponds to `QuantLib::BermudanSwaptionExerciseValue`.
#[derive(Debug, Clone)]
pub struct BermudanSwaptionExerciseValue {
    evolution: EvolutionDescription,
    cash_flow_times: Vec<Time>,
    strikes: Vec<Rate>,
    is_exercise_time: Vec<bool>,
    current_index: Size,
}

impl BermudanSwaptionExerciseValue {
    /// One strike per rate; exercise is possible at every reset.
    pub fn new(rate_times: &[Time], strikes: Vec<Rate>) -> Result<Self> {
        let evolution = reset_time_evolution(rate_times)?;
        let steps = evolution.number_of_steps();
        ensure!(
            strikes.len() == steps,
            "{} strikes given for {steps} rates",
            strikes.len()
        );
        Ok(Self {
            cash_flow_times: evolution.evolution_times().to_vec(),
            evolution,
            strikes,
            is_exercise_time: vec![true; steps],
            current_index: 0,
        })
    }
}

impl ExerciseValue for BermudanSwaptionExerciseValue {
    fn evolution(&self) -> &EvolutionDescription {
        &self.evolution
    }

    fn possible_cash_flow_times(&self) -> &[Time] {
        &self.cash_flow_times
    }

    fn reset(&mut self) {
        self.current_index = 0;
    }

    fn next_step(&mut self, _state: &dyn CurveState) -> Result<()> {
        self.current_index += 1;
        Ok(())
    }

    fn is_exercise_time(&self) -> &[bool] {
        &self.is_exercise_time
    }

    fn value(&self, state: &dyn CurveState) -> Result<CashFlow> {
        let i = last_step(self.current_index)?;
        let swap_rate = state.coterminal_swap_rate(i)?;
        let annuity = state.coterminal_swap_annuity(i, i)?;
        Ok(CashFlow::new(
            i,
            (swap_rate - self.strikes[i]).max(0.0) * annuity,
        ))
    }

    fn clone_box(&self) -> Box<dyn ExerciseValue> {
        Box::new(self.clone())
    }
}

/// Exercise as soon as the coterminal swap rate reaches a trigger level.
///
/// At exercise time `t_k` the strategy looks at the coterminal swap rate
/// starting at the first rate time not before `t_k`.
///
/// Corresponds to `QuantLib::SwapRateTrigger`.
#[derive(Debug, Clone)]
pub struct SwapRateTrigger {
    rate_times: Vec<Time>,
    exercise_times: Vec<Time>,
    triggers: Vec<Rate>,
    rate_index: Vec<Size>,
    current_index: Size,
}

impl SwapRateTrigger {
    /// One trigger level per exercise time.
    pub fn new(rate_times: &[Time], triggers: Vec<Rate>, exercise_times: Vec<Time>) -> Result<Self> {
        ensure!(rate_times.len() >= 2, "at least two rate times required");
        check_increasing_times(&exercise_times, "exercise time")?;
        ensure!(
            triggers.len() == exercise_times.len(),
            "{} triggers given for {} exercise times",
            triggers.len(),
            exercise_times.len()
        );
        let n = rate_times.len() - 1;
        let rate_index: Vec<Size> = exercise_times
            .iter()
            .map(|&t| lower_index(rate_times, t))
            .collect();
        if let Some(&last) = rate_index.last() {
            ensure!(
                last < n,
                "exercise time {} is past the last reset time",
                exercise_times[exercise_times.len() - 1]
            );
        }
        Ok(Self {
            rate_times: rate_times.to_vec(),
            exercise_times,
            triggers,
            rate_index,
            current_index: 0,
        })
    }

    /// Rate times the trigger was set up on.
    pub fn rate_times(&self) -> &[Time] {
        &self.rate_times
    }
}

impl ExerciseStrategy for SwapRateTrigger {
    fn exercise_times(&self) -> &[Time] {
        &self.exercise_times
    }

    fn relevant_times(&self) -> &[Time] {
        &self.exercise_times
    }

    fn reset(&mut self) {
        self.current_index = 0;
    }

    fn next_step(&mut self, _state: &dyn CurveState) -> Result<()> {
        ensure!(
            self.current_index < self.exercise_times.len(),
            "all {} exercise times already observed",
            self.exercise_times.len()
        );
        self.current_index += 1;
        Ok(())
    }

    fn exercise(&self, state: &dyn CurveState) -> Result<bool> {
        let k = last_step(self.current_index)?;
        let swap_rate = state.coterminal_swap_rate(self.rate_index[k])?;
        Ok(swap_rate >= self.triggers[k])
    }

    fn clone_box(&self) -> Box<dyn ExerciseStrategy> {
        Box::new(self.clone())
    }
}
