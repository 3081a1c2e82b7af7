//! Duality upper bound for callable products (translates
//! `ql/models/marketmodels/callability/upperboundengine.hpp`).
//!
//! The engine prices the right to exchange an underlying product for a
//! rebate at the exercise dates.  A hedge product, hedge rebate and
//! exercise strategy describe an approximately optimal exercise policy.
//! Along every outer path the engine builds the Andersen–Broadie martingale
//! of that policy, estimating the continuation value at each exercise date
//! with inner paths started from the outer state, and records
//!
//! * the value realised by the policy (a lower bound), and
//! * `max_j (Z_j - M_j)` over the exercise dates, the duality correction.
//!
//! The upper bound is the sum of the two means; see [`upper_bound_estimate`].

use crate::{
    curve_state::CurveState,
    discounter::MarketModelDiscounter,
    evolution_description::check_compatibility,
    evolvers::{EvolverStatus, MarketModelEvolver},
    exercise::{ExerciseStrategy, ExerciseValue},
    products::{cash_flow_buffers, CashFlow, MultiProduct},
    utilities::is_in_subset,
};
use ql_core::{ensure, errors::Result, fail, Real, Size, Time};
use ql_math::SequenceStatistics;
use tracing::{debug, info};

// Step masks, numeraires and discounters shared by outer and inner paths.
struct ExerciseGrid {
    numeraires: Vec<Size>,
    is_exercise_time: Vec<bool>,
    is_strategy_time: Vec<bool>,
    underlying: Vec<MarketModelDiscounter>,
    rebate: Vec<MarketModelDiscounter>,
    hedge: Vec<MarketModelDiscounter>,
    hedge_rebate: Vec<MarketModelDiscounter>,
}

fn discounters(times: &[Time], rate_times: &[Time]) -> Result<Vec<MarketModelDiscounter>> {
    times
        .iter()
        .map(|&t| MarketModelDiscounter::new(t, rate_times))
        .collect()
}

// Sum of `flows` in units of the step numeraire, divided by `principal`.
fn deflate(
    flows: &[CashFlow],
    discounters: &[MarketModelDiscounter],
    state: &dyn CurveState,
    numeraire: Size,
    principal: Real,
) -> Result<Real> {
    flows.iter().try_fold(0.0, |acc, cf| {
        let bonds = discounters[cf.time_index].numeraire_bonds(state, numeraire)?;
        Ok(acc + cf.amount * bonds / principal)
    })
}

/// Andersen–Broadie upper bound engine.
///
/// Corresponds to `QuantLib::UpperBoundEngine`.
pub struct UpperBoundEngine {
    evolver: Box<dyn MarketModelEvolver>,
    inner_evolvers: Vec<Option<Box<dyn MarketModelEvolver>>>,
    underlying: Box<dyn MultiProduct>,
    rebate: Box<dyn ExerciseValue>,
    hedge: Box<dyn MultiProduct>,
    hedge_rebate: Box<dyn ExerciseValue>,
    strategy: Box<dyn ExerciseStrategy>,
    initial_numeraire_value: Real,
    grid: ExerciseGrid,
    underlying_flows: Vec<Vec<CashFlow>>,
    hedge_flows: Vec<Vec<CashFlow>>,
}

impl UpperBoundEngine {
    /// Engine for the option to swap `underlying` for `rebate`.
    ///
    /// `inner_evolvers` provide the inner simulations: the one starting at
    /// step `k + 1` (its `initial_step`) estimates continuation values at
    /// exercise step `k`.  Every exercise step except the last needs one.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        evolver: Box<dyn MarketModelEvolver>,
        inner_evolvers: Vec<Box<dyn MarketModelEvolver>>,
        underlying: Box<dyn MultiProduct>,
        rebate: Box<dyn ExerciseValue>,
        hedge: Box<dyn MultiProduct>,
        hedge_rebate: Box<dyn ExerciseValue>,
        strategy: Box<dyn ExerciseStrategy>,
        initial_numeraire_value: Real,
    ) -> Result<Self> {
        let evolution = evolver.evolution().clone();
        ensure!(
            evolver.current_step() == 0,
            "outer paths must start at step 0, evolver starts at {}",
            evolver.current_step()
        );
        check_compatibility(&evolution, underlying.evolution())?;
        check_compatibility(&evolution, rebate.evolution())?;
        check_compatibility(&evolution, hedge.evolution())?;
        check_compatibility(&evolution, hedge_rebate.evolution())?;
        ensure!(
            underlying.number_of_products() == 1 && hedge.number_of_products() == 1,
            "underlying and hedge must be single products"
        );
        ensure!(
            rebate.is_exercise_time() == hedge_rebate.is_exercise_time(),
            "rebate and hedge rebate have different exercise times"
        );

        let steps = evolution.number_of_steps();
        let times = evolution.evolution_times();
        let is_exercise_time = rebate.is_exercise_time().to_vec();
        ensure!(
            is_exercise_time.iter().any(|&b| b),
            "no exercise opportunity"
        );
        ensure!(
            is_in_subset(times, strategy.exercise_times()) == is_exercise_time,
            "strategy exercise times differ from those of the rebate"
        );
        let is_strategy_time = is_in_subset(times, strategy.relevant_times());
        ensure!(
            is_strategy_time.iter().filter(|&&b| b).count() == strategy.relevant_times().len(),
            "strategy relevant times must be evolution times"
        );

        let mut slots: Vec<Option<Box<dyn MarketModelEvolver>>> = (0..steps).map(|_| None).collect();
        for inner in inner_evolvers {
            let start = inner.current_step();
            ensure!(
                start > 0 && start < steps,
                "inner evolver starts at step {start}, expected 1..{steps}"
            );
            ensure!(slots[start].is_none(), "two inner evolvers start at step {start}");
            check_compatibility(&evolution, inner.evolution())?;
            ensure!(
                inner.numeraires() == evolver.numeraires(),
                "inner evolver starting at step {start} uses different numeraires"
            );
            slots[start] = Some(inner);
        }
        for k in (0..steps).filter(|&k| is_exercise_time[k]) {
            ensure!(
                k + 1 == steps || slots[k + 1].is_some(),
                "no inner evolver starting at step {} after exercise step {k}",
                k + 1
            );
        }

        let rate_times = evolution.rate_times();
        let grid = ExerciseGrid {
            numeraires: evolver.numeraires().to_vec(),
            is_exercise_time,
            is_strategy_time,
            underlying: discounters(underlying.possible_cash_flow_times(), rate_times)?,
            rebate: discounters(rebate.possible_cash_flow_times(), rate_times)?,
            hedge: discounters(hedge.possible_cash_flow_times(), rate_times)?,
            hedge_rebate: discounters(hedge_rebate.possible_cash_flow_times(), rate_times)?,
        };
        let underlying_flows = cash_flow_buffers(underlying.as_ref());
        let hedge_flows = cash_flow_buffers(hedge.as_ref());
        debug!(
            steps,
            exercises = grid.is_exercise_time.iter().filter(|&&b| b).count(),
            "upper bound engine set up"
        );
        Ok(Self {
            evolver,
            inner_evolvers: slots,
            underlying,
            rebate,
            hedge,
            hedge_rebate,
            strategy,
            initial_numeraire_value,
            grid,
            underlying_flows,
            hedge_flows,
        })
    }

    /// Simulate one outer path with `inner_paths` inner paths per exercise
    /// date; returns `(policy value, duality correction)`.
    pub fn single_path_value(&mut self, inner_paths: Size) -> Result<(Real, Real)> {
        ensure!(inner_paths > 0, "at least one inner path required");
        let Self {
            evolver,
            inner_evolvers,
            underlying,
            rebate,
            hedge,
            hedge_rebate,
            strategy,
            initial_numeraire_value,
            grid,
            underlying_flows,
            hedge_flows,
        } = self;

        underlying.reset();
        rebate.reset();
        hedge.reset();
        hedge_rebate.reset();
        strategy.reset();
        evolver.start_new_path()?;

        let steps = grid.numeraires.len();
        let (mut underlying_done, mut hedge_done) = (false, false);
        // values of the cash flows paid before the current step
        let (mut underlying_value, mut hedge_value) = (0.0, 0.0);
        let mut policy_value = None;
        let mut martingale: Option<Real> = None;
        let mut previous_hold = 0.0;
        let mut correction = Real::NEG_INFINITY;

        loop {
            let step = evolver.current_step();
            evolver.advance_step()?;
            let principal = evolver.numeraire_rebasing();
            let state = evolver.current_state();
            let numeraire = grid.numeraires[step];

            let mut paid_underlying = 0.0;
            if !underlying_done {
                underlying_done = underlying.next_time_step(state, underlying_flows)?;
                paid_underlying = deflate(&underlying_flows[0], &grid.underlying, state, numeraire, principal)?;
            }
            let mut paid_hedge = 0.0;
            if !hedge_done {
                hedge_done = hedge.next_time_step(state, hedge_flows)?;
                paid_hedge = deflate(&hedge_flows[0], &grid.hedge, state, numeraire, principal)?;
            }
            rebate.next_step(state)?;
            hedge_rebate.next_step(state)?;
            if grid.is_strategy_time[step] {
                strategy.next_step(state)?;
            }

            if grid.is_exercise_time[step] {
                let exercise_value =
                    deflate(&[rebate.value(state)?], &grid.rebate, state, numeraire, principal)?;
                let hedge_exercise_value = deflate(
                    &[hedge_rebate.value(state)?],
                    &grid.hedge_rebate,
                    state,
                    numeraire,
                    principal,
                )?;

                let continuation = if step + 1 < steps && !hedge_done {
                    let Some(inner) = inner_evolvers[step + 1].as_deref_mut() else {
                        fail!("no inner evolver starting at step {}", step + 1);
                    };
                    let value = continuation_value(
                        inner,
                        state,
                        hedge.as_ref(),
                        hedge_rebate.as_ref(),
                        strategy.as_ref(),
                        grid,
                        inner_paths,
                    )?;
                    let next_numeraire = grid.numeraires[step + 1];
                    value / (principal * state.discount_ratio(numeraire, next_numeraire)?)
                } else {
                    0.0
                };

                let hold = hedge_value + paid_hedge + continuation;
                let exercised = strategy.exercise(state)?;
                let policy = if exercised {
                    hedge_value + hedge_exercise_value
                } else {
                    hold
                };
                let m = match martingale {
                    None => policy,
                    Some(previous) => previous + policy - previous_hold,
                };
                martingale = Some(m);
                previous_hold = hold;
                correction = correction.max(underlying_value + exercise_value - m);
                if exercised && policy_value.is_none() {
                    policy_value = Some(hedge_value + hedge_exercise_value);
                }
            }

            underlying_value += paid_underlying;
            hedge_value += paid_hedge;
            if evolver.status() == EvolverStatus::Done {
                break;
            }
        }

        let lower = policy_value.unwrap_or(hedge_value);
        Ok((lower * *initial_numeraire_value, correction * *initial_numeraire_value))
    }

    /// Simulate `outer_paths` outer paths, adding `(policy value,
    /// correction)` pairs to `stats`.
    pub fn multiple_path_values(
        &mut self,
        stats: &mut SequenceStatistics,
        outer_paths: Size,
        inner_paths: Size,
    ) -> Result<()> {
        ensure!(
            stats.size() == 2,
            "statistics of dimension {} given, 2 required",
            stats.size()
        );
        for _ in 0..outer_paths {
            let (lower, correction) = self.single_path_value(inner_paths)?;
            stats.add(&[lower, correction])?;
        }
        info!(
            outer_paths,
            inner_paths,
            estimate = ?upper_bound_estimate(stats),
            "upper bound paths simulated"
        );
        Ok(())
    }
}

// Mean value, in units of the inner evolver's numeraire at its first step,
// of following the hedge policy from the step after `start`.
fn continuation_value(
    inner: &mut dyn MarketModelEvolver,
    start: &dyn CurveState,
    hedge: &dyn MultiProduct,
    hedge_rebate: &dyn ExerciseValue,
    strategy: &dyn ExerciseStrategy,
    grid: &ExerciseGrid,
    paths: Size,
) -> Result<Real> {
    inner.set_initial_state(start)?;
    let mut flows = cash_flow_buffers(hedge);
    let mut total = 0.0;
    for _ in 0..paths {
        let mut hedge = hedge.clone_box();
        let mut rebate = hedge_rebate.clone_box();
        let mut strategy = strategy.clone_box();
        inner.start_new_path()?;
        loop {
            let step = inner.current_step();
            inner.advance_step()?;
            let principal = inner.numeraire_rebasing();
            let state = inner.current_state();
            let numeraire = grid.numeraires[step];

            rebate.next_step(state)?;
            if grid.is_strategy_time[step] {
                strategy.next_step(state)?;
            }
            if grid.is_exercise_time[step] && strategy.exercise(state)? {
                total += deflate(&[rebate.value(state)?], &grid.hedge_rebate, state, numeraire, principal)?;
                break;
            }
            let done = hedge.next_time_step(state, &mut flows)?;
            total += deflate(&flows[0], &grid.hedge, state, numeraire, principal)?;
            if done || inner.status() == EvolverStatus::Done {
                break;
            }
        }
    }
    Ok(total / paths as Real)
}

/// `(lower bound, upper bound)` from statistics filled by
/// [`UpperBoundEngine::multiple_path_values`].
pub fn upper_bound_estimate(stats: &SequenceStatistics) -> Option<(Real, Real)> {
    let mean = stats.mean()?;
    Some((mean[0], mean[0] + mean[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        brownian_generators::{BrownianGeneratorFactory, MtBrownianGeneratorFactory},
        correlation_model::{CorrelationModel, CorrelationStructure},
        evolution_description::EvolutionDescription,
        evolvers::{EvolverConfig, ForwardRateEvolver},
        exercise::{BermudanSwaptionExerciseValue, SwapRateTrigger},
        market_model::MarketModel,
        products::MultiStepNothing,
    };
    use approx::assert_relative_eq;
    use ql_core::Rate;
    use std::sync::Arc;

    const RATE_TIMES: [Time; 5] = [0.5, 1.0, 1.5, 2.0, 2.5];
    const FORWARDS: [Real; 4] = [0.035, 0.042, 0.046, 0.05];
    const STRIKE: Real = 0.04;

    fn model(vol: Real) -> Arc<dyn MarketModel> {
        let evolution =
            EvolutionDescription::new(RATE_TIMES.to_vec(), RATE_TIMES[..4].to_vec(), None, None).unwrap();
        Arc::new(
            CorrelationModel::new(
                evolution,
                vec![vol; 4],
                CorrelationStructure::Exponential {
                    long_term_correlation: 0.4,
                    beta: 0.3,
                },
                FORWARDS.to_vec(),
                2,
            )
            .unwrap(),
        )
    }

    fn evolver(model: &Arc<dyn MarketModel>, initial_step: Size, seed: u64) -> Box<dyn MarketModelEvolver> {
        let generator = MtBrownianGeneratorFactory::new(seed)
            .for_stream(initial_step as u64)
            .create(2, 4);
        let config = EvolverConfig::default().with_initial_step(initial_step);
        Box::new(ForwardRateEvolver::new(model.clone(), generator, config).unwrap())
    }

    fn engine(vol: Real, trigger: Rate) -> UpperBoundEngine {
        let m = model(vol);
        let nothing = MultiStepNothing::over(m.evolution().clone(), 1).unwrap();
        let rebate = BermudanSwaptionExerciseValue::new(&RATE_TIMES, vec![STRIKE; 4]).unwrap();
        let strategy = SwapRateTrigger::new(&RATE_TIMES, vec![trigger; 4], RATE_TIMES[..4].to_vec()).unwrap();
        let v0 = 1.0 / FORWARDS.iter().map(|f| 1.0 + 0.5 * f).product::<Real>();
        UpperBoundEngine::new(
            evolver(&m, 0, 11),
            (1..4).map(|k| evolver(&m, k, 11)).collect(),
            Box::new(nothing.clone()),
            Box::new(rebate.clone()),
            Box::new(nothing),
            Box::new(rebate),
            Box::new(strategy),
            v0,
        )
        .unwrap()
    }

    // Today's value of exercising at every reset on the frozen curve.
    fn intrinsic_values() -> Vec<Real> {
        let mut bonds = vec![1.0];
        for f in FORWARDS {
            let last = bonds[bonds.len() - 1];
            bonds.push(last / (1.0 + 0.5 * f));
        }
        (0..4)
            .map(|i| {
                let annuity: Real = (i..4).map(|j| 0.5 * bonds[j + 1]).sum();
                let swap_rate = (bonds[i] - bonds[4]) / annuity;
                (swap_rate - STRIKE).max(0.0) * annuity
            })
            .collect()
    }

    #[test]
    fn never_exercising_gives_the_perfect_foresight_bound() {
        let mut engine = engine(0.0, 1.0);
        let (lower, correction) = engine.single_path_value(2).unwrap();
        let best = intrinsic_values().into_iter().fold(0.0, Real::max);
        assert_eq!(lower, 0.0);
        assert_relative_eq!(correction, best, epsilon = 1e-12);
    }

    #[test]
    fn immediate_exercise_uses_inner_continuation_values() {
        let mut engine = engine(0.0, 0.0);
        let values = intrinsic_values();
        let (lower, correction) = engine.single_path_value(3).unwrap();
        assert_relative_eq!(lower, values[0], epsilon = 1e-12);
        let best = values.iter().copied().fold(0.0, Real::max);
        assert_relative_eq!(correction, best - values[0], epsilon = 1e-12);
    }

    #[test]
    fn outer_paths_feed_both_estimates() {
        let mut engine = engine(0.2, 0.045);
        let mut stats = SequenceStatistics::new(2);
        engine.multiple_path_values(&mut stats, 50, 20).unwrap();
        assert_eq!(stats.samples(), 50);
        let (lower, upper) = upper_bound_estimate(&stats).unwrap();
        assert!(lower > 0.0);
        assert!(upper.is_finite());
    }

    #[test]
    fn missing_inner_evolvers_are_rejected() {
        let m = model(0.1);
        let nothing = MultiStepNothing::over(m.evolution().clone(), 1).unwrap();
        let rebate = BermudanSwaptionExerciseValue::new(&RATE_TIMES, vec![STRIKE; 4]).unwrap();
        let strategy = SwapRateTrigger::new(&RATE_TIMES, vec![0.05; 4], RATE_TIMES[..4].to_vec()).unwrap();
        let result = UpperBoundEngine::new(
            evolver(&m, 0, 1),
            vec![evolver(&m, 1, 1)],
            Box::new(nothing.clone()),
            Box::new(rebate.clone()),
            Box::new(nothing),
            Box::new(rebate),
            Box::new(strategy),
            1.0,
        );
        assert!(result.is_err());
    }
}
