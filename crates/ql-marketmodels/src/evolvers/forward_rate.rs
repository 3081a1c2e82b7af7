//! Forward-rate evolver (translates
//! `ql/models/marketmodels/evolvers/lognormalfwdrateeuler.hpp`,
//! `lognormalfwdratepc.hpp` and `normalfwdratepc.hpp`).

use super::{
    check_evolver_setup, fixed_drifts, EvolutionScheme, EvolverConfig, EvolverStatus,
    MarketModelEvolver, PathCursor,
};
use crate::{
    brownian_generators::BrownianGenerator,
    curve_state::{CurveState, LmmCurveState},
    drift_computation::{LmmDriftCalculator, RateDynamics},
    evolution_description::EvolutionDescription,
    market_model::MarketModel,
};
use ql_core::{ensure, errors::Result, Rate, Real, Size, Spread};
use std::sync::Arc;
use tracing::trace;

/// Evolves forward rates step by step.
///
/// Lognormal dynamics evolve `x_i = log(f_i + d_i)`:
///
/// ```text
/// x_i += μ_i + (-½ C_ii) + A_i · z
/// ```
///
/// with `μ` from an [`LmmDriftCalculator`], `A` the step pseudo-root and `z`
/// the Brownian increments.  Normal dynamics evolve `f_i` additively without
/// the convexity term.  The predictor-corrector scheme replaces `μ` by the
/// average of the drifts at the start of the step and at the Euler
/// prediction.
///
/// Corresponds to `QuantLib::LogNormalFwdRateEuler`,
/// `QuantLib::LogNormalFwdRatePc` and `QuantLib::NormalFwdRatePc`.
pub struct ForwardRateEvolver {
    model: Arc<dyn MarketModel>,
    evolution: EvolutionDescription,
    scheme: EvolutionScheme,
    dynamics: RateDynamics,
    generator: Box<dyn BrownianGenerator>,
    calculators: Vec<LmmDriftCalculator>,
    fixed_drifts: Vec<Vec<Real>>,
    displacements: Vec<Spread>,
    initial_forwards: Vec<Rate>,
    initial_first: Size,
    cursor: PathCursor,
    // per-path state
    forwards: Vec<Rate>,
    state_variables: Vec<Real>,
    drifts1: Vec<Real>,
    drifts2: Vec<Real>,
    brownians: Vec<Real>,
    curve_state: LmmCurveState,
}

impl ForwardRateEvolver {
    /// Evolver for `model` driven by `generator`.
    ///
    /// The generator must produce `number_of_factors` increments for each
    /// step from `config.initial_step` on.
    pub fn new(
        model: Arc<dyn MarketModel>,
        generator: Box<dyn BrownianGenerator>,
        config: EvolverConfig,
    ) -> Result<Self> {
        let evolution = check_evolver_setup(model.as_ref(), generator.as_ref(), &config)?;
        let n = evolution.number_of_rates();
        let steps = evolution.number_of_steps();
        let displacements = model.displacements().to_vec();

        let mut calculators = Vec::with_capacity(steps);
        let mut fixed = Vec::with_capacity(steps);
        for step in 0..steps {
            let root = model.pseudo_root(step)?;
            calculators.push(LmmDriftCalculator::new(
                root,
                &displacements,
                evolution.rate_taus(),
                evolution.numeraires()[step],
                evolution.first_alive_rate()[step],
                config.dynamics,
                config.drift,
            )?);
            fixed.push(match config.dynamics {
                RateDynamics::Lognormal => fixed_drifts(root),
                RateDynamics::Normal => vec![0.0; n],
            });
        }

        let initial_forwards = model.initial_rates().to_vec();
        if config.dynamics == RateDynamics::Lognormal {
            check_displaced_rates(&initial_forwards, &displacements, 0)?;
        }
        let factors = model.number_of_factors();
        let curve_state = LmmCurveState::new(evolution.rate_times())?;

        Ok(Self {
            cursor: PathCursor::new(config.initial_step, steps),
            model,
            scheme: config.scheme,
            dynamics: config.dynamics,
            generator,
            calculators,
            fixed_drifts: fixed,
            displacements,
            forwards: initial_forwards.clone(),
            initial_forwards,
            initial_first: 0,
            state_variables: vec![0.0; n],
            drifts1: vec![0.0; n],
            drifts2: vec![0.0; n],
            brownians: vec![0.0; factors],
            curve_state,
            evolution,
        })
    }

    fn refresh_forwards(&mut self, alive: Size) {
        for i in alive..self.forwards.len() {
            self.forwards[i] = to_rate(self.dynamics, self.state_variables[i], self.displacements[i]);
        }
    }
}

impl MarketModelEvolver for ForwardRateEvolver {
    fn numeraires(&self) -> &[Size] {
        self.evolution.numeraires()
    }

    fn evolution(&self) -> &EvolutionDescription {
        &self.evolution
    }

    fn start_new_path(&mut self) -> Result<Real> {
        self.cursor.begin_path()?;
        self.generator.next_path();
        let first = self.initial_first;
        self.forwards[first..].copy_from_slice(&self.initial_forwards[first..]);
        for i in first..self.forwards.len() {
            self.state_variables[i] = from_rate(self.dynamics, self.forwards[i], self.displacements[i]);
        }
        self.curve_state.set_on_forward_rates(&self.forwards, first)?;
        trace!(initial_step = self.cursor.initial_step, "forward-rate path started");
        Ok(1.0)
    }

    fn advance_step(&mut self) -> Result<Real> {
        self.cursor.check_can_advance()?;
        let step = self.cursor.current_step;
        let alive = self.evolution.first_alive_rate()[step];

        // the numeraire may change between steps: rebase on the state the
        // previous step left behind
        let ratio = if step > self.cursor.initial_step {
            let numeraires = self.evolution.numeraires();
            self.curve_state
                .discount_ratio(numeraires[step - 1], numeraires[step])?
        } else {
            1.0
        };
        self.cursor.rebasing *= ratio;

        self.calculators[step].compute(&self.curve_state, &mut self.drifts1);
        self.generator.next_step(&mut self.brownians)?;
        let root = self.model.pseudo_root(step)?;
        let fixed = &self.fixed_drifts[step];
        for i in alive..self.forwards.len() {
            self.state_variables[i] +=
                self.drifts1[i] + fixed[i] + root.row_dot(i, &self.brownians);
        }
        self.refresh_forwards(alive);

        if self.scheme == EvolutionScheme::PredictorCorrector {
            self.calculators[step].compute_from_rates(&self.forwards, &mut self.drifts2);
            for i in alive..self.forwards.len() {
                self.state_variables[i] += 0.5 * (self.drifts2[i] - self.drifts1[i]);
            }
            self.refresh_forwards(alive);
        }

        self.curve_state.set_on_forward_rates(&self.forwards, alive)?;
        self.cursor.finish_step();
        Ok(ratio)
    }

    fn current_step(&self) -> Size {
        self.cursor.current_step
    }

    fn current_state(&self) -> &dyn CurveState {
        &self.curve_state
    }

    fn set_initial_state(&mut self, state: &dyn CurveState) -> Result<()> {
        ensure!(
            state.rate_times() == self.evolution.rate_times(),
            "initial state has different rate times"
        );
        let first = state.first_valid_index()?;
        let alive = self.evolution.first_alive_rate()[self.cursor.initial_step];
        ensure!(
            first <= alive,
            "initial state starts at rate {first}, rate {alive} is needed"
        );
        let forwards = state.forward_rates();
        if self.dynamics == RateDynamics::Lognormal {
            check_displaced_rates(forwards, &self.displacements, first)?;
        }
        self.initial_forwards[first..].copy_from_slice(&forwards[first..]);
        self.initial_first = first;
        self.cursor.initialized();
        Ok(())
    }

    fn numeraire_rebasing(&self) -> Real {
        self.cursor.rebasing
    }

    fn status(&self) -> EvolverStatus {
        self.cursor.status
    }
}

#[inline]
fn from_rate(dynamics: RateDynamics, rate: Rate, displacement: Spread) -> Real {
    match dynamics {
        RateDynamics::Lognormal => (rate + displacement).ln(),
        RateDynamics::Normal => rate,
    }
}

#[inline]
fn to_rate(dynamics: RateDynamics, x: Real, displacement: Spread) -> Rate {
    match dynamics {
        RateDynamics::Lognormal => x.exp() - displacement,
        RateDynamics::Normal => x,
    }
}

pub(super) fn check_displaced_rates(rates: &[Rate], displacements: &[Spread], first: Size) -> Result<()> {
    for i in first..rates.len() {
        ensure!(
            rates[i] + displacements[i] > 0.0,
            "rate {i} plus displacement ({} + {}) must be positive",
            rates[i],
            displacements[i]
        );
    }
    Ok(())
}
