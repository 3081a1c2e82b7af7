//! Coterminal swap-rate evolver (translates
//! `ql/models/marketmodels/evolvers/lognormalcotswapratepc.hpp`).

use super::{
    check_evolver_setup, fixed_drifts, forward_rate::check_displaced_rates, EvolutionScheme,
    EvolverConfig, EvolverStatus, MarketModelEvolver, PathCursor,
};
use crate::{
    brownian_generators::BrownianGenerator,
    curve_state::{CoterminalSwapCurveState, CurveState},
    drift_computation::{RateDynamics, SmmDriftCalculator},
    evolution_description::EvolutionDescription,
    market_model::MarketModel,
};
use ql_core::{ensure, errors::Result, Rate, Real, Size, Spread};
use std::sync::Arc;
use tracing::trace;

/// Evolves displaced-lognormal coterminal swap rates.
///
/// The model's initial rates and pseudo-roots are read as coterminal swap
/// rates and their factor loadings, e.g. those of a
/// [`FwdToCotSwapAdapter`](crate::adapters::FwdToCotSwapAdapter).
///
/// Corresponds to `QuantLib::LogNormalCotSwapRatePc`, with an Euler variant.
pub struct CoterminalSwapRateEvolver {
    model: Arc<dyn MarketModel>,
    evolution: EvolutionDescription,
    scheme: EvolutionScheme,
    generator: Box<dyn BrownianGenerator>,
    calculators: Vec<SmmDriftCalculator>,
    fixed_drifts: Vec<Vec<Real>>,
    displacements: Vec<Spread>,
    initial_swap_rates: Vec<Rate>,
    initial_first: Size,
    cursor: PathCursor,
    swap_rates: Vec<Rate>,
    log_swap_rates: Vec<Real>,
    drifts1: Vec<Real>,
    drifts2: Vec<Real>,
    brownians: Vec<Real>,
    curve_state: CoterminalSwapCurveState,
    // holds the predicted rates of a predictor-corrector step
    predicted_state: CoterminalSwapCurveState,
}

impl CoterminalSwapRateEvolver {
    /// Evolver for `model` driven by `generator`; only lognormal dynamics
    /// are supported.
    pub fn new(
        model: Arc<dyn MarketModel>,
        generator: Box<dyn BrownianGenerator>,
        config: EvolverConfig,
    ) -> Result<Self> {
        ensure!(
            config.dynamics == RateDynamics::Lognormal,
            "swap-rate evolution requires lognormal dynamics"
        );
        let evolution = check_evolver_setup(model.as_ref(), generator.as_ref(), &config)?;
        let n = evolution.number_of_rates();
        let steps = evolution.number_of_steps();
        let displacements = model.displacements().to_vec();

        let mut calculators = Vec::with_capacity(steps);
        let mut fixed = Vec::with_capacity(steps);
        for step in 0..steps {
            let root = model.pseudo_root(step)?;
            calculators.push(SmmDriftCalculator::new(
                root,
                &displacements,
                evolution.rate_taus(),
                evolution.numeraires()[step],
                evolution.first_alive_rate()[step],
                config.drift,
            )?);
            fixed.push(fixed_drifts(root));
        }

        let initial_swap_rates = model.initial_rates().to_vec();
        check_displaced_rates(&initial_swap_rates, &displacements, 0)?;
        let factors = model.number_of_factors();
        let curve_state = CoterminalSwapCurveState::new(evolution.rate_times())?;

        Ok(Self {
            cursor: PathCursor::new(config.initial_step, steps),
            model,
            scheme: config.scheme,
            generator,
            calculators,
            fixed_drifts: fixed,
            displacements,
            swap_rates: initial_swap_rates.clone(),
            initial_swap_rates,
            initial_first: 0,
            log_swap_rates: vec![0.0; n],
            drifts1: vec![0.0; n],
            drifts2: vec![0.0; n],
            brownians: vec![0.0; factors],
            predicted_state: curve_state.clone(),
            curve_state,
            evolution,
        })
    }

    fn refresh_swap_rates(&mut self, alive: Size) {
        for i in alive..self.swap_rates.len() {
            self.swap_rates[i] = self.log_swap_rates[i].exp() - self.displacements[i];
        }
    }
}

impl MarketModelEvolver for CoterminalSwapRateEvolver {
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
        self.swap_rates[first..].copy_from_slice(&self.initial_swap_rates[first..]);
        for i in first..self.swap_rates.len() {
            self.log_swap_rates[i] = (self.swap_rates[i] + self.displacements[i]).ln();
        }
        self.curve_state
            .set_on_coterminal_swap_rates(&self.swap_rates, first)?;
        trace!(initial_step = self.cursor.initial_step, "swap-rate path started");
        Ok(1.0)
    }

    fn advance_step(&mut self) -> Result<Real> {
        self.cursor.check_can_advance()?;
        let step = self.cursor.current_step;
        let alive = self.evolution.first_alive_rate()[step];

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
        for i in alive..self.swap_rates.len() {
            self.log_swap_rates[i] +=
                self.drifts1[i] + fixed[i] + root.row_dot(i, &self.brownians);
        }
        self.refresh_swap_rates(alive);

        if self.scheme == EvolutionScheme::PredictorCorrector {
            self.predicted_state
                .set_on_coterminal_swap_rates(&self.swap_rates, alive)?;
            self.calculators[step].compute(&self.predicted_state, &mut self.drifts2);
            for i in alive..self.swap_rates.len() {
                self.log_swap_rates[i] += 0.5 * (self.drifts2[i] - self.drifts1[i]);
            }
            self.refresh_swap_rates(alive);
        }

        self.curve_state
            .set_on_coterminal_swap_rates(&self.swap_rates, alive)?;
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
        let mut rates = vec![0.0; self.initial_swap_rates.len()];
        for (i, rate) in rates.iter_mut().enumerate().skip(first) {
            *rate = state.coterminal_swap_rate(i)?;
        }
        check_displaced_rates(&rates, &self.displacements, first)?;
        self.initial_swap_rates[first..].copy_from_slice(&rates[first..]);
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
