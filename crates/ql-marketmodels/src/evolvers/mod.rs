//! Path evolution of a market model (translates
//! `ql/models/marketmodels/evolver.hpp` and `ql/models/marketmodels/evolvers/`).
//!
//! An evolver owns everything mutable about one Monte Carlo path: the
//! current curve state, the Brownian generator, drift scratch space and the
//! numeraire rebasing factor.  It moves through
//!
//! ```text
//! Uninitialized --set_initial_state--> Ready --start_new_path--> Stepping --...--> Done
//! ```
//!
//! Evolvers starting at step zero are `Ready` as soon as they are built;
//! evolvers starting later need an initial state first.

mod coterminal_swap_rate;
mod forward_rate;

pub use coterminal_swap_rate::CoterminalSwapRateEvolver;
pub use forward_rate::ForwardRateEvolver;

use crate::{
    brownian_generators::BrownianGenerator,
    curve_state::CurveState,
    drift_computation::{DriftMethod, RateDynamics},
    evolution_description::EvolutionDescription,
    market_model::MarketModel,
};
use ql_core::{
    ensure,
    errors::{Error, Result},
    Real, Size,
};
use ql_math::Matrix;

/// Discretisation of the rate SDE over one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvolutionScheme {
    /// Drift frozen at the start of the step.
    #[default]
    Euler,
    /// Drift averaged between the start of the step and an Euler predictor.
    PredictorCorrector,
}

/// How an evolver is set up.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvolverConfig {
    /// Time-stepping scheme.
    pub scheme: EvolutionScheme,
    /// Drift algorithm.
    pub drift: DriftMethod,
    /// Rate dynamics (only lognormal is available for swap rates).
    pub dynamics: RateDynamics,
    /// Per-step numeraires overriding the model's.
    pub numeraires: Option<Vec<Size>>,
    /// First step simulated by every path.
    pub initial_step: Size,
}

impl EvolverConfig {
    /// Set the time-stepping scheme.
    pub fn with_scheme(mut self, scheme: EvolutionScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Set the drift algorithm.
    pub fn with_drift_method(mut self, drift: DriftMethod) -> Self {
        self.drift = drift;
        self
    }

    /// Set the rate dynamics.
    pub fn with_dynamics(mut self, dynamics: RateDynamics) -> Self {
        self.dynamics = dynamics;
        self
    }

    /// Override the numeraires.
    pub fn with_numeraires(mut self, numeraires: Vec<Size>) -> Self {
        self.numeraires = Some(numeraires);
        self
    }

    /// Start paths at `initial_step` (the initial state must then be set
    /// explicitly).
    pub fn with_initial_step(mut self, initial_step: Size) -> Self {
        self.initial_step = initial_step;
        self
    }
}

/// Lifecycle of an evolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvolverStatus {
    /// Waiting for an initial state.
    Uninitialized,
    /// Initial state known, no path started.
    Ready,
    /// A path is being simulated.
    Stepping,
    /// Every step of the current path has been simulated.
    Done,
}

/// Simulates paths of a market model one step at a time.
///
/// Corresponds to `QuantLib::MarketModelEvolver`.
pub trait MarketModelEvolver: Send {
    /// Numeraire index used at every step.
    fn numeraires(&self) -> &[Size];

    /// Evolution description (with the numeraires above).
    fn evolution(&self) -> &EvolutionDescription;

    /// Reset per-path state and begin a path; returns the initial numeraire
    /// rebasing (always `1`).
    fn start_new_path(&mut self) -> Result<Real>;

    /// Simulate the next step and return the numeraire rebasing ratio
    /// `P_{N_{k-1}} / P_{N_k}` applied at this step.
    fn advance_step(&mut self) -> Result<Real>;

    /// Index of the next step to simulate.
    fn current_step(&self) -> Size;

    /// State at the end of the last simulated step.
    fn current_state(&self) -> &dyn CurveState;

    /// Start every subsequent path from `state` (rates below its first
    /// valid index are ignored).
    fn set_initial_state(&mut self, state: &dyn CurveState) -> Result<()>;

    /// Units of the current numeraire bond worth one unit of the initial
    /// numeraire bond on the current path.
    fn numeraire_rebasing(&self) -> Real;

    /// Lifecycle position.
    fn status(&self) -> EvolverStatus;
}

// Step cursor and rebasing bookkeeping shared by the evolvers.
#[derive(Debug, Clone)]
struct PathCursor {
    status: EvolverStatus,
    initial_step: Size,
    steps: Size,
    current_step: Size,
    rebasing: Real,
}

impl PathCursor {
    fn new(initial_step: Size, steps: Size) -> Self {
        Self {
            status: if initial_step == 0 {
                EvolverStatus::Ready
            } else {
                EvolverStatus::Uninitialized
            },
            initial_step,
            steps,
            current_step: initial_step,
            rebasing: 1.0,
        }
    }

    fn initialized(&mut self) {
        self.status = EvolverStatus::Ready;
        self.current_step = self.initial_step;
        self.rebasing = 1.0;
    }

    fn begin_path(&mut self) -> Result<()> {
        if self.status == EvolverStatus::Uninitialized {
            ql_core::fail!(
                "initial state must be set before paths can start at step {}",
                self.initial_step
            );
        }
        self.current_step = self.initial_step;
        self.rebasing = 1.0;
        self.status = if self.initial_step < self.steps {
            EvolverStatus::Stepping
        } else {
            EvolverStatus::Done
        };
        Ok(())
    }

    fn check_can_advance(&self) -> Result<()> {
        match self.status {
            EvolverStatus::Stepping => Ok(()),
            EvolverStatus::Done => Err(Error::StepOutOfOrder {
                requested: self.current_step,
                current: self.current_step.saturating_sub(1),
            }),
            EvolverStatus::Ready | EvolverStatus::Uninitialized => {
                ql_core::fail!("no path started: call start_new_path first")
            }
        }
    }

    fn finish_step(&mut self) {
        self.current_step += 1;
        if self.current_step == self.steps {
            self.status = EvolverStatus::Done;
        }
    }
}

// Checks every evolver performs on construction; returns the evolution
// description carrying the numeraires in use.
fn check_evolver_setup(
    model: &dyn MarketModel,
    generator: &dyn BrownianGenerator,
    config: &EvolverConfig,
) -> Result<EvolutionDescription> {
    let evolution = match &config.numeraires {
        Some(numeraires) => model.evolution().with_numeraires(numeraires.clone())?,
        None => model.evolution().clone(),
    };
    let steps = evolution.number_of_steps();
    ensure!(
        config.initial_step < steps,
        "initial step ({}) must be below the number of steps ({steps})",
        config.initial_step
    );
    ensure!(
        generator.number_of_factors() == model.number_of_factors(),
        "generator has {} factors, model has {}",
        generator.number_of_factors(),
        model.number_of_factors()
    );
    ensure!(
        generator.number_of_steps() == steps - config.initial_step,
        "generator has {} steps, {} required",
        generator.number_of_steps(),
        steps - config.initial_step
    );
    Ok(evolution)
}

// Drift correction of displaced log-rates: -σ²/2 per alive rate.
fn fixed_drifts(root: &Matrix) -> Vec<Real> {
    (0..root.rows())
        .map(|i| {
            let variance: Real = (0..root.cols()).map(|f| root[(i, f)] * root[(i, f)]).sum();
            -0.5 * variance
        })
        .collect()
}
