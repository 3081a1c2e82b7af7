//! # ql-marketmodels
//!
//! Multi-factor LIBOR and coterminal-swap market models simulated by Monte
//! Carlo (translates `ql/models/marketmodels/`).
//!
//! A simulation is assembled from
//!
//! * an [`EvolutionDescription`] fixing rate times, evolution times and the
//!   numeraire of every step,
//! * a [`MarketModel`] supplying per-step pseudo-roots of the rate
//!   covariance (usually a [`CorrelationModel`]),
//! * an evolver ([`ForwardRateEvolver`] or [`CoterminalSwapRateEvolver`])
//!   that advances a [`CurveState`] one step at a time, with drifts from
//!   [`LmmDriftCalculator`] / [`SmmDriftCalculator`],
//! * products implementing [`MultiProduct`], possibly combined into
//!   composites or made callable,
//! * an engine: [`AccountingEngine`] for plain valuation and
//!   [`UpperBoundEngine`] for duality upper bounds of callable products.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use ql_marketmodels::{
//!     AccountingEngine, BrownianGeneratorFactory, CorrelationModel, CorrelationStructure,
//!     EvolutionDescription, EvolverConfig, ForwardRateEvolver, MtBrownianGeneratorFactory,
//!     MultiStepCaplets,
//! };
//! use ql_math::SequenceStatistics;
//!
//! let rate_times = vec![0.5, 1.0, 1.5, 2.0];
//! let evolution = EvolutionDescription::new(rate_times.clone(), vec![0.5, 1.0, 1.5], None, None)?;
//! let model = Arc::new(CorrelationModel::new(
//!     evolution,
//!     vec![0.2; 3],
//!     CorrelationStructure::Exponential { long_term_correlation: 0.5, beta: 0.2 },
//!     vec![0.03; 3],
//!     2,
//! )?);
//! let generator = MtBrownianGeneratorFactory::new(42).create(2, 3);
//! let evolver = ForwardRateEvolver::new(model, generator, EvolverConfig::default())?;
//! let caplets = MultiStepCaplets::new(&rate_times, vec![0.5; 3], vec![1.0, 1.5, 2.0], vec![0.03; 3])?;
//!
//! let terminal_bond = 1.0 / 1.015_f64.powi(3);
//! let mut engine = AccountingEngine::new(Box::new(evolver), Box::new(caplets), terminal_bond)?;
//! let mut stats = SequenceStatistics::new(3);
//! engine.multiple_path_values(&mut stats, 100)?;
//! assert_eq!(stats.samples(), 100);
//! # Ok::<(), ql_core::Error>(())
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

// ── Modules ───────────────────────────────────────────────────────────────────

/// Accounting engine and path-parallel valuation.
pub mod accounting_engine;

/// Re-expression of a forward-rate model in the coterminal-swap basis.
pub mod adapters;

/// Brownian increment generators.
pub mod brownian_generators;

/// Exponential-kernel and user-supplied correlation models.
pub mod correlation_model;

/// Curve states.
pub mod curve_state;

/// Cash-flow discounting between rate times.
pub mod discounter;

/// Drift calculators for forward and coterminal swap rates.
pub mod drift_computation;

/// Rate times, evolution times and numeraires.
pub mod evolution_description;

/// Evolvers.
pub mod evolvers;

/// Exercise values and strategies.
pub mod exercise;

/// The market-model interface.
pub mod market_model;

/// Products.
pub mod products;

/// Jacobians between coterminal swap rates and forward rates.
pub mod swap_forward_mappings;

/// Duality upper bound engine.
pub mod upper_bound_engine;

/// Time-grid helpers.
pub mod utilities;

// ── Convenience re-exports ────────────────────────────────────────────────────

pub use accounting_engine::{parallel_path_values, AccountingEngine, ParallelConfig};
pub use adapters::FwdToCotSwapAdapter;
pub use brownian_generators::{
    BrownianGenerator, BrownianGeneratorFactory, FixedBrownianGenerator, MtBrownianGenerator,
    MtBrownianGeneratorFactory,
};
pub use correlation_model::{CorrelationModel, CorrelationModelBuilder, CorrelationStructure};
pub use curve_state::{CoterminalSwapCurveState, CurveState, LmmCurveState};
pub use discounter::MarketModelDiscounter;
pub use drift_computation::{DriftMethod, LmmDriftCalculator, RateDynamics, SmmDriftCalculator};
pub use evolution_description::{
    check_compatibility, money_market_measure, money_market_plus_measure, terminal_measure,
    EvolutionDescription,
};
pub use evolvers::{
    CoterminalSwapRateEvolver, EvolutionScheme, EvolverConfig, EvolverStatus, ForwardRateEvolver,
    MarketModelEvolver,
};
pub use exercise::{
    BermudanSwaptionExerciseValue, ExerciseStrategy, ExerciseValue, NothingExerciseValue,
    SwapRateTrigger,
};
pub use market_model::MarketModel;
pub use products::{
    cash_flow_buffers, Aggregation, CallSpecifiedMultiProduct, CashFlow, CompositeBuilder,
    ExerciseAdapter, MultiProduct, MultiProductComposite, MultiStepCaplets, MultiStepForwards,
    MultiStepNothing, MultiStepSwap, ObservationFn, PathDependentProduct, PathObservations,
    PaymentFn, SingleProductComposite,
};
pub use upper_bound_engine::{upper_bound_estimate, UpperBoundEngine};
