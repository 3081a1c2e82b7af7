//! # marketmodels
//!
//! Multi-factor LIBOR and coterminal-swap market models simulated by Monte
//! Carlo, following QuantLib's `marketmodels` framework.
//!
//! This crate is a **façade** that re-exports the workspace crates.
//! Application code should depend on this crate rather than the individual
//! `ql-*` crates.
//!
//! ## Quick start
//!
//! ```rust
//! use marketmodels::{EvolutionDescription, LmmCurveState, CurveState};
//!
//! let evolution = EvolutionDescription::new(
//!     vec![0.5, 1.0, 1.5],
//!     vec![0.5, 1.0],
//!     None,
//!     None,
//! )?;
//! assert_eq!(evolution.numeraires(), &[2, 2]);
//!
//! let mut state = LmmCurveState::new(evolution.rate_times())?;
//! state.set_on_forward_rates(&[0.04, 0.04], 0)?;
//! assert!((state.coterminal_swap_rate(0)? - 0.04).abs() < 1e-12);
//! # Ok::<(), marketmodels::core::Error>(())
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Core types, aliases, and error definitions.
pub use ql_core as core;

/// Matrices, factor reduction, random numbers and statistics.
pub use ql_math as math;

/// The market-model engine.
pub use ql_marketmodels as engine;

pub use ql_marketmodels::*;
