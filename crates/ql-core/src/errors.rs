//! Error types for the market-model engine.
//!
//! QuantLib signals broken preconditions with `QL_REQUIRE`, `QL_ENSURE` and
//! `QL_FAIL`.  Here they map to the `ensure!`, `ensure_post!` and `fail!`
//! macros, all of which return early with a variant of the single
//! [`Error`] enum.  None of these errors are meant to be recovered from
//! locally: they flag a mis-specified simulation or a defect in product
//! logic.

use thiserror::Error;

/// The top-level error type used throughout the workspace.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    /// General runtime error (maps to `QL_FAIL`).
    #[error("{0}")]
    Runtime(String),

    /// Precondition violated (maps to `QL_REQUIRE`).
    #[error("precondition not satisfied: {0}")]
    Precondition(String),

    /// Postcondition violated (maps to `QL_ENSURE`).
    #[error("postcondition not satisfied: {0}")]
    Postcondition(String),

    /// Index out of range.
    #[error("index ({index}) out of range [0, {size})")]
    IndexOutOfRange {
        /// The index that was out of range.
        index: usize,
        /// The size of the container.
        size: usize,
    },

    /// Invalid argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A curve state was queried for a rate that had already reset.
    #[error("rate {index} has already reset (first alive rate is {first_alive})")]
    ExpiredRate {
        /// The queried rate index.
        index: usize,
        /// First rate index still alive in the curve state.
        first_alive: usize,
    },

    /// A payoff read information from a step that has not happened yet.
    #[error("not adapted: looking into the future (step {requested} read at step {current})")]
    NotAdapted {
        /// The step whose information was requested.
        requested: usize,
        /// The step being processed.
        current: usize,
    },

    /// A simulation step was requested out of sequence.
    #[error("step {requested} requested out of order (current step is {current})")]
    StepOutOfOrder {
        /// The step that was requested.
        requested: usize,
        /// The step the evolver is actually at.
        current: usize,
    },

    /// Factor reduction produced a pseudo-root of the wrong shape.
    #[error("step {step}: pseudo-root has {achieved} factors, {requested} requested")]
    FactorReduction {
        /// Evolution step of the offending matrix.
        step: usize,
        /// Number of factors asked for.
        requested: usize,
        /// Number of factors obtained.
        achieved: usize,
    },

    /// A matrix claimed to be positive semi-definite is not.
    #[error("negative eigenvalue ({0:e}) in a positive semi-definite matrix")]
    NegativeEigenvalue(f64),
}

/// Shorthand `Result` type used throughout the workspace.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Equivalent to C++ `QL_REQUIRE(condition, message)`.
///
/// Returns `Err(Error::Precondition(...))` if `$cond` is false.
///
/// # Example
/// ```
/// use ql_core::{ensure, errors::Error};
/// fn positive(x: f64) -> ql_core::errors::Result<f64> {
///     ensure!(x > 0.0, "x must be positive, got {x}");
///     Ok(x)
/// }
/// assert!(positive(1.0).is_ok());
/// assert!(positive(-1.0).is_err());
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($msg:tt)*) => {
        if !$cond {
            return Err($crate::errors::Error::Precondition(
                format!($($msg)*)
            ));
        }
    };
}

/// Equivalent to C++ `QL_ENSURE(condition, message)`.
///
/// Returns `Err(Error::Postcondition(...))` if `$cond` is false.
///
/// # Example
/// ```
/// use ql_core::{ensure_post, errors::Error};
/// fn compute(x: f64) -> ql_core::errors::Result<f64> {
///     let result = x * 2.0;
///     ensure_post!(result > 0.0, "result must be positive, got {result}");
///     Ok(result)
/// }
/// assert!(compute(1.0).is_ok());
/// assert!(compute(-1.0).is_err());
/// ```
#[macro_export]
macro_rules! ensure_post {
    ($cond:expr, $($msg:tt)*) => {
        if !$cond {
            return Err($crate::errors::Error::Postcondition(
                format!($($msg)*)
            ));
        }
    };
}

/// Equivalent to C++ `QL_FAIL(message)`.
///
/// Returns `Err(Error::Runtime(...))` immediately.
///
/// # Example
/// ```
/// use ql_core::{fail, errors::Error};
/// fn always_err() -> ql_core::errors::Result<()> {
///     fail!("something went wrong");
/// }
/// assert!(always_err().is_err());
/// ```
#[macro_export]
macro_rules! fail {
    ($($msg:tt)*) => {
        return Err($crate::errors::Error::Runtime(format!($($msg)*)))
    };
}

/// Check that `$index` lies in `[0, $size)`.
///
/// Returns `Err(Error::IndexOutOfRange { .. })` otherwise.
///
/// # Example
/// ```
/// use ql_core::{ensure_index, errors::Error};
/// fn get(v: &[f64], i: usize) -> ql_core::errors::Result<f64> {
///     ensure_index!(i, v.len());
///     Ok(v[i])
/// }
/// assert_eq!(get(&[1.0, 2.0], 1), Ok(2.0));
/// assert_eq!(
///     get(&[1.0, 2.0], 2),
///     Err(Error::IndexOutOfRange { index: 2, size: 2 })
/// );
/// ```
#[macro_export]
macro_rules! ensure_index {
    ($index:expr, $size:expr) => {
        if $index >= $size {
            return Err($crate::errors::Error::IndexOutOfRange {
                index: $index,
                size: $size,
            });
        }
    };
}
