//! Statistics accumulators (translates
//! `ql/math/statistics/generalstatistics.hpp` and
//! `ql/math/statistics/sequencestatistics.hpp`).
//!
//! Both accumulators support [`merge`](Statistics::merge) so that
//! path-parallel simulations can accumulate locally per thread and reduce
//! once at the end.

use ql_core::{ensure, errors::Result, Real};

/// Incremental statistics accumulator.
///
/// Accumulates samples and computes mean, variance, standard deviation and
/// the Monte Carlo error estimate.
#[derive(Debug, Clone, Default)]
pub struct Statistics {
    count: usize,
    sum_x: Real,
    sum_x2: Real,
}

impl Statistics {
    /// Create a new empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a single sample.
    pub fn add(&mut self, x: Real) {
        self.count += 1;
        self.sum_x += x;
        self.sum_x2 += x * x;
    }

    /// Fold another accumulator's samples into this one.
    pub fn merge(&mut self, other: &Statistics) {
        self.count += other.count;
        self.sum_x += other.sum_x;
        self.sum_x2 += other.sum_x2;
    }

    /// Number of samples.
    pub fn samples(&self) -> usize {
        self.count
    }

    /// Sample mean.  Returns `None` if no samples have been added.
    pub fn mean(&self) -> Option<Real> {
        (self.count > 0).then(|| self.sum_x / self.count as Real)
    }

    /// Unbiased (Bessel-corrected) variance.  Returns `None` for fewer than
    /// 2 samples.
    pub fn variance(&self) -> Option<Real> {
        if self.count < 2 {
            return None;
        }
        let n = self.count as Real;
        let m = self.sum_x / n;
        let s2 = (self.sum_x2 / n - m * m).max(0.0);
        Some(s2 * n / (n - 1.0))
    }

    /// Standard deviation.  Returns `None` for fewer than 2 samples.
    pub fn std_dev(&self) -> Option<Real> {
        self.variance().map(|v| v.sqrt())
    }

    /// Standard error of the mean, `σ / √n`.  Returns `None` for fewer than
    /// 2 samples.
    pub fn error_estimate(&self) -> Option<Real> {
        self.std_dev().map(|s| s / (self.count as Real).sqrt())
    }
}

/// Component-wise statistics over fixed-length samples, one [`Statistics`]
/// per dimension.
///
/// Used for multi-leg products (one value per leg per path) and for the
/// `(value, correction)` pairs produced by duality estimators.
#[derive(Debug, Clone, Default)]
pub struct SequenceStatistics {
    dimension: Vec<Statistics>,
}

impl SequenceStatistics {
    /// Create an accumulator for samples of length `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: vec![Statistics::new(); dimension],
        }
    }

    /// Sample length.
    pub fn size(&self) -> usize {
        self.dimension.len()
    }

    /// Add one sample (its length must equal [`size`](Self::size)).
    pub fn add(&mut self, sample: &[Real]) -> Result<()> {
        ensure!(
            sample.len() == self.dimension.len(),
            "sample size ({}) does not match statistics dimension ({})",
            sample.len(),
            self.dimension.len()
        );
        for (stats, &x) in self.dimension.iter_mut().zip(sample) {
            stats.add(x);
        }
        Ok(())
    }

    /// Fold another accumulator of the same dimension into this one.
    pub fn merge(&mut self, other: &SequenceStatistics) -> Result<()> {
        ensure!(
            other.size() == self.size(),
            "cannot merge statistics of dimension {} into dimension {}",
            other.size(),
            self.size()
        );
        for (mine, theirs) in self.dimension.iter_mut().zip(&other.dimension) {
            mine.merge(theirs);
        }
        Ok(())
    }

    /// Number of samples added so far.
    pub fn samples(&self) -> usize {
        self.dimension.first().map_or(0, Statistics::samples)
    }

    /// Per-dimension means (`None` before the first sample).
    pub fn mean(&self) -> Option<Vec<Real>> {
        self.dimension.iter().map(Statistics::mean).collect()
    }

    /// Per-dimension standard errors (`None` with fewer than 2 samples).
    pub fn error_estimate(&self) -> Option<Vec<Real>> {
        self.dimension.iter().map(Statistics::error_estimate).collect()
    }
}
