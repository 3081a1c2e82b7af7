//! Sources of Brownian increments for the evolvers (translates
//! `ql/models/marketmodels/browniangenerator.hpp` and
//! `ql/models/marketmodels/browniangenerators/mtbrowniangenerator.hpp`).
//!
//! A generator hands out, path after path, one vector of `F` independent
//! standard-normal increments per evolution step.  Each evolver owns its
//! generator; parallel simulations give every worker its own stream.

use ql_core::{ensure, errors::Result, Real, Size};
use ql_math::InverseCumulativeNormalRng;

/// Stateful, sequential source of factor increments.
///
/// Corresponds to `QuantLib::BrownianGenerator`.
pub trait BrownianGenerator: Send {
    /// Increments per step.
    fn number_of_factors(&self) -> Size;

    /// Steps per path.
    fn number_of_steps(&self) -> Size;

    /// Begin a new path.
    fn next_path(&mut self);

    /// Write the increments of the next step into `output`.
    ///
    /// Fails when the current path has no step left.
    fn next_step(&mut self, output: &mut [Real]) -> Result<()>;
}

/// Creates generators of a given shape.
///
/// Corresponds to `QuantLib::BrownianGeneratorFactory`.
pub trait BrownianGeneratorFactory: Send + Sync {
    /// A fresh generator for `factors × steps` increments per path.
    fn create(&self, factors: Size, steps: Size) -> Box<dyn BrownianGenerator>;
}

/// Mersenne Twister increments pushed through the inverse normal.
///
/// Corresponds to `QuantLib::MTBrownianGenerator`.
#[derive(Clone)]
pub struct MtBrownianGenerator {
    factors: Size,
    steps: Size,
    last_step: Size,
    generator: InverseCumulativeNormalRng,
}

impl MtBrownianGenerator {
    /// A generator seeded with `seed`.
    pub fn new(factors: Size, steps: Size, seed: u64) -> Self {
        Self {
            factors,
            steps,
            last_step: steps,
            generator: InverseCumulativeNormalRng::new(seed),
        }
    }
}

impl BrownianGenerator for MtBrownianGenerator {
    fn number_of_factors(&self) -> Size {
        self.factors
    }

    fn number_of_steps(&self) -> Size {
        self.steps
    }

    fn next_path(&mut self) {
        self.last_step = 0;
    }

    fn next_step(&mut self, output: &mut [Real]) -> Result<()> {
        ensure!(
            self.last_step < self.steps,
            "uniform sequence exhausted: {} steps per path",
            self.steps
        );
        ensure!(
            output.len() == self.factors,
            "output has {} slots, {} factors generated",
            output.len(),
            self.factors
        );
        self.generator.fill(output);
        self.last_step += 1;
        Ok(())
    }
}

/// Factory of [`MtBrownianGenerator`]s sharing one seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MtBrownianGeneratorFactory {
    seed: u64,
}

impl MtBrownianGeneratorFactory {
    /// Factory for seed `seed`.
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Factory for an independent stream, e.g. one per worker thread.
    pub fn for_stream(&self, stream: u64) -> Self {
        Self {
            seed: self
                .seed
                .wrapping_add(stream.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        }
    }

    /// The seed handed to new generators.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl BrownianGeneratorFactory for MtBrownianGeneratorFactory {
    fn create(&self, factors: Size, steps: Size) -> Box<dyn BrownianGenerator> {
        Box::new(MtBrownianGenerator::new(factors, steps, self.seed))
    }
}

/// Replays a fixed increment sequence on every path.
///
/// Useful for regression fixtures and for deterministic drift-only paths.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedBrownianGenerator {
    factors: Size,
    increments: Vec<Vec<Real>>,
    last_step: Size,
}

impl FixedBrownianGenerator {
    /// Replay `increments[step]` at every step; all rows must have the same
    /// length.
    pub fn new(increments: Vec<Vec<Real>>) -> Result<Self> {
        ensure!(!increments.is_empty(), "no steps given");
        let factors = increments[0].len();
        ensure!(factors > 0, "no factors given");
        for (step, row) in increments.iter().enumerate() {
            ensure!(
                row.len() == factors,
                "step {step} has {} increments, {factors} expected",
                row.len()
            );
        }
        let last_step = increments.len();
        Ok(Self {
            factors,
            increments,
            last_step,
        })
    }

    /// All-zero increments: paths follow the drift only.
    pub fn zeros(factors: Size, steps: Size) -> Result<Self> {
        Self::new(vec![vec![0.0; factors]; steps])
    }
}

impl BrownianGenerator for FixedBrownianGenerator {
    fn number_of_factors(&self) -> Size {
        self.factors
    }

    fn number_of_steps(&self) -> Size {
        self.increments.len()
    }

    fn next_path(&mut self) {
        self.last_step = 0;
    }

    fn next_step(&mut self, output: &mut [Real]) -> Result<()> {
        ensure!(
            self.last_step < self.increments.len(),
            "fixed sequence exhausted: {} steps per path",
            self.increments.len()
        );
        ensure!(
            output.len() == self.factors,
            "output has {} slots, {} factors stored",
            output.len(),
            self.factors
        );
        output.copy_from_slice(&self.increments[self.last_step]);
        self.last_step += 1;
        Ok(())
    }
}

impl BrownianGeneratorFactory for FixedBrownianGenerator {
    fn create(&self, factors: Size, steps: Size) -> Box<dyn BrownianGenerator> {
        // reshape by truncating or zero-padding
        let increments = (0..steps)
            .map(|step| {
                (0..factors)
                    .map(|f| {
                        self.increments
                            .get(step)
                            .and_then(|row| row.get(f))
                            .copied()
                            .unwrap_or(0.0)
                    })
                    .collect()
            })
            .collect();
        Box::new(FixedBrownianGenerator {
            factors,
            increments,
            last_step: steps,
        })
    }
}
