//! Random number generators (translates `ql/math/randomnumbers/`).
//!
//! A Mersenne Twister uniform generator (`rand_mt`) and a Gaussian generator
//! obtained by pushing its output through the inverse cumulative normal
//! distribution (`statrs`).  These are the variate sources behind the
//! market-model Brownian generators.

use ql_core::Real;
use rand_mt::Mt64;
use statrs::function::erf::erfc_inv;
use std::f64::consts::SQRT_2;

/// A uniform pseudo-random number generator based on the Mersenne Twister
/// MT19937-64 algorithm.
///
/// Corresponds to `QuantLib::MersenneTwisterUniformRng`.
#[derive(Clone)]
pub struct MersenneTwisterUniformRng {
    rng: Mt64,
}

impl MersenneTwisterUniformRng {
    /// Create a new generator with the given seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mt64::new(seed),
        }
    }

    /// Generate the next uniform deviate in the open interval `(0, 1)`.
    pub fn next_real(&mut self) -> Real {
        // 53 random bits centred in their bucket: never exactly 0 or 1
        let bits = self.rng.next_u64() >> 11;
        (bits as Real + 0.5) / (1u64 << 53) as Real
    }
}

/// An inverse-cumulative normal random number generator.
///
/// Corresponds to `QuantLib::InverseCumulativeRng<MersenneTwisterUniformRng,
/// InverseCumulativeNormal>`.
#[derive(Clone)]
pub struct InverseCumulativeNormalRng {
    uniform: MersenneTwisterUniformRng,
}

impl InverseCumulativeNormalRng {
    /// Create a new generator backed by a Mersenne Twister with the given
    /// seed.
    pub fn new(seed: u64) -> Self {
        Self {
            uniform: MersenneTwisterUniformRng::new(seed),
        }
    }

    /// Generate the next standard-normal deviate.
    pub fn next_real(&mut self) -> Real {
        inverse_cumulative_normal(self.uniform.next_real())
    }

    /// Fill `out` with independent standard-normal deviates.
    pub fn fill(&mut self, out: &mut [Real]) {
        for x in out.iter_mut() {
            *x = self.next_real();
        }
    }
}

/// Inverse of the standard normal distribution function on `(0, 1)`.
///
/// Corresponds to `QuantLib::InverseCumulativeNormal`.
#[inline]
pub fn inverse_cumulative_normal(u: Real) -> Real {
    -SQRT_2 * erfc_inv(2.0 * u)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mt_range() {
        let mut rng = MersenneTwisterUniformRng::new(42);
        for _ in 0..1_000 {
            let x = rng.next_real();
            assert!(x > 0.0 && x < 1.0);
        }
    }

    #[test]
    fn inverse_normal_known_quantiles() {
        assert!(inverse_cumulative_normal(0.5).abs() < 1e-12);
        assert!((inverse_cumulative_normal(0.975) - 1.959_963_984_540_054).abs() < 1e-9);
        assert!((inverse_cumulative_normal(0.025) + 1.959_963_984_540_054).abs() < 1e-9);
    }

    #[test]
    fn same_seed_same_sequence() {
        let mut a = InverseCumulativeNormalRng::new(7);
        let mut b = InverseCumulativeNormalRng::new(7);
        for _ in 0..100 {
            assert_eq!(a.next_real().to_bits(), b.next_real().to_bits());
        }
    }

    #[test]
    fn icn_rng_moments() {
        let mut rng = InverseCumulativeNormalRng::new(42);
        let mut samples = vec![0.0; 20_000];
        rng.fill(&mut samples);
        let n = samples.len() as Real;
        let mean = samples.iter().sum::<Real>() / n;
        let var = samples.iter().map(|x| (x - mean) * (x - mean)).sum::<Real>() / (n - 1.0);
        assert!(mean.abs() < 0.05, "mean {mean} out of expected range");
        assert!((var - 1.0).abs() < 0.05, "variance {var} out of expected range");
    }
}
