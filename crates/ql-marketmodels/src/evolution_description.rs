//! Rate times, evolution times and the numeraire used at each step
//! (translates `ql/models/marketmodels/evolutiondescription.hpp` and
//! `ql/models/marketmodels/evolutiondescription.cpp`).
//!
//! An [`EvolutionDescription`] is immutable once built.  Measure changes
//! (`with_terminal_measure`, `with_money_market_measure`, ...) return a new
//! description, so one instance can be shared read-only by every
//! simulation thread.

use crate::utilities::{check_increasing_times, lower_index};
use ql_core::{ensure, errors::Result, Size, Time};

/// Discretisation of a forward-rate term structure and of the times at
/// which it is observed.
///
/// * `rate_times`: the `n + 1` times bounding the `n` accrual periods;
/// * `evolution_times`: the `m` observation times, each with a numeraire
///   (index into the rate times of the discount bond used as numeraire)
///   and a relevance window `[first, last)` of rates that matter there.
///
/// Corresponds to `QuantLib::EvolutionDescription`.
#[derive(Debug, Clone, PartialEq)]
pub struct EvolutionDescription {
    rate_times: Vec<Time>,
    rate_taus: Vec<Time>,
    evolution_times: Vec<Time>,
    numeraires: Vec<Size>,
    relevance_rates: Vec<(Size, Size)>,
    first_alive_rate: Vec<Size>,
    effective_stop_time: Vec<Vec<Time>>,
}

impl EvolutionDescription {
    /// Build and validate a description.
    ///
    /// `numeraires` defaults to the terminal measure (last rate-time index at
    /// every step) and `relevance_rates` to the full range `[0, n)`.
    pub fn new(
        rate_times: Vec<Time>,
        evolution_times: Vec<Time>,
        numeraires: Option<Vec<Size>>,
        relevance_rates: Option<Vec<(Size, Size)>>,
    ) -> Result<Self> {
        ensure!(
            rate_times.len() >= 2,
            "at least two rate times required, {} given",
            rate_times.len()
        );
        check_increasing_times(&rate_times, "rate time")?;
        check_increasing_times(&evolution_times, "evolution time")?;

        let n = rate_times.len() - 1;
        let steps = evolution_times.len();
        let last_rate_time = rate_times[n];
        let last_evolution_time = evolution_times[steps - 1];
        ensure!(
            last_evolution_time <= last_rate_time,
            "last evolution time ({last_evolution_time}) is past the last rate time ({last_rate_time})"
        );

        let rate_taus = rate_times.windows(2).map(|w| w[1] - w[0]).collect();
        let first_alive_rate = evolution_times
            .iter()
            .map(|&t| lower_index(&rate_times, t))
            .collect();
        let effective_stop_time = evolution_times
            .iter()
            .map(|&t| rate_times[..n].iter().map(|&r| t.min(r)).collect())
            .collect();

        let relevance_rates = relevance_rates.unwrap_or_else(|| vec![(0, n); steps]);
        ensure!(
            relevance_rates.len() == steps,
            "number of relevance windows ({}) does not match number of steps ({steps})",
            relevance_rates.len()
        );
        for (k, &(first, last)) in relevance_rates.iter().enumerate() {
            ensure!(
                first <= last && last <= n,
                "invalid relevance window [{first}, {last}) at step {k} with {n} rates"
            );
        }

        let mut evolution = Self {
            rate_times,
            rate_taus,
            evolution_times,
            numeraires: Vec::new(),
            relevance_rates,
            first_alive_rate,
            effective_stop_time,
        };
        let numeraires = numeraires.unwrap_or_else(|| terminal_measure(&evolution));
        evolution.check_numeraires(&numeraires)?;
        evolution.numeraires = numeraires;
        Ok(evolution)
    }

    /// Same description, with every step using numeraires `numeraires`.
    pub fn with_numeraires(&self, numeraires: Vec<Size>) -> Result<Self> {
        self.check_numeraires(&numeraires)?;
        Ok(Self {
            numeraires,
            ..self.clone()
        })
    }

    /// Same description under the terminal measure.
    pub fn with_terminal_measure(&self) -> Self {
        Self {
            numeraires: terminal_measure(self),
            ..self.clone()
        }
    }

    /// Same description under the discretely-compounded money-market
    /// (spot LIBOR) measure.
    pub fn with_money_market_measure(&self) -> Self {
        Self {
            numeraires: money_market_measure(self),
            ..self.clone()
        }
    }

    /// Same description under the money-market measure shifted `offset`
    /// bonds further out.
    pub fn with_money_market_plus_measure(&self, offset: Size) -> Self {
        Self {
            numeraires: money_market_plus_measure(self, offset),
            ..self.clone()
        }
    }

    fn check_numeraires(&self, numeraires: &[Size]) -> Result<()> {
        let n = self.number_of_rates();
        ensure!(
            numeraires.len() == self.number_of_steps(),
            "number of numeraires ({}) does not match number of steps ({})",
            numeraires.len(),
            self.number_of_steps()
        );
        for (k, (&numeraire, &alive)) in numeraires.iter().zip(&self.first_alive_rate).enumerate() {
            ensure!(
                numeraire <= n,
                "numeraire index {numeraire} at step {k} exceeds number of rates ({n})"
            );
            ensure!(
                numeraire >= alive,
                "numeraire bond {numeraire} at step {k} has already expired (first alive rate is {alive})"
            );
        }
        Ok(())
    }

    /// The `n + 1` rate times.
    pub fn rate_times(&self) -> &[Time] {
        &self.rate_times
    }

    /// The `n` accrual fractions `rate_times[i+1] - rate_times[i]`.
    pub fn rate_taus(&self) -> &[Time] {
        &self.rate_taus
    }

    /// The observation times.
    pub fn evolution_times(&self) -> &[Time] {
        &self.evolution_times
    }

    /// Numeraire bond index at each step.
    pub fn numeraires(&self) -> &[Size] {
        &self.numeraires
    }

    /// Relevance window `[first, last)` at each step.
    pub fn relevance_rates(&self) -> &[(Size, Size)] {
        &self.relevance_rates
    }

    /// Index of the first rate whose reset time is not before each
    /// evolution time.
    pub fn first_alive_rate(&self) -> &[Size] {
        &self.first_alive_rate
    }

    /// `min(evolution_times[step], rate_times[i])` for each rate `i`: the
    /// time up to which rate `i` has accrued variance at `step`.
    pub fn effective_stop_time(&self, step: Size) -> &[Time] {
        &self.effective_stop_time[step]
    }

    /// Number of forward rates, `rate_times().len() - 1`.
    pub fn number_of_rates(&self) -> Size {
        self.rate_times.len() - 1
    }

    /// Number of evolution steps, `evolution_times().len()`.
    pub fn number_of_steps(&self) -> Size {
        self.evolution_times.len()
    }

    /// `true` if every step uses the last bond as numeraire.
    pub fn is_in_terminal_measure(&self) -> bool {
        self.numeraires == terminal_measure(self)
    }

    /// `true` if every step uses the first unexpired bond as numeraire.
    pub fn is_in_money_market_measure(&self) -> bool {
        self.numeraires == money_market_measure(self)
    }

    /// `true` if the numeraires are those of
    /// [`money_market_plus_measure`] with the given offset.
    pub fn is_in_money_market_plus_measure(&self, offset: Size) -> bool {
        self.numeraires == money_market_plus_measure(self, offset)
    }
}

/// Numeraires of the terminal measure: the last bond at every step.
pub fn terminal_measure(evolution: &EvolutionDescription) -> Vec<Size> {
    vec![evolution.number_of_rates(); evolution.number_of_steps()]
}

/// Numeraires of the money-market measure: the first bond not yet expired.
pub fn money_market_measure(evolution: &EvolutionDescription) -> Vec<Size> {
    evolution.first_alive_rate().to_vec()
}

/// Money-market numeraires shifted by `offset`, capped at the last bond.
pub fn money_market_plus_measure(evolution: &EvolutionDescription, offset: Size) -> Vec<Size> {
    let n = evolution.number_of_rates();
    evolution
        .first_alive_rate()
        .iter()
        .map(|&alive| (alive + offset).min(n))
        .collect()
}

/// Fail unless two descriptions share rate times and evolution times.
pub fn check_compatibility(a: &EvolutionDescription, b: &EvolutionDescription) -> Result<()> {
    ensure!(
        a.rate_times() == b.rate_times(),
        "rate times mismatch: {:?} vs {:?}",
        a.rate_times(),
        b.rate_times()
    );
    ensure!(
        a.evolution_times() == b.evolution_times(),
        "evolution times mismatch: {:?} vs {:?}",
        a.evolution_times(),
        b.evolution_times()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn standard() -> EvolutionDescription {
        EvolutionDescription::new(
            vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
            vec![0.0, 1.0, 2.0, 3.0, 4.0],
            None,
            None,
        )
        .unwrap()
    }

    #[test]
    fn defaults_to_terminal_measure_and_full_relevance() {
        let e = standard();
        assert_eq!(e.number_of_rates(), 5);
        assert_eq!(e.number_of_steps(), 5);
        assert_eq!(e.numeraires(), &[5, 5, 5, 5, 5]);
        assert!(e.is_in_terminal_measure());
        assert_eq!(e.relevance_rates()[2], (0, 5));
        assert_eq!(e.rate_taus(), &[1.0; 5]);
    }

    #[test]
    fn first_alive_rate_counts_resets_on_the_evolution_time_as_alive() {
        let e = EvolutionDescription::new(
            vec![0.5, 1.0, 1.5, 2.0],
            vec![0.25, 1.0, 1.75],
            None,
            None,
        )
        .unwrap();
        assert_eq!(e.first_alive_rate(), &[0, 1, 3]);
        assert_eq!(e.effective_stop_time(1), &[0.5, 1.0, 1.0]);
    }

    #[test]
    fn measure_changes_return_new_descriptions() {
        let e = standard();
        let mm = e.with_money_market_measure();
        assert_eq!(mm.numeraires(), &[0, 1, 2, 3, 4]);
        assert!(mm.is_in_money_market_measure());
        assert!(!mm.is_in_terminal_measure());
        assert!(e.is_in_terminal_measure());

        let plus = e.with_money_market_plus_measure(2);
        assert_eq!(plus.numeraires(), &[2, 3, 4, 5, 5]);
        assert!(plus.is_in_money_market_plus_measure(2));
        assert!(plus.with_terminal_measure().is_in_terminal_measure());
    }

    #[test]
    fn expired_numeraire_is_rejected() {
        let e = standard();
        assert!(e.with_numeraires(vec![5, 0, 5, 5, 5]).is_err());
        assert!(e.with_numeraires(vec![5, 6, 5, 5, 5]).is_err());
        assert!(e.with_numeraires(vec![5, 5, 5]).is_err());
        assert!(e.with_numeraires(vec![1, 1, 2, 3, 4]).is_ok());
    }

    #[test]
    fn invalid_inputs_fail_construction() {
        assert!(EvolutionDescription::new(vec![1.0], vec![0.5], None, None).is_err());
        assert!(EvolutionDescription::new(vec![0.0, 1.0, 0.5], vec![0.5], None, None).is_err());
        assert!(EvolutionDescription::new(vec![0.0, 1.0], vec![0.5, 0.5], None, None).is_err());
        assert!(EvolutionDescription::new(vec![0.0, 1.0], vec![0.5, 1.5], None, None).is_err());
        assert!(EvolutionDescription::new(vec![0.0, 1.0], vec![], None, None).is_err());
        assert!(
            EvolutionDescription::new(vec![0.0, 1.0, 2.0], vec![0.5], None, Some(vec![(1, 3)]))
                .is_err()
        );
        assert!(
            EvolutionDescription::new(vec![0.0, 1.0, 2.0], vec![0.5], None, Some(vec![(2, 1)]))
                .is_err()
        );
    }

    #[test]
    fn compatibility_check() {
        let a = standard();
        let b = a.with_money_market_measure();
        assert!(check_compatibility(&a, &b).is_ok());
        let c = EvolutionDescription::new(vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0], vec![1.0], None, None)
            .unwrap();
        assert!(check_compatibility(&a, &c).is_err());
    }

    proptest! {
        #[test]
        fn sizes_follow_inputs(
            gaps in proptest::collection::vec(0.1f64..2.0, 1..12),
            fraction in 0.05f64..1.0,
        ) {
            let mut rate_times = vec![0.0];
            for g in &gaps {
                let last = *rate_times.last().unwrap();
                rate_times.push(last + g);
            }
            let horizon = rate_times[rate_times.len() - 1] * fraction;
            let evolution_times: Vec<Time> = rate_times
                .iter()
                .copied()
                .filter(|&t| t > 0.0 && t <= horizon)
                .chain(std::iter::once(horizon))
                .fold(Vec::new(), |mut acc, t| {
                    if acc.last().map_or(true, |&l| t > l) {
                        acc.push(t);
                    }
                    acc
                });
            let e = EvolutionDescription::new(rate_times.clone(), evolution_times.clone(), None, None)
                .unwrap();
            prop_assert_eq!(e.number_of_rates(), rate_times.len() - 1);
            prop_assert_eq!(e.number_of_steps(), evolution_times.len());
            prop_assert!(e.with_money_market_measure().is_in_money_market_measure());
        }
    }
}
