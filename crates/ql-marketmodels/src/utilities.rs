//! Time-grid helpers shared by the market-model components (translates
//! `ql/models/marketmodels/utilities.hpp`).

use ql_core::{ensure, errors::Result, Time};

/// Fail unless `times` is non-empty, non-negative and strictly increasing.
pub fn check_increasing_times(times: &[Time], what: &str) -> Result<()> {
    ensure!(!times.is_empty(), "at least one {what} required");
    ensure!(times[0] >= 0.0, "first {what} ({}) is negative", times[0]);
    for (i, w) in times.windows(2).enumerate() {
        ensure!(
            w[1] > w[0],
            "non-increasing {what}: {} at index {} followed by {}",
            w[0],
            i,
            w[1]
        );
    }
    Ok(())
}

/// Merge several increasing time grids into their sorted, de-duplicated
/// union.
///
/// Returns the union together with, for each input grid, a mask telling
/// which union points belong to that grid.
pub fn merge_times(grids: &[&[Time]]) -> (Vec<Time>, Vec<Vec<bool>>) {
    let mut all: Vec<Time> = grids.iter().flat_map(|g| g.iter().copied()).collect();
    all.sort_by(|a, b| a.total_cmp(b));
    all.dedup();

    let masks = grids.iter().map(|g| is_in_subset(&all, g)).collect();
    (all, masks)
}

/// For each point of `set`, whether it also appears in `subset`.
///
/// Both grids must be increasing.
pub fn is_in_subset(set: &[Time], subset: &[Time]) -> Vec<bool> {
    let mut result = vec![false; set.len()];
    let mut j = 0;
    for (i, &t) in set.iter().enumerate() {
        while j < subset.len() && subset[j] < t {
            j += 1;
        }
        if j < subset.len() && subset[j] == t {
            result[i] = true;
        }
    }
    result
}

/// Index of the first time in `times` that is `>= t` (`times.len()` if none).
pub fn lower_index(times: &[Time], t: Time) -> usize {
    times.partition_point(|&x| x < t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increasing_times_are_validated() {
        assert!(check_increasing_times(&[0.0, 1.0, 2.0], "rate time").is_ok());
        assert!(check_increasing_times(&[], "rate time").is_err());
        assert!(check_increasing_times(&[-1.0, 1.0], "rate time").is_err());
        assert!(check_increasing_times(&[0.0, 1.0, 1.0], "rate time").is_err());
    }

    #[test]
    fn merge_produces_sorted_union_and_masks() {
        let a = [0.5, 1.0, 2.0];
        let b = [1.0, 1.5];
        let (all, masks) = merge_times(&[&a, &b]);
        assert_eq!(all, vec![0.5, 1.0, 1.5, 2.0]);
        assert_eq!(masks[0], vec![true, true, false, true]);
        assert_eq!(masks[1], vec![false, true, true, false]);
    }

    #[test]
    fn lower_index_finds_first_not_before() {
        let times = [0.0, 1.0, 2.0];
        assert_eq!(lower_index(&times, 0.0), 0);
        assert_eq!(lower_index(&times, 0.5), 1);
        assert_eq!(lower_index(&times, 2.0), 2);
        assert_eq!(lower_index(&times, 3.0), 3);
    }
}
