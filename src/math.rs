// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Some helper mathematics.
//!
//! Baselines are ordered lower-triangular, row-major over the second station:
//! the baseline between stations `i` and `j` (`i` < `j`) has index
//! `j (j - 1) / 2 + i`. Baseline 0 is between stations 0 and 1.

use num_traits::Float;

/// Evaluate sinc(x) = sin(x) / x, with sinc(0) defined as exactly 1.
#[inline]
pub fn sinc<F: Float>(x: F) -> F {
    if x == F::zero() {
        F::one()
    } else {
        x.sin() / x
    }
}

/// The number of cross-correlation baselines formed by an array of
/// `num_stations` stations.
#[inline]
pub fn num_baselines(num_stations: usize) -> usize {
    num_stations * num_stations.saturating_sub(1) / 2
}

/// Convert a pair of station indices (`station1` < `station2`) into a
/// cross-correlation baseline index.
#[inline]
pub fn baseline_index(station1: usize, station2: usize) -> usize {
    debug_assert!(station1 < station2);
    station2 * (station2 - 1) / 2 + station1
}

/// Convert a cross-correlation baseline index into its constituent station
/// indices. The inverse of [`baseline_index`].
#[inline]
pub fn baseline_to_stations(baseline: usize) -> (usize, usize) {
    let mut station2 = ((1.0 + (1.0 + 8.0 * baseline as f64).sqrt()) / 2.0) as usize;
    // The float estimate can land on the wrong side of a triangular-number
    // boundary; nudge it onto the right one.
    while station2 * (station2 - 1) / 2 > baseline {
        station2 -= 1;
    }
    while (station2 + 1) * station2 / 2 <= baseline {
        station2 += 1;
    }
    let station1 = baseline - station2 * (station2 - 1) / 2;
    (station1, station2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_to_stations() {
        // 128 stations, therefore 8128 baselines. Check that the bijection
        // holds in both directions.
        for n in [2, 6, 126, 128, 256] {
            let mut bl_index = 0;
            for station2 in 0..n {
                for station1 in 0..station2 {
                    assert_eq!(baseline_index(station1, station2), bl_index);
                    let (s1, s2) = baseline_to_stations(bl_index);
                    assert_eq!(
                        station1, s1,
                        "Expected station1 = {station1}, got {s1}. bl = {bl_index}"
                    );
                    assert_eq!(
                        station2, s2,
                        "Expected station2 = {station2}, got {s2}. bl = {bl_index}"
                    );
                    bl_index += 1;
                }
            }
            assert_eq!(num_baselines(n), bl_index);
        }
    }

    #[test]
    fn test_num_baselines() {
        assert_eq!(num_baselines(0), 0);
        assert_eq!(num_baselines(1), 0);
        assert_eq!(num_baselines(2), 1);
        assert_eq!(num_baselines(128), 8128);
    }

    #[test]
    fn sinc_is_exactly_one_at_zero() {
        assert_eq!(sinc(0.0_f64), 1.0);
        assert_eq!(sinc(0.0_f32), 1.0);
    }

    #[test]
    fn sinc_matches_definition_away_from_zero() {
        let x = 0.3_f64;
        approx::assert_abs_diff_eq!(sinc(x), x.sin() / x);
        // A null of the function.
        approx::assert_abs_diff_eq!(sinc(std::f64::consts::PI), 0.0, epsilon = 1e-15);
    }
}
