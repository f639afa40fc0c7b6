//! Descriptive statistics and throughput resampling.
//!
//! Every function is total: empty or degenerate input yields a neutral
//! value (`0.0`, an empty `Vec`) instead of an error.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Upper bound on the weeks one Monte Carlo iteration may simulate.
pub const MAX_SIMULATED_WEEKS: u32 = 520;

// ---------------------------------------------------------------------------
// Summary statistics
// ---------------------------------------------------------------------------

/// Linear-interpolation percentile.
///
/// `p` is clamped to `[0, 100]`; the rank on the sorted data is
/// `p / 100 * (n - 1)`. Non-finite values are ignored.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn percentile(p: f64, values: &[f64]) -> f64 {
    let sorted = sorted_finite(values);
    if sorted.is_empty() {
        return 0.0;
    }

    let p = if p.is_nan() { 0.0 } else { p.clamp(0.0, 100.0) };
    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;

    (sorted[upper] - sorted[lower]).mul_add(weight, sorted[lower])
}

#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; zero for fewer than two values.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn standard_deviation(values: &[f64]) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }
    let avg = mean(values);
    let variance = values
        .iter()
        .map(|value| (value - avg).powi(2))
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}

// ---------------------------------------------------------------------------
// Histogram
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower_bound: f64,
    pub count: usize,
}

/// Fixed-width bins over the data range, `ceil(sqrt(n))` of them.
///
/// Bins are ordered by lower bound; the maximum lands in the last bin.
/// A zero range collapses into a single bin.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn histogram(values: &[f64]) -> Vec<HistogramBin> {
    let sorted = sorted_finite(values);
    let (Some(&min), Some(&max)) = (sorted.first(), sorted.last()) else {
        return Vec::new();
    };

    let range = max - min;
    if range <= 0.0 {
        return vec![HistogramBin {
            lower_bound: min,
            count: sorted.len(),
        }];
    }

    let bins = (sorted.len() as f64).sqrt().ceil().max(1.0) as usize;
    let width = range / bins as f64;
    let mut histogram: Vec<HistogramBin> = (0..bins)
        .map(|index| HistogramBin {
            lower_bound: (index as f64).mul_add(width, min),
            count: 0,
        })
        .collect();

    for value in sorted {
        let index = (((value - min) / width).floor() as usize).min(bins - 1);
        histogram[index].count += 1;
    }
    histogram
}

// ---------------------------------------------------------------------------
// Monte Carlo
// ---------------------------------------------------------------------------

/// Simulate how many periods it takes to deliver `remaining_scope` items.
///
/// Each iteration draws throughput samples with replacement until their
/// running sum reaches the scope and records the number of draws. Samples
/// without any positive value can never finish, so they yield an empty
/// distribution, as do empty samples. Iterations are capped at
/// [`MAX_SIMULATED_WEEKS`].
pub fn monte_carlo_weeks<R: Rng + ?Sized>(
    remaining_scope: f64,
    samples: &[f64],
    iterations: usize,
    rng: &mut R,
) -> Vec<u32> {
    let usable: Vec<f64> = samples
        .iter()
        .copied()
        .filter(|sample| sample.is_finite() && *sample >= 0.0)
        .collect();
    if usable.is_empty() || !usable.iter().any(|sample| *sample > 0.0) {
        return Vec::new();
    }
    if remaining_scope <= 0.0 || remaining_scope.is_nan() {
        return vec![0; iterations];
    }

    (0..iterations)
        .map(|_| {
            let mut delivered = 0.0;
            let mut weeks = 0;
            while delivered < remaining_scope && weeks < MAX_SIMULATED_WEEKS {
                delivered += usable.choose(rng).copied().unwrap_or(0.0);
                weeks += 1;
            }
            weeks
        })
        .collect()
}

/// Share of simulated outcomes finishing within `weeks_remaining`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn odds_to_deadline(weeks_remaining: u32, distribution: &[u32]) -> f64 {
    if distribution.is_empty() {
        return 0.0;
    }
    let hits = distribution
        .iter()
        .filter(|weeks| **weeks <= weeks_remaining)
        .count();
    hits as f64 / distribution.len() as f64
}

fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0];
        assert!(close(percentile(0.0, &values), 1.0));
        assert!(close(percentile(50.0, &values), 2.5));
        assert!(close(percentile(80.0, &values), 3.4));
        assert!(close(percentile(100.0, &values), 4.0));
    }

    #[test]
    fn percentile_is_order_independent_and_clamped() {
        let values = [9.0, 1.0, 5.0];
        assert!(close(percentile(50.0, &values), 5.0));
        assert!(close(percentile(-10.0, &values), 1.0));
        assert!(close(percentile(250.0, &values), 9.0));
    }

    #[test]
    fn percentile_ignores_non_finite() {
        let values = [f64::NAN, 2.0, f64::INFINITY, 4.0];
        assert!(close(percentile(50.0, &values), 3.0));
    }

    #[test]
    fn empty_inputs_are_zero() {
        assert!(close(percentile(80.0, &[]), 0.0));
        assert!(close(mean(&[]), 0.0));
        assert!(close(standard_deviation(&[]), 0.0));
        assert!(histogram(&[]).is_empty());
    }

    #[test]
    fn standard_deviation_is_population() {
        assert!(close(standard_deviation(&[5.0]), 0.0));
        assert!(close(
            standard_deviation(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]),
            2.0
        ));
    }

    #[test]
    fn histogram_uses_sqrt_bins() {
        let values: Vec<f64> = (0..9).map(f64::from).collect();
        let bins = histogram(&values);
        assert_eq!(bins.len(), 3);
        assert!(close(bins[0].lower_bound, 0.0));
        assert_eq!(bins.iter().map(|bin| bin.count).sum::<usize>(), 9);
        assert_eq!(bins[2].count, 3);
    }

    #[test]
    fn histogram_zero_range_is_single_bin() {
        let bins = histogram(&[3.0, 3.0, 3.0]);
        assert_eq!(
            bins,
            vec![HistogramBin {
                lower_bound: 3.0,
                count: 3
            }]
        );
    }

    #[test]
    fn monte_carlo_degenerate_cases() {
        let mut rng = StdRng::seed_from_u64(7);
        assert!(monte_carlo_weeks(10.0, &[], 100, &mut rng).is_empty());
        assert!(monte_carlo_weeks(10.0, &[0.0, 0.0], 100, &mut rng).is_empty());
        assert_eq!(monte_carlo_weeks(0.0, &[3.0], 4, &mut rng), vec![0; 4]);
        assert!(close(odds_to_deadline(5, &[]), 0.0));
    }

    #[test]
    fn monte_carlo_constant_throughput_is_exact() {
        let mut rng = StdRng::seed_from_u64(7);
        let distribution = monte_carlo_weeks(10.0, &[2.0], 50, &mut rng);
        assert_eq!(distribution.len(), 50);
        assert!(distribution.iter().all(|weeks| *weeks == 5));
        assert!(close(odds_to_deadline(5, &distribution), 1.0));
        assert!(close(odds_to_deadline(4, &distribution), 0.0));
    }

    #[test]
    fn monte_carlo_is_reproducible_with_seed() {
        let samples = [0.0, 1.0, 3.0, 5.0, 2.0];
        let first = monte_carlo_weeks(40.0, &samples, 200, &mut StdRng::seed_from_u64(42));
        let second = monte_carlo_weeks(40.0, &samples, 200, &mut StdRng::seed_from_u64(42));
        assert_eq!(first, second);
        assert!(first.iter().all(|weeks| *weeks >= 8));
    }
}
