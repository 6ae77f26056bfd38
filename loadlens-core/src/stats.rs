//! Robust statistics over timing values.
//!
//! All functions take unsorted slices and sort a private copy with
//! [`f64::total_cmp`], so results depend only on the multiset of inputs.
//! Callers must not pass an empty slice to [`median`] or
//! [`median_absolute_deviation`]; the aggregator guarantees this.

/// Sorted copy of `values`.
fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(f64::total_cmp);
    out
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    let mid = n / 2;
    if n % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Median; the mean of the two middle values for even lengths.
#[must_use]
pub fn median(values: &[f64]) -> f64 {
    median_of_sorted(&sorted(values))
}

/// Median absolute deviation around the median (unscaled).
#[must_use]
pub fn median_absolute_deviation(values: &[f64]) -> f64 {
    let center = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Arithmetic mean; zero for an empty slice.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Bessel-corrected sample standard deviation; zero when fewer than two
/// values are given.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn sample_stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn median_odd_and_even() {
        assert!(approx(median(&[3.0, 1.0, 2.0]), 2.0));
        assert!(approx(median(&[100.0, 102.0, 101.0, 5000.0]), 101.5));
        assert!(approx(median(&[7.0]), 7.0));
    }

    #[test]
    fn mad_of_outlier_set() {
        // deviations from 101.5: 1.5, 0.5, 0.5, 4898.5 -> median 1.0
        assert!(approx(
            median_absolute_deviation(&[100.0, 102.0, 101.0, 5000.0]),
            1.0
        ));
    }

    #[test]
    fn mad_zero_for_constant_values() {
        assert!(approx(median_absolute_deviation(&[5.0, 5.0, 5.0, 9.0]), 0.0));
    }

    #[test]
    fn mean_and_stddev() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert!(approx(mean(&values), 5.0));
        // Sum of squares 32 over n-1 = 7
        assert!(approx(sample_stddev(&values), (32.0_f64 / 7.0).sqrt()));
    }

    #[test]
    fn stddev_zero_below_two_samples() {
        assert!(approx(sample_stddev(&[42.0]), 0.0));
        assert!(approx(sample_stddev(&[]), 0.0));
    }

    #[test]
    fn order_does_not_matter() {
        let a = [9.0, 1.0, 5.0, 3.0];
        let b = [3.0, 5.0, 1.0, 9.0];
        assert_eq!(median(&a).to_bits(), median(&b).to_bits());
        assert_eq!(
            median_absolute_deviation(&a).to_bits(),
            median_absolute_deviation(&b).to_bits()
        );
    }
}
