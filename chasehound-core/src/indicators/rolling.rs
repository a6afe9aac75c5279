//! Rolling and trailing-window statistics.
//!
//! `rolling_mean` is strict: a window with fewer than `period` values or any
//! NaN yields NaN. The `tail_*` reductions are lenient: they use whatever of
//! the last `n` values are present and skip NaN.

/// Rolling mean over a fixed window.
/// Lookback: period - 1 (first valid value at index period-1).
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut sum = 0.0;
    let mut nan_count = 0usize;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            nan_count += 1;
        } else {
            sum += v;
        }

        if i >= period {
            let leaving = values[i - period];
            if leaving.is_nan() {
                nan_count -= 1;
            } else {
                sum -= leaving;
            }
        }

        if i + 1 >= period && nan_count == 0 {
            result[i] = sum / period as f64;
        }
    }

    result
}

fn tail(values: &[f64], n: usize) -> impl Iterator<Item = f64> + '_ {
    values[values.len().saturating_sub(n)..]
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
}

/// Mean of the last `n` non-NaN values. NaN when there are none.
pub fn tail_mean(values: &[f64], n: usize) -> f64 {
    let (sum, count) = tail(values, n).fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// Sample standard deviation (ddof = 1) of the last `n` non-NaN values.
/// NaN with fewer than two values.
pub fn tail_sample_std(values: &[f64], n: usize) -> f64 {
    let window: Vec<f64> = tail(values, n).collect();
    if window.len() < 2 {
        return f64::NAN;
    }
    let mean = window.iter().sum::<f64>() / window.len() as f64;
    let ss: f64 = window.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (window.len() - 1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::assert_approx;

    #[test]
    fn rolling_mean_basic() {
        let r = rolling_mean(&[10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0], 5);
        assert!(r[..4].iter().all(|v| v.is_nan()));
        assert_approx(r[4], 12.0);
        assert_approx(r[6], 14.0);
    }

    #[test]
    fn rolling_mean_nan_window() {
        let r = rolling_mean(&[10.0, 11.0, f64::NAN, 13.0, 14.0, 15.0], 3);
        assert!(r[2].is_nan());
        assert!(r[3].is_nan());
        assert!(r[4].is_nan());
        assert_approx(r[5], 14.0);
    }

    #[test]
    fn rolling_mean_too_short() {
        assert!(rolling_mean(&[1.0, 2.0], 5).iter().all(|v| v.is_nan()));
        assert!(rolling_mean(&[1.0, 2.0], 0).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn tail_mean_uses_available_values() {
        assert_approx(tail_mean(&[1.0, 2.0, 3.0, 4.0], 2), 3.5);
        assert_approx(tail_mean(&[1.0, 2.0], 10), 1.5);
        assert_approx(tail_mean(&[1.0, f64::NAN, 3.0], 2), 3.0);
        assert!(tail_mean(&[], 3).is_nan());
    }

    #[test]
    fn tail_sample_std_matches_ddof_one() {
        // Sample std of 2, 4, 4, 4, 5, 5, 7, 9 is sqrt(32/7).
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_approx(tail_sample_std(&v, 8), (32.0f64 / 7.0).sqrt());
        assert!(tail_sample_std(&[5.0], 3).is_nan());
        assert_approx(tail_sample_std(&[1.0, 1.0, 1.0], 3), 0.0);
    }
}
