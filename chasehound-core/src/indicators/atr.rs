//! True range.
//!
//! TR[0] = high[0] - low[0] (no previous close).
//! TR[t] = max(high[t]-low[t], |high[t]-close[t-1]|, |low[t]-close[t-1]|).
//! NaN legs are skipped; TR is NaN only when every leg is NaN.

use crate::domain::PriceRow;

/// True range series, one value per row.
pub fn true_range(rows: &[PriceRow]) -> Vec<f64> {
    let mut tr = Vec::with_capacity(rows.len());
    let mut prev_close = f64::NAN;

    for row in rows {
        let legs = [
            row.high - row.low,
            (row.high - prev_close).abs(),
            (row.low - prev_close).abs(),
        ];
        tr.push(nan_max(&legs));
        prev_close = row.close;
    }

    tr
}

fn nan_max(values: &[f64]) -> f64 {
    values
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, |acc, v| if acc.is_nan() || v > acc { v } else { acc })
}
