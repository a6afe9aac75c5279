//! Series math used to build screening targets.

pub mod atr;
pub mod rolling;

pub use atr::true_range;
pub use rolling::{rolling_mean, tail_mean, tail_sample_std};

/// Daily rows from a close series; each open is the prior close and the bar
/// spans one point either side of its body.
#[cfg(test)]
pub fn make_rows(closes: &[f64]) -> Vec<crate::domain::PriceRow> {
    use crate::domain::PriceRow;
    let base_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            PriceRow::new(
                base_date + chrono::Duration::days(i as i64),
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
                1000,
            )
        })
        .collect()
}

#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64) {
    assert!((actual - expected).abs() < 1e-10, "{actual} != {expected}");
}
