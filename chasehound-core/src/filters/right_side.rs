//! Right-side filters: confirm the move is already under way.

use super::{FilterOutcome, TargetFilter};
use crate::target::{Candle, FilterKind, InvestmentTarget};

fn last_n(candles: &[Candle], n: usize) -> &[Candle] {
    &candles[candles.len().saturating_sub(n)..]
}

/// Passes when any candle in the lookback shows an up close, a gain ratio at
/// the threshold, or volume above its 20-day average times the ratio.
#[derive(Debug, Clone)]
pub struct BreakoutDetectionFilter {
    pub days_lookback: usize,
    pub price_ratio_threshold: f64,
    pub volume_augmentation_ratio_threshold: f64,
}

impl BreakoutDetectionFilter {
    pub fn new(
        days_lookback: usize,
        price_ratio_threshold: f64,
        volume_augmentation_ratio_threshold: f64,
    ) -> Self {
        Self {
            days_lookback,
            price_ratio_threshold,
            volume_augmentation_ratio_threshold,
        }
    }

    fn qualifies(&self, c: &Candle) -> bool {
        let row = &c.row;
        row.close > row.open
            || (row.close - row.open) / row.open >= self.price_ratio_threshold
            || row.volume as f64 > c.volume_avg_20d * self.volume_augmentation_ratio_threshold
    }
}

impl TargetFilter for BreakoutDetectionFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::BreakoutDetection
    }

    fn apply(&self, target: &InvestmentTarget) -> FilterOutcome {
        match last_n(&target.candles, self.days_lookback)
            .iter()
            .find(|c| self.qualifies(c))
        {
            Some(c) => FilterOutcome::new(self.kind(), true, format!("breakout on {}", c.row.date)),
            None => FilterOutcome::new(
                self.kind(),
                false,
                format!("no breakout in last {} candles", self.days_lookback),
            ),
        }
    }
}

/// Fails when any candle in the lookback closes below `ma_20 * tolerance`.
///
/// Candles whose moving average is not yet defined never count as violations.
#[derive(Debug, Clone)]
pub struct StructureConfirmationFilter {
    pub days_lookback: usize,
    pub ma_tolerance: f64,
}

impl StructureConfirmationFilter {
    pub fn new(days_lookback: usize, ma_tolerance: f64) -> Self {
        Self {
            days_lookback,
            ma_tolerance,
        }
    }
}

impl TargetFilter for StructureConfirmationFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::StructureConfirmation
    }

    fn apply(&self, target: &InvestmentTarget) -> FilterOutcome {
        match last_n(&target.candles, self.days_lookback)
            .iter()
            .find(|c| c.row.close < c.ma_20 * self.ma_tolerance)
        {
            Some(c) => FilterOutcome::new(
                self.kind(),
                false,
                format!("close {} below band {} on {}", c.row.close, c.ma_20 * self.ma_tolerance, c.row.date),
            ),
            None => FilterOutcome::new(self.kind(), true, "structure holds"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::test_support::*;

    /// Flat down-closing candles: open 101, close 100, constant volume.
    fn flat_down(n: usize) -> Vec<crate::domain::PriceRow> {
        let mut rows = rising_rows(n);
        for r in &mut rows {
            *r = crate::domain::PriceRow::new(r.date, 101.0, 101.5, 99.5, 100.0, 1000);
        }
        rows
    }

    #[test]
    fn breakout_single_qualifying_day_passes() {
        let mut rows = flat_down(40);
        let filter = BreakoutDetectionFilter::new(20, 0.05, 1.5);
        assert!(!filter.apply(&target_from(&rows, 1e9)).passed);

        // One up-close day in the middle of the window.
        rows[30].close = 101.2;
        assert!(filter.apply(&target_from(&rows, 1e9)).passed);
    }

    #[test]
    fn breakout_outside_lookback_is_ignored() {
        let mut rows = flat_down(40);
        rows[5].close = 120.0;
        let filter = BreakoutDetectionFilter::new(20, 0.05, 1.5);
        assert!(!filter.apply(&target_from(&rows, 1e9)).passed);
    }

    #[test]
    fn breakout_by_volume_surge() {
        let mut rows = flat_down(40);
        rows[39].volume = 10_000;
        let filter = BreakoutDetectionFilter::new(20, 0.05, 1.5);
        assert!(filter.apply(&target_from(&rows, 1e9)).passed);
    }

    #[test]
    fn structure_single_violation_fails() {
        let mut rows = flat_down(40);
        let filter = StructureConfirmationFilter::new(20, 0.97);
        assert!(filter.apply(&target_from(&rows, 1e9)).passed);

        // MA ~100; one close well below 97.
        rows[35].close = 80.0;
        assert!(!filter.apply(&target_from(&rows, 1e9)).passed);
    }

    #[test]
    fn structure_ignores_undefined_moving_average() {
        // Fewer than 20 rows: every ma_20 is NaN.
        let rows = flat_down(10);
        let filter = StructureConfirmationFilter::new(20, 0.97);
        assert!(filter.apply(&target_from(&rows, 1e9)).passed);
    }
}
