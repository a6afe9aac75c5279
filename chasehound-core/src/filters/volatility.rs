//! Volatility spike detections: short-term over long-term ratio of a metric.

use super::{FilterOutcome, TargetFilter};
use crate::target::{FilterKind, InvestmentTarget};

/// `short / long >= threshold`. A non-finite ratio never counts as a spike.
fn spike(kind: FilterKind, short: f64, long: f64, threshold: f64) -> FilterOutcome {
    let ratio = short / long;
    let passed = ratio.is_finite() && ratio >= threshold;
    FilterOutcome::new(kind, passed, format!("ratio {ratio:.4} vs threshold {threshold}"))
}

#[derive(Debug, Clone)]
pub struct TurnoverSpikeFilter {
    pub threshold: f64,
}

impl TurnoverSpikeFilter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl TargetFilter for TurnoverSpikeFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::TurnoverSpike
    }

    fn apply(&self, target: &InvestmentTarget) -> FilterOutcome {
        spike(
            self.kind(),
            target.turnover_short_term,
            target.turnover_long_term,
            self.threshold,
        )
    }
}

#[derive(Debug, Clone)]
pub struct AtrSpikeFilter {
    pub threshold: f64,
}

impl AtrSpikeFilter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl TargetFilter for AtrSpikeFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::AtrSpike
    }

    fn apply(&self, target: &InvestmentTarget) -> FilterOutcome {
        spike(
            self.kind(),
            target.atr_short_term,
            target.atr_long_term,
            self.threshold,
        )
    }
}

#[derive(Debug, Clone)]
pub struct PriceStdSpikeFilter {
    pub threshold: f64,
}

impl PriceStdSpikeFilter {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl TargetFilter for PriceStdSpikeFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::PriceStdSpike
    }

    fn apply(&self, target: &InvestmentTarget) -> FilterOutcome {
        spike(
            self.kind(),
            target.price_std_short_term,
            target.price_std_long_term,
            self.threshold,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::test_support::*;

    #[test]
    fn ratio_at_threshold_passes() {
        let mut t = target_from(&rising_rows(5), 1e9);
        t.turnover_short_term = 105.0;
        t.turnover_long_term = 100.0;
        assert!(TurnoverSpikeFilter::new(1.05).apply(&t).passed);
        assert!(!TurnoverSpikeFilter::new(1.06).apply(&t).passed);
    }

    #[test]
    fn zero_or_nan_long_term_never_spikes() {
        let mut t = target_from(&rising_rows(5), 1e9);
        t.atr_short_term = 1.0;
        t.atr_long_term = 0.0;
        assert!(!AtrSpikeFilter::new(1.2).apply(&t).passed);
        t.price_std_short_term = 1.0;
        t.price_std_long_term = f64::NAN;
        assert!(!PriceStdSpikeFilter::new(0.0).apply(&t).passed);
    }
}
