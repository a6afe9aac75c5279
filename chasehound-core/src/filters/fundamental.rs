//! Fundamental filters: size, liquidity and price floors.

use super::{FilterOutcome, TargetFilter};
use crate::target::{FilterKind, InvestmentTarget};

/// Latest market cap must be at least `lowest_market_gap`.
#[derive(Debug, Clone)]
pub struct MarketGapFilter {
    pub lowest_market_gap: f64,
}

impl MarketGapFilter {
    pub fn new(lowest_market_gap: f64) -> Self {
        Self { lowest_market_gap }
    }
}

impl TargetFilter for MarketGapFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::MarketGap
    }

    fn apply(&self, target: &InvestmentTarget) -> FilterOutcome {
        let passed = target.latest_market_cap >= self.lowest_market_gap;
        FilterOutcome::new(
            self.kind(),
            passed,
            format!("market cap {} vs floor {}", target.latest_market_cap, self.lowest_market_gap),
        )
    }
}

/// Previous-day turnover must be at least `lowest_avg_turnover`.
#[derive(Debug, Clone)]
pub struct TurnoverFilter {
    pub lowest_turnover: f64,
}

impl TurnoverFilter {
    pub fn new(lowest_turnover: f64) -> Self {
        Self { lowest_turnover }
    }
}

impl TargetFilter for TurnoverFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Turnover
    }

    fn apply(&self, target: &InvestmentTarget) -> FilterOutcome {
        let passed = target.previous_day_turnover >= self.lowest_turnover;
        FilterOutcome::new(
            self.kind(),
            passed,
            format!("turnover {} vs floor {}", target.previous_day_turnover, self.lowest_turnover),
        )
    }
}

#[derive(Debug, Clone)]
pub struct PriceFilter {
    pub lowest_price: f64,
}

impl PriceFilter {
    pub fn new(lowest_price: f64) -> Self {
        Self { lowest_price }
    }
}

impl TargetFilter for PriceFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::Price
    }

    fn apply(&self, target: &InvestmentTarget) -> FilterOutcome {
        let passed = target.previous_day_close_price >= self.lowest_price;
        FilterOutcome::new(
            self.kind(),
            passed,
            format!("close {} vs floor {}", target.previous_day_close_price, self.lowest_price),
        )
    }
}

/// Placeholder for an earnings-recency check. Always passes: no report dates
/// are sourced yet.
#[derive(Debug, Clone)]
pub struct LastReportDateFilter {
    pub latest_report_date_days: u32,
}

impl LastReportDateFilter {
    pub fn new(latest_report_date_days: u32) -> Self {
        Self {
            latest_report_date_days,
        }
    }
}

impl TargetFilter for LastReportDateFilter {
    fn kind(&self) -> FilterKind {
        FilterKind::LastReportDate
    }

    fn apply(&self, _target: &InvestmentTarget) -> FilterOutcome {
        FilterOutcome::new(self.kind(), true, "report date not checked")
    }
}
