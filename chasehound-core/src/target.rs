//! Investment targets: per-symbol snapshot, derived metrics and annotations.
//!
//! A target is built once per symbol per virtual date from the history that
//! ends the day before. Filters read it; only the pipeline writes its
//! annotations.

use crate::domain::PriceRow;
use crate::indicators::{rolling_mean, tail_mean, tail_sample_std, true_range};
use crate::params::TunableParams;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Window of the volume average and close moving average attached to each candle.
pub const ENHANCEMENT_WINDOW: usize = 20;

/// A history row enriched with the columns the right-side filters read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    #[serde(flatten)]
    pub row: PriceRow,
    /// 20-row rolling mean of volume; NaN for the first 19 rows.
    pub volume_avg_20d: f64,
    /// 20-row rolling mean of close; NaN for the first 19 rows.
    pub ma_20: f64,
}

/// Attach the rolling volume average and close moving average to each row.
pub fn enhance_rows(rows: &[PriceRow]) -> Vec<Candle> {
    let volumes: Vec<f64> = rows.iter().map(|r| r.volume as f64).collect();
    let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
    let volume_avg = rolling_mean(&volumes, ENHANCEMENT_WINDOW);
    let ma = rolling_mean(&closes, ENHANCEMENT_WINDOW);

    rows.iter()
        .zip(volume_avg)
        .zip(ma)
        .map(|((row, volume_avg_20d), ma_20)| Candle {
            row: row.clone(),
            volume_avg_20d,
            ma_20,
        })
        .collect()
}

/// Observed outcome on the virtual date itself.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SameDayPerformance {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// close - previous close
    pub price_change: f64,
    /// (close - previous close) / previous close
    pub price_change_percentage: f64,
    /// (open - previous close) / previous close
    pub opening_gap_percentage: f64,
}

impl SameDayPerformance {
    pub fn from_row(row: &PriceRow, previous_close: f64) -> Self {
        let price_change = row.close - previous_close;
        Self {
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            price_change,
            price_change_percentage: price_change / previous_close,
            opening_gap_percentage: (row.open - previous_close) / previous_close,
        }
    }
}

/// Every individual filter, named by the CSV column that records its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FilterKind {
    MarketGap,
    Turnover,
    Price,
    LastReportDate,
    TurnoverSpike,
    AtrSpike,
    PriceStdSpike,
    BreakoutDetection,
    StructureConfirmation,
}

impl FilterKind {
    pub const ALL: [FilterKind; 9] = [
        FilterKind::MarketGap,
        FilterKind::Turnover,
        FilterKind::Price,
        FilterKind::LastReportDate,
        FilterKind::TurnoverSpike,
        FilterKind::AtrSpike,
        FilterKind::PriceStdSpike,
        FilterKind::BreakoutDetection,
        FilterKind::StructureConfirmation,
    ];

    pub fn column_name(&self) -> &'static str {
        match self {
            FilterKind::MarketGap => "didPassMarketGapFilter",
            FilterKind::Turnover => "didPassTurnoverFilter",
            FilterKind::Price => "didPassPriceFilter",
            FilterKind::LastReportDate => "didPassLastReportDateFilter",
            FilterKind::TurnoverSpike => "didPassTurnoverSpikeFilter",
            FilterKind::AtrSpike => "didPassAtrSpikeFilter",
            FilterKind::PriceStdSpike => "didPassPriceStdSpikeFilter",
            FilterKind::BreakoutDetection => "didPassBreakoutDetectionFilter",
            FilterKind::StructureConfirmation => "didPassStructureConfirmationFilter",
        }
    }
}

/// First filter stage a target fails, or `PassedAll`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropOutStage {
    Fundamental,
    Volatility,
    RightSide,
    PassedAll,
}

impl DropOutStage {
    pub fn label(&self) -> &'static str {
        match self {
            DropOutStage::Fundamental => "fundamentalFilters",
            DropOutStage::Volatility => "volatilityFilters",
            DropOutStage::RightSide => "rightSideFilters",
            DropOutStage::PassedAll => "passedAllFilters",
        }
    }
}

impl fmt::Display for DropOutStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything the pipeline learns about a target after it is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetAnnotations {
    /// 1 = highest previous-day turnover among the day's built targets.
    pub previous_day_turnover_ranking: Option<usize>,

    pub passed_market_gap: Option<bool>,
    pub passed_turnover: Option<bool>,
    pub passed_price: Option<bool>,
    pub passed_last_report_date: Option<bool>,
    pub turnover_spike_detected: Option<bool>,
    pub atr_spike_detected: Option<bool>,
    pub price_std_spike_detected: Option<bool>,
    pub passed_breakout_detection: Option<bool>,
    pub passed_structure_confirmation: Option<bool>,

    pub performance: Option<SameDayPerformance>,
    pub dropped_out_at: Option<DropOutStage>,
    pub is_in_best_n: Option<bool>,
}

impl TargetAnnotations {
    fn slot(&mut self, kind: FilterKind) -> &mut Option<bool> {
        match kind {
            FilterKind::MarketGap => &mut self.passed_market_gap,
            FilterKind::Turnover => &mut self.passed_turnover,
            FilterKind::Price => &mut self.passed_price,
            FilterKind::LastReportDate => &mut self.passed_last_report_date,
            FilterKind::TurnoverSpike => &mut self.turnover_spike_detected,
            FilterKind::AtrSpike => &mut self.atr_spike_detected,
            FilterKind::PriceStdSpike => &mut self.price_std_spike_detected,
            FilterKind::BreakoutDetection => &mut self.passed_breakout_detection,
            FilterKind::StructureConfirmation => &mut self.passed_structure_confirmation,
        }
    }

    pub fn record(&mut self, kind: FilterKind, passed: bool) {
        *self.slot(kind) = Some(passed);
    }

    pub fn flag(&self, kind: FilterKind) -> Option<bool> {
        match kind {
            FilterKind::MarketGap => self.passed_market_gap,
            FilterKind::Turnover => self.passed_turnover,
            FilterKind::Price => self.passed_price,
            FilterKind::LastReportDate => self.passed_last_report_date,
            FilterKind::TurnoverSpike => self.turnover_spike_detected,
            FilterKind::AtrSpike => self.atr_spike_detected,
            FilterKind::PriceStdSpike => self.price_std_spike_detected,
            FilterKind::BreakoutDetection => self.passed_breakout_detection,
            FilterKind::StructureConfirmation => self.passed_structure_confirmation,
        }
    }
}

/// One symbol as seen on one virtual date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentTarget {
    pub symbol: String,
    /// Date of the last history row (the session before the virtual date).
    pub as_of: NaiveDate,
    pub previous_day_close_price: f64,
    pub previous_day_volume: Option<u64>,
    pub previous_day_turnover: f64,
    /// NaN when unknown (e.g. an index).
    pub latest_market_cap: f64,

    pub turnover_short_term: f64,
    pub turnover_long_term: f64,
    pub atr_short_term: f64,
    pub atr_long_term: f64,
    pub price_std_short_term: f64,
    pub price_std_long_term: f64,

    pub candles: Vec<Candle>,
    pub annotations: TargetAnnotations,
}

impl InvestmentTarget {
    /// Build a target from history ending the session before the virtual date.
    ///
    /// Returns `None` for an empty history.
    pub fn build(
        symbol: &str,
        rows: &[PriceRow],
        market_cap: f64,
        params: &TunableParams,
    ) -> Option<Self> {
        let last = rows.last()?;

        let turnovers: Vec<f64> = rows.iter().map(|r| r.turnover).collect();
        let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
        let tr = true_range(rows);

        Some(Self {
            symbol: symbol.to_string(),
            as_of: last.date,
            previous_day_close_price: last.close,
            previous_day_volume: Some(last.volume),
            previous_day_turnover: last.turnover,
            latest_market_cap: market_cap,
            turnover_short_term: tail_mean(&turnovers, params.turnover_short_term_days),
            turnover_long_term: tail_mean(&turnovers, params.turnover_long_term_days),
            atr_short_term: tail_mean(&tr, params.atr_short_term_days),
            atr_long_term: tail_mean(&tr, params.atr_long_term_days),
            price_std_short_term: tail_sample_std(&closes, params.price_std_short_term_days),
            price_std_long_term: tail_sample_std(&closes, params.price_std_long_term_days),
            candles: enhance_rows(rows),
            annotations: TargetAnnotations::default(),
        })
    }

    /// Row with every metric unknown, for a symbol that has no history.
    pub fn placeholder(symbol: &str, as_of: NaiveDate) -> Self {
        Self {
            symbol: symbol.to_string(),
            as_of,
            previous_day_close_price: f64::NAN,
            previous_day_volume: None,
            previous_day_turnover: f64::NAN,
            latest_market_cap: f64::NAN,
            turnover_short_term: f64::NAN,
            turnover_long_term: f64::NAN,
            atr_short_term: f64::NAN,
            atr_long_term: f64::NAN,
            price_std_short_term: f64::NAN,
            price_std_long_term: f64::NAN,
            candles: Vec::new(),
            annotations: TargetAnnotations::default(),
        }
    }

    /// Same-day price change percentage, when performance has been filled.
    pub fn price_change_percentage(&self) -> Option<f64> {
        self.annotations
            .performance
            .map(|p| p.price_change_percentage)
    }
}

/// Rank targets by previous-day turnover, highest first, starting at 1.
///
/// Ties keep their input order. NaN turnover ranks last.
pub fn assign_turnover_ranking(targets: &mut [InvestmentTarget]) {
    let mut order: Vec<usize> = (0..targets.len()).collect();
    let key = |t: &InvestmentTarget| {
        if t.previous_day_turnover.is_nan() {
            f64::NEG_INFINITY
        } else {
            t.previous_day_turnover
        }
    };
    order.sort_by(|&a, &b| key(&targets[b]).total_cmp(&key(&targets[a])));
    for (rank, index) in order.into_iter().enumerate() {
        targets[index].annotations.previous_day_turnover_ranking = Some(rank + 1);
    }
}

/// Top `n` targets by same-day price change percentage, descending.
///
/// Targets without observed performance are not ranked.
pub fn best_n_by_price_change(targets: &[InvestmentTarget], n: usize) -> Vec<InvestmentTarget> {
    let mut ranked: Vec<&InvestmentTarget> = targets
        .iter()
        .filter(|t| t.price_change_percentage().is_some_and(|p| !p.is_nan()))
        .collect();
    ranked.sort_by(|a, b| {
        let pa = a.price_change_percentage().unwrap_or(f64::NEG_INFINITY);
        let pb = b.price_change_percentage().unwrap_or(f64::NEG_INFINITY);
        pb.total_cmp(&pa)
    });
    ranked.into_iter().take(n).cloned().collect()
}
