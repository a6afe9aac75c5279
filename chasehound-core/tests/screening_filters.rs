//! Filter stage semantics over built targets.

use chasehound_core::domain::PriceRow;
use chasehound_core::filters::{FilterPipeline, FilterStage};
use chasehound_core::params::TunableParams;
use chasehound_core::target::{DropOutStage, InvestmentTarget};
use chrono::{Duration, NaiveDate};

fn params() -> TunableParams {
    let d = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
    let mut p = TunableParams::with_dates(d, d).unwrap();
    p.lowest_market_gap = 50_000_000.0;
    p.lowest_avg_turnover = 1_000_000.0;
    p.volatility_filters_passing_threshold = 0;
    p
}

/// 60 quiet sessions followed by 5 expanding ones, ending in an up close.
fn breakout_rows() -> Vec<PriceRow> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    (0..65)
        .map(|i| {
            let date = start + Duration::days(i);
            if i < 60 {
                PriceRow::new(date, 50.0, 50.5, 49.5, 50.0 + (i % 2) as f64 * 0.1, 100_000)
            } else {
                let c = 50.0 + (i - 59) as f64 * 2.0;
                PriceRow::new(date, c - 1.5, c + 0.5, c - 2.0, c, 400_000)
            }
        })
        .collect()
}

fn target(symbol: &str, market_cap: f64) -> InvestmentTarget {
    InvestmentTarget::build(symbol, &breakout_rows(), market_cap, &params()).unwrap()
}

#[test]
fn fundamental_stage_keeps_symbols_at_or_above_market_gap() {
    let pipeline = FilterPipeline::from_params(&params());
    let targets = vec![
        target("SMALL", 40_000_000.0),
        target("MID", 120_000_000.0),
        target("LARGE", 500_000_000.0),
    ];

    let fundamental: &FilterStage = &pipeline.stages()[0];
    let kept = fundamental.retain(targets);
    let symbols: Vec<&str> = kept.iter().map(|t| t.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["MID", "LARGE"]);
    assert!(kept.iter().all(|t| t.annotations.passed_market_gap == Some(true)));
}

#[test]
fn expanding_series_passes_every_stage() {
    let pipeline = FilterPipeline::from_params(&params());
    let survivors = pipeline.run(vec![target("LARGE", 500_000_000.0)]);
    assert_eq!(survivors.len(), 1);
    let a = &survivors[0].annotations;
    assert_eq!(a.passed_breakout_detection, Some(true));
    assert_eq!(a.passed_structure_confirmation, Some(true));
    // The last five sessions dominate every short-term window.
    assert_eq!(a.turnover_spike_detected, Some(true));
    assert_eq!(a.atr_spike_detected, Some(true));
}

#[test]
fn attribution_rerun_leaves_first_pass_untouched() {
    let pipeline = FilterPipeline::from_params(&params());
    let survivors = pipeline.run(vec![target("MID", 120_000_000.0)]);
    let snapshot = survivors[0].annotations.clone();

    let mut copy = survivors[0].clone();
    assert_eq!(pipeline.attribute_dropout(&mut copy), DropOutStage::PassedAll);
    assert_eq!(copy.annotations.dropped_out_at, Some(DropOutStage::PassedAll));
    assert_eq!(survivors[0].annotations, snapshot);
    assert_eq!(survivors[0].annotations.dropped_out_at, None);
}
