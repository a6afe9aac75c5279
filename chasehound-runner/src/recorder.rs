//! Per-date CSV artifacts.
//!
//! Three files per virtual date, named `{YYYYMMDD}_{suffix}.csv`:
//! - `results`: survivors of every stage, plus `isInBestNTargets`
//! - `bestTargetsOfTheDay`: the top-N, plus `droppedOutAtFilter`
//! - `sp500Avg`: the single benchmark row
//!
//! Rows are sorted by `currentDayPriceChangePercentage`, descending, with
//! missing values last. Missing numbers and flags are written as empty cells.

use anyhow::{Context, Result};
use chasehound_core::target::{FilterKind, InvestmentTarget, SameDayPerformance};
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

/// Kind of per-date artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Results,
    BestTargets,
    Benchmark,
}

impl ArtifactKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            ArtifactKind::Results => "results",
            ArtifactKind::BestTargets => "bestTargetsOfTheDay",
            ArtifactKind::Benchmark => "sp500Avg",
        }
    }

    pub fn file_name(&self, date: NaiveDate) -> String {
        format!("{}_{}.csv", date.format("%Y%m%d"), self.suffix())
    }

    /// Parse `{YYYYMMDD}_{suffix}.csv` back into its date and kind.
    pub fn parse_file_name(name: &str) -> Option<(NaiveDate, Self)> {
        let stem = name.strip_suffix(".csv")?;
        let (date, suffix) = stem.split_once('_')?;
        let date = NaiveDate::parse_from_str(date, "%Y%m%d").ok()?;
        let kind = [Self::Results, Self::BestTargets, Self::Benchmark]
            .into_iter()
            .find(|k| k.suffix() == suffix)?;
        Some((date, kind))
    }
}

/// Column holding same-day performance, used for sorting and post-analysis.
pub const PRICE_CHANGE_COLUMN: &str = "currentDayPriceChangePercentage";

const BASE_COLUMNS: [&str; 17] = [
    "symbol",
    "previousDayClosePrice",
    "previousDayVolume",
    "previousDayTurnover",
    "latestMarketCap",
    "turnoverShortTerm",
    "turnoverLongTerm",
    "atrShortTerm",
    "atrLongTerm",
    "priceStdShortTerm",
    "priceStdLongTerm",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "previousDayTurnoverRanking",
];

const PERFORMANCE_COLUMNS: [&str; 7] = [
    "currentDayOpenPrice",
    "currentDayHighPrice",
    "currentDayLowPrice",
    "currentDayClosePrice",
    "currentDayPriceChange",
    PRICE_CHANGE_COLUMN,
    "openingGapInPercentage",
];

fn num(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn header(extra: Option<&str>) -> Vec<&str> {
    let mut columns: Vec<&str> = BASE_COLUMNS.to_vec();
    columns.extend(FilterKind::ALL.iter().map(|k| k.column_name()));
    columns.extend(PERFORMANCE_COLUMNS);
    columns.extend(extra);
    columns
}

fn target_record(t: &InvestmentTarget) -> Vec<String> {
    let last = t.candles.last().map(|c| &c.row);
    let mut record = vec![
        t.symbol.clone(),
        num(t.previous_day_close_price),
        opt(t.previous_day_volume),
        num(t.previous_day_turnover),
        num(t.latest_market_cap),
        num(t.turnover_short_term),
        num(t.turnover_long_term),
        num(t.atr_short_term),
        num(t.atr_long_term),
        num(t.price_std_short_term),
        num(t.price_std_long_term),
        opt(last.map(|r| r.open)),
        opt(last.map(|r| r.high)),
        opt(last.map(|r| r.low)),
        opt(last.map(|r| r.close)),
        opt(last.map(|r| r.volume)),
        opt(t.annotations.previous_day_turnover_ranking),
    ];
    record.extend(FilterKind::ALL.iter().map(|k| opt(t.annotations.flag(*k))));

    let p = t.annotations.performance;
    let perf = |field: fn(&SameDayPerformance) -> f64| {
        p.map(|p| num(field(&p))).unwrap_or_default()
    };
    record.extend([
        perf(|p| p.open),
        perf(|p| p.high),
        perf(|p| p.low),
        perf(|p| p.close),
        perf(|p| p.price_change),
        perf(|p| p.price_change_percentage),
        perf(|p| p.opening_gap_percentage),
    ]);
    record
}

/// Stable sort by same-day change, highest first, missing last.
pub fn sort_by_price_change(targets: &[InvestmentTarget]) -> Vec<&InvestmentTarget> {
    let mut sorted: Vec<&InvestmentTarget> = targets.iter().collect();
    let key = |t: &InvestmentTarget| {
        t.price_change_percentage()
            .filter(|v| !v.is_nan())
            .unwrap_or(f64::NEG_INFINITY)
    };
    sorted.sort_by(|a, b| key(b).total_cmp(&key(a)));
    sorted
}

type ExtraColumn<'a> = (&'a str, &'a dyn Fn(&InvestmentTarget) -> String);

fn to_csv(targets: &[InvestmentTarget], extra: Option<ExtraColumn<'_>>) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(header(extra.map(|(name, _)| name)))?;
    for t in sort_by_price_change(targets) {
        let mut record = target_record(t);
        if let Some((_, value)) = extra {
            record.push(value(t));
        }
        wtr.write_record(&record)?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(data).context("CSV output is not valid UTF-8")
}

/// Survivors table with an `isInBestNTargets` column.
pub fn results_csv(targets: &[InvestmentTarget]) -> Result<String> {
    to_csv(
        targets,
        Some(("isInBestNTargets", &|t: &InvestmentTarget| {
            t.annotations.is_in_best_n.unwrap_or(false).to_string()
        })),
    )
}

/// Top-N table with a `droppedOutAtFilter` column.
pub fn best_targets_csv(targets: &[InvestmentTarget]) -> Result<String> {
    to_csv(
        targets,
        Some(("droppedOutAtFilter", &|t: &InvestmentTarget| {
            opt(t.annotations.dropped_out_at)
        })),
    )
}

/// Single-row benchmark table.
pub fn benchmark_csv(benchmark: &InvestmentTarget) -> Result<String> {
    to_csv(std::slice::from_ref(benchmark), None)
}

/// Writes the per-date tables into one output directory.
#[derive(Debug, Clone)]
pub struct ResultRecorder {
    output_dir: PathBuf,
}

impl ResultRecorder {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn write(&self, date: NaiveDate, kind: ArtifactKind, content: &str) -> Result<PathBuf> {
        let path = self.output_dir.join(kind.file_name(date));
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(path)
    }

    /// Write all three tables for `date`. Returns the written paths.
    pub fn record_day(
        &self,
        date: NaiveDate,
        survivors: &[InvestmentTarget],
        best: &[InvestmentTarget],
        benchmark: &InvestmentTarget,
    ) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("failed to create output dir: {}", self.output_dir.display())
        })?;
        Ok(vec![
            self.write(date, ArtifactKind::Benchmark, &benchmark_csv(benchmark)?)?,
            self.write(date, ArtifactKind::BestTargets, &best_targets_csv(best)?)?,
            self.write(date, ArtifactKind::Results, &results_csv(survivors)?)?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chasehound_core::domain::PriceRow;
    use chasehound_core::params::TunableParams;
    use chasehound_core::target::DropOutStage;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn target(symbol: &str, change_pct: Option<f64>) -> InvestmentTarget {
        let params = TunableParams::with_dates(d(15), d(15)).unwrap();
        let rows = vec![
            PriceRow::new(d(13), 10.0, 11.0, 9.0, 10.0, 100),
            PriceRow::new(d(14), 10.0, 11.0, 9.0, 10.0, 100),
        ];
        let mut t = InvestmentTarget::build(symbol, &rows, 1e9, &params).unwrap();
        t.annotations.performance = change_pct.map(|pct| {
            let close = 10.0 * (1.0 + pct);
            SameDayPerformance::from_row(&PriceRow::new(d(15), 10.0, close, 9.0, close, 1), 10.0)
        });
        t
    }

    fn column(csv: &str, name: &str) -> Vec<String> {
        let mut rdr = csv::Reader::from_reader(csv.as_bytes());
        let idx = rdr
            .headers()
            .unwrap()
            .iter()
            .position(|h| h == name)
            .unwrap();
        rdr.records()
            .map(|r| r.unwrap().get(idx).unwrap().to_string())
            .collect()
    }

    #[test]
    fn file_names_round_trip() {
        let name = ArtifactKind::BestTargets.file_name(d(5));
        assert_eq!(name, "20240305_bestTargetsOfTheDay.csv");
        assert_eq!(
            ArtifactKind::parse_file_name(&name),
            Some((d(5), ArtifactKind::BestTargets))
        );
        assert_eq!(ArtifactKind::parse_file_name("performanceDistribution.csv"), None);
        assert_eq!(ArtifactKind::parse_file_name("20240305_other.csv"), None);
    }

    #[test]
    fn results_sorted_descending_with_missing_last() {
        let targets = vec![
            target("LOW", Some(-0.02)),
            target("NONE", None),
            target("HIGH", Some(0.05)),
        ];
        let csv = results_csv(&targets).unwrap();
        assert_eq!(column(&csv, "symbol"), vec!["HIGH", "LOW", "NONE"]);
        assert_eq!(column(&csv, PRICE_CHANGE_COLUMN)[2], "");
        assert_eq!(column(&csv, "isInBestNTargets"), vec!["false"; 3]);
    }

    #[test]
    fn header_carries_every_filter_column() {
        let csv = results_csv(&[]).unwrap();
        for kind in FilterKind::ALL {
            assert!(csv.contains(kind.column_name()));
        }
        assert!(csv.starts_with("symbol,"));
    }

    #[test]
    fn placeholder_benchmark_leaves_every_metric_blank() {
        let csv = benchmark_csv(&InvestmentTarget::placeholder("^GSPC", d(15))).unwrap();
        assert_eq!(column(&csv, "symbol"), vec!["^GSPC"]);
        assert_eq!(column(&csv, "previousDayVolume"), vec![""]);
        assert_eq!(column(&csv, "previousDayClosePrice"), vec![""]);

        let csv = benchmark_csv(&target("SPY", None)).unwrap();
        assert_eq!(column(&csv, "previousDayVolume"), vec!["100"]);
    }

    #[test]
    fn best_targets_carry_dropout_label() {
        let mut t = target("A", Some(0.01));
        t.annotations.dropped_out_at = Some(DropOutStage::RightSide);
        let csv = best_targets_csv(&[t]).unwrap();
        assert_eq!(column(&csv, "droppedOutAtFilter"), vec!["rightSideFilters"]);
    }

    #[test]
    fn record_day_writes_three_files() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = ResultRecorder::new(dir.path().join("out"));
        let mut bench = target("^GSPC", Some(0.001));
        bench.latest_market_cap = f64::NAN;
        let paths = recorder
            .record_day(d(15), &[target("A", Some(0.01))], &[], &bench)
            .unwrap();
        assert_eq!(paths.len(), 3);
        assert!(paths.iter().all(|p| p.exists()));
        let bench_csv = std::fs::read_to_string(&paths[0]).unwrap();
        assert_eq!(column(&bench_csv, "latestMarketCap"), vec![""]);
    }
}
