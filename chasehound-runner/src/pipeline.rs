//! Screening pipeline: backward iteration over virtual dates.
//!
//! Seeded with the end date, the pipeline walks back one session at a time
//! until it passes the start date. Each virtual date:
//!
//! 1. loads history for the eligible universe up to the previous session
//! 2. builds one target per symbol with data and ranks them by turnover
//! 3. runs the fundamental, volatility and right-side stages
//! 4. outside prediction mode, fills same-day performance and picks the top-N
//!    from every built target, then attributes where each top-N target drops out
//! 5. writes the three per-date CSV tables
//!
//! After the last date the performance distribution and run manifest are
//! written next to the tables.

use crate::config::RunConfig;
use crate::manifest::{write_manifest, RunManifest, MANIFEST_FILE};
use crate::post_analysis;
use crate::recorder::ResultRecorder;
use anyhow::Context;
use chasehound_core::calendar::MarketCalendar;
use chasehound_core::clock::Clock;
use chasehound_core::data::{
    DataError, FetchOrchestrator, HistoryService, PriceCache, QuoteProvider, Universe,
};
use chasehound_core::domain::Interval;
use chasehound_core::filters::FilterPipeline;
use chasehound_core::params::{ConfigError, TunableParams};
use chasehound_core::target::{
    assign_turnover_ranking, best_n_by_price_change, DropOutStage, InvestmentTarget,
    SameDayPerformance,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that stop a run.
///
/// Per-symbol data problems never show up here; they only exclude the symbol.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("data error: {0}")]
    Data(#[from] DataError),
    #[error(transparent)]
    Output(#[from] anyhow::Error),
}

/// Where the pipeline is within the current virtual date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    AwaitingDate,
    FetchingUniverse,
    BuildingTargets,
    FilteringFundamental,
    FilteringVolatility,
    FilteringRightSide,
    Ranking,
    AttributingDropout,
    Recording,
    Done,
}

impl PipelineState {
    fn filtering(stage: DropOutStage) -> Self {
        match stage {
            DropOutStage::Fundamental => PipelineState::FilteringFundamental,
            DropOutStage::Volatility => PipelineState::FilteringVolatility,
            DropOutStage::RightSide | DropOutStage::PassedAll => PipelineState::FilteringRightSide,
        }
    }
}

/// Targets left after one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCount {
    pub stage: DropOutStage,
    pub remaining: usize,
}

/// What happened on one virtual date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationReport {
    pub date: NaiveDate,
    pub prediction_mode: bool,
    pub universe_size: usize,
    pub built: usize,
    pub stages: Vec<StageCount>,
    pub best_n: usize,
    pub artifacts: Vec<PathBuf>,
}

impl IterationReport {
    /// Targets left after `stage`, if the pipeline has it.
    pub fn remaining_after(&self, stage: DropOutStage) -> Option<usize> {
        self.stages
            .iter()
            .find(|s| s.stage == stage)
            .map(|s| s.remaining)
    }
}

/// Outcome of a complete run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub output_dir: PathBuf,
    pub days: Vec<IterationReport>,
    /// Every file written, per-date tables first.
    pub artifacts: Vec<PathBuf>,
    pub duration_secs: f64,
}

/// Drives one screening run.
pub struct ScreeningPipeline {
    params: TunableParams,
    universe: Universe,
    history: HistoryService,
    calendar: MarketCalendar,
    clock: Arc<dyn Clock>,
    filters: FilterPipeline,
    recorder: ResultRecorder,
    benchmark_symbol: String,
    interval: Interval,
    state: PipelineState,
}

impl ScreeningPipeline {
    /// Pipeline with the default calendar, `^GSPC` benchmark and daily rows.
    ///
    /// Fails if `params` do not validate.
    pub fn new(
        params: TunableParams,
        universe: Universe,
        history: HistoryService,
        clock: Arc<dyn Clock>,
        recorder: ResultRecorder,
    ) -> Result<Self, PipelineError> {
        params.validate()?;
        let filters = FilterPipeline::from_params(&params);
        Ok(Self {
            params,
            universe,
            history,
            calendar: MarketCalendar::default(),
            clock,
            filters,
            recorder,
            benchmark_symbol: "^GSPC".to_string(),
            interval: Interval::Daily,
            state: PipelineState::AwaitingDate,
        })
    }

    pub fn with_calendar(mut self, calendar: MarketCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    pub fn with_benchmark(mut self, symbol: impl Into<String>) -> Self {
        self.benchmark_symbol = symbol.into();
        self
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = interval;
        self
    }

    /// Wire a pipeline from a run file: opens the cache, loads the universe
    /// and builds the fetch pool.
    pub fn from_config(
        config: &RunConfig,
        provider: Arc<dyn QuoteProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PipelineError> {
        let params = config.resolve()?;
        let settings = &config.run;

        let cache = Arc::new(PriceCache::open(&settings.cache_dir, Arc::clone(&clock))?);
        let orchestrator = FetchOrchestrator::new(provider, settings.orchestrator_config())?;
        let universe = Universe::from_file(&settings.universe_file)?;
        info!(
            universe = universe.len(),
            file = %settings.universe_file.display(),
            "universe loaded"
        );

        Ok(Self::new(
            params,
            universe,
            HistoryService::new(cache, orchestrator),
            clock,
            ResultRecorder::new(&settings.output_dir),
        )?
        .with_calendar(settings.calendar()?)
        .with_benchmark(settings.benchmark_symbol.clone())
        .with_interval(settings.interval))
    }

    pub fn params(&self) -> &TunableParams {
        &self.params
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = ?self.state, to = ?next, "pipeline state");
        self.state = next;
    }

    /// Run every virtual date from the end date back to the start date.
    pub fn run(&mut self) -> Result<RunSummary, PipelineError> {
        let timer = Instant::now();
        let started_at = Utc::now();
        let run_id = self.params.run_id();
        let output_dir = self.recorder.output_dir().to_path_buf();
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("failed to create output dir: {}", output_dir.display()))?;

        let (symbols, caps): (Vec<String>, HashMap<String, f64>) = {
            let eligible = self.universe.eligible(self.params.lowest_market_gap);
            (
                eligible.iter().map(|l| l.symbol.clone()).collect(),
                eligible
                    .iter()
                    .filter_map(|l| l.market_cap.map(|cap| (l.symbol.clone(), cap)))
                    .collect(),
            )
        };
        info!(
            run_id = %run_id,
            start = %self.params.start_date,
            end = %self.params.end_date,
            universe = self.universe.len(),
            eligible = symbols.len(),
            "screening run started"
        );

        self.warm_up(&symbols);

        let mut days = Vec::new();
        let mut virtual_date = self.calendar.open_on_or_before(self.params.end_date);
        while virtual_date >= self.params.start_date {
            self.transition(PipelineState::AwaitingDate);
            days.push(self.run_day(virtual_date, &symbols, &caps)?);
            virtual_date = self.calendar.previous_market_open(virtual_date);
        }

        let mut artifacts: Vec<PathBuf> = days.iter().flat_map(|d| d.artifacts.clone()).collect();
        artifacts.push(post_analysis::write_distribution(&output_dir)?);

        let duration_secs = timer.elapsed().as_secs_f64();
        let manifest = RunManifest {
            run_id: run_id.clone(),
            params: self.params.clone(),
            benchmark_symbol: self.benchmark_symbol.clone(),
            started_at,
            finished_at: Utc::now(),
            duration_secs,
            days: days.clone(),
        };
        let manifest_path = output_dir.join(MANIFEST_FILE);
        write_manifest(&manifest_path, &manifest)?;
        artifacts.push(manifest_path);

        self.transition(PipelineState::Done);
        info!(run_id = %run_id, days = days.len(), duration_secs, "screening run finished");

        Ok(RunSummary {
            run_id,
            output_dir,
            days,
            artifacts,
            duration_secs,
        })
    }

    /// Fill the cache for the whole run in one pass so each date is served locally.
    fn warm_up(&self, symbols: &[String]) {
        let from = self.params.start_date - Duration::days(self.params.history_lookback_days());
        let to = (self.params.end_date + Duration::days(7)).min(self.clock.today());
        if from > to {
            return;
        }
        let mut all = symbols.to_vec();
        all.push(self.benchmark_symbol.clone());
        let with_data = self.history.warm(&all, from, to, self.interval);
        info!(%from, %to, symbols = all.len(), with_data, "cache warmed");
    }

    /// History window for `virtual_date`, snapped to sessions.
    fn history_window(&self, virtual_date: NaiveDate) -> (NaiveDate, NaiveDate) {
        let to = self.calendar.previous_market_open(virtual_date);
        let from = self.calendar.open_on_or_after(
            virtual_date - Duration::days(self.params.history_lookback_days()),
        );
        (from.min(to), to)
    }

    fn run_day(
        &mut self,
        virtual_date: NaiveDate,
        symbols: &[String],
        caps: &HashMap<String, f64>,
    ) -> Result<IterationReport, PipelineError> {
        let prediction_mode = self
            .calendar
            .does_date_refer_to_prediction(virtual_date, self.clock.as_ref());

        self.transition(PipelineState::FetchingUniverse);
        let (from, to) = self.history_window(virtual_date);
        let histories = self.history.load_histories(symbols, from, to, self.interval);

        self.transition(PipelineState::BuildingTargets);
        let mut targets: Vec<InvestmentTarget> = symbols
            .iter()
            .zip(&histories)
            .filter_map(|(symbol, rows)| {
                let cap = caps.get(symbol).copied().unwrap_or(f64::NAN);
                InvestmentTarget::build(symbol, rows.as_deref()?, cap, &self.params)
            })
            .collect();
        assign_turnover_ranking(&mut targets);
        let built = targets.len();
        if built < symbols.len() {
            debug!(date = %virtual_date, missing = symbols.len() - built, "symbols without history");
        }
        let mut originals = targets.clone();

        let state = &mut self.state;
        let (mut survivors, remaining) = self.filters.run_observed(targets, |stage| {
            let next = PipelineState::filtering(stage);
            debug!(from = ?*state, to = ?next, "pipeline state");
            *state = next;
        });
        let mut before = built;
        let stages: Vec<StageCount> = remaining
            .into_iter()
            .map(|(stage, left)| {
                info!(date = %virtual_date, stage = %stage, before, after = left, "stage applied");
                before = left;
                StageCount {
                    stage,
                    remaining: left,
                }
            })
            .collect();

        self.transition(PipelineState::Ranking);
        let mut best = Vec::new();
        if prediction_mode {
            debug!(date = %virtual_date, "prediction mode: no same-day performance");
        } else {
            let performance = self.same_day_performance(virtual_date, &originals);
            for t in originals.iter_mut().chain(survivors.iter_mut()) {
                t.annotations.performance = performance.get(&t.symbol).copied();
            }
            best = best_n_by_price_change(&originals, self.params.best_targets_n);
        }

        self.transition(PipelineState::AttributingDropout);
        for t in best.iter_mut() {
            self.filters.attribute_dropout(t);
        }
        let best_symbols: HashSet<&str> = best.iter().map(|t| t.symbol.as_str()).collect();
        for t in survivors.iter_mut() {
            t.annotations.is_in_best_n = Some(best_symbols.contains(t.symbol.as_str()));
        }

        self.transition(PipelineState::Recording);
        let benchmark = self.benchmark_target(virtual_date, from, to, prediction_mode);
        let artifacts = self
            .recorder
            .record_day(virtual_date, &survivors, &best, &benchmark)?;

        let report = IterationReport {
            date: virtual_date,
            prediction_mode,
            universe_size: symbols.len(),
            built,
            stages,
            best_n: best.len(),
            artifacts,
        };
        info!(
            date = %report.date,
            prediction_mode,
            built,
            survivors = survivors.len(),
            best_n = report.best_n,
            "virtual date recorded"
        );
        Ok(report)
    }

    /// Performance on `virtual_date` itself, keyed by symbol.
    ///
    /// A symbol whose last row in `[previous session, virtual_date]` is not
    /// dated `virtual_date` gets no entry.
    fn same_day_performance(
        &self,
        virtual_date: NaiveDate,
        targets: &[InvestmentTarget],
    ) -> HashMap<String, SameDayPerformance> {
        if targets.is_empty() {
            return HashMap::new();
        }
        let symbols: Vec<String> = targets.iter().map(|t| t.symbol.clone()).collect();
        let from = self.calendar.previous_market_open(virtual_date);
        let rows = self
            .history
            .load_histories(&symbols, from, virtual_date, self.interval);

        targets
            .iter()
            .zip(rows)
            .filter_map(|(t, rows)| {
                let row = rows?.pop().filter(|r| r.date == virtual_date)?;
                let performance = SameDayPerformance::from_row(&row, t.previous_day_close_price);
                Some((t.symbol.clone(), performance))
            })
            .collect()
    }

    /// Benchmark row built like any other target, or a placeholder without data.
    fn benchmark_target(
        &self,
        virtual_date: NaiveDate,
        from: NaiveDate,
        to: NaiveDate,
        prediction_mode: bool,
    ) -> InvestmentTarget {
        let symbol = self.benchmark_symbol.as_str();
        let rows = self
            .history
            .load_histories(std::slice::from_ref(&self.benchmark_symbol), from, to, self.interval)
            .pop()
            .flatten();
        let mut target = match rows
            .as_deref()
            .and_then(|rows| InvestmentTarget::build(symbol, rows, f64::NAN, &self.params))
        {
            Some(target) => target,
            None => {
                warn!(symbol, date = %virtual_date, "no benchmark history; writing placeholder row");
                InvestmentTarget::placeholder(symbol, to)
            }
        };
        if !prediction_mode {
            target.annotations.performance = self
                .same_day_performance(virtual_date, std::slice::from_ref(&target))
                .remove(symbol);
        }
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chasehound_core::clock::FixedClock;
    use chasehound_core::data::{MockProvider, OrchestratorConfig};
    use chrono_tz::America::New_York;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn pipeline(start: NaiveDate, end: NaiveDate, dir: &std::path::Path) -> ScreeningPipeline {
        let clock: Arc<dyn Clock> = Arc::new(
            FixedClock::at_local(New_York, d(6, 3).and_hms_opt(12, 0, 0).unwrap()).unwrap(),
        );
        let orchestrator =
            FetchOrchestrator::new(Arc::new(MockProvider::new()), OrchestratorConfig::default())
                .unwrap();
        let history = HistoryService::new(
            Arc::new(PriceCache::in_memory(Arc::clone(&clock))),
            orchestrator,
        );
        let params = TunableParams::with_dates(start, end).unwrap();
        ScreeningPipeline::new(params, Universe::default(), history, clock, ResultRecorder::new(dir))
            .unwrap()
    }

    #[test]
    fn history_window_is_snapped_to_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(d(3, 18), d(3, 18), dir.path());
        // 60 calendar days before Monday 2024-03-18 is Thursday 2024-01-18;
        // the previous session is Friday 2024-03-15.
        assert_eq!(p.history_window(d(3, 18)), (d(1, 18), d(3, 15)));
        // 2024-02-19 (Presidents' Day) rolls forward to the 20th.
        assert_eq!(p.history_window(d(4, 19)).0, d(2, 20));
    }

    #[test]
    fn invalid_params_are_rejected_at_construction() {
        let dir = tempfile::tempdir().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(
            FixedClock::at_local(New_York, d(6, 3).and_hms_opt(12, 0, 0).unwrap()).unwrap(),
        );
        let orchestrator =
            FetchOrchestrator::new(Arc::new(MockProvider::new()), OrchestratorConfig::default())
                .unwrap();
        let history =
            HistoryService::new(Arc::new(PriceCache::in_memory(Arc::clone(&clock))), orchestrator);
        let mut params = TunableParams::with_dates(d(3, 1), d(3, 5)).unwrap();
        params.best_targets_n = 0;
        let result = ScreeningPipeline::new(
            params,
            Universe::default(),
            history,
            clock,
            ResultRecorder::new(dir.path()),
        );
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn empty_universe_still_records_each_session() {
        let dir = tempfile::tempdir().unwrap();
        // Saturday 2024-03-09 through Tuesday 2024-03-12: two sessions.
        let mut p = pipeline(d(3, 9), d(3, 12), dir.path());
        let summary = p.run().unwrap();
        let dates: Vec<NaiveDate> = summary.days.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![d(3, 12), d(3, 11)]);
        let stages: Vec<(DropOutStage, usize)> = summary.days[0]
            .stages
            .iter()
            .map(|s| (s.stage, s.remaining))
            .collect();
        assert_eq!(
            stages,
            vec![
                (DropOutStage::Fundamental, 0),
                (DropOutStage::Volatility, 0),
                (DropOutStage::RightSide, 0)
            ]
        );
        assert_eq!(p.state(), PipelineState::Done);
        assert!(dir.path().join("20240311_sp500Avg.csv").exists());
        assert!(dir.path().join(MANIFEST_FILE).exists());
    }
}
