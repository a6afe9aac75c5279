//! Screening filters and stage combinators.
//!
//! Filters are pure: `apply` reads a target and returns a fresh outcome.
//! Recording flags onto a target is the stage's job, so re-running a stage
//! on copies (drop-out attribution) cannot disturb an earlier pass.

pub mod fundamental;
pub mod right_side;
pub mod volatility;

pub use fundamental::{LastReportDateFilter, MarketGapFilter, PriceFilter, TurnoverFilter};
pub use right_side::{BreakoutDetectionFilter, StructureConfirmationFilter};
pub use volatility::{AtrSpikeFilter, PriceStdSpikeFilter, TurnoverSpikeFilter};

use crate::params::TunableParams;
use crate::target::{DropOutStage, FilterKind, InvestmentTarget};
use tracing::debug;

/// Verdict of one filter on one target.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOutcome {
    pub kind: FilterKind,
    pub passed: bool,
    /// Short human-readable explanation of the verdict.
    pub reason: String,
}

impl FilterOutcome {
    pub fn new(kind: FilterKind, passed: bool, reason: impl Into<String>) -> Self {
        Self {
            kind,
            passed,
            reason: reason.into(),
        }
    }
}

/// A stateless predicate over a target.
///
/// Implementations must only read the target and their own thresholds.
pub trait TargetFilter: Send + Sync {
    fn kind(&self) -> FilterKind;

    fn apply(&self, target: &InvestmentTarget) -> FilterOutcome;
}

/// How a stage combines the verdicts of its filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Every filter must pass. Evaluation stops at the first failure.
    All,
    /// At least `min_passing` filters must pass. Every filter is evaluated.
    Vote { min_passing: usize },
}

/// Result of one stage on one target.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutcome {
    pub passed: bool,
    pub outcomes: Vec<FilterOutcome>,
}

/// An ordered group of filters with a combinator.
pub struct FilterStage {
    stage: DropOutStage,
    combinator: Combinator,
    filters: Vec<Box<dyn TargetFilter>>,
}

impl FilterStage {
    pub fn new(
        stage: DropOutStage,
        combinator: Combinator,
        filters: Vec<Box<dyn TargetFilter>>,
    ) -> Self {
        Self {
            stage,
            combinator,
            filters,
        }
    }

    /// The drop-out label of a target this stage rejects.
    pub fn stage(&self) -> DropOutStage {
        self.stage
    }

    pub fn combinator(&self) -> Combinator {
        self.combinator
    }

    pub fn filter_kinds(&self) -> Vec<FilterKind> {
        self.filters.iter().map(|f| f.kind()).collect()
    }

    /// Evaluate the stage on a target without touching it.
    pub fn evaluate(&self, target: &InvestmentTarget) -> StageOutcome {
        match self.combinator {
            Combinator::All => {
                let mut outcomes = Vec::with_capacity(self.filters.len());
                for filter in &self.filters {
                    let outcome = filter.apply(target);
                    let passed = outcome.passed;
                    outcomes.push(outcome);
                    if !passed {
                        return StageOutcome {
                            passed: false,
                            outcomes,
                        };
                    }
                }
                StageOutcome {
                    passed: true,
                    outcomes,
                }
            }
            Combinator::Vote { min_passing } => {
                let outcomes: Vec<FilterOutcome> =
                    self.filters.iter().map(|f| f.apply(target)).collect();
                let passing = outcomes.iter().filter(|o| o.passed).count();
                StageOutcome {
                    passed: passing >= min_passing,
                    outcomes,
                }
            }
        }
    }

    /// Evaluate a target and write each filter's flag onto it.
    pub fn evaluate_and_record(&self, target: &mut InvestmentTarget) -> bool {
        let outcome = self.evaluate(target);
        for o in &outcome.outcomes {
            target.annotations.record(o.kind, o.passed);
        }
        if !outcome.passed {
            debug!(
                symbol = %target.symbol,
                stage = %self.stage,
                reasons = ?outcome
                    .outcomes
                    .iter()
                    .filter(|o| !o.passed)
                    .map(|o| o.reason.as_str())
                    .collect::<Vec<_>>(),
                "target rejected"
            );
        }
        outcome.passed
    }

    /// Keep the targets that pass, recording flags on all of them.
    pub fn retain(&self, targets: Vec<InvestmentTarget>) -> Vec<InvestmentTarget> {
        targets
            .into_iter()
            .filter_map(|mut t| self.evaluate_and_record(&mut t).then_some(t))
            .collect()
    }
}

/// The three ordered screening stages.
pub struct FilterPipeline {
    stages: Vec<FilterStage>,
}

impl FilterPipeline {
    /// Build the fundamental, volatility and right-side stages from validated params.
    pub fn from_params(params: &TunableParams) -> Self {
        let fundamental = FilterStage::new(
            DropOutStage::Fundamental,
            Combinator::All,
            vec![
                Box::new(MarketGapFilter::new(params.lowest_market_gap)),
                Box::new(TurnoverFilter::new(params.lowest_avg_turnover)),
                Box::new(PriceFilter::new(params.lowest_price)),
                Box::new(LastReportDateFilter::new(params.latest_report_date_days)),
            ],
        );
        let volatility = FilterStage::new(
            DropOutStage::Volatility,
            Combinator::Vote {
                min_passing: params.volatility_filters_passing_threshold,
            },
            vec![
                Box::new(TurnoverSpikeFilter::new(params.turnover_spike_threshold)),
                Box::new(AtrSpikeFilter::new(params.atr_spike_threshold)),
                Box::new(PriceStdSpikeFilter::new(params.price_std_spike_threshold)),
            ],
        );
        let right_side = FilterStage::new(
            DropOutStage::RightSide,
            Combinator::All,
            vec![
                Box::new(BreakoutDetectionFilter::new(
                    params.breakout_detection_days_lookback,
                    params.breakout_detection_price_ratio_threshold,
                    params.breakout_detection_volume_augmentation_ratio_threshold,
                )),
                Box::new(StructureConfirmationFilter::new(
                    params.structure_confirmation_days_lookback,
                    params.structure_confirmation_ma_tolerance,
                )),
            ],
        );
        Self::new(vec![fundamental, volatility, right_side])
    }

    pub fn new(stages: Vec<FilterStage>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[FilterStage] {
        &self.stages
    }

    /// Run every stage in order, recording flags on the targets each stage sees.
    pub fn run(&self, targets: Vec<InvestmentTarget>) -> Vec<InvestmentTarget> {
        self.run_observed(targets, |_| {}).0
    }

    /// Like [`run`](Self::run), calling `entering` before each stage and
    /// returning how many targets were left after every stage.
    pub fn run_observed(
        &self,
        targets: Vec<InvestmentTarget>,
        mut entering: impl FnMut(DropOutStage),
    ) -> (Vec<InvestmentTarget>, Vec<(DropOutStage, usize)>) {
        let mut remaining = Vec::with_capacity(self.stages.len());
        let survivors = self.stages.iter().fold(targets, |targets, stage| {
            entering(stage.stage());
            let before = targets.len();
            let kept = stage.retain(targets);
            debug!(stage = %stage.stage(), before, after = kept.len(), "stage applied");
            remaining.push((stage.stage(), kept.len()));
            kept
        });
        (survivors, remaining)
    }

    /// Re-run the stages on one target and record where it first drops out.
    ///
    /// Flags of stages the target never reaches stay unset.
    pub fn attribute_dropout(&self, target: &mut InvestmentTarget) -> DropOutStage {
        let stage = self
            .stages
            .iter()
            .find(|s| !s.evaluate_and_record(target))
            .map(|s| s.stage())
            .unwrap_or(DropOutStage::PassedAll);
        target.annotations.dropped_out_at = Some(stage);
        stage
    }

}
