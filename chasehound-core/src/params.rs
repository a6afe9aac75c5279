//! Tunable screening parameters.
//!
//! `TunableParams` is the immutable threshold set threaded through every filter.
//! It is built from a `TunableParamsInput` overlay: every field optional, unknown
//! fields logged and ignored, missing fields taken from the defaults below. The run dates
//! have no default and must always be supplied.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

/// Errors raised while building or validating parameters.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("TOML parse error: {0}")]
    Toml(String),

    #[error("JSON parse error: {0}")]
    Json(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Fully-resolved screening parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunableParams {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    // Fundamental
    pub lowest_price: f64,
    pub lowest_market_gap: f64,
    pub lowest_avg_turnover: f64,
    pub lowest_avg_turnover_days: usize,
    pub latest_report_date_days: u32,

    // Volatility
    pub turnover_spike_threshold: f64,
    pub turnover_short_term_days: usize,
    pub turnover_long_term_days: usize,
    pub atr_spike_threshold: f64,
    pub atr_short_term_days: usize,
    pub atr_long_term_days: usize,
    pub price_std_spike_threshold: f64,
    pub price_std_short_term_days: usize,
    pub price_std_long_term_days: usize,
    pub volatility_filters_passing_threshold: usize,

    // Right side
    pub breakout_detection_days_lookback: usize,
    pub breakout_detection_price_ratio_threshold: f64,
    pub breakout_detection_ma_tolerance: f64,
    pub breakout_detection_volume_augmentation_ratio_threshold: f64,
    pub structure_confirmation_days_lookback: usize,
    pub structure_confirmation_ma_tolerance: f64,

    // Ranking
    pub best_targets_n: usize,
}

/// Partial parameter set as it arrives from a config file or request payload.
///
/// Field names are snake_case; the camelCase spellings used by the dashboard
/// payload are accepted as aliases. Keys that match no parameter end up in
/// `ignored`; dashboards send extra attributes and those never fail a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TunableParamsInput {
    #[serde(default, alias = "startDate")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, alias = "endDate")]
    pub end_date: Option<NaiveDate>,

    #[serde(default, alias = "lowestPrice")]
    pub lowest_price: Option<f64>,
    #[serde(default, alias = "lowestMarketGap")]
    pub lowest_market_gap: Option<f64>,
    #[serde(default, alias = "lowestAvgTurnover")]
    pub lowest_avg_turnover: Option<f64>,
    #[serde(default, alias = "lowestAvgTurnoverDays")]
    pub lowest_avg_turnover_days: Option<usize>,
    #[serde(default, alias = "latestReportDateDays")]
    pub latest_report_date_days: Option<u32>,

    #[serde(default, alias = "turnoverSpikeThreshold")]
    pub turnover_spike_threshold: Option<f64>,
    #[serde(default, alias = "turnoverShortTermDays")]
    pub turnover_short_term_days: Option<usize>,
    #[serde(default, alias = "turnoverLongTermDays")]
    pub turnover_long_term_days: Option<usize>,
    #[serde(default, alias = "atrSpikeThreshold")]
    pub atr_spike_threshold: Option<f64>,
    #[serde(default, alias = "atrShortTermDays")]
    pub atr_short_term_days: Option<usize>,
    #[serde(default, alias = "atrLongTermDays")]
    pub atr_long_term_days: Option<usize>,
    #[serde(default, alias = "priceStdSpikeThreshold")]
    pub price_std_spike_threshold: Option<f64>,
    #[serde(default, alias = "priceStdShortTermDays")]
    pub price_std_short_term_days: Option<usize>,
    #[serde(default, alias = "priceStdLongTermDays")]
    pub price_std_long_term_days: Option<usize>,
    #[serde(default, alias = "volatilityFiltersPassingThreshold")]
    pub volatility_filters_passing_threshold: Option<usize>,

    #[serde(default, alias = "breakoutDetectionDaysLookback")]
    pub breakout_detection_days_lookback: Option<usize>,
    #[serde(default, alias = "breakoutDetectionPriceRatioThreshold")]
    pub breakout_detection_price_ratio_threshold: Option<f64>,
    #[serde(default, alias = "breakoutDetectionMaTolerance")]
    pub breakout_detection_ma_tolerance: Option<f64>,
    #[serde(default, alias = "breakoutDetectionVolumeAugmentationRatioThreshold")]
    pub breakout_detection_volume_augmentation_ratio_threshold: Option<f64>,
    #[serde(default, alias = "structureConfirmationDaysLookback")]
    pub structure_confirmation_days_lookback: Option<usize>,
    #[serde(default, alias = "structureConfirmationMaTolerance")]
    pub structure_confirmation_ma_tolerance: Option<f64>,

    #[serde(default, alias = "bestTargetsN")]
    pub best_targets_n: Option<usize>,

    #[serde(flatten)]
    pub ignored: BTreeMap<String, serde_json::Value>,
}

impl TunableParamsInput {
    /// Parse an overlay from a JSON object.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value).map_err(|e| ConfigError::Json(e.to_string()))
    }

    /// Resolve the overlay against the defaults and validate the result.
    pub fn resolve(self) -> Result<TunableParams, ConfigError> {
        for key in self.ignored.keys() {
            warn!(key = key.as_str(), "ignoring unknown parameter");
        }
        let start_date = self
            .start_date
            .ok_or(ConfigError::MissingParameter("start_date"))?;
        let end_date = self
            .end_date
            .ok_or(ConfigError::MissingParameter("end_date"))?;

        let params = TunableParams {
            start_date,
            end_date,
            lowest_price: self.lowest_price.unwrap_or(2.0),
            lowest_market_gap: self.lowest_market_gap.unwrap_or(50_000_000.0),
            lowest_avg_turnover: self.lowest_avg_turnover.unwrap_or(20_000_000.0),
            lowest_avg_turnover_days: self.lowest_avg_turnover_days.unwrap_or(20),
            latest_report_date_days: self.latest_report_date_days.unwrap_or(120),
            turnover_spike_threshold: self.turnover_spike_threshold.unwrap_or(1.05),
            turnover_short_term_days: self.turnover_short_term_days.unwrap_or(5),
            turnover_long_term_days: self.turnover_long_term_days.unwrap_or(60),
            atr_spike_threshold: self.atr_spike_threshold.unwrap_or(1.2),
            atr_short_term_days: self.atr_short_term_days.unwrap_or(5),
            atr_long_term_days: self.atr_long_term_days.unwrap_or(20),
            price_std_spike_threshold: self.price_std_spike_threshold.unwrap_or(1.1),
            price_std_short_term_days: self.price_std_short_term_days.unwrap_or(5),
            price_std_long_term_days: self.price_std_long_term_days.unwrap_or(60),
            volatility_filters_passing_threshold: self
                .volatility_filters_passing_threshold
                .unwrap_or(2),
            breakout_detection_days_lookback: self.breakout_detection_days_lookback.unwrap_or(20),
            breakout_detection_price_ratio_threshold: self
                .breakout_detection_price_ratio_threshold
                .unwrap_or(0.05),
            breakout_detection_ma_tolerance: self.breakout_detection_ma_tolerance.unwrap_or(1.0),
            breakout_detection_volume_augmentation_ratio_threshold: self
                .breakout_detection_volume_augmentation_ratio_threshold
                .unwrap_or(1.5),
            structure_confirmation_days_lookback: self
                .structure_confirmation_days_lookback
                .unwrap_or(20),
            structure_confirmation_ma_tolerance: self
                .structure_confirmation_ma_tolerance
                .unwrap_or(0.97),
            best_targets_n: self.best_targets_n.unwrap_or(10),
        };
        params.validate()?;
        Ok(params)
    }
}

impl TunableParams {
    /// Defaults for every threshold over the given date range.
    pub fn with_dates(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self, ConfigError> {
        TunableParamsInput {
            start_date: Some(start_date),
            end_date: Some(end_date),
            ..Default::default()
        }
        .resolve()
    }

    /// Reject parameter sets the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_date > self.end_date {
            return Err(ConfigError::InvalidParameter {
                name: "start_date",
                reason: format!("{} is after end_date {}", self.start_date, self.end_date),
            });
        }

        let finite_non_negative = [
            ("lowest_price", self.lowest_price),
            ("lowest_market_gap", self.lowest_market_gap),
            ("lowest_avg_turnover", self.lowest_avg_turnover),
            ("turnover_spike_threshold", self.turnover_spike_threshold),
            ("atr_spike_threshold", self.atr_spike_threshold),
            ("price_std_spike_threshold", self.price_std_spike_threshold),
            (
                "breakout_detection_price_ratio_threshold",
                self.breakout_detection_price_ratio_threshold,
            ),
            ("breakout_detection_ma_tolerance", self.breakout_detection_ma_tolerance),
            (
                "breakout_detection_volume_augmentation_ratio_threshold",
                self.breakout_detection_volume_augmentation_ratio_threshold,
            ),
            (
                "structure_confirmation_ma_tolerance",
                self.structure_confirmation_ma_tolerance,
            ),
        ];
        for (name, value) in finite_non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidParameter {
                    name,
                    reason: format!("must be a finite non-negative number, got {value}"),
                });
            }
        }

        let windows = [
            ("lowest_avg_turnover_days", self.lowest_avg_turnover_days),
            ("turnover_short_term_days", self.turnover_short_term_days),
            ("turnover_long_term_days", self.turnover_long_term_days),
            ("atr_short_term_days", self.atr_short_term_days),
            ("atr_long_term_days", self.atr_long_term_days),
            ("price_std_short_term_days", self.price_std_short_term_days),
            ("price_std_long_term_days", self.price_std_long_term_days),
            ("breakout_detection_days_lookback", self.breakout_detection_days_lookback),
            (
                "structure_confirmation_days_lookback",
                self.structure_confirmation_days_lookback,
            ),
            ("best_targets_n", self.best_targets_n),
        ];
        for (name, value) in windows {
            if value == 0 {
                return Err(ConfigError::InvalidParameter {
                    name,
                    reason: "must be at least 1".into(),
                });
            }
        }

        let pairs = [
            (
                "turnover_short_term_days",
                self.turnover_short_term_days,
                self.turnover_long_term_days,
            ),
            ("atr_short_term_days", self.atr_short_term_days, self.atr_long_term_days),
            (
                "price_std_short_term_days",
                self.price_std_short_term_days,
                self.price_std_long_term_days,
            ),
        ];
        for (name, short, long) in pairs {
            if short > long {
                return Err(ConfigError::InvalidParameter {
                    name,
                    reason: format!("short window {short} exceeds long window {long}"),
                });
            }
        }

        if self.volatility_filters_passing_threshold > 3 {
            return Err(ConfigError::InvalidParameter {
                name: "volatility_filters_passing_threshold",
                reason: format!(
                    "only 3 volatility detections exist, got {}",
                    self.volatility_filters_passing_threshold
                ),
            });
        }

        Ok(())
    }

    /// Number of calendar days of history fetched before each virtual date.
    pub fn history_lookback_days(&self) -> i64 {
        3 * self.lowest_avg_turnover_days as i64
    }

    /// Content hash of the parameter set, stable across runs.
    pub fn run_id(&self) -> String {
        // Serializing plain numbers and dates into a Vec cannot fail.
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }
}
