//! TOML run configuration.
//!
//! A run file has two tables:
//!
//! ```toml
//! [run]
//! cache_dir = "cache"
//! output_dir = "output"
//! universe_file = "universe.json"
//!
//! [params]
//! start_date = "2024-03-01"
//! end_date = "2024-03-29"
//! lowest_market_gap = 50000000.0
//! ```
//!
//! `[run]` is optional and every key in it has a default. `[params]` is a
//! `TunableParamsInput` overlay: only the dates are required.

use chasehound_core::calendar::MarketCalendar;
use chasehound_core::data::OrchestratorConfig;
use chasehound_core::domain::Interval;
use chasehound_core::params::{ConfigError, TunableParams, TunableParamsInput};
use chrono::NaiveTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where a run reads and writes, and how it talks to the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunSettings {
    /// Directory holding Parquet price snapshots.
    pub cache_dir: PathBuf,
    /// Directory receiving per-date CSV artifacts and the run manifest.
    pub output_dir: PathBuf,
    /// JSON listing of `{symbol, marketCap}` objects.
    pub universe_file: PathBuf,
    /// Index symbol recorded in `{date}_sp500Avg.csv`.
    pub benchmark_symbol: String,
    pub interval: Interval,
    /// IANA name of the exchange timezone.
    pub market_timezone: String,
    /// Session close in the exchange timezone, `HH:MM`.
    pub market_close: String,
    pub max_concurrency: usize,
    pub batch_timeout_secs: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            output_dir: PathBuf::from("output"),
            universe_file: PathBuf::from("universe.json"),
            benchmark_symbol: "^GSPC".to_string(),
            interval: Interval::Daily,
            market_timezone: "America/New_York".to_string(),
            market_close: "16:00".to_string(),
            max_concurrency: 20,
            batch_timeout_secs: 300,
        }
    }
}

impl RunSettings {
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.market_timezone
            .parse::<Tz>()
            .map_err(|e| ConfigError::InvalidParameter {
                name: "market_timezone",
                reason: e.to_string(),
            })
    }

    pub fn market_close_time(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(&self.market_close, "%H:%M").map_err(|e| {
            ConfigError::InvalidParameter {
                name: "market_close",
                reason: format!("expected HH:MM, got '{}': {e}", self.market_close),
            }
        })
    }

    pub fn calendar(&self) -> Result<MarketCalendar, ConfigError> {
        Ok(MarketCalendar::new(self.market_close_time()?))
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            max_concurrency: self.max_concurrency,
            batch_timeout: Duration::from_secs(self.batch_timeout_secs),
        }
    }

    /// Reject settings a run cannot start with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.timezone()?;
        self.market_close_time()?;
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "max_concurrency",
                reason: "must be at least 1".into(),
            });
        }
        if self.batch_timeout_secs == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "batch_timeout_secs",
                reason: "must be at least 1".into(),
            });
        }
        if self.benchmark_symbol.trim().is_empty() {
            return Err(ConfigError::InvalidParameter {
                name: "benchmark_symbol",
                reason: "must not be empty".into(),
            });
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct SettingsOnly {
    #[serde(default)]
    run: RunSettings,
}

impl RunSettings {
    /// The `[run]` table of a run file; other tables are ignored.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let file: SettingsOnly =
            toml::from_str(&content).map_err(|e| ConfigError::Toml(e.to_string()))?;
        file.run.validate()?;
        Ok(file.run)
    }
}

/// A complete run description: settings plus the parameter overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    #[serde(default)]
    pub run: RunSettings,
    pub params: TunableParamsInput,
}

impl RunConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Toml(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Validated settings and resolved parameters.
    pub fn resolve(&self) -> Result<TunableParams, ConfigError> {
        self.run.validate()?;
        self.params.clone().resolve()
    }
}
