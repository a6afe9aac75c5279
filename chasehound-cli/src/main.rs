//! ChaseHound CLI: screening runs, cache management and quotes.
//!
//! Commands:
//! - `run`: screen a date range from a TOML run file
//! - `fetch`: warm the price cache for a list of symbols
//! - `cache status`: per-symbol snapshot count and loaded coverage
//! - `quote`: last traded price of one symbol
//! - `request`: answer a JSON run request, as the dashboard service does

use anyhow::{bail, Context, Result};
use chasehound_core::clock::{Clock, SystemClock};
use chasehound_core::data::{
    CircuitBreaker, FetchOrchestrator, HistoryService, PriceCache, QuoteProvider, YahooProvider,
};
use chasehound_core::target::DropOutStage;
use chasehound_runner::{
    handle_run_request, IterationReport, RunConfig, RunResponse, RunSettings, RunSummary,
    ScreeningPipeline, ServiceContext,
};
use chrono::{Duration, NaiveDate};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chasehound", about = "ChaseHound equity momentum screener")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Screen every session between the run file's start and end dates.
    Run {
        /// Path to a TOML run file with `[run]` and `[params]` tables.
        #[arg(long)]
        config: PathBuf,
    },
    /// Fetch history into the price cache.
    Fetch {
        /// Symbols to fetch (e.g., AAPL MSFT BRK.B).
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Start date (YYYY-MM-DD). Defaults to one year before the end date.
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD). Defaults to today in the market timezone.
        #[arg(long)]
        end: Option<String>,

        /// Run file whose `[run]` table locates the cache. Defaults apply without it.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Cache management commands.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Print the last traded price of a symbol.
    Quote {
        symbol: String,

        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Run a JSON request (`{"tunableParams": {...}}`) and print the JSON response.
    Request {
        /// Path to the request payload.
        #[arg(long)]
        payload: PathBuf,

        /// Run file whose `[run]` table configures the service.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Report snapshots on disk and the loaded coverage per symbol.
    Status {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json)?;

    match cli.command {
        Commands::Run { config } => run_screening(&config),
        Commands::Fetch {
            symbols,
            start,
            end,
            config,
        } => run_fetch(symbols, start, end, config.as_deref()),
        Commands::Cache { action } => match action {
            CacheAction::Status { config } => run_cache_status(config.as_deref()),
        },
        Commands::Quote { symbol, config } => run_quote(&symbol, config.as_deref()),
        Commands::Request { payload, config } => run_request(&payload, config.as_deref()),
    }
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .context("invalid log filter")?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn load_settings(config: Option<&Path>) -> Result<RunSettings> {
    match config {
        Some(path) => RunSettings::from_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => Ok(RunSettings::default()),
    }
}

fn system_clock(settings: &RunSettings) -> Result<Arc<dyn Clock>> {
    Ok(Arc::new(SystemClock::new(settings.timezone()?)))
}

fn yahoo() -> Result<Arc<YahooProvider>> {
    let circuit_breaker = Arc::new(CircuitBreaker::default_provider());
    Ok(Arc::new(YahooProvider::new(circuit_breaker)?))
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("expected YYYY-MM-DD, got '{value}'"))
}

fn run_screening(config_path: &Path) -> Result<()> {
    let config = RunConfig::from_file(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let clock = system_clock(&config.run)?;
    let provider: Arc<dyn QuoteProvider> = yahoo()?;

    let mut pipeline = ScreeningPipeline::from_config(&config, provider, clock)?;
    let summary = pipeline.run()?;
    print_summary(&summary);
    Ok(())
}

fn run_fetch(
    symbols: Vec<String>,
    start: Option<String>,
    end: Option<String>,
    config: Option<&Path>,
) -> Result<()> {
    let settings = load_settings(config)?;
    let clock = system_clock(&settings)?;

    let end_date = end.as_deref().map(parse_date).transpose()?.unwrap_or(clock.today());
    let start_date = start
        .as_deref()
        .map(parse_date)
        .transpose()?
        .unwrap_or(end_date - Duration::days(365));
    if start_date > end_date {
        bail!("--start {start_date} is after --end {end_date}");
    }

    let cache = Arc::new(PriceCache::open(&settings.cache_dir, clock)?);
    let provider: Arc<dyn QuoteProvider> = yahoo()?;
    let orchestrator = FetchOrchestrator::new(provider, settings.orchestrator_config())?;
    let history = HistoryService::new(cache, orchestrator);

    info!(symbols = symbols.len(), %start_date, %end_date, "fetching history");
    let rows = history.load_histories(&symbols, start_date, end_date, settings.interval);
    let mut missing = 0;
    for (symbol, rows) in symbols.iter().zip(&rows) {
        match rows {
            Some(rows) => println!("{symbol:<10} {:>6} rows", rows.len()),
            None => {
                missing += 1;
                println!("{symbol:<10} no data");
            }
        }
    }
    if missing > 0 {
        bail!("{missing} of {} symbol(s) returned no data", symbols.len());
    }
    Ok(())
}

fn run_cache_status(config: Option<&Path>) -> Result<()> {
    let settings = load_settings(config)?;
    if !settings.cache_dir.exists() {
        println!("Cache directory does not exist: {}", settings.cache_dir.display());
        return Ok(());
    }

    let cache = PriceCache::open(&settings.cache_dir, system_clock(&settings)?)?;
    let statuses = cache.status()?;
    if statuses.is_empty() {
        println!("Cache is empty: {}", settings.cache_dir.display());
        return Ok(());
    }

    println!("Cache: {}", settings.cache_dir.display());
    println!("Symbols: {}", statuses.len());
    println!();
    println!(
        "{:<10} {:>9} {:<25} {:>8} {:<16}",
        "Symbol", "Snapshots", "Coverage", "Rows", "Fetched (UTC)"
    );
    println!("{}", "-".repeat(72));
    for s in &statuses {
        let (coverage, fetched) = match &s.loaded {
            Some(key) => (
                format!("{} to {} ({})", key.covered_from, key.covered_to, key.interval),
                key.fetched_at.format("%Y-%m-%d %H:%M").to_string(),
            ),
            None => ("(unreadable)".to_string(), String::new()),
        };
        println!(
            "{:<10} {:>9} {:<25} {:>8} {:<16}",
            s.symbol, s.snapshots_on_disk, coverage, s.row_count, fetched
        );
    }
    Ok(())
}

fn run_quote(symbol: &str, config: Option<&Path>) -> Result<()> {
    let settings = load_settings(config)?;
    let today = system_clock(&settings)?.today();
    match yahoo()?.last_traded_price(symbol, today)? {
        Some(price) => println!("{symbol} {price:.2}"),
        None => bail!("no trades for {symbol} in the last week"),
    }
    Ok(())
}

fn run_request(payload_path: &Path, config: Option<&Path>) -> Result<()> {
    let settings = load_settings(config)?;
    let content = std::fs::read_to_string(payload_path)
        .with_context(|| format!("failed to read {}", payload_path.display()))?;
    let payload: serde_json::Value =
        serde_json::from_str(&content).context("payload is not valid JSON")?;

    let ctx = ServiceContext {
        clock: system_clock(&settings)?,
        provider: yahoo()?,
        settings,
    };
    let response = handle_run_request(&payload, &ctx);
    println!("{}", serde_json::to_string_pretty(&response)?);

    if matches!(response, RunResponse::Failed { .. }) {
        std::process::exit(1);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("=== Screening Run ===");
    println!("Run id:   {}", summary.run_id);
    println!("Output:   {}", summary.output_dir.display());
    println!("Dates:    {}", summary.days.len());
    println!("Duration: {:.1}s", summary.duration_secs);
    println!();
    println!(
        "{:<12} {:>8} {:>6} {:>12} {:>11} {:>11} {:>7}",
        "Date", "Universe", "Built", "Fundamental", "Volatility", "Right side", "Best N"
    );
    println!("{}", "-".repeat(74));
    let count = |day: &IterationReport, stage| {
        day.remaining_after(stage)
            .map_or_else(|| "-".to_string(), |n| n.to_string())
    };
    for day in summary.days.iter().rev() {
        let best = if day.prediction_mode {
            "predict".to_string()
        } else {
            day.best_n.to_string()
        };
        println!(
            "{:<12} {:>8} {:>6} {:>12} {:>11} {:>11} {:>7}",
            day.date,
            day.universe_size,
            day.built,
            count(day, DropOutStage::Fundamental),
            count(day, DropOutStage::Volatility),
            count(day, DropOutStage::RightSide),
            best
        );
    }
    println!();
}
