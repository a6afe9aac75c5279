//! Request/response contract for dashboard-style consumers.
//!
//! A request carries a TunableParams-shaped payload:
//!
//! ```json
//! {"tunableParams": {"startDate": "2024-03-01", "endDate": "2024-03-29"}}
//! ```
//!
//! A completed run answers with its duration, a UTC `generated` stamp, the
//! total record count and the rows of every CSV it produced. A failed run answers with the error only; tables already written
//! by a run that fails midway are not returned.

use crate::config::{RunConfig, RunSettings};
use crate::pipeline::ScreeningPipeline;
use anyhow::{Context, Result};
use chasehound_core::clock::Clock;
use chasehound_core::data::QuoteProvider;
use chasehound_core::params::TunableParamsInput;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunRequest {
    #[serde(alias = "tunableParams")]
    pub tunable_params: TunableParamsInput,
}

/// Rows of one produced table, keyed by column name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactContent {
    pub file: String,
    pub records: Vec<Map<String, Value>>,
}

/// Field names follow the dashboard contract: `execution_time`,
/// `results_count` and `generated` are snake case on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCompleted {
    #[serde(rename = "execution_time", alias = "executionTimeSecs")]
    pub execution_time_secs: f64,
    /// ISO-8601 UTC time the response was assembled.
    pub generated: String,
    /// Records across every returned table.
    pub results_count: usize,
    #[serde(rename = "runId", alias = "run_id")]
    pub run_id: String,
    #[serde(rename = "artifactCount", alias = "artifact_count")]
    pub artifact_count: usize,
    pub results: Vec<ArtifactContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunResponse {
    Completed(RunCompleted),
    Failed { error: String },
}

/// Everything a request needs besides its payload.
///
/// Each request writes into `settings.output_dir/{run_id}`.
#[derive(Clone)]
pub struct ServiceContext {
    pub settings: RunSettings,
    pub provider: Arc<dyn QuoteProvider>,
    pub clock: Arc<dyn Clock>,
}

/// Run one request to completion. Never panics on bad input.
pub fn handle_run_request(payload: &Value, ctx: &ServiceContext) -> RunResponse {
    let timer = Instant::now();
    match execute(payload, ctx) {
        Ok((run_id, results)) => {
            let execution_time_secs = timer.elapsed().as_secs_f64();
            let results_count: usize = results.iter().map(|r| r.records.len()).sum();
            let generated = ctx
                .clock
                .now()
                .with_timezone(&Utc)
                .naive_utc()
                .format("%Y-%m-%dT%H:%M:%S%.f")
                .to_string();
            info!(
                %run_id,
                execution_time_secs,
                artifacts = results.len(),
                results_count,
                "run request completed"
            );
            RunResponse::Completed(RunCompleted {
                execution_time_secs,
                generated,
                results_count,
                run_id,
                artifact_count: results.len(),
                results,
            })
        }
        Err(e) => {
            warn!("run request failed: {e:#}");
            RunResponse::Failed {
                error: format!("{e:#}"),
            }
        }
    }
}

fn execute(payload: &Value, ctx: &ServiceContext) -> Result<(String, Vec<ArtifactContent>)> {
    let request: RunRequest =
        serde_json::from_value(payload.clone()).context("invalid run request")?;
    let run_id = request.tunable_params.clone().resolve()?.run_id();

    let mut settings = ctx.settings.clone();
    settings.output_dir = settings.output_dir.join(&run_id);
    let config = RunConfig {
        run: settings,
        params: request.tunable_params,
    };

    let mut pipeline =
        ScreeningPipeline::from_config(&config, Arc::clone(&ctx.provider), Arc::clone(&ctx.clock))?;
    let summary = pipeline.run()?;

    let results = summary
        .artifacts
        .iter()
        .filter(|p| p.extension().is_some_and(|ext| ext == "csv"))
        .map(|p| read_artifact(p))
        .collect::<Result<Vec<_>>>()?;
    Ok((summary.run_id, results))
}

fn cell_value(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    match cell {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    cell.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(cell.to_string()))
}

fn read_artifact(path: &Path) -> Result<ArtifactContent> {
    let mut rdr =
        csv::Reader::from_path(path).with_context(|| format!("failed to open {}", path.display()))?;
    let headers = rdr.headers()?.clone();
    let mut records: Vec<Map<String, Value>> = Vec::new();
    for record in rdr.records() {
        let record = record?;
        records.push(
            headers
                .iter()
                .zip(record.iter())
                .map(|(h, cell)| (h.to_string(), cell_value(cell)))
                .collect(),
        );
    }
    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(ArtifactContent { file, records })
}
