//! Cross-date performance distribution.
//!
//! Scans an output directory for per-date `results` and `bestTargetsOfTheDay`
//! tables and summarizes same-day change per date into
//! `performanceDistribution.csv`.

use crate::recorder::{ArtifactKind, PRICE_CHANGE_COLUMN};
use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DISTRIBUTION_FILE: &str = "performanceDistribution.csv";

/// Same-day change statistics for one table of one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionRow {
    pub date: NaiveDate,
    /// `results` or `bestTargetsOfTheDay`.
    pub table: String,
    pub count: usize,
    pub performance_mean: f64,
    /// Sample standard deviation; NaN with fewer than two values.
    pub performance_std: f64,
}

fn mean_and_sample_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (f64::NAN, f64::NAN);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if values.len() < 2 {
        return (mean, f64::NAN);
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (mean, (ss / (n - 1.0)).sqrt())
}

/// Parsed same-day changes of one table, or `None` when the column is absent.
fn read_changes(path: &Path) -> Result<Option<Vec<f64>>> {
    let mut rdr = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let Some(idx) = rdr.headers()?.iter().position(|h| h == PRICE_CHANGE_COLUMN) else {
        return Ok(None);
    };
    let mut values = Vec::new();
    for record in rdr.records() {
        let record = record?;
        if let Some(v) = record.get(idx).and_then(|s| s.parse::<f64>().ok()) {
            if !v.is_nan() {
                values.push(v);
            }
        }
    }
    Ok(Some(values))
}

/// Summarize every per-date table in `output_dir`, sorted by date then table.
///
/// Unreadable tables are skipped with a warning, as are tables with no
/// same-day values (prediction dates).
pub fn summarize(output_dir: &Path) -> Result<Vec<DistributionRow>> {
    let mut rows = Vec::new();
    let entries = std::fs::read_dir(output_dir)
        .with_context(|| format!("failed to read {}", output_dir.display()))?;

    for entry in entries {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some((date, kind)) = ArtifactKind::parse_file_name(name) else {
            continue;
        };
        if kind == ArtifactKind::Benchmark {
            continue;
        }
        let values = match read_changes(&path) {
            Ok(Some(values)) if !values.is_empty() => values,
            Ok(_) => continue,
            Err(e) => {
                warn!(file = %path.display(), "skipping unreadable table: {e:#}");
                continue;
            }
        };
        let (performance_mean, performance_std) = mean_and_sample_std(&values);
        rows.push(DistributionRow {
            date,
            table: kind.suffix().to_string(),
            count: values.len(),
            performance_mean,
            performance_std,
        });
    }

    rows.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.table.cmp(&b.table)));
    Ok(rows)
}

/// Write `performanceDistribution.csv` into `output_dir` and return its path.
pub fn write_distribution(output_dir: &Path) -> Result<PathBuf> {
    let rows = summarize(output_dir)?;
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(["date", "table", "count", "performanceMean", "performanceStd"])?;
    for r in &rows {
        let std = if r.performance_std.is_nan() {
            String::new()
        } else {
            r.performance_std.to_string()
        };
        wtr.write_record([
            r.date.to_string(),
            r.table.clone(),
            r.count.to_string(),
            r.performance_mean.to_string(),
            std,
        ])?;
    }
    let data = wtr.into_inner().context("failed to flush CSV writer")?;

    let path = output_dir.join(DISTRIBUTION_FILE);
    std::fs::write(&path, data).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, body: &str) {
        std::fs::write(dir.join(name), body).unwrap();
    }

    #[test]
    fn summarizes_per_date_and_table() {
        let dir = tempfile::tempdir().unwrap();
        let header = format!("symbol,{PRICE_CHANGE_COLUMN}\n");
        write(dir.path(), "20240315_results.csv", &format!("{header}A,0.01\nB,0.03\nC,\n"));
        write(dir.path(), "20240315_bestTargetsOfTheDay.csv", &format!("{header}B,0.03\n"));
        write(dir.path(), "20240314_results.csv", &format!("{header}A,-0.02\nB,0.02\n"));
        write(dir.path(), "20240315_sp500Avg.csv", &format!("{header}^GSPC,0.005\n"));
        write(dir.path(), "20240313_results.csv", &format!("{header}A,\n"));
        write(dir.path(), "notes.csv", "x\n1\n");

        let rows = summarize(dir.path()).unwrap();
        let keys: Vec<(String, &str, usize)> = rows
            .iter()
            .map(|r| (r.date.to_string(), r.table.as_str(), r.count))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("2024-03-14".to_string(), "results", 2),
                ("2024-03-15".to_string(), "bestTargetsOfTheDay", 1),
                ("2024-03-15".to_string(), "results", 2),
            ]
        );
        assert!((rows[2].performance_mean - 0.02).abs() < 1e-12);
        assert!((rows[2].performance_std - 0.01 * 2f64.sqrt()).abs() < 1e-12);
        assert!(rows[1].performance_std.is_nan());
    }

    #[test]
    fn writes_distribution_file() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "20240315_results.csv",
            &format!("symbol,{PRICE_CHANGE_COLUMN}\nA,0.01\n"),
        );
        let path = write_distribution(dir.path()).unwrap();
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with("date,table,count,performanceMean,performanceStd\n"));
        assert!(content.contains("2024-03-15,results,1,0.01,"));
    }
}
