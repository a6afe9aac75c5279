//! Concurrent fetch orchestration.
//!
//! A batch of per-symbol history requests is fanned out onto a fixed-size
//! rayon pool and gathered back in input order. Every request resolves to
//! `Some(rows)` or `None`: provider errors, panics, empty series and requests
//! still running when the batch deadline passes all become `None`. Nothing is
//! retried here.

use super::provider::{DataError, QuoteProvider};
use crate::domain::{normalize_rows, Interval, PriceRow};
use chrono::NaiveDate;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One history request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub symbol: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub interval: Interval,
}

/// Worker pool sizing and batch deadline.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    pub max_concurrency: usize,
    pub batch_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 20,
            batch_timeout: Duration::from_secs(300),
        }
    }
}

/// Fans provider calls out over a bounded worker pool.
pub struct FetchOrchestrator {
    provider: Arc<dyn QuoteProvider>,
    pool: rayon::ThreadPool,
    batch_timeout: Duration,
}

impl FetchOrchestrator {
    pub fn new(
        provider: Arc<dyn QuoteProvider>,
        config: OrchestratorConfig,
    ) -> Result<Self, DataError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_concurrency.max(1))
            .thread_name(|i| format!("chasehound-fetch-{i}"))
            .build()
            .map_err(|e| DataError::Other(format!("failed to build fetch pool: {e}")))?;

        Ok(Self {
            provider,
            pool,
            batch_timeout: config.batch_timeout,
        })
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Fetch the same window for every symbol. Output order matches `symbols`.
    pub fn fetch_batch(
        &self,
        symbols: &[String],
        from: NaiveDate,
        to: NaiveDate,
        interval: Interval,
    ) -> Vec<Option<Vec<PriceRow>>> {
        let requests: Vec<FetchRequest> = symbols
            .iter()
            .map(|symbol| FetchRequest {
                symbol: symbol.clone(),
                from,
                to,
                interval,
            })
            .collect();
        self.fetch_requests(&requests)
    }

    /// Fetch each request's own window. Output order matches `requests`.
    ///
    /// Blocks until every request has resolved or the batch timeout expires.
    /// Requests still in flight at the deadline keep running on the pool but
    /// their results are discarded.
    pub fn fetch_requests(&self, requests: &[FetchRequest]) -> Vec<Option<Vec<PriceRow>>> {
        let total = requests.len();
        let mut slots: Vec<Option<Vec<PriceRow>>> = vec![None; total];
        if total == 0 {
            return slots;
        }
        if !self.provider.is_available() {
            warn!(
                provider = self.provider.name(),
                total,
                "provider unavailable, batch resolves to None"
            );
            return slots;
        }

        let started = Instant::now();
        let deadline = started + self.batch_timeout;
        let (tx, rx) = mpsc::channel::<(usize, Option<Vec<PriceRow>>)>();

        for (index, request) in requests.iter().cloned().enumerate() {
            let tx = tx.clone();
            let provider = Arc::clone(&self.provider);
            self.pool.spawn(move || {
                let rows = fetch_one(provider.as_ref(), &request);
                // The receiver is gone once the batch has timed out.
                let _ = tx.send((index, rows));
            });
        }
        drop(tx);

        let mut received = 0usize;
        while received < total {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((index, rows)) => {
                    slots[index] = rows;
                    received += 1;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    warn!(
                        pending = total - received,
                        timeout_secs = self.batch_timeout.as_secs_f64(),
                        "fetch batch timed out, pending requests resolve to None"
                    );
                    break;
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }

        let succeeded = slots.iter().filter(|s| s.is_some()).count();
        info!(
            provider = self.provider.name(),
            total,
            succeeded,
            failed = total - succeeded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetch batch complete"
        );
        slots
    }
}

fn fetch_one(provider: &dyn QuoteProvider, request: &FetchRequest) -> Option<Vec<PriceRow>> {
    let symbol = request.symbol.as_str();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        provider.fetch(symbol, request.from, request.to, request.interval)
    }));

    match outcome {
        Ok(Ok(result)) => {
            let source = result.source;
            let rows = normalize_rows(result.rows);
            if rows.is_empty() {
                debug!(symbol, from = %request.from, to = %request.to, "provider returned no usable rows");
                return None;
            }
            debug!(symbol, ?source, rows = rows.len(), "fetched");
            Some(rows)
        }
        Ok(Err(e)) => {
            warn!(symbol, "fetch failed: {e}");
            None
        }
        Err(_) => {
            warn!(symbol, "fetch panicked");
            None
        }
    }
}
