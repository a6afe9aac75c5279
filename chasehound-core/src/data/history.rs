//! Load-or-fetch history service.
//!
//! Answers "rows for these symbols between these dates" from the price cache
//! where possible and fetches only the missing part of each window otherwise.
//! Fetched rows are merged into the cache before being returned.

use super::cache::PriceCache;
use super::orchestrator::{FetchOrchestrator, FetchRequest};
use crate::domain::{Interval, PriceRow};
use chrono::{Duration, NaiveDate};
use std::sync::Arc;
use tracing::{debug, warn};

/// Window to fetch so that, once merged, the cache covers `[from, to]` without holes.
///
/// With no cached coverage the whole window is fetched. A window sticking out
/// on one side fetches from the window edge up to the cached edge; one sticking
/// out on both sides is fetched whole.
pub fn missing_window(
    coverage: Option<(NaiveDate, NaiveDate)>,
    from: NaiveDate,
    to: NaiveDate,
) -> (NaiveDate, NaiveDate) {
    let Some((c1, c2)) = coverage else {
        return (from, to);
    };
    match (from < c1, to > c2) {
        (true, false) => (from, c1 - Duration::days(1)),
        (false, true) => (c2 + Duration::days(1), to),
        _ => (from, to),
    }
}

/// Cache-first history access backed by the fetch orchestrator.
pub struct HistoryService {
    cache: Arc<PriceCache>,
    orchestrator: FetchOrchestrator,
}

impl HistoryService {
    pub fn new(cache: Arc<PriceCache>, orchestrator: FetchOrchestrator) -> Self {
        Self {
            cache,
            orchestrator,
        }
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }

    /// Rows in `[from, to]` for each symbol, in input order.
    ///
    /// A partially covered symbol whose gap fetch fails or comes back empty
    /// (weekends, holidays, listings younger than the window) is served from
    /// the cached part of the window. `None` means neither the cache nor the
    /// provider had any row in `[from, to]`.
    pub fn load_histories(
        &self,
        symbols: &[String],
        from: NaiveDate,
        to: NaiveDate,
        interval: Interval,
    ) -> Vec<Option<Vec<PriceRow>>> {
        let mut out: Vec<Option<Vec<PriceRow>>> = vec![None; symbols.len()];
        let mut miss_index = Vec::new();
        let mut requests = Vec::new();

        for (i, symbol) in symbols.iter().enumerate() {
            if let Some(rows) = self.cache.lookup(symbol, from, to, interval) {
                out[i] = Some(rows).filter(|r| !r.is_empty());
                continue;
            }
            let (gap_from, gap_to) =
                missing_window(self.cache.coverage(symbol, interval), from, to);
            miss_index.push(i);
            requests.push(FetchRequest {
                symbol: symbol.clone(),
                from: gap_from,
                to: gap_to,
                interval,
            });
        }

        debug!(
            hits = symbols.len() - requests.len(),
            misses = requests.len(),
            %from,
            %to,
            "cache lookup"
        );
        if requests.is_empty() {
            return out;
        }

        let fetched = self.orchestrator.fetch_requests(&requests);
        for ((i, request), rows) in miss_index.into_iter().zip(&requests).zip(fetched) {
            let symbol = request.symbol.as_str();
            match rows {
                Some(rows) => {
                    if let Err(e) = self.cache.merge(symbol, rows, interval) {
                        warn!(symbol, "failed to persist cache snapshot: {e}");
                    }
                }
                // Nothing new: serve what the cache already holds for the window.
                None => debug!(symbol, "gap fetch returned nothing"),
            }
            out[i] = self
                .cache
                .entry(symbol)
                .filter(|entry| entry.interval == interval)
                .map(|entry| entry.rows_between(from, to))
                .filter(|r| !r.is_empty());
        }
        out
    }

    /// Make sure the cache covers `[from, to]` for every symbol.
    ///
    /// Returns how many symbols have data for the window afterwards.
    pub fn warm(
        &self,
        symbols: &[String],
        from: NaiveDate,
        to: NaiveDate,
        interval: Interval,
    ) -> usize {
        self.load_histories(symbols, from, to, interval)
            .iter()
            .filter(|r| r.is_some())
            .count()
    }
}
