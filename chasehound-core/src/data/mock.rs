//! In-memory quote provider for offline runs and tests.

use super::provider::{DataError, FetchedSeries, QuoteProvider, SeriesSource};
use crate::domain::{Interval, PriceRow};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Serves fixed series, clipped to the requested window.
///
/// Symbols can be made to fail, panic or stall to exercise the fetch path.
#[derive(Debug, Default)]
pub struct MockProvider {
    series: HashMap<String, Vec<PriceRow>>,
    failing: HashSet<String>,
    panicking: HashSet<String>,
    delays: HashMap<String, Duration>,
    blocked: bool,
    calls: AtomicUsize,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, symbol: &str, rows: Vec<PriceRow>) -> Self {
        self.series.insert(symbol.to_string(), rows);
        self
    }

    pub fn with_failure(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }

    /// Report the provider as unavailable, as a tripped breaker would.
    pub fn blocked(mut self) -> Self {
        self.blocked = true;
        self
    }

    pub fn with_panic(mut self, symbol: &str) -> Self {
        self.panicking.insert(symbol.to_string());
        self
    }

    pub fn with_delay(mut self, symbol: &str, delay: Duration) -> Self {
        self.delays.insert(symbol.to_string(), delay);
        self
    }

    /// Number of `fetch` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl QuoteProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        _interval: Interval,
    ) -> Result<FetchedSeries, DataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(symbol) {
            std::thread::sleep(*delay);
        }
        if self.panicking.contains(symbol) {
            panic!("mock provider panic for {symbol}");
        }
        if self.failing.contains(symbol) {
            return Err(DataError::Network(format!("mock failure for {symbol}")));
        }

        let rows = self
            .series
            .get(symbol)
            .ok_or_else(|| DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            })?
            .iter()
            .filter(|r| r.date >= start && r.date <= end)
            .cloned()
            .collect();

        Ok(FetchedSeries {
            symbol: symbol.to_string(),
            rows,
            source: SeriesSource::Fixture,
        })
    }

    fn is_available(&self) -> bool {
        !self.blocked
    }
}
