//! The history provider seam and the errors that cross it.
//!
//! Everything above this trait (cache, orchestrator, pipeline) works the same
//! against Yahoo or the in-memory fixture provider.

use crate::domain::{Interval, PriceRow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("could not reach the quote service: {0}")]
    Network(String),

    #[error("quote service asked us to back off for {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("unexpected quote response: {0}")]
    UnexpectedResponse(String),

    #[error("quote service refused the request: {0}")]
    Unauthorized(String),

    #[error("no such symbol: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("provider is blocked until its circuit breaker cools down")]
    ProviderBlocked,

    #[error("price cache I/O failed: {0}")]
    CacheIo(String),

    #[error("price snapshot could not be read or written: {0}")]
    Snapshot(String),

    #[error("snapshot file name '{0}' is not a cache key")]
    InvalidCacheKey(String),

    #[error("bad universe listing: {0}")]
    Universe(String),

    #[error("{0}")]
    Other(String),
}

/// Rows returned by one provider call.
#[derive(Debug, Clone)]
pub struct FetchedSeries {
    pub symbol: String,
    pub rows: Vec<PriceRow>,
    pub source: SeriesSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeriesSource {
    Yahoo,
    Fixture,
}

/// Fetches OHLCV history for one symbol at a time.
///
/// Calls arrive concurrently from the fetch pool. A symbol with no rows in the
/// window is `Ok` with an empty series; the orchestrator turns that into a
/// missing result.
pub trait QuoteProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Rows dated within `[start, end]`, ascending.
    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: Interval,
    ) -> Result<FetchedSeries, DataError>;

    /// False while the provider is refusing requests; the orchestrator skips
    /// the whole batch.
    fn is_available(&self) -> bool;
}
