//! Daily and weekly history from Yahoo's v8 chart endpoint.
//!
//! The endpoint is unofficial; anything unexpected in the payload surfaces as
//! `DataError::UnexpectedResponse` and the symbol drops out of the batch.

use super::circuit_breaker::CircuitBreaker;
use super::provider::{DataError, FetchedSeries, QuoteProvider, SeriesSource};
use crate::domain::{normalize_rows, Interval, PriceRow};
use chrono::{Duration as ChronoDuration, NaiveDate};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

/// Map an exchange listing symbol to Yahoo's spelling.
///
/// Share classes are written with a dot on listings (`BRK.B`) and a dash on Yahoo (`BRK-B`).
pub fn provider_symbol(symbol: &str) -> String {
    symbol.replace('.', "-")
}

enum Attempt {
    Rows(Vec<PriceRow>),
    Retry(DataError),
    Fail(DataError),
}

pub struct YahooProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
    max_retries: u32,
    base_delay: Duration,
}

impl YahooProvider {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) chasehound")
            .build()
            .map_err(|e| DataError::Network(format!("http client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    fn chart_url(symbol: &str, start: NaiveDate, end: NaiveDate, interval: Interval) -> String {
        let start_ts = start.and_time(chrono::NaiveTime::MIN).and_utc().timestamp();
        // period2 is exclusive on Yahoo's side; ask through the end of `end`.
        let end_ts = (end + ChronoDuration::days(1))
            .and_time(chrono::NaiveTime::MIN)
            .and_utc()
            .timestamp()
            - 1;
        format!(
            "https://query2.finance.yahoo.com/v8/finance/chart/{}\
             ?period1={start_ts}&period2={end_ts}&interval={interval}",
            provider_symbol(symbol)
        )
    }

    fn parse_response(symbol: &str, resp: ChartResponse) -> Result<Vec<PriceRow>, DataError> {
        let data = match (resp.chart.result, resp.chart.error) {
            (Some(results), _) => results.into_iter().next().ok_or_else(|| {
                DataError::UnexpectedResponse(format!("{symbol}: empty result list"))
            })?,
            (None, Some(err)) if err.code == "Not Found" => {
                return Err(DataError::SymbolNotFound {
                    symbol: symbol.to_string(),
                })
            }
            (None, Some(err)) => {
                return Err(DataError::UnexpectedResponse(format!(
                    "{symbol}: {} ({})",
                    err.description, err.code
                )))
            }
            (None, None) => {
                return Err(DataError::UnexpectedResponse(format!(
                    "{symbol}: neither result nor error"
                )))
            }
        };

        // No timestamps means no sessions in range.
        let Some(timestamps) = data.timestamp else {
            return Ok(Vec::new());
        };

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::UnexpectedResponse(format!("{symbol}: no quote block")))?;

        let at = |column: &[Option<f64>], i: usize| column.get(i).copied().flatten();
        let mut rows = Vec::with_capacity(timestamps.len());
        for (i, ts) in timestamps.into_iter().enumerate() {
            // Halted or placeholder sessions carry no close.
            let Some(close) = at(&quote.close, i) else {
                continue;
            };
            let date = chrono::DateTime::from_timestamp(ts, 0)
                .ok_or_else(|| DataError::UnexpectedResponse(format!("bad timestamp {ts}")))?
                .date_naive();
            rows.push(PriceRow::new(
                date,
                at(&quote.open, i).unwrap_or(f64::NAN),
                at(&quote.high, i).unwrap_or(f64::NAN),
                at(&quote.low, i).unwrap_or(f64::NAN),
                close,
                quote.volume.get(i).copied().flatten().unwrap_or(0),
            ));
        }

        Ok(normalize_rows(rows))
    }

    /// One chart request, retried with doubling delays on throttling and transport errors.
    fn fetch_with_retry(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: Interval,
    ) -> Result<Vec<PriceRow>, DataError> {
        let url = Self::chart_url(symbol, start, end, interval);
        let mut retryable = DataError::Other(format!("no attempt made for {symbol}"));

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                debug!(symbol, attempt, ?delay, "retrying chart request");
                std::thread::sleep(delay);
            }
            if !self.circuit_breaker.is_allowed() {
                return Err(DataError::ProviderBlocked);
            }
            match self.attempt(symbol, &url) {
                Attempt::Rows(rows) => {
                    self.circuit_breaker.record_success();
                    return Ok(rows);
                }
                Attempt::Retry(e) => retryable = e,
                Attempt::Fail(e) => return Err(e),
            }
        }
        Err(retryable)
    }

    fn attempt(&self, symbol: &str, url: &str) -> Attempt {
        use reqwest::StatusCode;

        let resp = match self.client.get(url).send() {
            Ok(resp) => resp,
            Err(e) if e.is_connect() || e.is_timeout() => {
                return Attempt::Retry(DataError::Network(e.to_string()))
            }
            Err(e) => return Attempt::Fail(DataError::Network(e.to_string())),
        };

        match resp.status() {
            StatusCode::FORBIDDEN => {
                warn!(symbol, "chart endpoint answered 403, backing off");
                self.circuit_breaker.trip();
                Attempt::Fail(DataError::ProviderBlocked)
            }
            StatusCode::TOO_MANY_REQUESTS => {
                self.circuit_breaker.record_failure();
                let retry_after_secs = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok()?.parse::<u64>().ok())
                    .unwrap_or(60);
                Attempt::Retry(DataError::RateLimited { retry_after_secs })
            }
            StatusCode::UNAUTHORIZED => {
                Attempt::Fail(DataError::Unauthorized(format!("chart request for {symbol}")))
            }
            StatusCode::NOT_FOUND => Attempt::Fail(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            }),
            status if !status.is_success() => {
                self.circuit_breaker.record_failure();
                Attempt::Retry(DataError::Network(format!("{symbol}: HTTP {status}")))
            }
            _ => {
                let parsed = resp
                    .json::<ChartResponse>()
                    .map_err(|e| DataError::UnexpectedResponse(format!("{symbol}: {e}")))
                    .and_then(|chart| Self::parse_response(symbol, chart));
                match parsed {
                    Ok(rows) => Attempt::Rows(rows),
                    Err(e) => Attempt::Fail(e),
                }
            }
        }
    }

    /// Latest close over the last few sessions, or `None` when nothing traded.
    pub fn last_traded_price(&self, symbol: &str, today: NaiveDate) -> Result<Option<f64>, DataError> {
        let rows = self.fetch_with_retry(
            symbol,
            today - ChronoDuration::days(7),
            today,
            Interval::Daily,
        )?;
        Ok(rows.last().map(|r| r.close))
    }
}

impl QuoteProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        interval: Interval,
    ) -> Result<FetchedSeries, DataError> {
        let rows = self.fetch_with_retry(symbol, start, end, interval)?;
        Ok(FetchedSeries {
            symbol: symbol.to_string(),
            rows,
            source: SeriesSource::Yahoo,
        })
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_class_symbols_are_rewritten() {
        assert_eq!(provider_symbol("BRK.B"), "BRK-B");
        assert_eq!(provider_symbol("BF.B"), "BF-B");
        assert_eq!(provider_symbol("AAPL"), "AAPL");
    }

    #[test]
    fn chart_url_carries_interval_and_rewritten_symbol() {
        let url = YahooProvider::chart_url(
            "BRK.B",
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            Interval::Weekly,
        );
        assert!(url.contains("/chart/BRK-B?"));
        assert!(url.contains("interval=1wk"));
        assert!(url.contains("period1=1704153600"));
    }

    #[test]
    fn parse_skips_rows_without_close_and_computes_turnover() {
        let body = r#"{
            "chart": {
                "result": [{
                    "timestamp": [1704205800, 1704292200, 1704378600],
                    "indicators": {
                        "quote": [{
                            "open":   [10.0, null, 11.0],
                            "high":   [10.5, null, 11.5],
                            "low":    [9.5,  null, 10.5],
                            "close":  [10.2, null, 11.2],
                            "volume": [1000, null, 2000]
                        }]
                    }
                }],
                "error": null
            }
        }"#;
        let resp: ChartResponse = serde_json::from_str(body).unwrap();
        let rows = YahooProvider::parse_response("TEST", resp).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(rows[1].turnover, 2000.0 * 11.2);
    }

    #[test]
    fn parse_maps_not_found_error() {
        let body = r#"{"chart": {"result": null,
            "error": {"code": "Not Found", "description": "No data found"}}}"#;
        let resp: ChartResponse = serde_json::from_str(body).unwrap();
        let err = YahooProvider::parse_response("NOPE", resp).unwrap_err();
        assert!(matches!(err, DataError::SymbolNotFound { .. }));
    }

    #[test]
    fn parse_without_timestamps_is_empty() {
        let body = r#"{"chart": {"result": [{"indicators": {"quote": [{
            "open": [], "high": [], "low": [], "close": [], "volume": []}]}}],
            "error": null}}"#;
        let resp: ChartResponse = serde_json::from_str(body).unwrap();
        assert!(YahooProvider::parse_response("EMPTY", resp).unwrap().is_empty());
    }
}
