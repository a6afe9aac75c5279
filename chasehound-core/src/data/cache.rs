//! Snapshot price cache: in-memory index plus Parquet files on disk.
//!
//! Layout: `{cache_dir}/{symbol}_from{YYYYMMDD}_to{YYYYMMDD}_{interval}_at{YYYYMMDDHHMMSS}.parquet`
//!
//! The `at` stamp is UTC so snapshot order survives DST transitions.
//!
//! - Each merge writes a fresh snapshot; older snapshots are left on disk.
//! - At open, only the most recently fetched snapshot per symbol is loaded.
//! - Writes are atomic (write to .tmp, rename into place).
//! - An unreadable snapshot is a cache miss. It is logged, never deleted.

use super::provider::DataError;
use crate::clock::Clock;
use crate::domain::{Interval, PriceRow};
use chrono::{NaiveDate, NaiveDateTime, Utc};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

const DATE_KEY_FORMAT: &str = "%Y%m%d";
const FETCHED_AT_FORMAT: &str = "%Y%m%d%H%M%S";

/// Identity of one persisted snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheKey {
    pub symbol: String,
    pub covered_from: NaiveDate,
    pub covered_to: NaiveDate,
    pub interval: Interval,
    /// Fetch time in UTC.
    pub fetched_at: NaiveDateTime,
}

impl CacheKey {
    /// File stem, e.g. `AAPL_from20240102_to20240329_1d_at20240401093000`.
    pub fn file_stem(&self) -> String {
        format!(
            "{}_from{}_to{}_{}_at{}",
            self.symbol,
            self.covered_from.format(DATE_KEY_FORMAT),
            self.covered_to.format(DATE_KEY_FORMAT),
            self.interval,
            self.fetched_at.format(FETCHED_AT_FORMAT),
        )
    }

    /// Parse a file stem back into a key.
    ///
    /// Fields are split from the right: symbols may contain underscores, the
    /// other four fields never do.
    pub fn parse(stem: &str) -> Result<Self, DataError> {
        let bad = || DataError::InvalidCacheKey(stem.to_string());

        let mut parts = stem.rsplitn(5, '_');
        let at = parts.next().ok_or_else(bad)?;
        let interval = parts.next().ok_or_else(bad)?;
        let to = parts.next().ok_or_else(bad)?;
        let from = parts.next().ok_or_else(bad)?;
        let symbol = parts.next().filter(|s| !s.is_empty()).ok_or_else(bad)?;

        let fetched_at = at
            .strip_prefix("at")
            .and_then(|s| NaiveDateTime::parse_from_str(s, FETCHED_AT_FORMAT).ok())
            .ok_or_else(bad)?;
        let covered_to = to
            .strip_prefix("to")
            .and_then(|s| NaiveDate::parse_from_str(s, DATE_KEY_FORMAT).ok())
            .ok_or_else(bad)?;
        let covered_from = from
            .strip_prefix("from")
            .and_then(|s| NaiveDate::parse_from_str(s, DATE_KEY_FORMAT).ok())
            .ok_or_else(bad)?;
        let interval = interval.parse::<Interval>().map_err(|_| bad())?;

        Ok(Self {
            symbol: symbol.to_string(),
            covered_from,
            covered_to,
            interval,
            fetched_at,
        })
    }

    fn coverage_days(&self) -> i64 {
        (self.covered_to - self.covered_from).num_days()
    }

    /// Ordering used to pick the snapshot loaded at open: latest fetch first,
    /// then wider coverage, then the stem itself so the choice is deterministic.
    fn is_preferred_over(&self, other: &CacheKey) -> bool {
        (self.fetched_at, self.coverage_days(), self.file_stem())
            > (other.fetched_at, other.coverage_days(), other.file_stem())
    }
}

/// Cached history for one symbol.
///
/// Rows are strictly increasing by date; `covered_from`/`covered_to` are the
/// first and last row dates.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub symbol: String,
    pub rows: Vec<PriceRow>,
    pub covered_from: NaiveDate,
    pub covered_to: NaiveDate,
    pub interval: Interval,
    pub fetched_at: NaiveDateTime,
}

impl CacheEntry {
    /// Build an entry from rows already sorted and de-duplicated. `None` when empty.
    fn from_rows(
        symbol: &str,
        rows: Vec<PriceRow>,
        interval: Interval,
        fetched_at: NaiveDateTime,
    ) -> Option<Self> {
        let covered_from = rows.first()?.date;
        let covered_to = rows.last()?.date;
        Some(Self {
            symbol: symbol.to_string(),
            rows,
            covered_from,
            covered_to,
            interval,
            fetched_at,
        })
    }

    pub fn key(&self) -> CacheKey {
        CacheKey {
            symbol: self.symbol.clone(),
            covered_from: self.covered_from,
            covered_to: self.covered_to,
            interval: self.interval,
            fetched_at: self.fetched_at,
        }
    }

    /// True iff `[from, to]` lies inside the covered range.
    pub fn covers(&self, from: NaiveDate, to: NaiveDate) -> bool {
        from >= self.covered_from && to <= self.covered_to
    }

    /// Rows with dates in `[from, to]`.
    pub fn rows_between(&self, from: NaiveDate, to: NaiveDate) -> Vec<PriceRow> {
        let start = self.rows.partition_point(|r| r.date < from);
        let end = self.rows.partition_point(|r| r.date <= to);
        if start >= end {
            return Vec::new();
        }
        self.rows[start..end].to_vec()
    }
}

/// Coverage summary for one cached symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatus {
    pub symbol: String,
    pub snapshots_on_disk: usize,
    pub loaded: Option<CacheKey>,
    pub row_count: usize,
}

/// Symbol-keyed price cache.
///
/// The in-memory map is the source of truth for lookups; disk snapshots exist
/// so the next process can start warm. A single process is expected to own a
/// cache directory.
pub struct PriceCache {
    cache_dir: Option<PathBuf>,
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl PriceCache {
    /// Open (creating if needed) a cache directory and load the latest snapshot per symbol.
    pub fn open(cache_dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self, DataError> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)
            .map_err(|e| DataError::CacheIo(format!("failed to create dir: {e}")))?;

        let entries = cold_load(&cache_dir)?;
        info!(
            dir = %cache_dir.display(),
            symbols = entries.len(),
            "price cache opened"
        );

        Ok(Self {
            cache_dir: Some(cache_dir),
            entries: Mutex::new(entries),
            clock,
        })
    }

    /// Cache that never touches disk.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            cache_dir: None,
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Root directory of the cache, if persistent.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached rows in `[from, to]` iff the cached range fully covers it at `interval`.
    pub fn lookup(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
        interval: Interval,
    ) -> Option<Vec<PriceRow>> {
        let entries = self.lock();
        let entry = entries.get(symbol)?;
        if entry.interval != interval || !entry.covers(from, to) {
            debug!(symbol, %from, %to, "cache miss");
            return None;
        }
        Some(entry.rows_between(from, to))
    }

    /// Covered range for `symbol` at `interval`, if any.
    pub fn coverage(&self, symbol: &str, interval: Interval) -> Option<(NaiveDate, NaiveDate)> {
        self.lock()
            .get(symbol)
            .filter(|e| e.interval == interval)
            .map(|e| (e.covered_from, e.covered_to))
    }

    /// Copy of the current entry for `symbol`.
    pub fn entry(&self, symbol: &str) -> Option<CacheEntry> {
        self.lock().get(symbol).cloned()
    }

    /// Number of symbols held in memory.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Merge freshly fetched rows into the entry for `symbol`.
    ///
    /// Rows are combined per date with the new row winning, then a new
    /// snapshot is written with the widened coverage and a fresh `fetched_at`.
    /// A different interval replaces the entry. Merging no rows is a no-op.
    ///
    /// The in-memory entry is replaced before persisting, so a persist error
    /// leaves lookups correct for this process.
    pub fn merge(
        &self,
        symbol: &str,
        new_rows: Vec<PriceRow>,
        interval: Interval,
    ) -> Result<(), DataError> {
        if new_rows.is_empty() {
            return Ok(());
        }

        let fetched_at = self.clock.now().with_timezone(&Utc).naive_utc();

        let entry = {
            let mut entries = self.lock();

            let mut by_date: BTreeMap<NaiveDate, PriceRow> = BTreeMap::new();
            if let Some(existing) = entries.get(symbol).filter(|e| e.interval == interval) {
                by_date.extend(existing.rows.iter().map(|r| (r.date, r.clone())));
            }
            let added = new_rows.len();
            by_date.extend(new_rows.into_iter().map(|r| (r.date, r)));

            let Some(entry) =
                CacheEntry::from_rows(symbol, by_date.into_values().collect(), interval, fetched_at)
            else {
                return Ok(());
            };
            debug!(
                symbol,
                added,
                total = entry.rows.len(),
                from = %entry.covered_from,
                to = %entry.covered_to,
                "merged rows into cache"
            );
            entries.insert(symbol.to_string(), entry.clone());
            entry
        };

        if let Some(dir) = &self.cache_dir {
            write_snapshot(dir, &entry)?;
        }
        Ok(())
    }

    /// Per-symbol snapshot inventory for the cache directory.
    pub fn status(&self) -> Result<Vec<CacheStatus>, DataError> {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        if let Some(dir) = &self.cache_dir {
            for key in scan_keys(dir)? {
                *counts.entry(key.symbol).or_default() += 1;
            }
        }

        let entries = self.lock();
        for symbol in entries.keys() {
            counts.entry(symbol.clone()).or_default();
        }

        Ok(counts
            .into_iter()
            .map(|(symbol, snapshots_on_disk)| {
                let entry = entries.get(&symbol);
                CacheStatus {
                    loaded: entry.map(CacheEntry::key),
                    row_count: entry.map_or(0, |e| e.rows.len()),
                    snapshots_on_disk,
                    symbol,
                }
            })
            .collect())
    }
}

// ── Snapshot discovery ──────────────────────────────────────────────

/// Every parseable snapshot key in `dir`. Unparseable names are skipped.
fn scan_keys(dir: &Path) -> Result<Vec<CacheKey>, DataError> {
    let read = fs::read_dir(dir).map_err(|e| DataError::CacheIo(format!("read dir: {e}")))?;
    let mut keys = Vec::new();
    for dir_entry in read {
        let dir_entry = dir_entry.map_err(|e| DataError::CacheIo(format!("dir entry: {e}")))?;
        let path = dir_entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("parquet") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        match CacheKey::parse(stem) {
            Ok(key) => keys.push(key),
            Err(e) => warn!(file = %path.display(), "skipping cache file: {e}"),
        }
    }
    Ok(keys)
}

/// Load the preferred snapshot for every symbol found in `dir`.
fn cold_load(dir: &Path) -> Result<HashMap<String, CacheEntry>, DataError> {
    let mut latest: HashMap<String, CacheKey> = HashMap::new();
    for key in scan_keys(dir)? {
        match latest.get(&key.symbol) {
            Some(current) if !key.is_preferred_over(current) => {}
            _ => {
                latest.insert(key.symbol.clone(), key);
            }
        }
    }

    let mut entries = HashMap::with_capacity(latest.len());
    for (symbol, key) in latest {
        let path = snapshot_path(dir, &key);
        match load_and_validate_parquet(&path) {
            Ok(rows) => {
                let rows = crate::domain::normalize_rows(rows);
                if let Some(entry) = CacheEntry::from_rows(&symbol, rows, key.interval, key.fetched_at)
                {
                    entries.insert(symbol, entry);
                }
            }
            Err(e) => {
                warn!(file = %path.display(), "unreadable cache snapshot treated as miss: {e}");
            }
        }
    }
    Ok(entries)
}

fn snapshot_path(dir: &Path, key: &CacheKey) -> PathBuf {
    dir.join(format!("{}.parquet", key.file_stem()))
}

fn write_snapshot(dir: &Path, entry: &CacheEntry) -> Result<(), DataError> {
    let path = snapshot_path(dir, &entry.key());
    let tmp_path = path.with_extension("parquet.tmp");

    let mut df = rows_to_dataframe(&entry.rows)?;
    write_parquet(&mut df, &tmp_path)?;

    fs::rename(&tmp_path, &path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        DataError::CacheIo(format!("atomic rename failed: {e}"))
    })
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Convert rows to a Polars DataFrame.
fn rows_to_dataframe(rows: &[PriceRow]) -> Result<DataFrame, DataError> {
    let epoch = epoch();
    let dates: Vec<i32> = rows
        .iter()
        .map(|r| (r.date - epoch).num_days() as i32)
        .collect();
    let opens: Vec<f64> = rows.iter().map(|r| r.open).collect();
    let highs: Vec<f64> = rows.iter().map(|r| r.high).collect();
    let lows: Vec<f64> = rows.iter().map(|r| r.low).collect();
    let closes: Vec<f64> = rows.iter().map(|r| r.close).collect();
    let volumes: Vec<u64> = rows.iter().map(|r| r.volume).collect();
    let turnovers: Vec<f64> = rows.iter().map(|r| r.turnover).collect();

    DataFrame::new(vec![
        Column::new("date".into(), dates)
            .cast(&DataType::Date)
            .map_err(|e| DataError::Snapshot(format!("date cast: {e}")))?,
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
        Column::new("turnover".into(), turnovers),
    ])
    .map_err(|e| DataError::Snapshot(format!("dataframe creation: {e}")))
}

fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<(), DataError> {
    let file =
        fs::File::create(path).map_err(|e| DataError::Snapshot(format!("create file: {e}")))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| DataError::Snapshot(format!("write parquet: {e}")))?;
    Ok(())
}

const EXPECTED_COLUMNS: [&str; 7] = ["date", "open", "high", "low", "close", "volume", "turnover"];

fn load_and_validate_parquet(path: &Path) -> Result<Vec<PriceRow>, DataError> {
    let file = fs::File::open(path).map_err(|e| DataError::Snapshot(format!("open: {e}")))?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| DataError::Snapshot(format!("read: {e}")))?;

    if df.height() == 0 {
        return Err(DataError::Snapshot("no rows".into()));
    }
    for col_name in EXPECTED_COLUMNS {
        if df.column(col_name).is_err() {
            return Err(DataError::Snapshot(format!("missing column '{col_name}'")));
        }
    }

    dataframe_to_rows(&df)
}

fn dataframe_to_rows(df: &DataFrame) -> Result<Vec<PriceRow>, DataError> {
    let col = |name: &str| {
        df.column(name)
            .map_err(|e| DataError::Snapshot(format!("column read: {e}")))
    };
    let typed = |name: &str, e: PolarsError| DataError::Snapshot(format!("{name} column type: {e}"));

    let date_ca = col("date")?.date().map_err(|e| typed("date", e))?;
    let open_ca = col("open")?.f64().map_err(|e| typed("open", e))?;
    let high_ca = col("high")?.f64().map_err(|e| typed("high", e))?;
    let low_ca = col("low")?.f64().map_err(|e| typed("low", e))?;
    let close_ca = col("close")?.f64().map_err(|e| typed("close", e))?;
    let vol_ca = col("volume")?.u64().map_err(|e| typed("volume", e))?;
    let turnover_ca = col("turnover")?.f64().map_err(|e| typed("turnover", e))?;

    let epoch = epoch();
    let n = df.height();
    let mut rows = Vec::with_capacity(n);

    for i in 0..n {
        let date_days = date_ca
            .get(i)
            .ok_or_else(|| DataError::Snapshot(format!("null date at row {i}")))?;
        let close = close_ca.get(i).unwrap_or(f64::NAN);
        let volume = vol_ca.get(i).unwrap_or(0);

        rows.push(PriceRow {
            date: epoch + chrono::Duration::days(date_days as i64),
            open: open_ca.get(i).unwrap_or(f64::NAN),
            high: high_ca.get(i).unwrap_or(f64::NAN),
            low: low_ca.get(i).unwrap_or(f64::NAN),
            close,
            volume,
            turnover: turnover_ca.get(i).unwrap_or(volume as f64 * close),
        });
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, FixedClock};
    use chrono::{DateTime, Duration, TimeZone};
    use chrono_tz::Tz;

    /// Clock that advances one minute every time it is read.
    struct TickingClock {
        at: Mutex<DateTime<Tz>>,
    }

    impl TickingClock {
        fn new() -> Self {
            let tz = chrono_tz::America::New_York;
            Self {
                at: Mutex::new(tz.with_ymd_and_hms(2024, 4, 1, 9, 30, 0).unwrap()),
            }
        }
    }

    impl Clock for TickingClock {
        fn now(&self) -> DateTime<Tz> {
            let mut at = self.at.lock().unwrap();
            *at += Duration::minutes(1);
            *at
        }
    }

    fn fixed_clock() -> Arc<dyn Clock> {
        let local = NaiveDate::from_ymd_opt(2024, 4, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap();
        Arc::new(FixedClock::at_local(chrono_tz::America::New_York, local).unwrap())
    }

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn row(date: NaiveDate, close: f64) -> PriceRow {
        PriceRow::new(date, close, close + 1.0, close - 1.0, close, 1_000)
    }

    fn rows(days: std::ops::RangeInclusive<u32>, close: f64) -> Vec<PriceRow> {
        days.map(|day| row(d(1, day), close)).collect()
    }

    #[test]
    fn key_roundtrip_with_underscored_symbol() {
        let key = CacheKey {
            symbol: "FOO_BAR".into(),
            covered_from: d(1, 2),
            covered_to: d(3, 28),
            interval: Interval::Daily,
            fetched_at: d(4, 1).and_hms_opt(9, 30, 5).unwrap(),
        };
        let stem = key.file_stem();
        assert_eq!(stem, "FOO_BAR_from20240102_to20240328_1d_at20240401093005");
        assert_eq!(CacheKey::parse(&stem).unwrap(), key);
    }

    #[test]
    fn malformed_keys_are_rejected() {
        for stem in [
            "AAPL",
            "AAPL_from2024_to20240328_1d_at20240401093005",
            "AAPL_from20240102_to20240328_5m_at20240401093005",
            "_from20240102_to20240328_1d_at20240401093005",
        ] {
            assert!(CacheKey::parse(stem).is_err(), "{stem} should not parse");
        }
    }

    #[test]
    fn lookup_hits_only_inside_coverage() {
        let cache = PriceCache::in_memory(fixed_clock());
        cache.merge("AAPL", rows(2..=20, 10.0), Interval::Daily).unwrap();

        let hit = cache.lookup("AAPL", d(1, 5), d(1, 10), Interval::Daily).unwrap();
        assert_eq!(hit.len(), 6);
        assert_eq!(hit[0].date, d(1, 5));

        assert!(cache.lookup("AAPL", d(1, 2), d(1, 20), Interval::Daily).is_some());
        assert!(cache.lookup("AAPL", d(1, 1), d(1, 10), Interval::Daily).is_none());
        assert!(cache.lookup("AAPL", d(1, 5), d(1, 21), Interval::Daily).is_none());
        assert!(cache.lookup("AAPL", d(1, 5), d(1, 10), Interval::Weekly).is_none());
        assert!(cache.lookup("MSFT", d(1, 5), d(1, 10), Interval::Daily).is_none());
    }

    #[test]
    fn merge_new_rows_win_on_conflict() {
        let cache = PriceCache::in_memory(fixed_clock());
        cache.merge("AAPL", rows(2..=10, 10.0), Interval::Daily).unwrap();
        cache.merge("AAPL", rows(8..=15, 12.0), Interval::Daily).unwrap();

        let entry = cache.entry("AAPL").unwrap();
        assert_eq!(entry.rows.len(), 14);
        assert_eq!(entry.covered_from, d(1, 2));
        assert_eq!(entry.covered_to, d(1, 15));
        assert_eq!(entry.rows[0].close, 10.0);
        assert_eq!(entry.rows[6].date, d(1, 8));
        assert_eq!(entry.rows[6].close, 12.0);
        assert!(entry.rows.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn merge_subset_keeps_values_and_refreshes_fetched_at() {
        let cache = PriceCache::in_memory(Arc::new(TickingClock::new()));
        cache.merge("AAPL", rows(2..=20, 10.0), Interval::Daily).unwrap();
        let before = cache.entry("AAPL").unwrap();

        cache.merge("AAPL", rows(5..=8, 10.0), Interval::Daily).unwrap();
        let after = cache.entry("AAPL").unwrap();

        assert_eq!(after.rows, before.rows);
        assert!(after.fetched_at > before.fetched_at);
    }

    #[test]
    fn merge_empty_is_noop_and_interval_change_replaces() {
        let cache = PriceCache::in_memory(fixed_clock());
        cache.merge("AAPL", Vec::new(), Interval::Daily).unwrap();
        assert!(cache.entry("AAPL").is_none());

        cache.merge("AAPL", rows(2..=10, 10.0), Interval::Daily).unwrap();
        cache.merge("AAPL", rows(5..=5, 11.0), Interval::Weekly).unwrap();
        let entry = cache.entry("AAPL").unwrap();
        assert_eq!(entry.interval, Interval::Weekly);
        assert_eq!(entry.rows.len(), 1);
    }

    #[test]
    fn persisted_snapshot_reloads_latest() {
        let dir = tempfile::tempdir().unwrap();
        let clock: Arc<dyn Clock> = Arc::new(TickingClock::new());
        {
            let cache = PriceCache::open(dir.path(), clock.clone()).unwrap();
            cache.merge("SPY", rows(2..=5, 100.0), Interval::Daily).unwrap();
            cache.merge("SPY", rows(6..=9, 101.0), Interval::Daily).unwrap();
            cache.merge("BRK_B", rows(2..=3, 400.0), Interval::Daily).unwrap();
        }

        let reopened = PriceCache::open(dir.path(), clock).unwrap();
        let spy = reopened.entry("SPY").unwrap();
        assert_eq!(spy.rows.len(), 8);
        assert_eq!(spy.covered_to, d(1, 9));
        assert_eq!(spy.rows[7].turnover, 101.0 * 1_000.0);
        assert!(reopened.entry("BRK_B").is_some());

        let status = reopened.status().unwrap();
        let spy_status = status.iter().find(|s| s.symbol == "SPY").unwrap();
        assert_eq!(spy_status.snapshots_on_disk, 2);
        assert_eq!(spy_status.row_count, 8);
    }

    #[test]
    fn snapshot_written_after_dst_fall_back_is_the_one_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let at_utc = |h, m| -> Arc<dyn Clock> {
            let utc = Utc.with_ymd_and_hms(2024, 11, 3, h, m, 0).unwrap();
            Arc::new(FixedClock::new(utc.with_timezone(&chrono_tz::America::New_York)))
        };
        let oct = |day| NaiveDate::from_ymd_opt(2024, 10, day).unwrap();

        // 05:30Z is 01:30 EDT; 06:10Z is 01:10 EST, earlier on the wall clock.
        PriceCache::open(dir.path(), at_utc(5, 30))
            .unwrap()
            .merge("AAPL", vec![row(oct(1), 100.0)], Interval::Daily)
            .unwrap();
        PriceCache::open(dir.path(), at_utc(6, 10))
            .unwrap()
            .merge("AAPL", vec![row(oct(2), 101.0)], Interval::Daily)
            .unwrap();

        let reopened = PriceCache::open(dir.path(), at_utc(7, 0)).unwrap();
        let entry = reopened.entry("AAPL").unwrap();
        assert_eq!(entry.rows.len(), 2);
        assert_eq!(entry.covered_to, oct(2));
        assert_eq!(
            entry.fetched_at,
            NaiveDate::from_ymd_opt(2024, 11, 3).unwrap().and_hms_opt(6, 10, 0).unwrap()
        );
        assert!(dir
            .path()
            .join("AAPL_from20241001_to20241002_1d_at20241103061000.parquet")
            .exists());
    }

    #[test]
    fn corrupt_latest_snapshot_is_a_miss_and_kept() {
        let dir = tempfile::tempdir().unwrap();
        let clock = fixed_clock();
        {
            let cache = PriceCache::open(dir.path(), clock.clone()).unwrap();
            cache.merge("SPY", rows(2..=5, 100.0), Interval::Daily).unwrap();
        }
        let corrupt = dir
            .path()
            .join("SPY_from20240102_to20240131_1d_at20991231000000.parquet");
        fs::write(&corrupt, b"not parquet").unwrap();

        let reopened = PriceCache::open(dir.path(), clock).unwrap();
        assert!(reopened.entry("SPY").is_none());
        assert!(corrupt.exists());
    }

    #[test]
    fn snapshot_missing_columns_is_a_snapshot_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.parquet");
        let mut df = DataFrame::new(vec![Column::new("close".into(), vec![1.0f64, 2.0])]).unwrap();
        write_parquet(&mut df, &path).unwrap();

        let err = load_and_validate_parquet(&path).unwrap_err();
        assert!(matches!(err, DataError::Snapshot(ref m) if m.contains("date")), "{err}");
    }

    #[test]
    fn preferred_key_breaks_ties_by_coverage() {
        let at = d(4, 1).and_hms_opt(9, 30, 0).unwrap();
        let narrow = CacheKey {
            symbol: "SPY".into(),
            covered_from: d(1, 2),
            covered_to: d(1, 5),
            interval: Interval::Daily,
            fetched_at: at,
        };
        let wide = CacheKey {
            covered_to: d(1, 20),
            ..narrow.clone()
        };
        assert!(wide.is_preferred_over(&narrow));
        assert!(!narrow.is_preferred_over(&wide));
    }
}
