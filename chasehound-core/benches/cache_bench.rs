//! Criterion benchmarks for screening hot paths.
//!
//! Benchmarks:
//! 1. Cache merge (overlapping refresh of an existing entry)
//! 2. Cache lookup (covered window slice)
//! 3. Target build (metrics + candle enhancement)
//! 4. Filter pipeline over a batch of targets

use chasehound_core::clock::{Clock, FixedClock};
use chasehound_core::data::PriceCache;
use chasehound_core::domain::{Interval, PriceRow};
use chasehound_core::filters::FilterPipeline;
use chasehound_core::params::TunableParams;
use chasehound_core::target::InvestmentTarget;
use chrono::{Duration, NaiveDate};
use chrono_tz::America::New_York;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

// ── Helpers ──────────────────────────────────────────────────────────

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 2).unwrap()
}

fn make_rows(n: usize, offset: i64) -> Vec<PriceRow> {
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0;
            PriceRow::new(
                base() + Duration::days(offset + i as i64),
                close - 0.3,
                close + 1.5,
                close - 1.5,
                close,
                1_000_000 + (i as u64 % 500_000),
            )
        })
        .collect()
}

fn clock() -> Arc<dyn Clock> {
    let at = NaiveDate::from_ymd_opt(2030, 1, 1)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    Arc::new(FixedClock::at_local(New_York, at).unwrap())
}

fn params() -> TunableParams {
    TunableParams::with_dates(base(), base()).unwrap()
}

// ── 1 + 2. Cache ─────────────────────────────────────────────────────

fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("price_cache");

    for &rows in &[250usize, 2_500] {
        group.bench_with_input(BenchmarkId::new("merge_overlap", rows), &rows, |b, &rows| {
            let cache = PriceCache::in_memory(clock());
            cache.merge("AAA", make_rows(rows, 0), Interval::Daily).unwrap();
            let refresh = make_rows(rows / 2, rows as i64 / 2);
            b.iter(|| {
                cache
                    .merge("AAA", black_box(refresh.clone()), Interval::Daily)
                    .unwrap()
            });
        });

        group.bench_with_input(BenchmarkId::new("lookup", rows), &rows, |b, &rows| {
            let cache = PriceCache::in_memory(clock());
            cache.merge("AAA", make_rows(rows, 0), Interval::Daily).unwrap();
            let from = base() + Duration::days(rows as i64 / 4);
            let to = base() + Duration::days(rows as i64 / 2);
            b.iter(|| cache.lookup(black_box("AAA"), from, to, Interval::Daily));
        });
    }

    group.finish();
}

// ── 3 + 4. Targets and filters ───────────────────────────────────────

fn bench_screening(c: &mut Criterion) {
    let p = params();
    let rows = make_rows(180, 0);

    c.bench_function("target_build_180", |b| {
        b.iter(|| InvestmentTarget::build("AAA", black_box(&rows), 1e9, &p))
    });

    let pipeline = FilterPipeline::from_params(&p);
    let targets: Vec<InvestmentTarget> = (0..500)
        .filter_map(|i| InvestmentTarget::build(&format!("S{i}"), &rows, 1e9, &p))
        .collect();
    c.bench_function("filter_pipeline_500", |b| {
        b.iter(|| pipeline.run(black_box(targets.clone())))
    });
}

criterion_group!(benches, bench_cache, bench_screening);
criterion_main!(benches);
