//! ChaseHound Core: price cache, concurrent fetch, market calendar, targets, filters.
//!
//! This crate contains everything a screening run needs below the pipeline:
//! - Domain types (price rows, intervals)
//! - Snapshot-backed price cache with coverage lookup and last-write-wins merge
//! - Bounded-concurrency fetch orchestration over a quote provider
//! - NYSE trading calendar and an injectable clock
//! - Tunable parameters with validation
//! - Investment targets and the fundamental/volatility/right-side filter stages

pub mod calendar;
pub mod clock;
pub mod data;
pub mod domain;
pub mod filters;
pub mod indicators;
pub mod params;
pub mod target;
