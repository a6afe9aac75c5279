//! Domain types for ChaseHound

pub mod row;

pub use row::{normalize_rows, Interval, PriceRow};
