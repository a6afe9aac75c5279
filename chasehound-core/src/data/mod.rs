//! Price data: providers, snapshot cache, concurrent fetch, universe.

pub mod cache;
pub mod circuit_breaker;
pub mod history;
pub mod mock;
pub mod orchestrator;
pub mod provider;
pub mod universe;
pub mod yahoo;

pub use cache::{CacheEntry, CacheKey, CacheStatus, PriceCache};
pub use circuit_breaker::CircuitBreaker;
pub use history::{missing_window, HistoryService};
pub use mock::MockProvider;
pub use orchestrator::{FetchOrchestrator, FetchRequest, OrchestratorConfig};
pub use provider::{DataError, FetchedSeries, QuoteProvider, SeriesSource};
pub use universe::{Listing, Universe};
pub use yahoo::YahooProvider;
