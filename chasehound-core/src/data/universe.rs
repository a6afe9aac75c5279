//! Symbol universe: listed tickers with their market capitalization.
//!
//! Loaded from a JSON array of listing records, e.g. an exchange's full ticker
//! dump. Only `symbol` and `marketCap` are read; the cap may be a number, a
//! numeric string, empty or null. Unparseable caps never pass a market-cap floor.

use super::provider::DataError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One listed symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub symbol: String,
    #[serde(
        rename = "marketCap",
        alias = "market_cap",
        default,
        deserialize_with = "lenient_f64"
    )]
    pub market_cap: Option<f64>,
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().replace(',', "").parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite()))
}

/// The full listing, in file order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Universe {
    listings: Vec<Listing>,
}

impl Universe {
    pub fn new(listings: Vec<Listing>) -> Self {
        Self { listings }
    }

    /// Load a universe from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DataError::Other(format!("read universe file {}: {e}", path.display())))?;
        Self::from_json(&content)
    }

    /// Parse a universe from a JSON string.
    pub fn from_json(content: &str) -> Result<Self, DataError> {
        serde_json::from_str(content)
            .map_err(|e| DataError::Universe(format!("parse universe JSON: {e}")))
    }

    pub fn listings(&self) -> &[Listing] {
        &self.listings
    }

    pub fn len(&self) -> usize {
        self.listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listings.is_empty()
    }

    /// Listings whose market cap is at least `min_market_cap`, in file order.
    pub fn eligible(&self, min_market_cap: f64) -> Vec<&Listing> {
        self.listings
            .iter()
            .filter(|l| l.market_cap.is_some_and(|cap| cap >= min_market_cap))
            .collect()
    }

    /// Symbol → market cap for every listing with a known cap.
    pub fn market_caps(&self) -> HashMap<String, f64> {
        self.listings
            .iter()
            .filter_map(|l| l.market_cap.map(|cap| (l.symbol.clone(), cap)))
            .collect()
    }
}
