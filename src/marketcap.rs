//! Market-cap snapshot type and the history repository boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::market::Market;

/// One market-cap observation for a single asset.
///
/// Immutable once read from the repository. `price` and `market_cap` are
/// ranking-only magnitudes and deliberately stay floating point; monetary
/// bookkeeping elsewhere uses `Decimal`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketCapSample {
    pub market: Market,
    pub price: f64,
    pub market_cap: f64,
    pub tags: Vec<String>,
    pub updated: DateTime<Utc>,
}

/// Source of historical market-cap snapshots.
///
/// Implementations are external (SQL/NoSQL specifics are out of scope);
/// tests use an in-memory fake. Each returned series must be strictly
/// descending by `updated` (most recent first).
pub trait MarketCapRepository {
    /// Historical snapshots for every asset quoted in `quote_symbol`,
    /// covering roughly the last `lookback_days` days.
    fn list_historical_many(
        &self,
        quote_symbol: &str,
        lookback_days: u32,
    ) -> Result<Vec<Vec<MarketCapSample>>>;
}
