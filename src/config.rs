//! Per-user rebalancing policy, loadable from TOML or JSON.

use std::path::Path;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Per-user policy driving target calculation and order construction.
///
/// Persistence of this structure is external; the crate only consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Absolute quote-currency reserve never allocated to assets.
    #[serde(default)]
    pub quote_takeout: Decimal,

    /// Percentage of the portfolio kept as quote-currency reserve (0–100).
    #[serde(default)]
    pub quote_allocation: Decimal,

    /// Per-base-symbol weighting multiplier applied to the smoothed
    /// market cap. Missing symbols default to 1.
    #[serde(default)]
    pub alt_weighting_factors: FxHashMap<String, f64>,

    /// Assets carrying any of these tags are excluded from the ranking.
    #[serde(default)]
    pub tags_to_ignore: Vec<String>,

    /// How many ranked assets make up the target allocation.
    #[serde(default = "default_top_ranking_count")]
    pub top_ranking_count: usize,

    /// EMA lookback over daily market-cap candidates, in periods.
    #[serde(default = "default_smoothing")]
    pub smoothing: usize,

    /// Dampening exponent: weights use `market_cap ^ (1 / nth_root)`.
    /// Values above 1 flatten the dominance of the largest assets.
    #[serde(default = "default_nth_root")]
    pub nth_root: f64,

    /// Diffs below this quote value are not worth an order.
    #[serde(default)]
    pub minimum_diff_quote: Decimal,

    /// Diffs below this percentage of the portfolio total are not worth
    /// an order (0–100).
    #[serde(default)]
    pub minimum_diff_allocation: Decimal,

    /// Minimum number of daily candidates an asset series must provide
    /// before the calculator produces any ranking at all.
    #[serde(default = "default_minimum_records")]
    pub minimum_records: usize,

    /// Scheduling data for the external trigger; the engine never reads
    /// these to decide when to run.
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u32,
    #[serde(default)]
    pub automation_enabled: bool,
    #[serde(default)]
    pub last_rebalance: Option<DateTime<Utc>>,
}

fn default_top_ranking_count() -> usize {
    10
}
fn default_smoothing() -> usize {
    14
}
fn default_nth_root() -> f64 {
    2.5
}
fn default_minimum_records() -> usize {
    1
}
fn default_interval_hours() -> u32 {
    24
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quote_takeout: Decimal::ZERO,
            quote_allocation: Decimal::ZERO,
            alt_weighting_factors: FxHashMap::default(),
            tags_to_ignore: Vec::new(),
            top_ranking_count: default_top_ranking_count(),
            smoothing: default_smoothing(),
            nth_root: default_nth_root(),
            minimum_diff_quote: Decimal::ZERO,
            minimum_diff_allocation: Decimal::ZERO,
            minimum_records: default_minimum_records(),
            interval_hours: default_interval_hours(),
            automation_enabled: false,
            last_rebalance: None,
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&contents)
    }

    /// Parse from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a JSON string (the shape user configuration is stored
    /// in externally).
    pub fn from_json(contents: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Weighting factor for a base symbol, defaulting to 1.
    pub fn weighting_factor(&self, base_symbol: &str) -> f64 {
        self.alt_weighting_factors
            .get(base_symbol)
            .copied()
            .unwrap_or(1.0)
    }

    /// Validate config invariants.
    pub fn validate(&self) -> Result<()> {
        if self.quote_takeout < Decimal::ZERO {
            return Err(Error::Config("quote_takeout must be >= 0".into()));
        }
        if self.quote_allocation < Decimal::ZERO || self.quote_allocation > Decimal::ONE_HUNDRED {
            return Err(Error::Config("quote_allocation must be in [0, 100]".into()));
        }
        if self.minimum_diff_allocation < Decimal::ZERO
            || self.minimum_diff_allocation > Decimal::ONE_HUNDRED
        {
            return Err(Error::Config(
                "minimum_diff_allocation must be in [0, 100]".into(),
            ));
        }
        if self.minimum_diff_quote < Decimal::ZERO {
            return Err(Error::Config("minimum_diff_quote must be >= 0".into()));
        }
        if self.top_ranking_count == 0 {
            return Err(Error::Config("top_ranking_count must be > 0".into()));
        }
        if self.smoothing == 0 {
            return Err(Error::Config("smoothing must be > 0".into()));
        }
        if !(self.nth_root >= 1.0) {
            return Err(Error::Config("nth_root must be >= 1.0".into()));
        }
        if self.minimum_records == 0 {
            return Err(Error::Config("minimum_records must be > 0".into()));
        }
        Ok(())
    }
}
