//! Target allocation: rank assets by dampened, smoothed market cap.

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::exchange::MarketStatus;
use crate::market::Market;
use crate::marketcap::MarketCapSample;
use crate::sampler::daily_candidates;
use crate::smoothing::smooth_latest;

/// An unnormalized target weight for one asset.
///
/// Weights are only comparable relative to the sum of all weights in the
/// same run; normalization happens in the engine, against the subset of
/// assets that turn out tradable. Ephemeral, produced fresh per run.
#[derive(Clone, Debug, PartialEq)]
pub struct AbsoluteAllocation {
    pub market: Market,
    pub weight: f64,
    pub status: MarketStatus,
}

/// Compute the ranked target allocation from raw per-asset snapshot
/// histories (each descending by time, as the repository returns them).
///
/// Per asset: reduce to daily candidates anchored at `now`, smooth the
/// market cap with an EMA over `config.smoothing` periods, then weight by
/// `factor * cap^(1/nth_root)`. Assets tagged with anything in
/// `config.tags_to_ignore` are dropped. The top `config.top_ranking_count`
/// survive, all with status [`MarketStatus::Unknown`] — the engine
/// resolves tradability later.
///
/// Returns [`Error::InsufficientData`] instead of a partial ranking when
/// no asset provides at least `config.minimum_records` daily candidates.
pub fn compute_target_allocation(
    config: &Config,
    histories: &[Vec<MarketCapSample>],
    now: DateTime<Utc>,
) -> Result<Vec<AbsoluteAllocation>> {
    let mut best_depth = 0usize;
    let mut ranked: Vec<AbsoluteAllocation> = Vec::new();

    for series in histories {
        let candidates = daily_candidates(series, now);
        best_depth = best_depth.max(candidates.len());
        if candidates.len() < config.minimum_records {
            continue;
        }

        let Some(smoothed) = smooth_latest(&candidates, config.smoothing) else {
            continue;
        };

        if smoothed
            .tags
            .iter()
            .any(|t| config.tags_to_ignore.iter().any(|ignore| ignore == t))
        {
            continue;
        }

        let factor = config.weighting_factor(smoothed.market.base_symbol());
        let weight = factor * smoothed.market_cap.powf(1.0 / config.nth_root);

        ranked.push(AbsoluteAllocation {
            market: smoothed.market,
            weight,
            status: MarketStatus::Unknown,
        });
    }

    if ranked.is_empty() {
        return Err(Error::InsufficientData {
            required: config.minimum_records,
            actual: best_depth,
        });
    }

    ranked.sort_by(|a, b| b.weight.total_cmp(&a.weight));
    ranked.truncate(config.top_ranking_count);
    Ok(ranked)
}
