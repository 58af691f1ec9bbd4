//! EMA smoothing of daily market-cap series.

use crate::marketcap::MarketCapSample;

/// Exponential moving average over `values` (oldest first) with the
/// standard `alpha = 2 / (n + 1)` convention, seeded with the simple
/// average of the first `n` values.
///
/// The effective lookback is clamped to `min(lookback, values.len())` and
/// is always at least 1, so a lookback longer than the series never fails
/// and simply averages over everything available. An empty series smooths
/// to `0.0`.
pub fn ema(values: &[f64], lookback: usize) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = lookback.min(values.len()).max(1);

    let mut current = values[..n].iter().sum::<f64>() / n as f64;
    let alpha = 2.0 / (n as f64 + 1.0);
    for v in &values[n..] {
        current = (v - current) * alpha + current;
    }
    current
}

/// Smooth a daily-candidate series (newest first, as produced by the
/// sampler) and return the most recent sample with its `market_cap`
/// replaced by the EMA value. All other fields pass through unchanged.
/// Returns `None` for an empty series.
pub fn smooth_latest(series_desc: &[MarketCapSample], lookback: usize) -> Option<MarketCapSample> {
    let newest = series_desc.first()?;
    let caps: Vec<f64> = series_desc.iter().rev().map(|s| s.market_cap).collect();
    let mut smoothed = newest.clone();
    smoothed.market_cap = ema(&caps, lookback);
    Some(smoothed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    use crate::market::Market;

    #[test]
    fn empty_series_is_zero() {
        assert_eq!(ema(&[], 14), 0.0);
    }

    #[test]
    fn single_value_is_itself() {
        assert_eq!(ema(&[42.0], 14), 42.0);
    }

    #[test]
    fn lookback_longer_than_series_averages_everything() {
        // Effective lookback clamps to 3: seed = SMA of all values.
        assert_eq!(ema(&[1.0, 2.0, 3.0], 10), 2.0);
    }

    #[test]
    fn zero_lookback_clamps_to_one() {
        // n = 1: plain EMA with alpha = 1 tracks the last value.
        assert_eq!(ema(&[5.0, 7.0, 9.0], 0), 9.0);
    }

    #[test]
    fn weights_recent_values_more() {
        let flat_then_jump = [100.0, 100.0, 100.0, 100.0, 200.0];
        let smoothed = ema(&flat_then_jump, 3);
        assert!(smoothed > 100.0 && smoothed < 200.0);
        // alpha = 0.5: seed 100, then 100, then (200-100)*0.5+100 = 150.
        assert!((smoothed - 150.0).abs() < 1e-9);
    }

    #[test]
    fn smooth_latest_replaces_only_market_cap() {
        let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let series: Vec<MarketCapSample> = (0..3)
            .map(|i| MarketCapSample {
                market: Market::new("ETH", "EUR"),
                price: 3000.0,
                market_cap: 100.0 * (3 - i) as f64, // newest = 300
                tags: vec!["pow".into()],
                updated: t0 - Duration::days(i),
            })
            .collect();

        let smoothed = smooth_latest(&series, 3).unwrap();
        assert_eq!(smoothed.market, series[0].market);
        assert_eq!(smoothed.updated, series[0].updated);
        assert_eq!(smoothed.tags, series[0].tags);
        assert_eq!(smoothed.market_cap, 200.0); // SMA of 100, 200, 300
    }

    #[test]
    fn smooth_latest_empty_is_none() {
        assert!(smooth_latest(&[], 14).is_none());
    }
}
