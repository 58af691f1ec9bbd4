//! Daily-candidate selection over irregularly timed market-cap snapshots.
//!
//! Collection jitter means snapshots are never exactly 24h apart. This
//! module reduces a descending-by-time series to at most one sample per
//! ~24h slot, preferring the sample nearest the exact 24h mark and
//! degrading to the closest one inside a broad window when no tight match
//! exists. The scan is greedy and single-pass: a sample emitted for an
//! earlier slot is never revisited.

use chrono::{DateTime, Utc};

use crate::marketcap::MarketCapSample;

/// How much earlier than the ideal 24h mark a sample may be and still
/// count as a tight match.
pub const EARLY_TOLERANCE_MIN: i64 = 6;
/// How much later than the ideal 24h mark a sample may be.
pub const LATE_TOLERANCE_MIN: i64 = 9;

const DAY_MIN: i64 = 1440;

// The repository-side "within N days" lookback filter folds these
// tolerances in as EARLY_TOLERANCE_MIN / 1440 extra days — integer
// division that is always 0 at minute scale, so that filter spans exactly
// one day per period. Possibly a latent bug in the reference system;
// preserved rather than fixed.

/// Select one representative sample per ~24h slot.
///
/// `samples` must be ordered strictly descending by `updated`. The first
/// slot is anchored at `now`; each accepted sample re-anchors the next
/// slot at its own timestamp. Selection ends at the first gap too large
/// to bridge (asset no longer observed), so the output is newest-first
/// and not necessarily contiguous with the input's full span.
pub fn daily_candidates(samples: &[MarketCapSample], now: DateTime<Utc>) -> Vec<MarketCapSample> {
    // Offsets are negative: samples move backward in time from the anchor.
    let broad_floor = -(DAY_MIN + LATE_TOLERANCE_MIN + EARLY_TOLERANCE_MIN);
    let tight_ceiling = -(DAY_MIN - EARLY_TOLERANCE_MIN - LATE_TOLERANCE_MIN);

    let mut out = Vec::new();
    let mut prev_anchor = now;
    let mut anchored = false;
    let mut tentative: Option<usize> = None;

    let mut i = 0;
    while i < samples.len() {
        let offset = (samples[i].updated - prev_anchor).num_minutes();

        if offset >= broad_floor {
            // Inside the broad window: this is the tentative pick for the
            // current slot until something closer to the 24h mark shows up.
            tentative = Some(i);
            if offset <= tight_ceiling || !anchored {
                out.push(samples[i].clone());
                prev_anchor = samples[i].updated;
                anchored = true;
                tentative = None;
            }
            i += 1;
        } else {
            match tentative.take() {
                // The slot's window closed without a tight match: settle
                // for the last broad candidate and re-evaluate the current
                // sample against the new anchor (it may start a new slot).
                Some(pick) => {
                    out.push(samples[pick].clone());
                    prev_anchor = samples[pick].updated;
                }
                // Unbridgeable gap: the asset stopped being observed for
                // over a day. No further slots.
                None => break,
            }
        }
    }

    // Input exhausted with a slot still open: its best broad candidate wins.
    if let Some(pick) = tentative {
        out.push(samples[pick].clone());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::market::Market;

    fn sample(updated: DateTime<Utc>, cap: f64) -> MarketCapSample {
        MarketCapSample {
            market: Market::new("BTC", "EUR"),
            price: 20_000.0,
            market_cap: cap,
            tags: vec![],
            updated,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    /// Descending series: one sample every `spacing` minutes back from `now`.
    fn regular_series(count: usize, spacing: i64) -> Vec<MarketCapSample> {
        (0..count)
            .map(|i| sample(now() - Duration::minutes(spacing * i as i64), 1000.0 + i as f64))
            .collect()
    }

    #[test]
    fn regular_series_passes_through_unchanged() {
        let input = regular_series(7, 1440);
        let picked = daily_candidates(&input, now());
        assert_eq!(picked, input);
    }

    #[test]
    fn small_jitter_still_selected() {
        let mut input = regular_series(4, 1440);
        // Shift one sample 5 minutes late; still within tolerance.
        input[2].updated += Duration::minutes(5);
        let picked = daily_candidates(&input, now());
        assert_eq!(picked.len(), 4);
        assert_eq!(picked[2], input[2]);
        // The shifted sample re-anchors slot 3 at its own timestamp.
        assert_eq!(picked[3], input[3]);
    }

    #[test]
    fn large_gap_terminates_series() {
        let first = sample(now(), 1000.0);
        let second = sample(now() - Duration::minutes(2000), 999.0);
        let third = sample(now() - Duration::minutes(3440), 998.0);

        let picked = daily_candidates(&[first.clone(), second, third], now());
        assert_eq!(picked, vec![first]);
    }

    #[test]
    fn broad_candidate_wins_without_tight_match() {
        // Slot sample sits 23h (1380m) before the anchor — broad but not
        // tight. The next sample is out of the window, so the broad pick
        // wins and re-anchors.
        let s0 = sample(now(), 1000.0);
        let s1 = sample(now() - Duration::minutes(1380), 999.0);
        let s2 = sample(now() - Duration::minutes(1380 + 1440), 998.0);

        let picked = daily_candidates(&[s0.clone(), s1.clone(), s2.clone()], now());
        assert_eq!(picked, vec![s0, s1, s2]);
    }

    #[test]
    fn prefers_sample_nearest_the_24h_mark() {
        // Two candidates inside one slot: 23h10m and 24h00m back. The
        // tight match at 24h wins; the earlier broad one is skipped.
        let s0 = sample(now(), 1000.0);
        let near = sample(now() - Duration::minutes(1390), 999.0);
        let tight = sample(now() - Duration::minutes(1440), 998.0);

        let picked = daily_candidates(&[s0.clone(), near, tight.clone()], now());
        assert_eq!(picked, vec![s0, tight]);
    }

    #[test]
    fn trailing_broad_candidate_is_emitted() {
        let s0 = sample(now(), 1000.0);
        let s1 = sample(now() - Duration::minutes(1380), 999.0);

        let picked = daily_candidates(&[s0.clone(), s1.clone()], now());
        assert_eq!(picked, vec![s0, s1]);
    }

    #[test]
    fn empty_input() {
        assert!(daily_candidates(&[], now()).is_empty());
    }

    #[test]
    fn stale_first_sample_yields_nothing() {
        let old = sample(now() - Duration::minutes(3000), 1.0);
        assert!(daily_candidates(&[old], now()).is_empty());
    }
}
