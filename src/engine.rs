//! Rebalance engine: diff the current balance against target weights,
//! then sell before buying.
//!
//! Orders within a phase are submitted concurrently and each submission
//! is chained to its own completion verification; the buy phase starts
//! only after every sell-phase worker has finished. The engine never
//! mutates the balance snapshot it is given and never rolls back a
//! partially executed run — it returns whatever orders it did execute.

use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use rustc_hash::FxHashMap;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::exchange::{Exchange, MarketStatus};
use crate::market::Market;
use crate::order::{Order, OrderRequest, OrderSide};
use crate::portfolio::Balance;
use crate::target::AbsoluteAllocation;
use crate::verify::{self, Clock, verify_order};

/// Tag sent with every order and cancel this engine issues.
const ORDER_SOURCE: &str = "rebalance";

/// Quote-currency deviation of one asset from its target.
///
/// Positive `amount_quote_diff` means the position is oversized (sell
/// candidate); negative means undersized (buy candidate). Ephemeral.
#[derive(Clone, Debug, PartialEq)]
pub struct AllocationDiff {
    pub market: Market,
    /// Current price, zero for targets with no current position.
    pub price: Decimal,
    /// Current amount in base units.
    pub amount: Decimal,
    pub amount_quote_diff: Decimal,
}

impl AllocationDiff {
    /// Current quote value of the position this diff was computed from.
    pub fn current_amount_quote(&self) -> Decimal {
        self.price * self.amount
    }
}

/// Converts target weights plus a balance snapshot into executed orders.
pub struct RebalanceEngine<'a, E: Exchange> {
    exchange: &'a E,
    clock: &'a dyn Clock,
    poll_budget: u32,
    poll_interval: Duration,
}

impl<'a, E: Exchange> RebalanceEngine<'a, E> {
    pub fn new(exchange: &'a E, clock: &'a dyn Clock) -> Self {
        Self {
            exchange,
            clock,
            poll_budget: verify::POLL_BUDGET,
            poll_interval: verify::POLL_INTERVAL,
        }
    }

    /// Override the verification poll budget and interval (tests).
    pub fn with_polling(mut self, budget: u32, interval: Duration) -> Self {
        self.poll_budget = budget;
        self.poll_interval = interval;
        self
    }

    /// Full rebalance: cancel open orders, diff against `targets`, sell
    /// oversized positions, then buy undersized ones with the freed
    /// liquidity. The balance is fetched from the exchange when not
    /// supplied. Returns sell results followed by buy results.
    pub fn rebalance(
        &self,
        config: &Config,
        targets: &[AbsoluteAllocation],
        balance: Option<Balance>,
    ) -> Result<Vec<Order>> {
        // A failed cancel-all aborts: open orders mean the position state
        // cannot be trusted.
        self.exchange.cancel_all_open_orders(None)?;

        let balance = match balance {
            Some(b) => b,
            None => self.exchange.get_balance()?,
        };

        let diffs = self.compute_diffs(config, targets, &balance)?;
        for d in &diffs {
            debug!("diff {}: {}", d.market, d.amount_quote_diff);
        }

        let total = balance.amount_quote_total();
        let sells = self.build_sell_orders(config, total, &diffs)?;
        info!("sell phase: {} orders", sells.len());
        let sell_results = self.run_phase(&sells, true)?;

        let freed: Decimal = sell_results.iter().map(|o| o.amount_quote_filled).sum();
        let available = balance.amount_quote_available() + freed;
        let buys = self.build_buy_orders(config, total, available, &diffs);
        info!("buy phase: {} orders", buys.len());
        let buy_results = self.run_phase(&buys, false)?;

        let mut results = sell_results;
        results.extend(buy_results);
        Ok(results)
    }

    /// Execute a pre-built order list (simulate-then-confirm workflows):
    /// cancel open orders, run the sell-side requests as the sell phase,
    /// then the buy-side requests as the buy phase.
    pub fn execute_orders(&self, requests: &[OrderRequest]) -> Result<Vec<Order>> {
        self.exchange.cancel_all_open_orders(None)?;

        let sells: Vec<OrderRequest> = requests
            .iter()
            .filter(|r| r.side == OrderSide::Sell)
            .cloned()
            .collect();
        let buys: Vec<OrderRequest> = requests
            .iter()
            .filter(|r| r.side == OrderSide::Buy)
            .cloned()
            .collect();

        let mut results = self.run_phase(&sells, true)?;
        results.extend(self.run_phase(&buys, false)?);
        Ok(results)
    }

    /// Compute per-asset quote-currency deviations without executing.
    ///
    /// Resolves unknown market statuses against the exchange and counts
    /// only known-status assets toward `config.top_ranking_count`.
    /// Targets that are not `Trading` are treated as absent; targets with
    /// no current position get a synthesized zero-current diff.
    pub fn compute_diffs(
        &self,
        config: &Config,
        targets: &[AbsoluteAllocation],
        balance: &Balance,
    ) -> Result<Vec<AllocationDiff>> {
        let included = self.resolve_targets(config, targets)?;

        let total = balance.amount_quote_total();
        let reserve = reserve_ratio(config, total);
        let divisor = (Decimal::ONE - reserve).to_f64().unwrap_or(0.0);

        let tradable_weight: f64 = included
            .iter()
            .filter(|t| t.status == MarketStatus::Trading)
            .map(|t| t.weight)
            .sum();
        // The reserve scales the weight total up, shrinking every relative
        // allocation by (1 - reserve). A zero divisor reserves everything.
        let scaled_total = if divisor > 0.0 {
            tradable_weight / divisor
        } else {
            0.0
        };

        let target_by_base: FxHashMap<&str, f64> = included
            .iter()
            .filter(|t| t.status == MarketStatus::Trading)
            .map(|t| (t.market.base_symbol(), t.weight))
            .collect();

        let target_quote = |weight: f64| -> Decimal {
            let relative = if scaled_total > 0.0 {
                weight / scaled_total
            } else {
                0.0
            };
            Decimal::from_f64_retain(relative).unwrap_or(Decimal::ZERO) * total
        };

        let mut diffs = Vec::new();
        for a in balance.allocations() {
            let weight = target_by_base
                .get(a.market().base_symbol())
                .copied()
                .unwrap_or(0.0);
            diffs.push(AllocationDiff {
                market: a.market().clone(),
                price: a.price(),
                amount: a.amount(),
                amount_quote_diff: a.amount_quote() - target_quote(weight),
            });
        }
        for t in &included {
            if t.status != MarketStatus::Trading {
                continue;
            }
            if balance.get_allocation(t.market.base_symbol()).is_some() {
                continue;
            }
            diffs.push(AllocationDiff {
                market: t.market.clone(),
                price: Decimal::ZERO,
                amount: Decimal::ZERO,
                amount_quote_diff: -target_quote(t.weight),
            });
        }
        Ok(diffs)
    }

    /// Resolve unknown statuses and fill the ranking quota with assets
    /// whose status is known, scanning until the quota is met or the
    /// list is exhausted.
    fn resolve_targets(
        &self,
        config: &Config,
        targets: &[AbsoluteAllocation],
    ) -> Result<Vec<AbsoluteAllocation>> {
        let mut included = Vec::new();
        let mut known = 0usize;

        for target in targets {
            if known >= config.top_ranking_count {
                break;
            }
            let mut target = target.clone();
            if target.status == MarketStatus::Unknown {
                target.status = match self.exchange.get_market(&target.market)? {
                    Some(data) => data.status,
                    None => MarketStatus::Unavailable,
                };
            }
            if target.status != MarketStatus::Unknown {
                known += 1;
                included.push(target);
            }
        }
        Ok(included)
    }

    /// Step 5: one sell order per oversized non-cash position.
    fn build_sell_orders(
        &self,
        config: &Config,
        total: Decimal,
        diffs: &[AllocationDiff],
    ) -> Result<Vec<OrderRequest>> {
        let min_quote = self.exchange.min_order_size_in_quote();
        let taker_fee = self.exchange.taker_fee();
        let mut sells = Vec::new();

        for diff in diffs {
            if diff.amount_quote_diff <= Decimal::ZERO || diff.market.is_quote_currency() {
                continue;
            }
            if !meets_minimum_diff(config, total, diff.amount_quote_diff) {
                continue;
            }

            let remainder = diff.current_amount_quote() - diff.amount_quote_diff;
            let mut request = if remainder < min_quote {
                // Selling the diff would leave dust below the minimum
                // order size: liquidate the entire position instead,
                // floored to the asset's declared precision.
                let decimals = self
                    .exchange
                    .get_asset(diff.market.base_symbol())?
                    .map(|a| a.decimals)
                    .unwrap_or(8);
                let amount = diff.amount.trunc_with_scale(decimals);
                OrderRequest::market_in_base(diff.market.clone(), OrderSide::Sell, amount)
            } else {
                OrderRequest::market_in_quote(
                    diff.market.clone(),
                    OrderSide::Sell,
                    diff.amount_quote_diff,
                )
            };

            let notional = request
                .amount_quote
                .unwrap_or_else(|| request.amount.unwrap_or(Decimal::ZERO) * diff.price);
            request.fee_expected = notional * taker_fee;

            let qualifies = match (request.amount_quote, request.amount) {
                (Some(quote), _) if quote >= min_quote => true,
                (_, Some(amount)) if amount > Decimal::ZERO => true,
                _ => false,
            };
            if qualifies {
                sells.push(request);
            } else {
                debug!("dropping sell below minimum for {}", diff.market);
            }
        }
        Ok(sells)
    }

    /// Step 6: buy orders for undersized positions, scaled to available
    /// quote liquidity so the phase never overspends.
    fn build_buy_orders(
        &self,
        config: &Config,
        total: Decimal,
        available: Decimal,
        diffs: &[AllocationDiff],
    ) -> Vec<OrderRequest> {
        let min_quote = self.exchange.min_order_size_in_quote();
        let taker_fee = self.exchange.taker_fee();

        let demands: Vec<(&AllocationDiff, Decimal)> = diffs
            .iter()
            .filter(|d| d.amount_quote_diff < Decimal::ZERO && !d.market.is_quote_currency())
            .map(|d| (d, -d.amount_quote_diff))
            .filter(|(_, quote)| {
                *quote >= min_quote && meets_minimum_diff(config, total, *quote)
            })
            .collect();

        let total_demand: Decimal = demands.iter().map(|(_, quote)| *quote).sum();
        if total_demand.is_zero() {
            return Vec::new();
        }
        let ratio = total_demand.min(available.max(Decimal::ZERO)) / total_demand;

        let mut buys = Vec::new();
        for (diff, quote) in demands {
            let scaled = quote * ratio;
            if scaled < min_quote {
                debug!("dropping scaled buy below minimum for {}", diff.market);
                continue;
            }
            let mut request =
                OrderRequest::market_in_quote(diff.market.clone(), OrderSide::Buy, scaled);
            request.fee_expected = scaled * taker_fee;
            buys.push(request);
        }
        buys
    }

    /// Submit every request concurrently, each chained to its own
    /// completion verification, and join before returning.
    ///
    /// Authentication failures abort the run; any other per-order failure
    /// is logged and skipped — partial completion is an accepted outcome.
    fn run_phase(&self, requests: &[OrderRequest], cancel_on_timeout: bool) -> Result<Vec<Order>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let outcomes: Vec<Result<Order>> = thread::scope(|scope| {
            let handles: Vec<_> = requests
                .iter()
                .map(|request| {
                    scope.spawn(move || -> Result<Order> {
                        let submitted = self.exchange.new_order(request, ORDER_SOURCE)?;
                        info!(
                            "submitted {} {} (id={})",
                            submitted.side, submitted.market, submitted.id
                        );
                        Ok(verify_order(
                            self.exchange,
                            self.clock,
                            submitted,
                            self.poll_budget,
                            self.poll_interval,
                            cancel_on_timeout,
                            ORDER_SOURCE,
                        ))
                    })
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(Error::Exchange("order worker panicked".into())))
                })
                .collect()
        });

        let mut orders = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(order) => orders.push(order),
                Err(Error::Authentication(msg)) => return Err(Error::Authentication(msg)),
                Err(e) => warn!("order failed: {e}"),
            }
        }
        Ok(orders)
    }
}

/// Fraction of the portfolio reserved as quote currency:
/// `clamp(0, 1, quote_takeout / total + quote_allocation / 100)`.
fn reserve_ratio(config: &Config, total: Decimal) -> Decimal {
    let takeout_share = if total > Decimal::ZERO {
        config.quote_takeout / total
    } else if config.quote_takeout.is_zero() {
        Decimal::ZERO
    } else {
        Decimal::ONE
    };
    (takeout_share + config.quote_allocation / Decimal::ONE_HUNDRED)
        .clamp(Decimal::ZERO, Decimal::ONE)
}

fn meets_minimum_diff(config: &Config, total: Decimal, diff_abs: Decimal) -> bool {
    diff_abs >= config.minimum_diff_quote
        && diff_abs >= total * config.minimum_diff_allocation / Decimal::ONE_HUNDRED
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn reserve_combines_takeout_and_allocation() {
        let config = Config {
            quote_takeout: dec!(100),
            quote_allocation: dec!(5),
            ..Config::default()
        };
        // 100/1000 + 5% = 15%
        assert_eq!(reserve_ratio(&config, dec!(1000)), dec!(0.15));
    }

    #[test]
    fn reserve_clamps_to_one() {
        let config = Config {
            quote_takeout: dec!(5000),
            quote_allocation: dec!(50),
            ..Config::default()
        };
        assert_eq!(reserve_ratio(&config, dec!(1000)), Decimal::ONE);
    }

    #[test]
    fn reserve_with_empty_portfolio() {
        let config = Config {
            quote_takeout: dec!(10),
            ..Config::default()
        };
        assert_eq!(reserve_ratio(&config, Decimal::ZERO), Decimal::ONE);
        assert_eq!(reserve_ratio(&Config::default(), Decimal::ZERO), Decimal::ZERO);
    }

    #[test]
    fn minimum_diff_filters() {
        let config = Config {
            minimum_diff_quote: dec!(10),
            minimum_diff_allocation: dec!(2),
            ..Config::default()
        };
        // Needs >= 10 quote and >= 2% of 1000 = 20.
        assert!(!meets_minimum_diff(&config, dec!(1000), dec!(15)));
        assert!(meets_minimum_diff(&config, dec!(1000), dec!(25)));
        assert!(!meets_minimum_diff(&config, dec!(1000), dec!(5)));
    }
}
