//! In-memory portfolio model: per-asset allocations owned by a balance.
//!
//! `Balance` caches two derived values (`amount_quote_total` and
//! `amount_quote_available`) and recomputes them lazily. Invalidation is
//! explicit dependency tracking: every `Allocation` mutator raises a dirty
//! signal on the owning balance via a handle installed at attach time.
//! No persistence — this is bookkeeping for a single rebalance run.

use std::cell::Cell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::market::Market;

/// Dirty flags shared between a balance and its allocations.
#[derive(Debug, Default)]
struct BalanceSignals {
    total_dirty: AtomicBool,
    available_dirty: AtomicBool,
}

/// Attach-time handle through which an allocation notifies its owner.
#[derive(Debug)]
struct OwnerHandle {
    signals: Arc<BalanceSignals>,
    /// The allocation's base symbol equals the balance's quote symbol,
    /// so its changes also invalidate `amount_quote_available`.
    is_cash: bool,
}

/// A single asset position: price (quote per unit base), amount (base
/// units), and the derived quote value.
///
/// The invariant `amount_quote == price * amount` holds after any `price`
/// or `amount` write. Writing `amount_quote` directly overrides it: the
/// amount is recomputed as `amount_quote / price` (zero when the price is
/// zero) and the given quote value is pinned until the next price/amount
/// write.
#[derive(Debug)]
pub struct Allocation {
    market: Market,
    price: Decimal,
    amount: Decimal,
    amount_quote: Cell<Option<Decimal>>,
    owner: Option<OwnerHandle>,
}

impl Allocation {
    /// Create a standalone allocation, not yet owned by any balance.
    pub fn new(market: Market, price: Decimal, amount: Decimal) -> Self {
        Self {
            market,
            price,
            amount,
            amount_quote: Cell::new(None),
            owner: None,
        }
    }

    pub fn market(&self) -> &Market {
        &self.market
    }

    pub fn price(&self) -> Decimal {
        self.price
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    /// Quote value of this position, recomputed lazily after invalidation.
    pub fn amount_quote(&self) -> Decimal {
        match self.amount_quote.get() {
            Some(q) => q,
            None => {
                let q = self.price * self.amount;
                self.amount_quote.set(Some(q));
                q
            }
        }
    }

    /// Set the price. A no-op write (same value) is silent.
    pub fn set_price(&mut self, price: Decimal) {
        if price == self.price {
            return;
        }
        self.price = price;
        self.amount_quote.set(None);
        self.notify();
    }

    /// Set the amount in base units. A no-op write is silent.
    pub fn set_amount(&mut self, amount: Decimal) {
        if amount == self.amount {
            return;
        }
        self.amount = amount;
        self.amount_quote.set(None);
        self.notify();
    }

    /// Set the quote value directly (e.g. from an external quote-value
    /// report) and recompute the amount from it.
    pub fn set_amount_quote(&mut self, amount_quote: Decimal) {
        if amount_quote == self.amount_quote() {
            return;
        }
        self.amount = if self.price.is_zero() {
            Decimal::ZERO
        } else {
            amount_quote / self.price
        };
        self.amount_quote.set(Some(amount_quote));
        self.notify();
    }

    fn notify(&self) {
        if let Some(owner) = &self.owner {
            owner.signals.total_dirty.store(true, Ordering::Relaxed);
            if owner.is_cash {
                owner.signals.available_dirty.store(true, Ordering::Relaxed);
            }
        }
    }
}

/// A set of allocations, unique by market, sharing one quote currency.
#[derive(Debug)]
pub struct Balance {
    quote_symbol: String,
    allocations: Vec<Allocation>,
    signals: Arc<BalanceSignals>,
    total_cache: Cell<Option<Decimal>>,
    available_cache: Cell<Option<Decimal>>,
}

impl Balance {
    pub fn new(quote_symbol: &str) -> Self {
        Self {
            quote_symbol: quote_symbol.to_ascii_uppercase(),
            allocations: Vec::new(),
            signals: Arc::new(BalanceSignals::default()),
            total_cache: Cell::new(None),
            available_cache: Cell::new(None),
        }
    }

    pub fn quote_symbol(&self) -> &str {
        &self.quote_symbol
    }

    pub fn allocations(&self) -> &[Allocation] {
        &self.allocations
    }

    /// Attach an allocation to this balance.
    ///
    /// Fails with [`Error::AlreadyExists`] when an allocation for the same
    /// market is already present, and with [`Error::InvalidObject`] when
    /// the allocation's quote symbol does not match the balance's.
    pub fn add_allocation(&mut self, mut allocation: Allocation) -> Result<()> {
        if allocation.market.quote_symbol() != self.quote_symbol {
            return Err(Error::InvalidObject(format!(
                "allocation {} is quoted in {}, balance in {}",
                allocation.market,
                allocation.market.quote_symbol(),
                self.quote_symbol,
            )));
        }
        if self.allocations.iter().any(|a| a.market == allocation.market) {
            return Err(Error::AlreadyExists(allocation.market.clone()));
        }

        let is_cash = allocation.market.base_symbol() == self.quote_symbol;
        allocation.owner = Some(OwnerHandle {
            signals: Arc::clone(&self.signals),
            is_cash,
        });
        self.allocations.push(allocation);
        self.invalidate(is_cash);
        Ok(())
    }

    /// Detach and return the allocation for `base_symbol`, if present.
    pub fn remove_allocation(&mut self, base_symbol: &str) -> Option<Allocation> {
        let base = base_symbol.to_ascii_uppercase();
        let idx = self
            .allocations
            .iter()
            .position(|a| a.market.base_symbol() == base)?;
        let mut removed = self.allocations.remove(idx);
        let was_cash = removed
            .owner
            .as_ref()
            .is_some_and(|o| o.is_cash);
        removed.owner = None;
        self.invalidate(was_cash);
        Some(removed)
    }

    pub fn get_allocation(&self, base_symbol: &str) -> Option<&Allocation> {
        let base = base_symbol.to_ascii_uppercase();
        self.allocations
            .iter()
            .find(|a| a.market.base_symbol() == base)
    }

    pub fn get_allocation_mut(&mut self, base_symbol: &str) -> Option<&mut Allocation> {
        let base = base_symbol.to_ascii_uppercase();
        self.allocations
            .iter_mut()
            .find(|a| a.market.base_symbol() == base)
    }

    /// Sum of all allocations' quote values. Cached; invalidated by any
    /// child price/amount/amount-quote change or membership change.
    pub fn amount_quote_total(&self) -> Decimal {
        let dirty = self.signals.total_dirty.swap(false, Ordering::Relaxed);
        if !dirty {
            if let Some(total) = self.total_cache.get() {
                return total;
            }
        }
        let total = self
            .allocations
            .iter()
            .map(|a| a.amount_quote())
            .sum();
        self.total_cache.set(Some(total));
        total
    }

    /// Quote value of the cash position (the allocation whose base symbol
    /// equals this balance's quote symbol), or zero if absent. Cached;
    /// invalidated only by changes to that allocation or its add/remove.
    pub fn amount_quote_available(&self) -> Decimal {
        let dirty = self.signals.available_dirty.swap(false, Ordering::Relaxed);
        if !dirty {
            if let Some(available) = self.available_cache.get() {
                return available;
            }
        }
        let available = self
            .get_allocation(&self.quote_symbol)
            .map(|a| a.amount_quote())
            .unwrap_or(Decimal::ZERO);
        self.available_cache.set(Some(available));
        available
    }

    /// True when a mutation has invalidated the cached total since the
    /// last read. Lets downstream consumers skip full re-scans.
    pub fn total_changed(&self) -> bool {
        self.signals.total_dirty.load(Ordering::Relaxed)
    }

    /// Same as [`total_changed`](Self::total_changed) for the cash position.
    pub fn available_changed(&self) -> bool {
        self.signals.available_dirty.load(Ordering::Relaxed)
    }

    fn invalidate(&self, touches_cash: bool) {
        self.signals.total_dirty.store(true, Ordering::Relaxed);
        if touches_cash {
            self.signals.available_dirty.store(true, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn btc_eur() -> Market {
        Market::new("BTC", "EUR")
    }

    fn eur_balance() -> Balance {
        Balance::new("EUR")
    }

    #[test]
    fn add_then_get() {
        let mut balance = eur_balance();
        balance
            .add_allocation(Allocation::new(btc_eur(), dec!(20000), dec!(0.02)))
            .unwrap();

        let a = balance.get_allocation("BTC").unwrap();
        assert_eq!(a.market(), &btc_eur());
        assert_eq!(a.amount_quote(), dec!(400));
    }

    #[test]
    fn duplicate_market_rejected() {
        let mut balance = eur_balance();
        balance
            .add_allocation(Allocation::new(btc_eur(), dec!(20000), dec!(0.02)))
            .unwrap();

        let err = balance
            .add_allocation(Allocation::new(btc_eur(), dec!(21000), dec!(0.01)))
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists(m) if m == btc_eur()));
    }

    #[test]
    fn quote_mismatch_rejected() {
        let mut balance = eur_balance();
        let err = balance
            .add_allocation(Allocation::new(Market::new("BTC", "USD"), dec!(1), dec!(1)))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidObject(_)));
    }

    #[test]
    fn amount_quote_tracks_price_and_amount() {
        let mut a = Allocation::new(btc_eur(), dec!(100), dec!(2));
        assert_eq!(a.amount_quote(), dec!(200));

        a.set_price(dec!(150));
        assert_eq!(a.amount_quote(), dec!(300));

        a.set_amount(dec!(4));
        assert_eq!(a.amount_quote(), dec!(600));
    }

    #[test]
    fn set_amount_quote_recomputes_amount() {
        let mut a = Allocation::new(btc_eur(), dec!(100), dec!(2));
        a.set_amount_quote(dec!(500));
        assert_eq!(a.amount(), dec!(5));
        assert_eq!(a.amount_quote(), dec!(500));
    }

    #[test]
    fn set_amount_quote_with_zero_price() {
        let mut a = Allocation::new(btc_eur(), Decimal::ZERO, dec!(2));
        a.set_amount_quote(dec!(500));
        assert_eq!(a.amount(), Decimal::ZERO);
        // Pinned value survives until the next price/amount write.
        assert_eq!(a.amount_quote(), dec!(500));

        a.set_price(dec!(100));
        assert_eq!(a.amount_quote(), Decimal::ZERO);
    }

    #[test]
    fn total_and_available() {
        let mut balance = eur_balance();
        balance
            .add_allocation(Allocation::new(Market::new("EUR", "EUR"), dec!(1), dec!(50)))
            .unwrap();
        balance
            .add_allocation(Allocation::new(btc_eur(), dec!(20000), dec!(0.02)))
            .unwrap();

        assert_eq!(balance.amount_quote_total(), dec!(450));
        assert_eq!(balance.amount_quote_available(), dec!(50));
    }

    #[test]
    fn available_zero_without_cash_position() {
        let mut balance = eur_balance();
        balance
            .add_allocation(Allocation::new(btc_eur(), dec!(20000), dec!(0.02)))
            .unwrap();
        assert_eq!(balance.amount_quote_available(), Decimal::ZERO);
    }

    #[test]
    fn child_mutation_invalidates_total() {
        let mut balance = eur_balance();
        balance
            .add_allocation(Allocation::new(btc_eur(), dec!(100), dec!(1)))
            .unwrap();
        assert_eq!(balance.amount_quote_total(), dec!(100));
        assert!(!balance.total_changed());

        balance.get_allocation_mut("BTC").unwrap().set_price(dec!(200));
        assert!(balance.total_changed());
        assert_eq!(balance.amount_quote_total(), dec!(200));
        assert!(!balance.total_changed());
    }

    #[test]
    fn noop_write_is_silent() {
        let mut balance = eur_balance();
        balance
            .add_allocation(Allocation::new(btc_eur(), dec!(100), dec!(1)))
            .unwrap();
        let _ = balance.amount_quote_total();

        balance.get_allocation_mut("BTC").unwrap().set_price(dec!(100));
        assert!(!balance.total_changed());
    }

    #[test]
    fn only_cash_invalidates_available() {
        let mut balance = eur_balance();
        balance
            .add_allocation(Allocation::new(Market::new("EUR", "EUR"), dec!(1), dec!(50)))
            .unwrap();
        balance
            .add_allocation(Allocation::new(btc_eur(), dec!(100), dec!(1)))
            .unwrap();
        let _ = balance.amount_quote_available();

        balance.get_allocation_mut("BTC").unwrap().set_price(dec!(200));
        assert!(!balance.available_changed());

        balance.get_allocation_mut("EUR").unwrap().set_amount(dec!(75));
        assert!(balance.available_changed());
        assert_eq!(balance.amount_quote_available(), dec!(75));
    }

    #[test]
    fn remove_detaches_and_invalidates() {
        let mut balance = eur_balance();
        balance
            .add_allocation(Allocation::new(btc_eur(), dec!(100), dec!(1)))
            .unwrap();
        let _ = balance.amount_quote_total();

        let removed = balance.remove_allocation("BTC").unwrap();
        assert_eq!(removed.amount_quote(), dec!(100));
        assert!(balance.total_changed());
        assert_eq!(balance.amount_quote_total(), Decimal::ZERO);
        assert!(balance.remove_allocation("BTC").is_none());
    }
}
