//! Mock exchange for testing — implements [`Exchange`] with configurable
//! fills, recorded submissions, and failure injection.
//!
//! ```ignore
//! use capfolio::mock::{FillMode, MockExchange};
//! use rust_decimal_macros::dec;
//!
//! let exchange = MockExchange::builder("EUR")
//!     .fill_mode(FillMode::FillFull)
//!     .with_cash(dec!(50))
//!     .with_allocation("BTC", dec!(20000), dec!(0.02))
//!     .build();
//! ```

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use rustc_hash::FxHashMap;

use crate::exchange::{
    AssetData, Exchange, ExchangeError, ExchangeResult, MarketData, MarketStatus,
};
use crate::market::Market;
use crate::order::{Order, OrderRequest, OrderStatus};
use crate::portfolio::{Allocation, Balance};

/// How the mock handles submitted orders.
#[derive(Clone, Debug)]
pub enum FillMode {
    /// Orders fill fully and immediately.
    FillFull,
    /// Orders fill the given fraction and report `PartiallyFilled`.
    FillPartial(f64),
    /// Orders rest with status `New` until cancelled.
    StayOpen,
    /// All submissions are rejected.
    Reject,
}

/// A recorded cancellation, for assertions.
#[derive(Clone, Debug)]
pub struct RecordedCancel {
    pub id: String,
    pub market: Market,
    pub source: String,
}

/// Builder for [`MockExchange`].
pub struct MockExchangeBuilder {
    quote_symbol: String,
    min_order_in_quote: Decimal,
    maker_fee: Decimal,
    taker_fee: Decimal,
    fill_mode: FillMode,
    holdings: Vec<(Market, Decimal, Decimal)>,
    markets: FxHashMap<Market, MarketData>,
    assets: FxHashMap<String, AssetData>,
    fail_cancel_all: bool,
    fail_authentication: bool,
}

impl MockExchangeBuilder {
    pub fn fill_mode(mut self, mode: FillMode) -> Self {
        self.fill_mode = mode;
        self
    }

    /// Quote-currency cash position.
    pub fn with_cash(mut self, amount: Decimal) -> Self {
        let cash = Market::new(&self.quote_symbol, &self.quote_symbol);
        self.holdings.push((cash, Decimal::ONE, amount));
        self
    }

    /// Asset position: `amount` base units at `price`.
    pub fn with_allocation(mut self, base: &str, price: Decimal, amount: Decimal) -> Self {
        let market = Market::new(base, &self.quote_symbol);
        self.holdings.push((market, price, amount));
        self
    }

    /// Register a tradable market with default metadata.
    pub fn with_trading_market(self, base: &str) -> Self {
        self.with_market(base, MarketStatus::Trading)
    }

    pub fn with_market(mut self, base: &str, status: MarketStatus) -> Self {
        let market = Market::new(base, &self.quote_symbol);
        self.markets.insert(
            market,
            MarketData {
                status,
                price_decimals: 2,
                min_order_in_quote: self.min_order_in_quote,
            },
        );
        self.assets
            .entry(base.to_ascii_uppercase())
            .or_insert(AssetData { decimals: 8 });
        self
    }

    pub fn with_asset(mut self, base: &str, decimals: u32) -> Self {
        self.assets
            .insert(base.to_ascii_uppercase(), AssetData { decimals });
        self
    }

    pub fn min_order_size(mut self, min: Decimal) -> Self {
        self.min_order_in_quote = min;
        self
    }

    /// Make `cancel_all_open_orders` fail, aborting any run that starts
    /// with it.
    pub fn fail_cancel_all(mut self) -> Self {
        self.fail_cancel_all = true;
        self
    }

    /// Make every call fail with an authentication error.
    pub fn fail_authentication(mut self) -> Self {
        self.fail_authentication = true;
        self
    }

    pub fn build(self) -> MockExchange {
        MockExchange {
            quote_symbol: self.quote_symbol,
            min_order_in_quote: self.min_order_in_quote,
            maker_fee: self.maker_fee,
            taker_fee: self.taker_fee,
            fill_mode: self.fill_mode,
            holdings: self.holdings,
            markets: self.markets,
            assets: self.assets,
            fail_cancel_all: self.fail_cancel_all,
            fail_authentication: self.fail_authentication,
            next_order_id: AtomicU64::new(1),
            orders: Mutex::new(FxHashMap::default()),
            submitted: Mutex::new(Vec::new()),
            cancelled: Mutex::new(Vec::new()),
        }
    }
}

/// A mock exchange that records submissions and returns configurable
/// responses.
pub struct MockExchange {
    quote_symbol: String,
    min_order_in_quote: Decimal,
    maker_fee: Decimal,
    taker_fee: Decimal,
    fill_mode: FillMode,
    holdings: Vec<(Market, Decimal, Decimal)>,
    markets: FxHashMap<Market, MarketData>,
    assets: FxHashMap<String, AssetData>,
    fail_cancel_all: bool,
    fail_authentication: bool,
    next_order_id: AtomicU64,
    orders: Mutex<FxHashMap<String, Order>>,
    submitted: Mutex<Vec<OrderRequest>>,
    cancelled: Mutex<Vec<RecordedCancel>>,
}

impl MockExchange {
    pub fn builder(quote_symbol: &str) -> MockExchangeBuilder {
        MockExchangeBuilder {
            quote_symbol: quote_symbol.to_ascii_uppercase(),
            min_order_in_quote: dec!(5),
            maker_fee: dec!(0.0015),
            taker_fee: dec!(0.0025),
            fill_mode: FillMode::FillFull,
            holdings: Vec::new(),
            markets: FxHashMap::default(),
            assets: FxHashMap::default(),
            fail_cancel_all: false,
            fail_authentication: false,
        }
    }

    /// All order requests submitted so far.
    pub fn submitted_orders(&self) -> Vec<OrderRequest> {
        self.submitted.lock().unwrap().clone()
    }

    /// All cancellations requested so far.
    pub fn cancelled_orders(&self) -> Vec<RecordedCancel> {
        self.cancelled.lock().unwrap().clone()
    }

    fn check_auth(&self) -> ExchangeResult<()> {
        if self.fail_authentication {
            return Err(ExchangeError::Authentication(
                "mock: invalid credentials".into(),
            ));
        }
        Ok(())
    }

    /// Price of a market according to the mock's holdings.
    fn price_of(&self, market: &Market) -> Decimal {
        self.holdings
            .iter()
            .find(|(m, _, _)| m == market)
            .map(|(_, price, _)| *price)
            .unwrap_or(Decimal::ZERO)
    }

    fn fill(&self, request: &OrderRequest, id: String) -> Order {
        let price = self.price_of(&request.market);
        let full_quote = request
            .amount_quote
            .or_else(|| request.amount.map(|a| a * price))
            .unwrap_or(Decimal::ZERO);
        let full_base = request.amount.or_else(|| {
            if price.is_zero() {
                None
            } else {
                request.amount_quote.map(|q| q / price)
            }
        });

        let (status, fraction) = match self.fill_mode {
            FillMode::FillFull => (OrderStatus::Filled, Decimal::ONE),
            FillMode::FillPartial(f) => (
                OrderStatus::PartiallyFilled,
                Decimal::from_f64_retain(f).unwrap_or(Decimal::ZERO),
            ),
            FillMode::StayOpen => (OrderStatus::New, Decimal::ZERO),
            FillMode::Reject => (OrderStatus::Rejected, Decimal::ZERO),
        };

        let amount_quote_filled = full_quote * fraction;
        Order {
            id,
            market: request.market.clone(),
            side: request.side,
            order_type: request.order_type,
            status,
            price: request.price,
            amount: request.amount,
            amount_quote: request.amount_quote,
            time_in_force: request.time_in_force,
            amount_filled: full_base.unwrap_or(Decimal::ZERO) * fraction,
            amount_quote_filled,
            fee_expected: request.fee_expected,
            fee_paid: amount_quote_filled * self.taker_fee,
        }
    }
}

impl Exchange for MockExchange {
    fn quote_symbol(&self) -> &str {
        &self.quote_symbol
    }

    fn min_order_size_in_quote(&self) -> Decimal {
        self.min_order_in_quote
    }

    fn maker_fee(&self) -> Decimal {
        self.maker_fee
    }

    fn taker_fee(&self) -> Decimal {
        self.taker_fee
    }

    fn get_balance(&self) -> ExchangeResult<Balance> {
        self.check_auth()?;
        let mut balance = Balance::new(&self.quote_symbol);
        for (market, price, amount) in &self.holdings {
            balance
                .add_allocation(Allocation::new(market.clone(), *price, *amount))
                .map_err(|e| ExchangeError::Api(e.to_string()))?;
        }
        Ok(balance)
    }

    fn get_market(&self, market: &Market) -> ExchangeResult<Option<MarketData>> {
        self.check_auth()?;
        Ok(self.markets.get(market).cloned())
    }

    fn get_asset(&self, base_symbol: &str) -> ExchangeResult<Option<AssetData>> {
        self.check_auth()?;
        Ok(self.assets.get(&base_symbol.to_ascii_uppercase()).cloned())
    }

    fn new_order(&self, request: &OrderRequest, _source: &str) -> ExchangeResult<Order> {
        self.check_auth()?;
        self.submitted.lock().unwrap().push(request.clone());

        if matches!(self.fill_mode, FillMode::Reject) {
            return Err(ExchangeError::Order("mock: order rejected".into()));
        }

        let id = self.next_order_id.fetch_add(1, Ordering::Relaxed).to_string();
        let order = self.fill(request, id.clone());
        self.orders.lock().unwrap().insert(id, order.clone());
        Ok(order)
    }

    fn get_order(&self, id: &str, _market: &Market) -> ExchangeResult<Option<Order>> {
        self.check_auth()?;
        Ok(self.orders.lock().unwrap().get(id).cloned())
    }

    fn cancel_order(
        &self,
        id: &str,
        market: &Market,
        source: &str,
    ) -> ExchangeResult<Option<Order>> {
        self.check_auth()?;
        self.cancelled.lock().unwrap().push(RecordedCancel {
            id: id.to_string(),
            market: market.clone(),
            source: source.to_string(),
        });

        let mut orders = self.orders.lock().unwrap();
        Ok(orders.get_mut(id).map(|order| {
            if !order.has_ended() {
                order.status = OrderStatus::Canceled;
            }
            order.clone()
        }))
    }

    fn cancel_all_open_orders(&self, market: Option<&Market>) -> ExchangeResult<Vec<Order>> {
        self.check_auth()?;
        if self.fail_cancel_all {
            return Err(ExchangeError::Api("mock: cancel-all failed".into()));
        }

        let mut orders = self.orders.lock().unwrap();
        let mut cancelled = Vec::new();
        for order in orders.values_mut() {
            let in_scope = market.is_none_or(|m| *m == order.market);
            if in_scope && !order.has_ended() {
                order.status = OrderStatus::Canceled;
                cancelled.push(order.clone());
            }
        }
        Ok(cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::order::OrderSide;

    #[test]
    fn balance_reflects_holdings() {
        let exchange = MockExchange::builder("EUR")
            .with_cash(dec!(50))
            .with_allocation("BTC", dec!(20000), dec!(0.02))
            .build();

        let balance = exchange.get_balance().unwrap();
        assert_eq!(balance.amount_quote_total(), dec!(450));
        assert_eq!(balance.amount_quote_available(), dec!(50));
    }

    #[test]
    fn full_fill_records_submission() {
        let exchange = MockExchange::builder("EUR")
            .with_allocation("BTC", dec!(20000), dec!(0.02))
            .build();

        let request =
            OrderRequest::market_in_quote(Market::new("BTC", "EUR"), OrderSide::Buy, dec!(100));
        let order = exchange.new_order(&request, "test").unwrap();

        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(order.amount_quote_filled, dec!(100));
        assert_eq!(exchange.submitted_orders().len(), 1);
    }

    #[test]
    fn stay_open_then_cancel() {
        let exchange = MockExchange::builder("EUR")
            .fill_mode(FillMode::StayOpen)
            .with_allocation("BTC", dec!(20000), dec!(0.02))
            .build();

        let market = Market::new("BTC", "EUR");
        let request = OrderRequest::market_in_quote(market.clone(), OrderSide::Sell, dec!(100));
        let order = exchange.new_order(&request, "test").unwrap();
        assert_eq!(order.status, OrderStatus::New);

        let cancelled = exchange
            .cancel_order(&order.id, &market, "test")
            .unwrap()
            .unwrap();
        assert_eq!(cancelled.status, OrderStatus::Canceled);
        assert_eq!(exchange.cancelled_orders().len(), 1);
    }

    #[test]
    fn reject_mode_errors_on_submit() {
        let exchange = MockExchange::builder("EUR")
            .fill_mode(FillMode::Reject)
            .build();

        let request =
            OrderRequest::market_in_quote(Market::new("BTC", "EUR"), OrderSide::Buy, dec!(100));
        assert!(exchange.new_order(&request, "test").is_err());
    }

    #[test]
    fn authentication_failure_everywhere() {
        let exchange = MockExchange::builder("EUR").fail_authentication().build();
        assert!(matches!(
            exchange.get_balance(),
            Err(ExchangeError::Authentication(_))
        ));
        assert!(matches!(
            exchange.cancel_all_open_orders(None),
            Err(ExchangeError::Authentication(_))
        ));
    }
}
