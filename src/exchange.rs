//! Exchange boundary: the trait the engine trades through.
//!
//! Concrete REST/WS adapters (signing, rate limiting, JSON shapes) live
//! outside this crate; tests use [`crate::mock::MockExchange`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market::Market;
use crate::order::{Order, OrderRequest};
use crate::portfolio::Balance;

/// Errors returned by exchange operations.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    /// Bad credentials. The engine short-circuits the run on this.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The exchange refused or could not handle an order.
    #[error("order error: {0}")]
    Order(String),

    /// Any other non-success response.
    #[error("api error: {0}")]
    Api(String),
}

pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;

/// Trading status of a market on the exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketStatus {
    /// Not yet resolved against the exchange.
    Unknown,
    Trading,
    Halted,
    Auction,
    /// The exchange does not list this market.
    Unavailable,
}

/// Per-market metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct MarketData {
    pub status: MarketStatus,
    /// Decimal places the exchange accepts in prices for this market.
    pub price_decimals: u32,
    /// Market-specific minimum order size in quote currency, when it
    /// differs from the exchange-wide floor.
    pub min_order_in_quote: Decimal,
}

/// Per-asset metadata.
#[derive(Clone, Debug, PartialEq)]
pub struct AssetData {
    /// Decimal places the exchange accepts in base amounts.
    pub decimals: u32,
}

/// Minimal exchange API needed by the rebalance engine.
///
/// Implementations must be safe to call from the engine's per-order
/// worker threads, hence the `Sync` bound.
pub trait Exchange: Sync {
    /// The exchange's quote currency (e.g. `EUR`).
    fn quote_symbol(&self) -> &str;
    /// Exchange-wide minimum order size in quote currency.
    fn min_order_size_in_quote(&self) -> Decimal;
    fn maker_fee(&self) -> Decimal;
    fn taker_fee(&self) -> Decimal;

    fn get_balance(&self) -> ExchangeResult<Balance>;
    fn get_market(&self, market: &Market) -> ExchangeResult<Option<MarketData>>;
    fn get_asset(&self, base_symbol: &str) -> ExchangeResult<Option<AssetData>>;

    /// Submit an order. `source` tags the initiating workflow for the
    /// exchange-side audit trail.
    fn new_order(&self, request: &OrderRequest, source: &str) -> ExchangeResult<Order>;
    fn get_order(&self, id: &str, market: &Market) -> ExchangeResult<Option<Order>>;
    fn cancel_order(&self, id: &str, market: &Market, source: &str)
    -> ExchangeResult<Option<Order>>;
    /// Cancel every open order, optionally restricted to one market.
    fn cancel_all_open_orders(&self, market: Option<&Market>) -> ExchangeResult<Vec<Order>>;
}
