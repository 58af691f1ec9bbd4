//! Order request/response types and the order status lifecycle.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::market::Market;

/// Trade direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    GoodTilCanceled,
    ImmediateOrCancel,
    FillOrKill,
}

/// Lifecycle: `BrandNew → New → PartiallyFilled → {Filled | Canceled |
/// Expired | Failed | Rejected}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Constructed locally, not yet accepted by the exchange.
    BrandNew,
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Expired,
    Failed,
    Rejected,
}

impl OrderStatus {
    /// True for every terminal status.
    pub fn has_ended(self) -> bool {
        !matches!(
            self,
            OrderStatus::BrandNew | OrderStatus::New | OrderStatus::PartiallyFilled
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::BrandNew => "brand-new",
            OrderStatus::New => "new",
            OrderStatus::PartiallyFilled => "partially-filled",
            OrderStatus::Filled => "filled",
            OrderStatus::Canceled => "canceled",
            OrderStatus::Expired => "expired",
            OrderStatus::Failed => "failed",
            OrderStatus::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

/// An order as constructed locally, before submission.
///
/// Size is given either as `amount` (base units, e.g. a full-position
/// liquidation) or as `amount_quote` (quote currency); `price` only
/// applies to limit orders.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub market: Market,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub price: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub amount_quote: Option<Decimal>,
    pub time_in_force: TimeInForce,
    /// Fee the engine expects to pay, estimated from the taker rate.
    pub fee_expected: Decimal,
}

impl OrderRequest {
    /// A market order sized in quote currency.
    pub fn market_in_quote(market: Market, side: OrderSide, amount_quote: Decimal) -> Self {
        Self {
            market,
            side,
            order_type: OrderType::Market,
            price: None,
            amount: None,
            amount_quote: Some(amount_quote),
            time_in_force: TimeInForce::GoodTilCanceled,
            fee_expected: Decimal::ZERO,
        }
    }

    /// A market order sized in base units.
    pub fn market_in_base(market: Market, side: OrderSide, amount: Decimal) -> Self {
        Self {
            market,
            side,
            order_type: OrderType::Market,
            price: None,
            amount: Some(amount),
            amount_quote: None,
            time_in_force: TimeInForce::GoodTilCanceled,
            fee_expected: Decimal::ZERO,
        }
    }
}

/// An order as known to the exchange after submission.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub market: Market,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub price: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub amount_quote: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub amount_filled: Decimal,
    pub amount_quote_filled: Decimal,
    pub fee_expected: Decimal,
    pub fee_paid: Decimal,
}

impl Order {
    /// True once the order has reached a terminal status.
    pub fn has_ended(&self) -> bool {
        self.status.has_ended()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        for status in [
            OrderStatus::Filled,
            OrderStatus::Canceled,
            OrderStatus::Expired,
            OrderStatus::Failed,
            OrderStatus::Rejected,
        ] {
            assert!(status.has_ended(), "{status} should be terminal");
        }
        for status in [
            OrderStatus::BrandNew,
            OrderStatus::New,
            OrderStatus::PartiallyFilled,
        ] {
            assert!(!status.has_ended(), "{status} should not be terminal");
        }
    }
}
