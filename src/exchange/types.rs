//! Types exchanged with market-data and order-submission collaborators.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// +1 for buys, -1 for sells. Adverse price moves follow this sign.
    pub fn sign(&self) -> Decimal {
        match self {
            OrderSide::Buy => Decimal::ONE,
            OrderSide::Sell => Decimal::NEGATIVE_ONE,
        }
    }

    /// The side that unwinds a position opened on this side.
    pub fn opposite(&self) -> OrderSide {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "BUY"),
            OrderSide::Sell => write!(f, "SELL"),
        }
    }
}

/// An order the engine intends to send. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub symbol: String,
    pub side: OrderSide,
    pub target_price: Decimal,
    pub requested_quantity: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl OrderIntent {
    /// Create a new intent stamped with the current time.
    pub fn new(
        symbol: impl Into<String>,
        side: OrderSide,
        target_price: Decimal,
        requested_quantity: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            side,
            target_price,
            requested_quantity,
            timestamp: Utc::now(),
        }
    }

    /// Requested notional at the target price.
    pub fn notional(&self) -> Decimal {
        (self.requested_quantity * self.target_price).abs()
    }

    /// Same intent with a different quantity.
    pub fn with_quantity(&self, quantity: Decimal) -> Self {
        Self {
            requested_quantity: quantity,
            ..self.clone()
        }
    }
}

/// Raw fill acknowledgment returned by a live venue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillAck {
    pub order_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub executed_quantity: Decimal,
    pub average_price: Decimal,
    pub update_time: DateTime<Utc>,
}

/// Top-of-book and depth for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub best_bid: Decimal,
    pub best_ask: Decimal,
    /// Resting quantity on the bid side
    pub bid_depth: Decimal,
    /// Resting quantity on the ask side
    pub ask_depth: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl MarketSnapshot {
    /// Mid price.
    pub fn mid(&self) -> Decimal {
        (self.best_bid + self.best_ask) / Decimal::TWO
    }

    /// Liquidity an order on `side` would consume.
    pub fn available_volume(&self, side: OrderSide) -> Decimal {
        match side {
            OrderSide::Buy => self.ask_depth,
            OrderSide::Sell => self.bid_depth,
        }
    }

    /// Price an order on `side` would cross at.
    pub fn touch_price(&self, side: OrderSide) -> Decimal {
        match side {
            OrderSide::Buy => self.best_ask,
            OrderSide::Sell => self.best_bid,
        }
    }
}

/// A detected cross-exchange price spread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadOpportunity {
    pub symbol: String,
    pub buy_exchange: String,
    pub sell_exchange: String,
    /// Side of the leg this engine executes
    pub side: OrderSide,
    /// Execution price of that leg
    pub price: Decimal,
    /// Spread between the venues, in bps
    pub spread_bps: Decimal,
    /// Estimated resting liquidity on the relevant side
    pub available_volume: Decimal,
    pub requested_quantity: Decimal,
    pub detected_at: DateTime<Utc>,
}

impl SpreadOpportunity {
    /// Build the order intent for this opportunity at a given size.
    pub fn to_intent(&self, quantity: Decimal) -> OrderIntent {
        OrderIntent::new(self.symbol.clone(), self.side, self.price, quantity)
    }
}

/// Infrastructure health signals sampled for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthSignals {
    pub ws_lag_ms: u64,
    pub redis_heartbeat_age_ms: u64,
    pub loop_latency_ms: u64,
    pub safety_rejections_count: u32,
}

/// Account figures needed by the live guard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub balance: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_sign_and_opposite() {
        assert_eq!(OrderSide::Buy.sign(), dec!(1));
        assert_eq!(OrderSide::Sell.sign(), dec!(-1));
        assert_eq!(OrderSide::Buy.opposite(), OrderSide::Sell);
        assert_eq!(OrderSide::Sell.to_string(), "SELL");
    }

    #[test]
    fn test_snapshot_side_helpers() {
        let snapshot = MarketSnapshot {
            symbol: "BTCUSDT".to_string(),
            best_bid: dec!(99990),
            best_ask: dec!(100010),
            bid_depth: dec!(2),
            ask_depth: dec!(3),
            timestamp: Utc::now(),
        };

        assert_eq!(snapshot.mid(), dec!(100000));
        assert_eq!(snapshot.available_volume(OrderSide::Buy), dec!(3));
        assert_eq!(snapshot.touch_price(OrderSide::Sell), dec!(99990));
    }

    #[test]
    fn test_intent_notional() {
        let intent = OrderIntent::new("ETHUSDT", OrderSide::Sell, dec!(2000), dec!(-0.5));
        assert_eq!(intent.notional(), dec!(1000));
        assert_eq!(intent.with_quantity(dec!(1)).requested_quantity, dec!(1));
    }
}
