//! Venue-agnostic traits for the collaborators the core depends on.
//!
//! The execution core never talks to an exchange directly. It consumes:
//! - a market-data feed (quotes and depth per symbol)
//! - an order-submission gateway (live mode only)
//! - a health source (heartbeat and WebSocket lag ages)
//!
//! Paper runs and tests use `PaperExchange`, which implements all three.

use async_trait::async_trait;

use super::types::{FillAck, MarketSnapshot, OrderIntent};

/// Supplies best bid/ask and depth per symbol.
#[async_trait]
pub trait MarketDataFeed: Send + Sync {
    /// Latest snapshot for a symbol.
    async fn snapshot(&self, symbol: &str) -> anyhow::Result<MarketSnapshot>;
}

/// Accepts an order intent and returns the venue's fill acknowledgment.
///
/// Calls are network I/O and must never run inside a tick that forbids
/// REST calls.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderGateway: Send + Sync {
    async fn submit_order(&self, intent: &OrderIntent) -> anyhow::Result<FillAck>;
}

/// Clock-like source for infrastructure freshness.
pub trait HealthSource: Send + Sync {
    /// Age of the last Redis heartbeat.
    fn redis_heartbeat_age_ms(&self) -> u64;

    /// Lag of the market-data WebSocket.
    fn ws_lag_ms(&self) -> u64;
}
