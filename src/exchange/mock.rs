//! In-memory paper exchange for simulations and tests.
//!
//! Serves market snapshots set by the caller, fills orders through the
//! fill simulation model and tracks a quote-currency balance.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::traits::{HealthSource, MarketDataFeed, OrderGateway};
use super::types::*;
use crate::config::FillConfig;
use crate::execution::FillSimulationModel;

/// Paper account state.
#[derive(Debug, Clone)]
pub struct PaperAccount {
    pub initial_balance: Decimal,
    pub balance: Decimal,
    pub total_fees: Decimal,
    pub order_count: u64,
}

/// Simulated venue implementing every collaborator trait.
pub struct PaperExchange {
    account: Arc<RwLock<PaperAccount>>,
    snapshots: Arc<RwLock<HashMap<String, MarketSnapshot>>>,
    fill_model: FillSimulationModel,
    order_id_counter: AtomicU64,
    heartbeat_age_ms: AtomicU64,
    ws_lag_ms: AtomicU64,
    reject_orders: AtomicBool,
    /// Taker fee rate (0.04%)
    fee_rate: Decimal,
}

impl PaperExchange {
    pub fn new(initial_balance: Decimal, fill: &FillConfig) -> Self {
        Self {
            account: Arc::new(RwLock::new(PaperAccount {
                initial_balance,
                balance: initial_balance,
                total_fees: Decimal::ZERO,
                order_count: 0,
            })),
            snapshots: Arc::new(RwLock::new(HashMap::new())),
            fill_model: FillSimulationModel::new(fill),
            order_id_counter: AtomicU64::new(1),
            heartbeat_age_ms: AtomicU64::new(0),
            ws_lag_ms: AtomicU64::new(0),
            reject_orders: AtomicBool::new(false),
            fee_rate: dec!(0.0004),
        }
    }

    /// Replace the snapshot for its symbol.
    pub async fn set_snapshot(&self, snapshot: MarketSnapshot) {
        self.snapshots
            .write()
            .await
            .insert(snapshot.symbol.clone(), snapshot);
    }

    /// Set a symmetric quote with equal depth on both sides.
    pub async fn set_quote(&self, symbol: &str, bid: Decimal, ask: Decimal, depth: Decimal) {
        self.set_snapshot(MarketSnapshot {
            symbol: symbol.to_string(),
            best_bid: bid,
            best_ask: ask,
            bid_depth: depth,
            ask_depth: depth,
            timestamp: Utc::now(),
        })
        .await;
    }

    /// Set the ages reported through `HealthSource`.
    pub fn set_health(&self, heartbeat_age_ms: u64, ws_lag_ms: u64) {
        self.heartbeat_age_ms.store(heartbeat_age_ms, Ordering::Relaxed);
        self.ws_lag_ms.store(ws_lag_ms, Ordering::Relaxed);
    }

    /// Make every later order submission fail.
    pub fn set_reject_orders(&self, reject: bool) {
        self.reject_orders.store(reject, Ordering::Relaxed);
    }

    pub async fn account(&self) -> PaperAccount {
        self.account.read().await.clone()
    }

    pub async fn account_snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            balance: self.account.read().await.balance,
        }
    }

    fn next_order_id(&self) -> u64 {
        self.order_id_counter.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataFeed for PaperExchange {
    async fn snapshot(&self, symbol: &str) -> Result<MarketSnapshot> {
        self.snapshots
            .read()
            .await
            .get(symbol)
            .cloned()
            .ok_or_else(|| anyhow!("no market data for {}", symbol))
    }
}

#[async_trait]
impl OrderGateway for PaperExchange {
    async fn submit_order(&self, intent: &OrderIntent) -> Result<FillAck> {
        if self.reject_orders.load(Ordering::Relaxed) {
            return Err(anyhow!("paper exchange rejecting orders"));
        }

        let snapshot = self.snapshot(&intent.symbol).await?;
        let fill = self
            .fill_model
            .simulate(intent, snapshot.available_volume(intent.side));
        if !fill.has_fill() {
            return Err(anyhow!(
                "order for {} {} rejected: no liquidity",
                intent.side,
                intent.symbol
            ));
        }

        let notional = fill.notional();
        let fee = notional * self.fee_rate;
        {
            let mut account = self.account.write().await;
            match intent.side {
                OrderSide::Buy => account.balance -= notional + fee,
                OrderSide::Sell => account.balance += notional - fee,
            }
            account.total_fees += fee;
            account.order_count += 1;
        }

        let order_id = format!("paper-{}", self.next_order_id());
        info!(
            order_id = %order_id,
            symbol = %intent.symbol,
            side = %intent.side,
            quantity = %fill.filled_quantity,
            price = %fill.effective_price,
            fee = %fee,
            "[PAPER] Order filled"
        );

        Ok(FillAck {
            order_id,
            symbol: intent.symbol.clone(),
            side: intent.side,
            executed_quantity: fill.filled_quantity,
            average_price: fill.effective_price,
            update_time: Utc::now(),
        })
    }
}

impl HealthSource for PaperExchange {
    fn redis_heartbeat_age_ms(&self) -> u64 {
        self.heartbeat_age_ms.load(Ordering::Relaxed)
    }

    fn ws_lag_ms(&self) -> u64 {
        let lag = self.ws_lag_ms.load(Ordering::Relaxed);
        debug!(lag_ms = lag, "Paper WS lag sampled");
        lag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange() -> PaperExchange {
        PaperExchange::new(dec!(10000), &FillConfig::default())
    }

    #[tokio::test]
    async fn test_missing_market_data_is_error() {
        let paper = exchange();
        assert!(paper.snapshot("BTCUSDT").await.is_err());
    }

    #[tokio::test]
    async fn test_buy_fills_through_model_and_debits_balance() {
        let paper = exchange();
        paper.set_quote("ETHUSDT", dec!(1999), dec!(2000), dec!(4)).await;

        let intent = OrderIntent::new("ETHUSDT", OrderSide::Buy, dec!(2000), dec!(1));
        let ack = paper.submit_order(&intent).await.unwrap();

        // impact 1/4 -> 2000 * (1 + 0.001 * 0.25)
        assert_eq!(ack.average_price, dec!(2000.5));
        assert_eq!(ack.executed_quantity, dec!(1));
        assert_eq!(ack.order_id, "paper-1");

        let account = paper.account().await;
        assert_eq!(account.order_count, 1);
        assert_eq!(account.total_fees, dec!(0.80020));
        assert_eq!(account.balance, dec!(10000) - dec!(2000.5) - dec!(0.80020));
    }

    #[tokio::test]
    async fn test_no_liquidity_is_error() {
        let paper = exchange();
        paper.set_quote("BTCUSDT", dec!(99990), dec!(100010), Decimal::ZERO).await;
        let intent = OrderIntent::new("BTCUSDT", OrderSide::Sell, dec!(99990), dec!(0.1));
        assert!(paper.submit_order(&intent).await.is_err());
        assert_eq!(paper.account().await.order_count, 0);
    }

    #[test]
    fn test_reject_switch_blocks_submission() {
        let paper = exchange();
        tokio_test::block_on(paper.set_quote("ETHUSDT", dec!(1999), dec!(2000), dec!(4)));
        paper.set_reject_orders(true);

        let intent = OrderIntent::new("ETHUSDT", OrderSide::Buy, dec!(2000), dec!(1));
        assert!(tokio_test::block_on(paper.submit_order(&intent)).is_err());

        paper.set_reject_orders(false);
        assert!(tokio_test::block_on(paper.submit_order(&intent)).is_ok());
        assert_eq!(tokio_test::block_on(paper.account()).order_count, 1);
    }

    #[tokio::test]
    async fn test_health_source_reports_set_values() {
        let paper = exchange();
        paper.set_health(1_500, 250);
        assert_eq!(paper.redis_heartbeat_age_ms(), 1_500);
        assert_eq!(paper.ws_lag_ms(), 250);
    }
}
