//! Position lifecycle: open, stop-loss, rebalance, close.
//!
//! Exposure is a manager-wide invariant, so every mutation goes through a
//! single mutex around the book, the stop-loss state and the rebalancer.

use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

use super::engine::{ClosedTrade, CloseReason, OpenOutcome, Position, PositionEngine};
use super::rebalancer::Rebalancer;
use super::stop_loss::StopLossEngine;
use crate::config::{PositionConfig, RebalanceConfig, StopLossConfig};
use crate::exchange::OrderSide;

/// Position changes caused by one operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PositionDelta {
    pub open: Option<OpenOutcome>,
    pub closed: Vec<ClosedTrade>,
}

impl PositionDelta {
    pub fn is_empty(&self) -> bool {
        self.open.is_none() && self.closed.is_empty()
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.closed.iter().map(|t| t.realized_pnl).sum()
    }

    pub fn extend(&mut self, other: PositionDelta) {
        if other.open.is_some() {
            self.open = other.open;
        }
        self.closed.extend(other.closed);
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PositionStats {
    pub open_positions: usize,
    pub exposure: Decimal,
    pub max_exposure: Decimal,
    pub realized_pnl_total: Decimal,
    pub realized_pnl_today: Decimal,
    pub unrealized_pnl: Decimal,
    pub positions_opened: u64,
    pub positions_closed: u64,
    pub opens_refused: u64,
    pub stop_losses_triggered: u64,
    pub rebalances: u64,
}

#[derive(Debug)]
struct Inner {
    book: PositionEngine,
    stops: StopLossEngine,
    rebalancer: Rebalancer,
    last_prices: HashMap<String, Decimal>,
    stop_losses_triggered: u64,
    rebalances: u64,
}

/// Thread-safe owner of all position state.
#[derive(Debug)]
pub struct PositionLifecycleManager {
    inner: Mutex<Inner>,
}

impl PositionLifecycleManager {
    pub fn new(
        position: &PositionConfig,
        stop_loss: StopLossConfig,
        rebalance: RebalanceConfig,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                book: PositionEngine::new(position),
                stops: StopLossEngine::new(stop_loss),
                rebalancer: Rebalancer::new(rebalance),
                last_prices: HashMap::new(),
                stop_losses_triggered: 0,
                rebalances: 0,
            }),
        }
    }

    /// Open (or scale into) a position if the caps allow it.
    pub fn open(&self, symbol: &str, side: OrderSide, quantity: Decimal, price: Decimal) -> OpenOutcome {
        self.inner.lock().book.open(symbol, side, quantity, price, Utc::now())
    }

    /// Apply an executed fill. A fill against an opposite position reduces
    /// it first; any remainder opens on the new side.
    pub fn apply_fill(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> PositionDelta {
        let now = Utc::now();
        let mut inner = self.inner.lock();
        let mut delta = PositionDelta::default();

        let mut remaining = quantity;
        let opposite_qty = inner
            .book
            .get(symbol)
            .filter(|p| p.side != side)
            .map(|p| p.quantity);

        if let Some(open_qty) = opposite_qty {
            let exit_qty = remaining.min(open_qty);
            if let Some(trade) = inner
                .book
                .reduce(symbol, exit_qty, price, CloseReason::OppositeFill, now)
            {
                delta.closed.push(trade);
            }
            remaining -= exit_qty;
        }

        if remaining > Decimal::ZERO {
            delta.open = Some(inner.book.open(symbol, side, remaining, price, now));
        }

        inner.last_prices.insert(symbol.to_string(), price);
        delta
    }

    /// Why a fill could not be booked under the exposure and count caps.
    pub fn capacity_refusal(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Option<String> {
        self.inner
            .lock()
            .book
            .capacity_refusal(symbol, side, quantity, price)
    }

    /// Close the whole position on `symbol` at `price`.
    pub fn close(&self, symbol: &str, price: Decimal) -> Option<ClosedTrade> {
        self.inner
            .lock()
            .book
            .close(symbol, price, CloseReason::Manual, Utc::now())
    }

    /// Exit part of the position on `symbol`.
    pub fn reduce_position(
        &self,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
    ) -> Option<ClosedTrade> {
        self.inner
            .lock()
            .book
            .reduce(symbol, quantity, price, CloseReason::Manual, Utc::now())
    }

    /// Record the latest price for `symbol` and mark its position to market.
    pub fn mark_price(&self, symbol: &str, price: Decimal) -> Option<Decimal> {
        let mut inner = self.inner.lock();
        inner.last_prices.insert(symbol.to_string(), price);
        inner.book.mark_price(symbol, price)
    }

    /// Feed a high/low/close bar into the ATR for `symbol`.
    pub fn record_bar(&self, symbol: &str, high: Decimal, low: Decimal, close: Decimal) {
        self.inner.lock().stops.record_bar(symbol, high, low, close);
    }

    /// Feed a tick price into the ATR for `symbol`.
    pub fn record_price(&self, symbol: &str, price: Decimal) {
        self.inner.lock().stops.record_price(symbol, price);
    }

    /// Close every position whose stop is hit at its last known price.
    pub fn run_stop_losses(&self) -> Vec<ClosedTrade> {
        let now = Utc::now();
        let mut inner = self.inner.lock();

        let triggered: Vec<(String, Decimal)> = inner
            .book
            .positions()
            .filter_map(|position| {
                let price = *inner.last_prices.get(&position.symbol)?;
                inner.stops.check(position, price).map(|t| (t.symbol, t.current_price))
            })
            .collect();

        let mut closed = Vec::with_capacity(triggered.len());
        for (symbol, price) in triggered {
            if let Some(trade) = inner.book.close(&symbol, price, CloseReason::StopLoss, now) {
                warn!(
                    symbol = %symbol,
                    exit_price = %price,
                    pnl = %trade.realized_pnl,
                    "Stop-loss closed position"
                );
                inner.stop_losses_triggered += 1;
                closed.push(trade);
            }
        }
        closed
    }

    /// Trim positions back under the exposure ceiling.
    pub fn rebalance(&self, size_multiplier: Decimal) -> Vec<ClosedTrade> {
        let now = Utc::now();
        let mut inner = self.inner.lock();

        let Some(plan) = inner.rebalancer.plan(inner.book.positions(), size_multiplier) else {
            return Vec::new();
        };
        inner.rebalances += 1;

        let mut closed = Vec::with_capacity(plan.actions.len());
        for action in plan.actions {
            let price = match inner.last_prices.get(&action.symbol) {
                Some(price) => *price,
                None => match inner.book.get(&action.symbol) {
                    Some(position) => position.entry_price,
                    None => continue,
                },
            };
            if let Some(trade) =
                inner
                    .book
                    .reduce(&action.symbol, action.quantity, price, CloseReason::Rebalance, now)
            {
                closed.push(trade);
            }
        }

        info!(
            exposure_before = %plan.exposure,
            exposure_after = %inner.book.exposure(),
            ceiling = %plan.ceiling,
            closed = closed.len(),
            "Rebalance complete"
        );
        closed
    }

    pub fn exposure(&self) -> Decimal {
        self.inner.lock().book.exposure()
    }

    pub fn open_count(&self) -> usize {
        self.inner.lock().book.open_count()
    }

    pub fn position(&self, symbol: &str) -> Option<Position> {
        self.inner.lock().book.get(symbol).cloned()
    }

    /// Snapshot of open positions, largest exposure first.
    pub fn positions(&self) -> Vec<Position> {
        let inner = self.inner.lock();
        let mut positions: Vec<Position> = inner.book.positions().cloned().collect();
        positions.sort_by(|a, b| b.notional().cmp(&a.notional()));
        positions
    }

    pub fn total_unrealized_pnl(&self) -> Decimal {
        self.inner.lock().book.total_unrealized_pnl()
    }

    pub fn realized_total(&self) -> Decimal {
        self.inner.lock().book.realized_total()
    }

    /// Today's realized loss as a positive amount.
    pub fn daily_loss(&self) -> Decimal {
        self.inner.lock().book.daily_loss(Utc::now())
    }

    pub fn get_stats(&self) -> PositionStats {
        let now = Utc::now();
        let inner = self.inner.lock();
        let (opened, closed, refused) = inner.book.counters();
        PositionStats {
            open_positions: inner.book.open_count(),
            exposure: inner.book.exposure(),
            max_exposure: inner.book.max_exposure(),
            realized_pnl_total: inner.book.realized_total(),
            realized_pnl_today: inner.book.realized_today(now),
            unrealized_pnl: inner.book.total_unrealized_pnl(),
            positions_opened: opened,
            positions_closed: closed,
            opens_refused: refused,
            stop_losses_triggered: inner.stop_losses_triggered,
            rebalances: inner.rebalances,
        }
    }
}
