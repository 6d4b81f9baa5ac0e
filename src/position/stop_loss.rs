//! Stop-loss triggers.
//!
//! Static stops sit a fixed percentage from entry. ATR stops sit
//! `atr_multiplier` average true ranges from entry and fall back to the
//! static distance until `min_atr_samples` true ranges are available.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

use super::engine::Position;
use crate::config::{StopLossConfig, StopLossMode};
use crate::exchange::OrderSide;

/// Rolling average true range for one symbol.
#[derive(Debug, Clone)]
struct AtrTracker {
    window: usize,
    true_ranges: VecDeque<Decimal>,
    prev_close: Option<Decimal>,
}

impl AtrTracker {
    fn new(window: usize) -> Self {
        Self {
            window,
            true_ranges: VecDeque::with_capacity(window),
            prev_close: None,
        }
    }

    fn record_bar(&mut self, high: Decimal, low: Decimal, close: Decimal) {
        let range = high - low;
        let true_range = match self.prev_close {
            Some(prev) => range.max((high - prev).abs()).max((low - prev).abs()),
            None => range,
        };
        self.prev_close = Some(close);

        self.true_ranges.push_back(true_range);
        while self.true_ranges.len() > self.window {
            self.true_ranges.pop_front();
        }
    }

    fn samples(&self) -> usize {
        self.true_ranges.len()
    }

    fn atr(&self) -> Decimal {
        if self.true_ranges.is_empty() {
            return Decimal::ZERO;
        }
        let sum: Decimal = self.true_ranges.iter().copied().sum();
        sum / Decimal::from(self.true_ranges.len())
    }
}

/// A stop that has been hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StopTrigger {
    pub symbol: String,
    pub side: OrderSide,
    pub trigger_price: Decimal,
    pub current_price: Decimal,
    pub mode: StopLossMode,
}

/// Per-symbol stop-loss evaluation.
#[derive(Debug)]
pub struct StopLossEngine {
    config: StopLossConfig,
    trackers: HashMap<String, AtrTracker>,
}

impl StopLossEngine {
    pub fn new(config: StopLossConfig) -> Self {
        Self {
            config,
            trackers: HashMap::new(),
        }
    }

    /// Feed a high/low/close bar for the ATR.
    pub fn record_bar(&mut self, symbol: &str, high: Decimal, low: Decimal, close: Decimal) {
        if high < low {
            warn!(symbol = %symbol, high = %high, low = %low, "Ignoring bar with high below low");
            return;
        }
        let window = self.config.atr_window;
        self.trackers
            .entry(symbol.to_string())
            .or_insert_with(|| AtrTracker::new(window))
            .record_bar(high, low, close);
    }

    /// Feed a single tick price as a degenerate bar.
    pub fn record_price(&mut self, symbol: &str, price: Decimal) {
        self.record_bar(symbol, price, price, price);
    }

    /// ATR for `symbol` once enough samples exist.
    pub fn atr(&self, symbol: &str) -> Option<Decimal> {
        let tracker = self.trackers.get(symbol)?;
        if tracker.samples() < self.config.min_atr_samples {
            return None;
        }
        Some(tracker.atr())
    }

    /// Stop distance from entry and the mode that produced it.
    fn distance(&self, position: &Position) -> (Decimal, StopLossMode) {
        let static_distance = position.entry_price * self.config.static_pct;
        match self.config.mode {
            StopLossMode::Static => (static_distance, StopLossMode::Static),
            StopLossMode::Atr => match self.atr(&position.symbol) {
                Some(atr) if atr > Decimal::ZERO => {
                    (atr * self.config.atr_multiplier, StopLossMode::Atr)
                }
                _ => (static_distance, StopLossMode::Static),
            },
        }
    }

    fn trigger(&self, position: &Position) -> (Decimal, StopLossMode) {
        let (distance, mode) = self.distance(position);
        let price = match position.side {
            OrderSide::Buy => (position.entry_price - distance).max(Decimal::ZERO),
            OrderSide::Sell => position.entry_price + distance,
        };
        (price, mode)
    }

    /// Trigger price for `position`: below entry for longs, above for shorts.
    pub fn trigger_price(&self, position: &Position) -> Decimal {
        self.trigger(position).0
    }

    /// Whether `position` should be closed at `current_price`.
    pub fn check(&self, position: &Position, current_price: Decimal) -> Option<StopTrigger> {
        let (trigger_price, mode) = self.trigger(position);

        let hit = match position.side {
            OrderSide::Buy => current_price <= trigger_price,
            OrderSide::Sell => current_price >= trigger_price,
        };

        if !hit {
            return None;
        }

        debug!(
            symbol = %position.symbol,
            trigger_price = %trigger_price,
            current_price = %current_price,
            mode = ?mode,
            "Stop-loss hit"
        );
        Some(StopTrigger {
            symbol: position.symbol.clone(),
            side: position.side,
            trigger_price,
            current_price,
            mode,
        })
    }
}
