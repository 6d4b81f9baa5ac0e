//! Position book, exposure accounting and realized PnL.
//!
//! One position per symbol. Same-side entries scale in at a weighted
//! average price. This type is not synchronized; the lifecycle manager
//! serializes access to it.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::PositionConfig;
use crate::exchange::OrderSide;

/// An open position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub symbol: String,
    pub side: OrderSide,
    /// Always positive; direction is carried by `side`
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    pub unrealized_pnl: Decimal,
}

impl Position {
    /// Entry notional (exposure contribution).
    pub fn notional(&self) -> Decimal {
        (self.quantity * self.entry_price).abs()
    }

    /// Quantity signed by side.
    pub fn signed_quantity(&self) -> Decimal {
        self.quantity * self.side.sign()
    }

    /// PnL of `quantity` units exited at `exit_price`.
    pub fn pnl_at(&self, exit_price: Decimal, quantity: Decimal) -> Decimal {
        (exit_price - self.entry_price) * quantity * self.side.sign()
    }
}

/// Why a position was closed or reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    Manual,
    StopLoss,
    Rebalance,
    OppositeFill,
}

/// Realized outcome of a close or partial exit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClosedTrade {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub realized_pnl: Decimal,
    /// Entry notional of the closed quantity
    pub notional: Decimal,
    pub fully_closed: bool,
    pub reason: CloseReason,
    pub closed_at: DateTime<Utc>,
}

impl ClosedTrade {
    /// Realized return on the closed notional.
    pub fn return_pct(&self) -> Decimal {
        if self.notional.is_zero() {
            return Decimal::ZERO;
        }
        self.realized_pnl / self.notional
    }
}

/// Outcome of an open request.
#[must_use = "an open request may be refused"]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum OpenOutcome {
    Created { position: Position },
    /// Added to an existing same-side position
    Increased { position: Position },
    NotCreated { reason: String },
}

impl OpenOutcome {
    pub fn is_created(&self) -> bool {
        !matches!(self, OpenOutcome::NotCreated { .. })
    }

    pub fn position(&self) -> Option<&Position> {
        match self {
            OpenOutcome::Created { position } | OpenOutcome::Increased { position } => Some(position),
            OpenOutcome::NotCreated { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DailyPnl {
    date: NaiveDate,
    realized: Decimal,
}

/// Position book with exposure caps.
#[derive(Debug)]
pub struct PositionEngine {
    max_exposure: Decimal,
    max_open_positions: usize,
    positions: HashMap<String, Position>,
    realized_total: Decimal,
    daily: DailyPnl,
    positions_opened: u64,
    positions_closed: u64,
    opens_refused: u64,
}

impl PositionEngine {
    pub fn new(config: &PositionConfig) -> Self {
        Self {
            max_exposure: config.max_exposure,
            max_open_positions: config.max_open_positions,
            positions: HashMap::new(),
            realized_total: Decimal::ZERO,
            daily: DailyPnl {
                date: Utc::now().date_naive(),
                realized: Decimal::ZERO,
            },
            positions_opened: 0,
            positions_closed: 0,
            opens_refused: 0,
        }
    }

    /// Σ |quantity · entry_price| over open positions.
    pub fn exposure(&self) -> Decimal {
        self.positions.values().map(Position::notional).sum()
    }

    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    pub fn max_exposure(&self) -> Decimal {
        self.max_exposure
    }

    pub fn get(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Open or scale into a position, subject to the exposure and count caps.
    pub fn open(
        &mut self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> OpenOutcome {
        if quantity <= Decimal::ZERO || price <= Decimal::ZERO {
            return self.refuse(format!(
                "non-positive quantity {} or price {}",
                quantity, price
            ));
        }

        let Some(new_notional) = quantity.checked_mul(price) else {
            return self.refuse(format!("notional of {} at {} overflows", quantity, price));
        };
        let exposure = self.exposure();
        if exposure + new_notional > self.max_exposure {
            return self.refuse(format!(
                "exposure {} + {} would exceed max {}",
                exposure, new_notional, self.max_exposure
            ));
        }

        if let Some(existing) = self.positions.get_mut(symbol) {
            if existing.side != side {
                let reason = format!(
                    "opposite {} position already open on {}",
                    existing.side, symbol
                );
                return self.refuse(reason);
            }

            let total_qty = existing.quantity + quantity;
            existing.entry_price =
                (existing.entry_price * existing.quantity + price * quantity) / total_qty;
            existing.quantity = total_qty;
            let position = existing.clone();

            info!(
                symbol = %symbol,
                side = %side,
                quantity = %position.quantity,
                entry_price = %position.entry_price,
                exposure = %self.exposure(),
                "Position increased"
            );
            return OpenOutcome::Increased { position };
        }

        if self.positions.len() >= self.max_open_positions {
            return self.refuse(format!(
                "{} open positions at max {}",
                self.positions.len(),
                self.max_open_positions
            ));
        }

        let position = Position {
            symbol: symbol.to_string(),
            side,
            quantity,
            entry_price: price,
            entry_time: now,
            unrealized_pnl: Decimal::ZERO,
        };
        self.positions.insert(symbol.to_string(), position.clone());
        self.positions_opened += 1;

        info!(
            symbol = %symbol,
            side = %side,
            quantity = %quantity,
            entry_price = %price,
            exposure = %self.exposure(),
            "Position opened"
        );
        OpenOutcome::Created { position }
    }

    /// Why a fill of `quantity` at `price` could not be booked, if so.
    ///
    /// Mirrors fill application: an opposite position is reduced first and
    /// only the remainder has to fit under the caps.
    pub fn capacity_refusal(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Option<String> {
        if quantity <= Decimal::ZERO || price <= Decimal::ZERO {
            return Some(format!("non-positive quantity {} or price {}", quantity, price));
        }

        let mut exposure = self.exposure();
        let mut count = self.positions.len();
        let mut remaining = quantity;
        let mut scaling_in = false;

        if let Some(existing) = self.positions.get(symbol) {
            if existing.side == side {
                scaling_in = true;
            } else {
                let exit_qty = remaining.min(existing.quantity);
                exposure -= exit_qty * existing.entry_price;
                remaining -= exit_qty;
                if exit_qty == existing.quantity {
                    count -= 1;
                }
            }
        }

        if remaining <= Decimal::ZERO {
            return None;
        }

        let Some(new_notional) = remaining.checked_mul(price) else {
            return Some(format!("notional of {} at {} overflows", remaining, price));
        };
        if exposure + new_notional > self.max_exposure {
            return Some(format!(
                "exposure {} + {} would exceed max {}",
                exposure, new_notional, self.max_exposure
            ));
        }
        if !scaling_in && count >= self.max_open_positions {
            return Some(format!(
                "{} open positions at max {}",
                count, self.max_open_positions
            ));
        }
        None
    }

    fn refuse(&mut self, reason: String) -> OpenOutcome {
        self.opens_refused += 1;
        debug!(reason = %reason, "Position not created");
        OpenOutcome::NotCreated { reason }
    }

    /// Close the whole position at `price`.
    pub fn close(
        &mut self,
        symbol: &str,
        price: Decimal,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> Option<ClosedTrade> {
        let quantity = self.positions.get(symbol)?.quantity;
        self.reduce(symbol, quantity, price, reason, now)
    }

    /// Exit `quantity` units at `price`. Quantities at or above the open size
    /// close the position.
    pub fn reduce(
        &mut self,
        symbol: &str,
        quantity: Decimal,
        price: Decimal,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> Option<ClosedTrade> {
        if quantity <= Decimal::ZERO {
            return None;
        }
        let position = self.positions.get_mut(symbol)?;

        let exit_qty = quantity.min(position.quantity);
        let realized_pnl = position.pnl_at(price, exit_qty);
        let trade = ClosedTrade {
            symbol: symbol.to_string(),
            side: position.side,
            quantity: exit_qty,
            entry_price: position.entry_price,
            exit_price: price,
            realized_pnl,
            notional: exit_qty * position.entry_price,
            fully_closed: exit_qty == position.quantity,
            reason,
            closed_at: now,
        };

        if trade.fully_closed {
            self.positions.remove(symbol);
            self.positions_closed += 1;
        } else {
            position.quantity -= exit_qty;
            position.unrealized_pnl = position.pnl_at(price, position.quantity);
        }

        self.realize(realized_pnl, now);

        let exposure = self.exposure();

        info!(
            symbol = %symbol,
            quantity = %exit_qty,
            exit_price = %price,
            pnl = %realized_pnl,
            reason = ?reason,
            fully_closed = trade.fully_closed,
            exposure = %exposure,
            "Position reduced"
        );
        Some(trade)
    }

    fn realize(&mut self, pnl: Decimal, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.daily.date {
            info!(
                previous_date = %self.daily.date,
                previous_realized = %self.daily.realized,
                "Daily PnL rolled over"
            );
            self.daily = DailyPnl {
                date: today,
                realized: Decimal::ZERO,
            };
        }
        self.daily.realized += pnl;
        self.realized_total += pnl;
    }

    /// Update unrealized PnL of the position on `symbol`.
    pub fn mark_price(&mut self, symbol: &str, price: Decimal) -> Option<Decimal> {
        let position = self.positions.get_mut(symbol)?;
        position.unrealized_pnl = position.pnl_at(price, position.quantity);
        Some(position.unrealized_pnl)
    }

    pub fn total_unrealized_pnl(&self) -> Decimal {
        self.positions.values().map(|p| p.unrealized_pnl).sum()
    }

    pub fn realized_total(&self) -> Decimal {
        self.realized_total
    }

    /// Realized PnL for the UTC date of `now`.
    pub fn realized_today(&self, now: DateTime<Utc>) -> Decimal {
        if now.date_naive() == self.daily.date {
            self.daily.realized
        } else {
            Decimal::ZERO
        }
    }

    /// Today's realized loss as a positive amount (0 when in profit).
    pub fn daily_loss(&self, now: DateTime<Utc>) -> Decimal {
        (-self.realized_today(now)).max(Decimal::ZERO)
    }

    pub(crate) fn counters(&self) -> (u64, u64, u64) {
        (self.positions_opened, self.positions_closed, self.opens_refused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn engine(max_exposure: Decimal, max_open: usize) -> PositionEngine {
        PositionEngine::new(&PositionConfig {
            max_exposure,
            max_open_positions: max_open,
        })
    }

    #[test]
    fn test_open_and_close_long() {
        let mut book = engine(dec!(100000), 5);
        let now = Utc::now();
        assert!(book.open("BTCUSDT", OrderSide::Buy, dec!(0.1), dec!(50000), now).is_created());
        assert_eq!(book.exposure(), dec!(5000));

        let trade = book
            .close("BTCUSDT", dec!(51000), CloseReason::Manual, now)
            .unwrap();
        assert_eq!(trade.realized_pnl, dec!(100));
        assert!(trade.fully_closed);
        assert_eq!(book.exposure(), Decimal::ZERO);
        assert_eq!(book.open_count(), 0);
        assert_eq!(book.realized_today(now), dec!(100));
    }

    #[test]
    fn test_short_pnl_sign() {
        let mut book = engine(dec!(100000), 5);
        let now = Utc::now();
        let _ = book.open("ETHUSDT", OrderSide::Sell, dec!(2), dec!(2000), now);
        let trade = book
            .close("ETHUSDT", dec!(2100), CloseReason::StopLoss, now)
            .unwrap();
        assert_eq!(trade.realized_pnl, dec!(-200));
        assert_eq!(book.daily_loss(now), dec!(200));
    }

    #[test]
    fn test_exposure_at_ceiling_refuses_open() {
        let mut book = engine(dec!(10000), 5);
        let now = Utc::now();
        let _ = book.open("BTCUSDT", OrderSide::Buy, dec!(0.2), dec!(50000), now);
        assert_eq!(book.exposure(), dec!(10000));

        let outcome = book.open("ETHUSDT", OrderSide::Buy, dec!(0.01), dec!(2000), now);
        assert!(matches!(outcome, OpenOutcome::NotCreated { .. }));
        assert_eq!(book.exposure(), dec!(10000));
        assert_eq!(book.open_count(), 1);
    }

    #[test]
    fn test_open_count_cap() {
        let mut book = engine(dec!(1000000), 2);
        let now = Utc::now();
        let _ = book.open("A", OrderSide::Buy, dec!(1), dec!(10), now);
        let _ = book.open("B", OrderSide::Buy, dec!(1), dec!(10), now);
        let outcome = book.open("C", OrderSide::Buy, dec!(1), dec!(10), now);
        assert!(!outcome.is_created());
        // Scaling into an existing symbol is still allowed.
        assert!(matches!(
            book.open("A", OrderSide::Buy, dec!(1), dec!(20), now),
            OpenOutcome::Increased { .. }
        ));
        assert_eq!(book.get("A").unwrap().entry_price, dec!(15));
    }

    #[test]
    fn test_opposite_side_refused() {
        let mut book = engine(dec!(1000000), 5);
        let now = Utc::now();
        let _ = book.open("BTCUSDT", OrderSide::Buy, dec!(1), dec!(100), now);
        let outcome = book.open("BTCUSDT", OrderSide::Sell, dec!(1), dec!(100), now);
        assert!(!outcome.is_created());
    }

    #[test]
    fn test_partial_reduce_keeps_remainder() {
        let mut book = engine(dec!(1000000), 5);
        let now = Utc::now();
        let _ = book.open("BTCUSDT", OrderSide::Buy, dec!(1), dec!(100), now);
        let trade = book
            .reduce("BTCUSDT", dec!(0.4), dec!(110), CloseReason::Rebalance, now)
            .unwrap();
        assert_eq!(trade.realized_pnl, dec!(4));
        assert!(!trade.fully_closed);
        assert_eq!(book.get("BTCUSDT").unwrap().quantity, dec!(0.6));
        assert_eq!(book.exposure(), dec!(60));
    }

    #[test]
    fn test_oversized_reduce_closes_whole_position() {
        let mut book = engine(dec!(1000000), 5);
        let now = Utc::now();
        let _ = book.open("BTCUSDT", OrderSide::Buy, dec!(1), dec!(100), now);

        let trade = book
            .reduce("BTCUSDT", dec!(5), dec!(90), CloseReason::Manual, now)
            .unwrap();
        assert_eq!(trade.quantity, dec!(1));
        assert!(trade.fully_closed);
        assert_eq!(book.exposure(), Decimal::ZERO);
        assert!(book.get("BTCUSDT").is_none());
        assert!(book.reduce("BTCUSDT", dec!(1), dec!(90), CloseReason::Manual, now).is_none());
    }

    #[test]
    fn test_capacity_refusal_matches_open_caps() {
        let mut book = engine(dec!(1000), 2);
        let now = Utc::now();
        let _ = book.open("ETHUSDT", OrderSide::Buy, dec!(0.5), dec!(2000), now);

        // At the exposure cap: a new symbol does not fit.
        let reason = book.capacity_refusal("BTCUSDT", OrderSide::Buy, dec!(0.00004), dec!(100000));
        assert!(reason.unwrap().contains("would exceed max"));

        // An opposite fill frees exposure before the remainder is booked.
        assert!(book
            .capacity_refusal("ETHUSDT", OrderSide::Sell, dec!(0.7), dec!(2000))
            .is_none());
        assert!(book
            .capacity_refusal("ETHUSDT", OrderSide::Sell, dec!(0.5), dec!(1500))
            .is_none());
        assert!(book
            .capacity_refusal("ETHUSDT", OrderSide::Sell, dec!(1.1), dec!(2000))
            .is_some());

        let reason = book.capacity_refusal("BTCUSDT", OrderSide::Buy, Decimal::MAX, dec!(2));
        assert!(reason.unwrap().contains("overflows"));
        assert!(!book.open("BTCUSDT", OrderSide::Buy, Decimal::MAX, dec!(2), now).is_created());
    }

    #[test]
    fn test_capacity_refusal_counts_positions() {
        let mut book = engine(dec!(1000000), 1);
        let now = Utc::now();
        let _ = book.open("A", OrderSide::Buy, dec!(1), dec!(10), now);

        assert!(book.capacity_refusal("B", OrderSide::Buy, dec!(1), dec!(10)).is_some());
        assert!(book.capacity_refusal("A", OrderSide::Buy, dec!(1), dec!(10)).is_none());
        // Flipping A replaces it rather than adding a second position.
        assert!(book.capacity_refusal("A", OrderSide::Sell, dec!(2), dec!(10)).is_none());
        assert!(book.capacity_refusal("A", OrderSide::Buy, Decimal::ZERO, dec!(10)).is_some());
    }

    #[test]
    fn test_mark_price_updates_unrealized() {
        let mut book = engine(dec!(1000000), 5);
        let now = Utc::now();
        let _ = book.open("BTCUSDT", OrderSide::Sell, dec!(0.5), dec!(100), now);
        assert_eq!(book.mark_price("BTCUSDT", dec!(90)), Some(dec!(5)));
        assert_eq!(book.total_unrealized_pnl(), dec!(5));
        assert_eq!(book.mark_price("ETHUSDT", dec!(90)), None);
    }

    #[test]
    fn test_daily_pnl_rolls_over_at_utc_midnight() {
        let mut book = engine(dec!(1000000), 5);
        let day1 = Utc.with_ymd_and_hms(2026, 3, 1, 23, 0, 0).unwrap();
        let day2 = day1 + Duration::hours(2);

        let _ = book.open("A", OrderSide::Buy, dec!(1), dec!(100), day1);
        book.close("A", dec!(90), CloseReason::Manual, day1).unwrap();
        assert_eq!(book.daily_loss(day1), dec!(10));
        assert_eq!(book.daily_loss(day2), Decimal::ZERO);

        let _ = book.open("B", OrderSide::Buy, dec!(1), dec!(100), day2);
        book.close("B", dec!(95), CloseReason::Manual, day2).unwrap();
        assert_eq!(book.realized_today(day2), dec!(-5));
        assert_eq!(book.realized_total(), dec!(-15));
    }
}
