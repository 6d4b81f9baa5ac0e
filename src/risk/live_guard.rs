//! Last-mile gate before any real-money order.
//!
//! Checks run in a fixed order and the first failure wins:
//! 1. guard disabled
//! 2. session already stopped
//! 3. symbol not in the allow-list
//! 4. balance below the floor
//! 5. daily loss above the cap (stops the session)
//! 6. notional above the per-trade cap
//!
//! A daily-loss breach always stops the session, even when an earlier
//! per-order check has already failed; the reason then names both.
//! Once stopped, every later check returns `SessionStop` until the process
//! restarts.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info};

use super::alert::{self, AlertSeverity};
use crate::config::LiveGuardConfig;
use crate::utils::decimal::round_down_to_lot;

/// Outcome of a live order check.
#[must_use = "a blocked or session-stopping decision must be honoured"]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum GuardDecision {
    Allowed,
    Blocked { reason: String },
    /// Blocks this order and every later one.
    SessionStop { reason: String },
}

impl GuardDecision {
    pub fn allowed(&self) -> bool {
        matches!(self, GuardDecision::Allowed)
    }

    pub fn session_stop(&self) -> bool {
        matches!(self, GuardDecision::SessionStop { .. })
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            GuardDecision::Allowed => None,
            GuardDecision::Blocked { reason } | GuardDecision::SessionStop { reason } => Some(reason),
        }
    }
}

#[derive(Debug, Serialize)]
struct GuardAlert<'a> {
    timestamp: DateTime<Utc>,
    kind: &'static str,
    symbol: &'a str,
    notional: Decimal,
    reason: &'a str,
}

/// Counters for audit dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct GuardStats {
    pub enabled: bool,
    pub total_orders_attempted: u64,
    pub total_orders_blocked: u64,
    pub total_orders_allowed: u64,
    pub session_stopped: bool,
    pub session_stop_reason: Option<String>,
}

/// Hard operational limits for live orders.
#[derive(Debug)]
pub struct LiveSafetyGuard {
    config: LiveGuardConfig,
    session_stopped: AtomicBool,
    session_stop_reason: Mutex<Option<String>>,
    total_orders_attempted: AtomicU64,
    total_orders_blocked: AtomicU64,
    total_orders_allowed: AtomicU64,
}

impl LiveSafetyGuard {
    pub fn new(config: LiveGuardConfig) -> Self {
        info!(
            enabled = config.enabled,
            allowed_symbols = ?config.allowed_symbols,
            max_daily_loss = %config.max_daily_loss,
            max_notional_per_trade = %config.max_notional_per_trade,
            dry_run_scale = %config.dry_run_scale,
            "Live safety guard initialized"
        );
        Self {
            config,
            session_stopped: AtomicBool::new(false),
            session_stop_reason: Mutex::new(None),
            total_orders_attempted: AtomicU64::new(0),
            total_orders_blocked: AtomicU64::new(0),
            total_orders_allowed: AtomicU64::new(0),
        }
    }

    /// Check an order before it is sent. `daily_loss` is a positive loss amount.
    pub fn check_before_send_order(
        &self,
        symbol: &str,
        notional: Decimal,
        balance: Decimal,
        daily_loss: Decimal,
    ) -> GuardDecision {
        self.total_orders_attempted.fetch_add(1, Ordering::Relaxed);

        let decision = self.decide(symbol, notional.abs(), balance, daily_loss);

        match &decision {
            GuardDecision::Allowed => {
                self.total_orders_allowed.fetch_add(1, Ordering::Relaxed);
                debug!(symbol = %symbol, notional = %notional, "Live order allowed");
            }
            GuardDecision::Blocked { reason } => {
                self.total_orders_blocked.fetch_add(1, Ordering::Relaxed);
                self.alert(AlertSeverity::Warning, "order_blocked", symbol, notional, reason);
            }
            GuardDecision::SessionStop { reason } => {
                self.total_orders_blocked.fetch_add(1, Ordering::Relaxed);
                self.alert(AlertSeverity::Critical, "session_stop", symbol, notional, reason);
            }
        }

        decision
    }

    fn decide(
        &self,
        symbol: &str,
        notional: Decimal,
        balance: Decimal,
        daily_loss: Decimal,
    ) -> GuardDecision {
        if !self.config.enabled {
            return GuardDecision::Blocked {
                reason: "live safety guard is disabled".to_string(),
            };
        }

        if self.session_stopped.load(Ordering::Acquire) {
            let latched = self
                .session_stop_reason
                .lock()
                .clone()
                .unwrap_or_else(|| "session stopped".to_string());
            return GuardDecision::SessionStop {
                reason: format!("session stopped earlier: {}", latched),
            };
        }

        let order_block = if !self.config.allowed_symbols.iter().any(|s| s == symbol) {
            Some(format!("symbol {} is not in the allow-list", symbol))
        } else if balance < self.config.min_balance {
            Some(format!(
                "balance {} below minimum {}",
                balance, self.config.min_balance
            ))
        } else {
            None
        };

        if daily_loss > self.config.max_daily_loss {
            let loss_reason = format!(
                "daily loss {} exceeds cap {}",
                daily_loss, self.config.max_daily_loss
            );
            let reason = match order_block {
                Some(first) => format!("{}; {}", first, loss_reason),
                None => loss_reason,
            };
            self.latch_session_stop(&reason);
            return GuardDecision::SessionStop { reason };
        }

        if let Some(reason) = order_block {
            return GuardDecision::Blocked { reason };
        }

        if notional > self.config.max_notional_per_trade {
            return GuardDecision::Blocked {
                reason: format!(
                    "notional {} exceeds per-trade cap {}",
                    notional, self.config.max_notional_per_trade
                ),
            };
        }

        GuardDecision::Allowed
    }

    fn latch_session_stop(&self, reason: &str) {
        let mut latched = self.session_stop_reason.lock();
        if latched.is_none() {
            *latched = Some(reason.to_string());
        }
        self.session_stopped.store(true, Ordering::Release);
    }

    fn alert(&self, severity: AlertSeverity, kind: &'static str, symbol: &str, notional: Decimal, reason: &str) {
        alert::emit(
            severity,
            &GuardAlert {
                timestamp: Utc::now(),
                kind,
                symbol,
                notional,
                reason,
            },
        );
    }

    /// Scale an allowed quantity down for validation runs, rounded to the lot size.
    pub fn apply_dry_run_scale(&self, quantity: Decimal) -> Decimal {
        round_down_to_lot(quantity * self.config.dry_run_scale, self.config.lot_size)
    }

    pub fn is_session_stopped(&self) -> bool {
        self.session_stopped.load(Ordering::Acquire)
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn get_stats(&self) -> GuardStats {
        GuardStats {
            enabled: self.config.enabled,
            total_orders_attempted: self.total_orders_attempted.load(Ordering::Relaxed),
            total_orders_blocked: self.total_orders_blocked.load(Ordering::Relaxed),
            total_orders_allowed: self.total_orders_allowed.load(Ordering::Relaxed),
            session_stopped: self.is_session_stopped(),
            session_stop_reason: self.session_stop_reason.lock().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn enabled_guard() -> LiveSafetyGuard {
        LiveSafetyGuard::new(LiveGuardConfig {
            enabled: true,
            ..LiveGuardConfig::default()
        })
    }

    #[test]
    fn test_disabled_guard_blocks_everything() {
        let guard = LiveSafetyGuard::new(LiveGuardConfig::default());
        let inputs = [
            ("BTCUSDT", dec!(10), dec!(10000), dec!(0)),
            ("ETHUSDT", dec!(1), dec!(1000000), dec!(0)),
            ("DOGEUSDT", dec!(100000), dec!(0), dec!(1000)),
        ];
        for (symbol, notional, balance, loss) in inputs {
            let decision = guard.check_before_send_order(symbol, notional, balance, loss);
            assert!(!decision.allowed());
            assert!(decision.reason().unwrap().contains("disabled"));
        }
        assert_eq!(guard.get_stats().total_orders_blocked, 3);
        assert!(!guard.is_session_stopped());
    }

    #[test]
    fn test_valid_order_allowed() {
        let guard = enabled_guard();
        let decision = guard.check_before_send_order("BTCUSDT", dec!(100), dec!(1000), dec!(10));
        assert_eq!(decision, GuardDecision::Allowed);
        assert!(decision.reason().is_none());

        let stats = guard.get_stats();
        assert_eq!(stats.total_orders_attempted, 1);
        assert_eq!(stats.total_orders_allowed, 1);
        assert_eq!(stats.total_orders_blocked, 0);
    }

    #[test]
    fn test_check_order_first_failure_wins() {
        let guard = enabled_guard();

        let symbol = guard.check_before_send_order("XRPUSDT", dec!(10000), dec!(1), dec!(0));
        assert!(symbol.reason().unwrap().contains("allow-list"));

        let balance = guard.check_before_send_order("BTCUSDT", dec!(10000), dec!(50), dec!(0));
        assert!(balance.reason().unwrap().contains("balance"));

        let notional = guard.check_before_send_order("BTCUSDT", dec!(600), dec!(1000), dec!(0));
        assert!(!notional.session_stop());
        assert!(notional.reason().unwrap().contains("per-trade cap"));
    }

    #[test]
    fn test_daily_loss_stops_session_regardless_of_other_fields() {
        let guard = enabled_guard();
        let decision = guard.check_before_send_order("XRPUSDT", dec!(999999), dec!(0), dec!(51));
        assert!(decision.session_stop());
        assert!(!decision.allowed());
        let reason = decision.reason().unwrap();
        assert!(reason.contains("allow-list") && reason.contains("daily loss"));
    }

    #[test]
    fn test_session_stop_latches() {
        let guard = enabled_guard();
        assert!(guard
            .check_before_send_order("BTCUSDT", dec!(100), dec!(1000), dec!(60))
            .session_stop());

        // A perfectly valid order afterwards is still refused.
        let later = guard.check_before_send_order("BTCUSDT", dec!(10), dec!(1000), dec!(0));
        assert!(later.session_stop());

        let stats = guard.get_stats();
        assert!(stats.session_stopped);
        assert_eq!(stats.total_orders_allowed, 0);
        assert_eq!(stats.total_orders_blocked, 2);
        assert!(stats.session_stop_reason.unwrap().contains("daily loss"));
    }

    #[test]
    fn test_loss_at_cap_is_not_a_breach() {
        let guard = enabled_guard();
        let decision = guard.check_before_send_order("ETHUSDT", dec!(100), dec!(1000), dec!(50));
        assert!(decision.allowed());
    }

    #[test]
    fn test_dry_run_scale_rounds_to_lot() {
        let guard = LiveSafetyGuard::new(LiveGuardConfig {
            enabled: true,
            lot_size: dec!(0.001),
            ..LiveGuardConfig::default()
        });
        // 0.25 * 0.01 = 0.0025 -> 0.002
        assert_eq!(guard.apply_dry_run_scale(dec!(0.25)), dec!(0.002));

        let unrounded = enabled_guard();
        assert_eq!(unrounded.apply_dry_run_scale(dec!(0.25)), dec!(0.0025));
    }

    #[test]
    fn test_decision_serializes_with_tag() {
        let json = serde_json::to_string(&GuardDecision::SessionStop {
            reason: "daily loss".to_string(),
        })
        .unwrap();
        assert!(json.contains("\"decision\":\"session_stop\""));
    }
}
