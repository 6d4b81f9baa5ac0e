//! Health watchdog state machine.
//!
//! Aggregates WebSocket lag, Redis heartbeat age, loop latency and the
//! safety rejection count into HEALTHY / WARN / ERROR / SHUTDOWN.
//!
//! - Any ERROR breach increments `consecutive_errors`; a cycle without one
//!   resets it to 0.
//! - Reaching `max_consecutive_errors` latches shutdown for the rest of the
//!   process lifetime.
//! - WARN-only cycles count towards a soft reset: after `soft_reset_cycles`
//!   of them in a row the streak is logged as recovered and starts over.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, error, info};

use super::alert::{self, AlertSeverity};
use crate::config::WatchdogConfig;
use crate::exchange::HealthSignals;

/// Which health input breached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthSignal {
    WsLag,
    RedisHeartbeat,
    LoopLatency,
    SafetyRejections,
    /// Synthetic signal for the shutdown latch itself
    ConsecutiveErrors,
}

impl fmt::Display for HealthSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthSignal::WsLag => "ws_lag",
            HealthSignal::RedisHeartbeat => "redis_heartbeat",
            HealthSignal::LoopLatency => "loop_latency",
            HealthSignal::SafetyRejections => "safety_rejections",
            HealthSignal::ConsecutiveErrors => "consecutive_errors",
        };
        write!(f, "{}", name)
    }
}

/// One threshold breach.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchdogAlert {
    pub timestamp: DateTime<Utc>,
    pub signal: HealthSignal,
    pub severity: AlertSeverity,
    pub value: u64,
    pub threshold: u64,
    pub message: String,
}

impl WatchdogAlert {
    fn new(signal: HealthSignal, severity: AlertSeverity, value: u64, threshold: u64) -> Self {
        let level = if severity >= AlertSeverity::Error { "ERROR" } else { "WARN" };
        Self {
            timestamp: Utc::now(),
            signal,
            severity,
            value,
            threshold,
            message: format!("{} {} at {} (threshold {})", signal, level, value, threshold),
        }
    }

    pub fn emit(&self) {
        alert::emit(self.severity, self);
    }
}

/// Aggregate health state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchdogState {
    Healthy,
    Warn,
    Error,
    Shutdown,
}

/// Result of one watchdog evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchdogStatus {
    pub state: WatchdogState,
    /// No ERROR breach this cycle and shutdown not latched
    pub is_healthy: bool,
    pub alerts: Vec<WatchdogAlert>,
    pub consecutive_errors: u32,
    pub warn_cycle_count: u32,
    pub should_shutdown: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WatchdogStats {
    pub evaluations: u64,
    pub healthy_cycles: u64,
    pub warn_cycles: u64,
    pub error_cycles: u64,
    pub soft_resets: u64,
    pub consecutive_errors: u32,
    pub warn_cycle_count: u32,
    pub should_shutdown: bool,
    pub shutdown_reason: Option<String>,
    pub retained_alerts: usize,
}

/// Consecutive-failure health state machine.
#[derive(Debug)]
pub struct WatchdogStateMachine {
    config: WatchdogConfig,
    consecutive_errors: u32,
    warn_cycle_count: u32,
    should_shutdown: bool,
    shutdown_reason: Option<String>,
    recent_alerts: VecDeque<WatchdogAlert>,
    evaluations: u64,
    healthy_cycles: u64,
    warn_cycles: u64,
    error_cycles: u64,
    soft_resets: u64,
}

impl WatchdogStateMachine {
    pub fn new(config: WatchdogConfig) -> Self {
        Self {
            recent_alerts: VecDeque::with_capacity(config.max_alerts),
            config,
            consecutive_errors: 0,
            warn_cycle_count: 0,
            should_shutdown: false,
            shutdown_reason: None,
            evaluations: 0,
            healthy_cycles: 0,
            warn_cycles: 0,
            error_cycles: 0,
            soft_resets: 0,
        }
    }

    fn check(
        alerts: &mut Vec<WatchdogAlert>,
        signal: HealthSignal,
        value: u64,
        warn_threshold: u64,
        error_threshold: u64,
    ) {
        if value >= error_threshold {
            alerts.push(WatchdogAlert::new(signal, AlertSeverity::Error, value, error_threshold));
        } else if value >= warn_threshold {
            alerts.push(WatchdogAlert::new(signal, AlertSeverity::Warning, value, warn_threshold));
        }
    }

    /// Evaluate one cycle of health signals.
    pub fn evaluate(&mut self, signals: &HealthSignals) -> WatchdogStatus {
        let cfg = &self.config;
        let mut alerts = Vec::new();

        Self::check(
            &mut alerts,
            HealthSignal::WsLag,
            signals.ws_lag_ms,
            cfg.ws_lag_warn_ms,
            cfg.ws_lag_error_ms,
        );
        Self::check(
            &mut alerts,
            HealthSignal::RedisHeartbeat,
            signals.redis_heartbeat_age_ms,
            cfg.heartbeat_warn_ms,
            cfg.heartbeat_error_ms,
        );
        Self::check(
            &mut alerts,
            HealthSignal::LoopLatency,
            signals.loop_latency_ms,
            cfg.loop_latency_warn_ms,
            cfg.loop_latency_error_ms,
        );
        Self::check(
            &mut alerts,
            HealthSignal::SafetyRejections,
            u64::from(signals.safety_rejections_count),
            u64::from(cfg.safety_rejections_warn),
            u64::from(cfg.safety_rejections_error),
        );

        let has_error = alerts.iter().any(|a| a.severity >= AlertSeverity::Error);
        let has_warn = !alerts.is_empty();
        self.evaluations += 1;

        if has_error {
            self.error_cycles += 1;
            self.warn_cycle_count = 0;
            self.consecutive_errors += 1;
            debug!(
                consecutive_errors = self.consecutive_errors,
                max = self.config.max_consecutive_errors,
                "Watchdog cycle with ERROR breaches"
            );

            if !self.should_shutdown && self.consecutive_errors >= self.config.max_consecutive_errors {
                let reason = format!(
                    "{} consecutive watchdog cycles with ERROR breaches",
                    self.consecutive_errors
                );
                error!(consecutive_errors = self.consecutive_errors, "Watchdog latched shutdown");
                self.should_shutdown = true;
                self.shutdown_reason = Some(reason);
                alerts.push(WatchdogAlert::new(
                    HealthSignal::ConsecutiveErrors,
                    AlertSeverity::Critical,
                    u64::from(self.consecutive_errors),
                    u64::from(self.config.max_consecutive_errors),
                ));
            }
        } else {
            if self.consecutive_errors > 0 {
                info!(
                    previous = self.consecutive_errors,
                    "Watchdog cycle without ERROR breaches, resetting error streak"
                );
            }
            self.consecutive_errors = 0;

            if has_warn {
                self.warn_cycles += 1;
                self.warn_cycle_count += 1;
                if self.warn_cycle_count >= self.config.soft_reset_cycles {
                    info!(
                        warn_cycles = self.warn_cycle_count,
                        "Watchdog soft reset after consecutive WARN-only cycles"
                    );
                    self.soft_resets += 1;
                    self.warn_cycle_count = 0;
                }
            } else {
                self.healthy_cycles += 1;
                self.warn_cycle_count = 0;
            }
        }

        for alert in &alerts {
            alert.emit();
            self.recent_alerts.push_back(alert.clone());
        }
        while self.recent_alerts.len() > self.config.max_alerts {
            self.recent_alerts.pop_front();
        }

        let state = if self.should_shutdown {
            WatchdogState::Shutdown
        } else if has_error {
            WatchdogState::Error
        } else if has_warn {
            WatchdogState::Warn
        } else {
            WatchdogState::Healthy
        };

        WatchdogStatus {
            state,
            is_healthy: !has_error && !self.should_shutdown,
            alerts,
            consecutive_errors: self.consecutive_errors,
            warn_cycle_count: self.warn_cycle_count,
            should_shutdown: self.should_shutdown,
        }
    }

    /// Whether shutdown has latched. Never cleared.
    pub fn should_shutdown(&self) -> bool {
        self.should_shutdown
    }

    pub fn shutdown_reason(&self) -> Option<&str> {
        self.shutdown_reason.as_deref()
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    /// Most recent alerts, oldest first.
    pub fn recent_alerts(&self) -> impl Iterator<Item = &WatchdogAlert> {
        self.recent_alerts.iter()
    }

    pub fn get_stats(&self) -> WatchdogStats {
        WatchdogStats {
            evaluations: self.evaluations,
            healthy_cycles: self.healthy_cycles,
            warn_cycles: self.warn_cycles,
            error_cycles: self.error_cycles,
            soft_resets: self.soft_resets,
            consecutive_errors: self.consecutive_errors,
            warn_cycle_count: self.warn_cycle_count,
            should_shutdown: self.should_shutdown,
            shutdown_reason: self.shutdown_reason.clone(),
            retained_alerts: self.recent_alerts.len(),
        }
    }
}
