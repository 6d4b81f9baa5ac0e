//! Market and infrastructure risk classification.
//!
//! Every evaluation classifies the current state into a `RiskMode` from the
//! latest price volatility, WebSocket lag spikes, Redis heartbeat age and
//! loop latency. The mode is recomputed from scratch each time; nothing is
//! sticky. Sizing here is advisory. Hard operational limits live in the
//! live safety guard.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, info, warn};

use crate::config::RiskGatewayConfig;
use crate::exchange::HealthSignals;
use crate::utils::decimal::to_f64;

/// Risk mode, ordered from least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskMode {
    Normal,
    Cautious,
    Extreme,
    Blocked,
}

impl fmt::Display for RiskMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskMode::Normal => write!(f, "NORMAL"),
            RiskMode::Cautious => write!(f, "CAUTIOUS"),
            RiskMode::Extreme => write!(f, "EXTREME"),
            RiskMode::Blocked => write!(f, "BLOCKED"),
        }
    }
}

/// Advisory sizing decision for one tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskDecision {
    pub allow_trade: bool,
    pub risk_mode: RiskMode,
    pub position_size_multiplier: Decimal,
    /// Slippage tolerance in percent
    pub slippage_tolerance_pct: Decimal,
    pub block_reason: Option<String>,
}

impl RiskDecision {
    fn blocked(reason: String) -> Self {
        Self {
            allow_trade: false,
            risk_mode: RiskMode::Blocked,
            position_size_multiplier: Decimal::ZERO,
            slippage_tolerance_pct: Decimal::ZERO,
            block_reason: Some(reason),
        }
    }
}

/// Counters for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct RiskGatewayStats {
    pub evaluations: u64,
    pub normal: u64,
    pub cautious: u64,
    pub extreme: u64,
    pub blocked: u64,
    pub current_mode: Option<RiskMode>,
    pub last_volatility_pct: f64,
    pub lag_spikes_in_window: usize,
}

/// Rolling-window risk mode classifier.
#[derive(Debug)]
pub struct RiskGateway {
    config: RiskGatewayConfig,
    prices: VecDeque<Decimal>,
    lag_samples: VecDeque<u64>,
    current_mode: Option<RiskMode>,
    last_volatility_pct: f64,
    evaluations: u64,
    mode_counts: [u64; 4],
}

impl RiskGateway {
    pub fn new(config: RiskGatewayConfig) -> Self {
        Self {
            prices: VecDeque::with_capacity(config.price_window),
            lag_samples: VecDeque::with_capacity(config.lag_window),
            config,
            current_mode: None,
            last_volatility_pct: 0.0,
            evaluations: 0,
            mode_counts: [0; 4],
        }
    }

    /// Add a price to the volatility window. Non-positive prices are ignored.
    pub fn record_price(&mut self, price: Decimal) {
        if price <= Decimal::ZERO {
            warn!(price = %price, "Ignoring non-positive price sample");
            return;
        }
        self.prices.push_back(price);
        while self.prices.len() > self.config.price_window {
            self.prices.pop_front();
        }
    }

    /// Add a WebSocket lag sample to the spike window.
    pub fn record_ws_lag(&mut self, lag_ms: u64) {
        self.lag_samples.push_back(lag_ms);
        while self.lag_samples.len() > self.config.lag_window {
            self.lag_samples.pop_front();
        }
    }

    /// Population std-dev of tick-to-tick returns over the price window, in percent.
    pub fn volatility_pct(&self) -> f64 {
        if self.prices.len() < 3 {
            return 0.0;
        }

        let returns: Vec<f64> = self
            .prices
            .iter()
            .zip(self.prices.iter().skip(1))
            .map(|(prev, next)| to_f64((next - prev) / prev) * 100.0)
            .collect();

        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        variance.sqrt()
    }

    /// Lag samples above the spike threshold inside the window.
    pub fn lag_spike_count(&self) -> usize {
        self.lag_samples
            .iter()
            .filter(|lag| **lag > self.config.ws_lag_spike_ms)
            .count()
    }

    /// Record the tick's WS lag and classify the current state.
    pub fn evaluate(&mut self, signals: &HealthSignals) -> RiskDecision {
        self.record_ws_lag(signals.ws_lag_ms);
        self.last_volatility_pct = self.volatility_pct();

        let decision = self.classify(signals);

        self.evaluations += 1;
        self.mode_counts[decision.risk_mode as usize] += 1;

        if self.current_mode != Some(decision.risk_mode) {
            let previous = self
                .current_mode
                .map(|m| m.to_string())
                .unwrap_or_else(|| "NONE".to_string());
            if decision.risk_mode > RiskMode::Normal {
                warn!(
                    from = %previous,
                    to = %decision.risk_mode,
                    reason = ?decision.block_reason,
                    volatility_pct = self.last_volatility_pct,
                    "Risk mode changed"
                );
            } else {
                info!(from = %previous, to = %decision.risk_mode, "Risk mode changed");
            }
            self.current_mode = Some(decision.risk_mode);
        }

        decision
    }

    /// Classify without touching the windows or counters.
    pub fn classify(&self, signals: &HealthSignals) -> RiskDecision {
        let cfg = &self.config;
        let volatility = self.volatility_pct();
        let spikes = self.lag_spike_count();

        debug!(
            volatility_pct = volatility,
            lag_spikes = spikes,
            heartbeat_age_ms = signals.redis_heartbeat_age_ms,
            loop_latency_ms = signals.loop_latency_ms,
            "Classifying risk mode"
        );

        // Hard blocks, first match wins.
        if signals.redis_heartbeat_age_ms > cfg.heartbeat_error_ms {
            return RiskDecision::blocked(format!(
                "redis heartbeat age {}ms exceeds {}ms",
                signals.redis_heartbeat_age_ms, cfg.heartbeat_error_ms
            ));
        }
        if signals.loop_latency_ms > cfg.loop_latency_error_ms {
            return RiskDecision::blocked(format!(
                "loop latency {}ms exceeds {}ms",
                signals.loop_latency_ms, cfg.loop_latency_error_ms
            ));
        }
        if volatility > cfg.volatility_block_pct {
            return RiskDecision::blocked(format!(
                "volatility {:.4}% exceeds ceiling {:.4}%",
                volatility, cfg.volatility_block_pct
            ));
        }

        let mode = if volatility >= cfg.volatility_extreme_pct || spikes >= cfg.extreme_spike_count {
            RiskMode::Extreme
        } else if volatility >= cfg.volatility_cautious_pct
            || spikes >= cfg.cautious_spike_count
            || signals.redis_heartbeat_age_ms >= cfg.heartbeat_warn_ms
            || signals.loop_latency_ms >= cfg.loop_latency_warn_ms
        {
            RiskMode::Cautious
        } else {
            RiskMode::Normal
        };

        let (multiplier, slippage) = match mode {
            RiskMode::Normal => (cfg.normal_multiplier, cfg.normal_slippage_pct),
            RiskMode::Cautious => (cfg.cautious_multiplier, cfg.cautious_slippage_pct),
            _ => (cfg.extreme_multiplier, cfg.extreme_slippage_pct),
        };

        RiskDecision {
            allow_trade: true,
            risk_mode: mode,
            position_size_multiplier: multiplier,
            slippage_tolerance_pct: slippage,
            block_reason: None,
        }
    }

    /// Mode of the most recent evaluation.
    pub fn current_mode(&self) -> Option<RiskMode> {
        self.current_mode
    }

    pub fn get_stats(&self) -> RiskGatewayStats {
        RiskGatewayStats {
            evaluations: self.evaluations,
            normal: self.mode_counts[RiskMode::Normal as usize],
            cautious: self.mode_counts[RiskMode::Cautious as usize],
            extreme: self.mode_counts[RiskMode::Extreme as usize],
            blocked: self.mode_counts[RiskMode::Blocked as usize],
            current_mode: self.current_mode,
            last_volatility_pct: self.last_volatility_pct,
            lag_spikes_in_window: self.lag_spike_count(),
        }
    }
}
