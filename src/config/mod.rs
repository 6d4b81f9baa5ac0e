//! Configuration management for the arbitrage execution core.
//!
//! Loads settings from environment variables and config files. Every
//! threshold used by the guard layer is a named field so PAPER/LIVE/TEST
//! profiles can be injected without touching code.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating profile of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TradingProfile {
    /// Simulated fills through the fill model.
    #[default]
    Paper,
    /// Real orders behind the live safety guard.
    Live,
    /// Small windows and tight thresholds for tests.
    Test,
}

impl TradingProfile {
    /// Whether orders leave the process.
    pub fn is_live(&self) -> bool {
        matches!(self, TradingProfile::Live)
    }
}

impl fmt::Display for TradingProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingProfile::Paper => write!(f, "PAPER"),
            TradingProfile::Live => write!(f, "LIVE"),
            TradingProfile::Test => write!(f, "TEST"),
        }
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Operating profile
    #[serde(default)]
    pub profile: TradingProfile,
    /// Tick scope behaviour
    #[serde(default)]
    pub tick: TickConfig,
    /// Fill simulation parameters
    #[serde(default)]
    pub fill: FillConfig,
    /// Rolling risk metric windows
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Stress scenario parameters
    #[serde(default)]
    pub stress: StressConfig,
    /// Risk mode classification thresholds
    #[serde(default)]
    pub risk_gateway: RiskGatewayConfig,
    /// Last-mile live order limits
    #[serde(default)]
    pub live_guard: LiveGuardConfig,
    /// Exposure and position count caps
    #[serde(default)]
    pub position: PositionConfig,
    /// Stop-loss parameters
    #[serde(default)]
    pub stop_loss: StopLossConfig,
    /// Exposure rebalancing
    #[serde(default)]
    pub rebalance: RebalanceConfig,
    /// Health watchdog thresholds
    #[serde(default)]
    pub watchdog: WatchdogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickConfig {
    /// Forbid REST calls while an evaluation tick is running
    #[serde(default = "default_forbid_rest")]
    pub forbid_rest_during_evaluation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillConfig {
    /// Linear slippage coefficient applied to the size/volume ratio
    #[serde(default = "default_slippage_alpha")]
    pub slippage_alpha: Decimal,
    /// Share of quoted depth assumed to be actually fillable (0.0-1.0)
    #[serde(default = "default_available_volume_factor")]
    pub available_volume_factor: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Number of returns / PnL points kept in the rolling windows
    #[serde(default = "default_metrics_window")]
    pub window_size: usize,
    /// Confidence used for snapshot VaR / ES (e.g. 0.95)
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressConfig {
    /// Baseline adverse move used by the volatility spike scenario (0.02 = 2%)
    #[serde(default = "default_base_volatility")]
    pub base_volatility: Decimal,
    /// Baseline spread cost used by the spread widening scenario (0.001 = 10 bps)
    #[serde(default = "default_base_spread")]
    pub base_spread: Decimal,
    /// Loss rate per hour of exchange outage (0.005 = 0.5%/h)
    #[serde(default = "default_outage_hourly_loss_rate")]
    pub outage_hourly_loss_rate: Decimal,
    /// Multiplier for the standard volatility spike scenario
    #[serde(default = "default_volatility_spike_multiplier")]
    pub volatility_spike_multiplier: Decimal,
    /// Multiplier for the standard spread widening scenario
    #[serde(default = "default_spread_widening_multiplier")]
    pub spread_widening_multiplier: Decimal,
    /// Duration of the standard outage scenario in hours
    #[serde(default = "default_outage_hours")]
    pub outage_hours: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskGatewayConfig {
    /// Number of recent prices used for the volatility estimate
    #[serde(default = "default_price_window")]
    pub price_window: usize,
    /// Number of recent WS lag samples inspected for spikes
    #[serde(default = "default_lag_window")]
    pub lag_window: usize,
    /// WS lag above this counts as a spike
    #[serde(default = "default_ws_lag_spike_ms")]
    pub ws_lag_spike_ms: u64,
    /// Spike count that moves the mode to CAUTIOUS
    #[serde(default = "default_cautious_spike_count")]
    pub cautious_spike_count: usize,
    /// Spike count that moves the mode to EXTREME
    #[serde(default = "default_extreme_spike_count")]
    pub extreme_spike_count: usize,
    /// Volatility (std-dev of tick returns, in %) for CAUTIOUS
    #[serde(default = "default_volatility_cautious_pct")]
    pub volatility_cautious_pct: f64,
    /// Volatility for EXTREME
    #[serde(default = "default_volatility_extreme_pct")]
    pub volatility_extreme_pct: f64,
    /// Volatility ceiling above which trading is blocked
    #[serde(default = "default_volatility_block_pct")]
    pub volatility_block_pct: f64,
    /// Heartbeat age that moves the mode to CAUTIOUS
    #[serde(default = "default_heartbeat_warn_ms")]
    pub heartbeat_warn_ms: u64,
    /// Heartbeat age that blocks trading
    #[serde(default = "default_heartbeat_error_ms")]
    pub heartbeat_error_ms: u64,
    /// Loop latency that moves the mode to CAUTIOUS
    #[serde(default = "default_loop_latency_warn_ms")]
    pub loop_latency_warn_ms: u64,
    /// Loop latency that blocks trading
    #[serde(default = "default_loop_latency_error_ms")]
    pub loop_latency_error_ms: u64,
    /// Position size multiplier per mode
    #[serde(default = "default_normal_multiplier")]
    pub normal_multiplier: Decimal,
    #[serde(default = "default_cautious_multiplier")]
    pub cautious_multiplier: Decimal,
    #[serde(default = "default_extreme_multiplier")]
    pub extreme_multiplier: Decimal,
    /// Slippage tolerance per mode, in percent
    #[serde(default = "default_normal_slippage_pct")]
    pub normal_slippage_pct: Decimal,
    #[serde(default = "default_cautious_slippage_pct")]
    pub cautious_slippage_pct: Decimal,
    #[serde(default = "default_extreme_slippage_pct")]
    pub extreme_slippage_pct: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveGuardConfig {
    /// Master switch; a disabled guard blocks every live order
    #[serde(default)]
    pub enabled: bool,
    /// Symbols allowed to trade live
    #[serde(default = "default_allowed_symbols")]
    pub allowed_symbols: Vec<String>,
    /// Minimum account balance required to send an order
    #[serde(default = "default_min_balance")]
    pub min_balance: Decimal,
    /// Daily realized loss that stops the session
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss: Decimal,
    /// Maximum notional per order
    #[serde(default = "default_max_notional_per_trade")]
    pub max_notional_per_trade: Decimal,
    /// Quantity scale applied to allowed live orders (0.01 = 1%)
    #[serde(default = "default_dry_run_scale")]
    pub dry_run_scale: Decimal,
    /// Lot size used to round scaled quantities down (0 = no rounding)
    #[serde(default)]
    pub lot_size: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionConfig {
    /// Maximum total notional of open positions
    #[serde(default = "default_max_exposure")]
    pub max_exposure: Decimal,
    /// Maximum number of concurrently open positions
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: usize,
}

/// How the stop trigger distance is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StopLossMode {
    /// Fixed percentage from entry
    #[default]
    Static,
    /// Multiple of the rolling average true range
    Atr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopLossConfig {
    #[serde(default)]
    pub mode: StopLossMode,
    /// Distance from entry for static stops (0.02 = 2%)
    #[serde(default = "default_static_stop_pct")]
    pub static_pct: Decimal,
    /// Number of true-range samples averaged into the ATR
    #[serde(default = "default_atr_window")]
    pub atr_window: usize,
    /// Stop distance in ATRs
    #[serde(default = "default_atr_multiplier")]
    pub atr_multiplier: Decimal,
    /// ATR stops fall back to static until this many samples exist
    #[serde(default = "default_min_atr_samples")]
    pub min_atr_samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceConfig {
    /// Exposure above which positions are trimmed
    #[serde(default = "default_max_exposure")]
    pub exposure_ceiling: Decimal,
    /// Trim the last selected position partially instead of closing it
    #[serde(default)]
    pub trim_partially: bool,
    /// Shrink the ceiling by the current risk-mode size multiplier
    #[serde(default)]
    pub scale_with_risk_mode: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_ws_lag_warn_ms")]
    pub ws_lag_warn_ms: u64,
    #[serde(default = "default_ws_lag_error_ms")]
    pub ws_lag_error_ms: u64,
    #[serde(default = "default_heartbeat_warn_ms")]
    pub heartbeat_warn_ms: u64,
    #[serde(default = "default_heartbeat_error_ms")]
    pub heartbeat_error_ms: u64,
    #[serde(default = "default_loop_latency_warn_ms")]
    pub loop_latency_warn_ms: u64,
    #[serde(default = "default_loop_latency_error_ms")]
    pub loop_latency_error_ms: u64,
    #[serde(default = "default_safety_rejections_warn")]
    pub safety_rejections_warn: u32,
    #[serde(default = "default_safety_rejections_error")]
    pub safety_rejections_error: u32,
    /// Consecutive ERROR evaluations that latch shutdown
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
    /// Consecutive WARN-only evaluations before a soft reset
    #[serde(default = "default_soft_reset_cycles")]
    pub soft_reset_cycles: u32,
    /// Maximum alerts retained for inspection
    #[serde(default = "default_max_alerts")]
    pub max_alerts: usize,
}

// Default value functions
fn default_forbid_rest() -> bool {
    true
}

fn default_slippage_alpha() -> Decimal {
    Decimal::new(1, 3) // 0.001 per unit of size/volume
}

fn default_available_volume_factor() -> Decimal {
    Decimal::ONE
}

fn default_metrics_window() -> usize {
    500
}

fn default_confidence() -> f64 {
    0.95
}

fn default_base_volatility() -> Decimal {
    Decimal::new(2, 2) // 0.02
}

fn default_base_spread() -> Decimal {
    Decimal::new(1, 3) // 0.001 (10 bps)
}

fn default_outage_hourly_loss_rate() -> Decimal {
    Decimal::new(5, 3) // 0.005 per hour
}

fn default_volatility_spike_multiplier() -> Decimal {
    Decimal::new(3, 0)
}

fn default_spread_widening_multiplier() -> Decimal {
    Decimal::new(5, 0)
}

fn default_outage_hours() -> Decimal {
    Decimal::new(4, 0)
}

fn default_price_window() -> usize {
    60
}

fn default_lag_window() -> usize {
    30
}

fn default_ws_lag_spike_ms() -> u64 {
    500
}

fn default_cautious_spike_count() -> usize {
    3
}

fn default_extreme_spike_count() -> usize {
    6
}

fn default_volatility_cautious_pct() -> f64 {
    0.15
}

fn default_volatility_extreme_pct() -> f64 {
    0.40
}

fn default_volatility_block_pct() -> f64 {
    1.0
}

fn default_heartbeat_warn_ms() -> u64 {
    2_000
}

fn default_heartbeat_error_ms() -> u64 {
    5_000
}

fn default_loop_latency_warn_ms() -> u64 {
    200
}

fn default_loop_latency_error_ms() -> u64 {
    1_000
}

fn default_normal_multiplier() -> Decimal {
    Decimal::ONE
}

fn default_cautious_multiplier() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_extreme_multiplier() -> Decimal {
    Decimal::new(1, 1) // 0.1
}

fn default_normal_slippage_pct() -> Decimal {
    Decimal::new(5, 2) // 0.05%
}

fn default_cautious_slippage_pct() -> Decimal {
    Decimal::new(10, 2) // 0.10%
}

fn default_extreme_slippage_pct() -> Decimal {
    Decimal::new(20, 2) // 0.20%
}

fn default_allowed_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}

fn default_min_balance() -> Decimal {
    Decimal::new(100, 0)
}

fn default_max_daily_loss() -> Decimal {
    Decimal::new(50, 0)
}

fn default_max_notional_per_trade() -> Decimal {
    Decimal::new(500, 0)
}

fn default_dry_run_scale() -> Decimal {
    Decimal::new(1, 2) // 0.01
}

fn default_max_exposure() -> Decimal {
    Decimal::new(10_000, 0)
}

fn default_max_open_positions() -> usize {
    5
}

fn default_static_stop_pct() -> Decimal {
    Decimal::new(2, 2) // 0.02
}

fn default_atr_window() -> usize {
    14
}

fn default_atr_multiplier() -> Decimal {
    Decimal::new(2, 0)
}

fn default_min_atr_samples() -> usize {
    3
}

fn default_ws_lag_warn_ms() -> u64 {
    500
}

fn default_ws_lag_error_ms() -> u64 {
    2_000
}

fn default_safety_rejections_warn() -> u32 {
    3
}

fn default_safety_rejections_error() -> u32 {
    10
}

fn default_max_consecutive_errors() -> u32 {
    3
}

fn default_soft_reset_cycles() -> u32 {
    5
}

fn default_max_alerts() -> usize {
    100
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("ARB"))
            .build()
            .context("Failed to build configuration")?;

        let config: Config = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults tuned for a given profile.
    pub fn for_profile(profile: TradingProfile) -> Self {
        let mut config = Self {
            profile,
            ..Self::default()
        };

        match profile {
            TradingProfile::Paper => {}
            TradingProfile::Live => {
                config.live_guard.enabled = true;
                config.position.max_exposure = Decimal::new(1_000, 0);
                config.rebalance.exposure_ceiling = Decimal::new(1_000, 0);
                config.position.max_open_positions = 2;
            }
            TradingProfile::Test => {
                config.metrics.window_size = 20;
                config.risk_gateway.price_window = 10;
                config.risk_gateway.lag_window = 5;
                config.risk_gateway.cautious_spike_count = 2;
                config.risk_gateway.extreme_spike_count = 4;
                config.stop_loss.atr_window = 5;
                config.watchdog.soft_reset_cycles = 3;
                config.watchdog.max_alerts = 20;
            }
        }

        config
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            self.fill.slippage_alpha >= Decimal::ZERO,
            "slippage_alpha must be non-negative"
        );

        anyhow::ensure!(
            self.fill.available_volume_factor > Decimal::ZERO
                && self.fill.available_volume_factor <= Decimal::ONE,
            "available_volume_factor must be between 0 and 1"
        );

        anyhow::ensure!(
            self.metrics.window_size >= 2,
            "metrics window_size must be at least 2"
        );

        anyhow::ensure!(
            self.metrics.confidence > 0.0 && self.metrics.confidence < 1.0,
            "metrics confidence must be strictly between 0 and 1"
        );

        anyhow::ensure!(
            self.stress.base_volatility >= Decimal::ZERO
                && self.stress.base_spread >= Decimal::ZERO
                && self.stress.outage_hourly_loss_rate >= Decimal::ZERO,
            "stress base rates must be non-negative"
        );

        let gw = &self.risk_gateway;
        anyhow::ensure!(
            gw.price_window >= 2 && gw.lag_window >= 1,
            "risk gateway windows are too small"
        );
        anyhow::ensure!(
            gw.cautious_spike_count <= gw.extreme_spike_count,
            "cautious_spike_count must be <= extreme_spike_count"
        );
        anyhow::ensure!(
            gw.volatility_cautious_pct <= gw.volatility_extreme_pct
                && gw.volatility_extreme_pct <= gw.volatility_block_pct,
            "volatility thresholds must be ordered cautious <= extreme <= block"
        );
        anyhow::ensure!(
            gw.heartbeat_warn_ms <= gw.heartbeat_error_ms
                && gw.loop_latency_warn_ms <= gw.loop_latency_error_ms,
            "risk gateway warn thresholds must not exceed error thresholds"
        );
        anyhow::ensure!(
            gw.normal_multiplier <= Decimal::ONE
                && gw.normal_multiplier >= gw.cautious_multiplier
                && gw.cautious_multiplier >= gw.extreme_multiplier
                && gw.extreme_multiplier >= Decimal::ZERO,
            "size multipliers must satisfy 1 >= normal >= cautious >= extreme >= 0"
        );
        anyhow::ensure!(
            gw.normal_slippage_pct <= gw.cautious_slippage_pct
                && gw.cautious_slippage_pct <= gw.extreme_slippage_pct,
            "slippage tolerance must widen with the risk mode"
        );

        let guard = &self.live_guard;
        anyhow::ensure!(
            guard.dry_run_scale > Decimal::ZERO && guard.dry_run_scale <= Decimal::ONE,
            "dry_run_scale must be between 0 and 1"
        );
        anyhow::ensure!(
            guard.max_daily_loss >= Decimal::ZERO
                && guard.max_notional_per_trade > Decimal::ZERO
                && guard.lot_size >= Decimal::ZERO,
            "live guard limits must be non-negative"
        );

        anyhow::ensure!(
            self.position.max_exposure > Decimal::ZERO && self.position.max_open_positions > 0,
            "position caps must be positive"
        );

        anyhow::ensure!(
            self.rebalance.exposure_ceiling > Decimal::ZERO,
            "exposure_ceiling must be positive"
        );

        let stop = &self.stop_loss;
        anyhow::ensure!(
            stop.static_pct > Decimal::ZERO && stop.static_pct < Decimal::ONE,
            "static stop pct must be between 0 and 1"
        );
        anyhow::ensure!(
            stop.atr_window > 0 && stop.min_atr_samples <= stop.atr_window,
            "min_atr_samples must fit inside atr_window"
        );
        anyhow::ensure!(
            stop.atr_multiplier > Decimal::ZERO,
            "atr_multiplier must be positive"
        );

        let wd = &self.watchdog;
        anyhow::ensure!(
            wd.ws_lag_warn_ms <= wd.ws_lag_error_ms
                && wd.heartbeat_warn_ms <= wd.heartbeat_error_ms
                && wd.loop_latency_warn_ms <= wd.loop_latency_error_ms
                && wd.safety_rejections_warn <= wd.safety_rejections_error,
            "watchdog warn thresholds must not exceed error thresholds"
        );
        anyhow::ensure!(
            wd.max_consecutive_errors >= 1 && wd.soft_reset_cycles >= 1,
            "watchdog cycle limits must be at least 1"
        );

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: TradingProfile::Paper,
            tick: TickConfig::default(),
            fill: FillConfig::default(),
            metrics: MetricsConfig::default(),
            stress: StressConfig::default(),
            risk_gateway: RiskGatewayConfig::default(),
            live_guard: LiveGuardConfig::default(),
            position: PositionConfig::default(),
            stop_loss: StopLossConfig::default(),
            rebalance: RebalanceConfig::default(),
            watchdog: WatchdogConfig::default(),
        }
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            forbid_rest_during_evaluation: default_forbid_rest(),
        }
    }
}

impl Default for FillConfig {
    fn default() -> Self {
        Self {
            slippage_alpha: default_slippage_alpha(),
            available_volume_factor: default_available_volume_factor(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            window_size: default_metrics_window(),
            confidence: default_confidence(),
        }
    }
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            base_volatility: default_base_volatility(),
            base_spread: default_base_spread(),
            outage_hourly_loss_rate: default_outage_hourly_loss_rate(),
            volatility_spike_multiplier: default_volatility_spike_multiplier(),
            spread_widening_multiplier: default_spread_widening_multiplier(),
            outage_hours: default_outage_hours(),
        }
    }
}

impl Default for RiskGatewayConfig {
    fn default() -> Self {
        Self {
            price_window: default_price_window(),
            lag_window: default_lag_window(),
            ws_lag_spike_ms: default_ws_lag_spike_ms(),
            cautious_spike_count: default_cautious_spike_count(),
            extreme_spike_count: default_extreme_spike_count(),
            volatility_cautious_pct: default_volatility_cautious_pct(),
            volatility_extreme_pct: default_volatility_extreme_pct(),
            volatility_block_pct: default_volatility_block_pct(),
            heartbeat_warn_ms: default_heartbeat_warn_ms(),
            heartbeat_error_ms: default_heartbeat_error_ms(),
            loop_latency_warn_ms: default_loop_latency_warn_ms(),
            loop_latency_error_ms: default_loop_latency_error_ms(),
            normal_multiplier: default_normal_multiplier(),
            cautious_multiplier: default_cautious_multiplier(),
            extreme_multiplier: default_extreme_multiplier(),
            normal_slippage_pct: default_normal_slippage_pct(),
            cautious_slippage_pct: default_cautious_slippage_pct(),
            extreme_slippage_pct: default_extreme_slippage_pct(),
        }
    }
}

impl Default for LiveGuardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_symbols: default_allowed_symbols(),
            min_balance: default_min_balance(),
            max_daily_loss: default_max_daily_loss(),
            max_notional_per_trade: default_max_notional_per_trade(),
            dry_run_scale: default_dry_run_scale(),
            lot_size: Decimal::ZERO,
        }
    }
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            max_exposure: default_max_exposure(),
            max_open_positions: default_max_open_positions(),
        }
    }
}

impl Default for StopLossConfig {
    fn default() -> Self {
        Self {
            mode: StopLossMode::Static,
            static_pct: default_static_stop_pct(),
            atr_window: default_atr_window(),
            atr_multiplier: default_atr_multiplier(),
            min_atr_samples: default_min_atr_samples(),
        }
    }
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            exposure_ceiling: default_max_exposure(),
            trim_partially: false,
            scale_with_risk_mode: false,
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            ws_lag_warn_ms: default_ws_lag_warn_ms(),
            ws_lag_error_ms: default_ws_lag_error_ms(),
            heartbeat_warn_ms: default_heartbeat_warn_ms(),
            heartbeat_error_ms: default_heartbeat_error_ms(),
            loop_latency_warn_ms: default_loop_latency_warn_ms(),
            loop_latency_error_ms: default_loop_latency_error_ms(),
            safety_rejections_warn: default_safety_rejections_warn(),
            safety_rejections_error: default_safety_rejections_error(),
            max_consecutive_errors: default_max_consecutive_errors(),
            soft_reset_cycles: default_soft_reset_cycles(),
            max_alerts: default_max_alerts(),
        }
    }
}
