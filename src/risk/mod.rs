//! Risk management for the arbitrage execution core.
//!
//! Independent guards consulted every tick:
//! - Market/infra risk mode classification (advisory sizing)
//! - Last-mile live order limits with session stop
//! - Health watchdog with shutdown latch
//! - Rolling VaR / Expected Shortfall / drawdown / Sharpe metrics
//! - Deterministic stress scenarios

pub mod alert;
mod gateway;
mod live_guard;
mod metrics;
mod stress;
mod watchdog;

pub use alert::AlertSeverity;
pub use gateway::{RiskDecision, RiskGateway, RiskGatewayStats, RiskMode};
pub use live_guard::{GuardDecision, GuardStats, LiveSafetyGuard};
pub use metrics::{QuantRiskMetrics, RiskMetricsSnapshot};
pub use stress::{estimate_loss, standard_scenarios, StressResult, StressScenario};
pub use watchdog::{
    HealthSignal, WatchdogAlert, WatchdogState, WatchdogStateMachine, WatchdogStats, WatchdogStatus,
};
