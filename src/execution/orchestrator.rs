//! Per-tick execution pipeline.
//!
//! `evaluate` runs one opportunity through every guard inside a tick that
//! forbids REST calls:
//! 1. risk mode classification
//! 2. health watchdog (shutdown is terminal)
//! 3. mark-to-market and stop-loss closes
//! 4. live safety guard (live profile) or fill simulation (paper/test),
//!    both gated on the position caps
//! 5. exposure rebalancing
//! 6. realized returns into the risk metrics
//!
//! Live orders are never sent from inside `evaluate`. An allowed live order
//! comes back as `pending_live_order` and is sent by `submit_live`.

use anyhow::Context;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::fill::{FillResult, FillSimulationModel, FillStats, FillStatus};
use crate::config::{Config, TradingProfile};
use crate::error::{EngineError, EngineResult};
use crate::exchange::{
    AccountSnapshot, FillAck, HealthSignals, OrderGateway, OrderIntent, OrderSide, SpreadOpportunity,
};
use crate::position::{ClosedTrade, OpenOutcome, PositionDelta, PositionLifecycleManager, PositionStats};
use crate::risk::alert::{self, AlertSeverity};
use crate::risk::{
    GuardDecision, GuardStats, LiveSafetyGuard, QuantRiskMetrics, RiskDecision, RiskGateway,
    RiskGatewayStats, RiskMetricsSnapshot, StressResult, WatchdogStateMachine, WatchdogStats,
    WatchdogStatus,
};
use crate::tick::{TickScope, TickStats};
use crate::utils::decimal::to_f64;

/// Everything decided during one tick.
#[must_use = "an evaluation may carry a pending live order or a session stop"]
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub symbol: String,
    pub profile: TradingProfile,
    pub risk_decision: RiskDecision,
    /// Live profile only
    pub guard_decision: Option<GuardDecision>,
    /// Paper/test profile only
    pub fill_result: Option<FillResult>,
    pub position_delta: Option<PositionDelta>,
    pub watchdog_status: WatchdogStatus,
    /// Requested quantity after risk-mode sizing
    pub sized_quantity: Decimal,
    /// Allowed live order awaiting `submit_live`
    pub pending_live_order: Option<OrderIntent>,
    /// Set when the position caps could not take the order
    pub capacity_refusal: Option<String>,
}

impl EvaluationResult {
    /// Whether the tick stopped the live session.
    pub fn session_stop(&self) -> bool {
        self.guard_decision
            .as_ref()
            .map(GuardDecision::session_stop)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStats {
    pub profile: TradingProfile,
    pub evaluations: u64,
    pub risk_blocks: u64,
    pub guard_blocks: u64,
    pub capacity_blocks: u64,
    pub fills: u64,
    pub partial_fills: u64,
    pub rejected_fills: u64,
    pub live_orders_submitted: u64,
    pub live_orders_failed: u64,
    pub unbooked_live_fills: u64,
    pub shutdown: bool,
    pub session_stopped: bool,
    pub tick: TickStats,
    pub fill: FillStats,
    pub risk_gateway: RiskGatewayStats,
    pub live_guard: GuardStats,
    pub positions: PositionStats,
    pub watchdog: WatchdogStats,
    pub metrics: RiskMetricsSnapshot,
}

#[derive(Debug, Default)]
struct Counters {
    evaluations: AtomicU64,
    risk_blocks: AtomicU64,
    guard_blocks: AtomicU64,
    capacity_blocks: AtomicU64,
    fills: AtomicU64,
    partial_fills: AtomicU64,
    rejected_fills: AtomicU64,
    live_orders_submitted: AtomicU64,
    live_orders_failed: AtomicU64,
    unbooked_live_fills: AtomicU64,
}

#[derive(Serialize)]
struct UnbookedFillAlert<'a> {
    timestamp: DateTime<Utc>,
    kind: &'static str,
    order_id: &'a str,
    symbol: &'a str,
    side: OrderSide,
    quantity: Decimal,
    price: Decimal,
    reason: &'a str,
}

/// Composes the guards, the fill model and the position manager.
pub struct ExecutionOrchestrator {
    profile: TradingProfile,
    forbid_rest_during_evaluation: bool,
    tick_scope: TickScope,
    fill_model: FillSimulationModel,
    risk_gateway: Mutex<RiskGateway>,
    watchdog: Mutex<WatchdogStateMachine>,
    metrics: Mutex<QuantRiskMetrics>,
    live_guard: LiveSafetyGuard,
    positions: PositionLifecycleManager,
    order_gateway: Option<Arc<dyn OrderGateway>>,
    shutdown: AtomicBool,
    shutdown_reason: Mutex<Option<String>>,
    session_stopped: AtomicBool,
    session_stop_reason: Mutex<Option<String>>,
    counters: Counters,
}

impl ExecutionOrchestrator {
    /// Validate `config` once and build every component from it.
    pub fn new(config: &Config, tick_scope: TickScope) -> anyhow::Result<Self> {
        config
            .validate()
            .context("invalid execution configuration")?;
        info!(profile = %config.profile, "Execution orchestrator initialized");
        Ok(Self {
            profile: config.profile,
            forbid_rest_during_evaluation: config.tick.forbid_rest_during_evaluation,
            tick_scope,
            fill_model: FillSimulationModel::new(&config.fill),
            risk_gateway: Mutex::new(RiskGateway::new(config.risk_gateway.clone())),
            watchdog: Mutex::new(WatchdogStateMachine::new(config.watchdog.clone())),
            metrics: Mutex::new(QuantRiskMetrics::new(&config.metrics, config.stress.clone())),
            live_guard: LiveSafetyGuard::new(config.live_guard.clone()),
            positions: PositionLifecycleManager::new(
                &config.position,
                config.stop_loss.clone(),
                config.rebalance.clone(),
            ),
            order_gateway: None,
            shutdown: AtomicBool::new(false),
            shutdown_reason: Mutex::new(None),
            session_stopped: AtomicBool::new(false),
            session_stop_reason: Mutex::new(None),
            counters: Counters::default(),
        })
    }

    /// Attach the venue used by `submit_live`.
    pub fn with_order_gateway(mut self, gateway: Arc<dyn OrderGateway>) -> Self {
        self.order_gateway = Some(gateway);
        self
    }

    fn shutdown_error(&self) -> EngineError {
        let reason = self
            .shutdown_reason
            .lock()
            .clone()
            .unwrap_or_else(|| "watchdog shutdown".to_string());
        EngineError::ShutdownRequested { reason }
    }

    /// Run one opportunity through the pipeline.
    pub fn evaluate(
        &self,
        opportunity: &SpreadOpportunity,
        health: &HealthSignals,
        account: &AccountSnapshot,
    ) -> EngineResult<EvaluationResult> {
        if self.is_shutdown() {
            return Err(self.shutdown_error());
        }

        let _tick = self.tick_scope.enter_tick(self.forbid_rest_during_evaluation);
        self.counters.evaluations.fetch_add(1, Ordering::Relaxed);

        let symbol = opportunity.symbol.as_str();
        let price = opportunity.price;

        let risk_decision = {
            let mut gateway = self.risk_gateway.lock();
            gateway.record_price(price);
            gateway.evaluate(health)
        };

        let watchdog_status = self.watchdog.lock().evaluate(health);
        if watchdog_status.should_shutdown {
            self.latch_shutdown();
            return Err(self.shutdown_error());
        }

        let mut delta = PositionDelta::default();

        self.positions.record_price(symbol, price);
        self.positions.mark_price(symbol, price);
        delta.closed.extend(self.positions.run_stop_losses());

        let mut result = EvaluationResult {
            symbol: symbol.to_string(),
            profile: self.profile,
            risk_decision: risk_decision.clone(),
            guard_decision: None,
            fill_result: None,
            position_delta: None,
            watchdog_status,
            sized_quantity: Decimal::ZERO,
            pending_live_order: None,
            capacity_refusal: None,
        };

        if !risk_decision.allow_trade {
            self.counters.risk_blocks.fetch_add(1, Ordering::Relaxed);
            debug!(
                symbol = %symbol,
                reason = ?risk_decision.block_reason,
                "Opportunity blocked by risk gateway"
            );
            self.record_closed_trades(&delta.closed);
            result.position_delta = Some(delta).filter(|d| !d.is_empty());
            return Ok(result);
        }

        let quantity = opportunity.requested_quantity * risk_decision.position_size_multiplier;
        result.sized_quantity = quantity;
        let intent = opportunity.to_intent(quantity);

        if self.profile.is_live() {
            let decision = self.live_guard.check_before_send_order(
                symbol,
                intent.notional(),
                account.balance,
                self.positions.daily_loss(),
            );

            match &decision {
                GuardDecision::Allowed => {
                    let scaled = self.live_guard.apply_dry_run_scale(quantity);
                    if scaled > Decimal::ZERO {
                        match self.capacity_refusal(symbol, intent.side, scaled, intent.target_price) {
                            Some(reason) => result.capacity_refusal = Some(reason),
                            None => result.pending_live_order = Some(intent.with_quantity(scaled)),
                        }
                    } else {
                        debug!(symbol = %symbol, quantity = %quantity, "Dry-run scaled quantity rounds to zero");
                    }
                }
                GuardDecision::Blocked { .. } => {
                    self.counters.guard_blocks.fetch_add(1, Ordering::Relaxed);
                }
                GuardDecision::SessionStop { reason } => {
                    self.counters.guard_blocks.fetch_add(1, Ordering::Relaxed);
                    self.latch_session_stop(reason);
                }
            }
            result.guard_decision = Some(decision);
        } else if let Some(reason) =
            self.capacity_refusal(symbol, intent.side, quantity, intent.target_price)
        {
            result.capacity_refusal = Some(reason);
        } else {
            let fill = self.fill_model.simulate(&intent, opportunity.available_volume);
            fill.validate(intent.requested_quantity)?;

            // Slippage can push the executed notional past the cap.
            let refusal = fill
                .has_fill()
                .then(|| {
                    self.capacity_refusal(
                        symbol,
                        intent.side,
                        fill.filled_quantity,
                        fill.effective_price,
                    )
                })
                .flatten();

            if let Some(reason) = refusal {
                result.capacity_refusal = Some(reason);
            } else {
                match fill.status {
                    FillStatus::Filled => self.counters.fills.fetch_add(1, Ordering::Relaxed),
                    FillStatus::Partial => self.counters.partial_fills.fetch_add(1, Ordering::Relaxed),
                    FillStatus::Rejected => self.counters.rejected_fills.fetch_add(1, Ordering::Relaxed),
                };

                if fill.has_fill() {
                    let opened = self.positions.apply_fill(
                        symbol,
                        intent.side,
                        fill.filled_quantity,
                        fill.effective_price,
                    );
                    if let Some(outcome) = opened.open.as_ref().filter(|o| !o.is_created()) {
                        warn!(symbol = %symbol, outcome = ?outcome, "Filled quantity did not open a position");
                    }
                    delta.extend(opened);
                }
                result.fill_result = Some(fill);
            }
        }

        delta
            .closed
            .extend(self.positions.rebalance(risk_decision.position_size_multiplier));

        self.record_closed_trades(&delta.closed);
        result.position_delta = Some(delta).filter(|d| !d.is_empty());

        debug!(
            symbol = %symbol,
            mode = %result.risk_decision.risk_mode,
            sized_quantity = %result.sized_quantity,
            exposure = %self.positions.exposure(),
            "Tick evaluated"
        );
        Ok(result)
    }

    /// Send an allowed live order and apply the venue's fill.
    ///
    /// The REST call is recorded inside a permissive tick; the network
    /// await itself happens outside any tick.
    pub async fn submit_live(&self, intent: OrderIntent) -> EngineResult<PositionDelta> {
        if self.is_shutdown() {
            return Err(self.shutdown_error());
        }
        if self.is_session_stopped() {
            let reason = self
                .session_stop_reason
                .lock()
                .clone()
                .or_else(|| self.live_guard.get_stats().session_stop_reason)
                .unwrap_or_else(|| "session stopped".to_string());
            return Err(EngineError::SessionStopped { reason });
        }

        let gateway = self
            .order_gateway
            .clone()
            .ok_or_else(|| EngineError::Gateway(anyhow::anyhow!("no order gateway configured")))?;

        self.tick_scope
            .run(false, || self.tick_scope.record_rest_call("order/submit"));

        let ack = match gateway.submit_order(&intent).await {
            Ok(ack) => ack,
            Err(e) => {
                self.counters.live_orders_failed.fetch_add(1, Ordering::Relaxed);
                warn!(symbol = %intent.symbol, error = %e, "Live order submission failed");
                return Err(EngineError::Gateway(e));
            }
        };
        self.counters.live_orders_submitted.fetch_add(1, Ordering::Relaxed);

        Self::validate_ack(&intent, &ack)?;
        if ack.executed_quantity.is_zero() {
            info!(order_id = %ack.order_id, "Live order acknowledged without execution");
            return Ok(PositionDelta::default());
        }

        let delta = self.positions.apply_fill(
            &ack.symbol,
            ack.side,
            ack.executed_quantity,
            ack.average_price,
        );
        self.record_closed_trades(&delta.closed);

        if let Some(OpenOutcome::NotCreated { reason }) = &delta.open {
            return Err(self.unbooked_fill(&ack, reason));
        }

        info!(
            order_id = %ack.order_id,
            symbol = %ack.symbol,
            side = %ack.side,
            quantity = %ack.executed_quantity,
            price = %ack.average_price,
            "Live fill applied"
        );
        Ok(delta)
    }

    fn capacity_refusal(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> Option<String> {
        let reason = self.positions.capacity_refusal(symbol, side, quantity, price)?;
        self.counters.capacity_blocks.fetch_add(1, Ordering::Relaxed);
        warn!(symbol = %symbol, side = %side, quantity = %quantity, reason = %reason, "Order exceeds position capacity");
        Some(reason)
    }

    /// A venue fill the book refused: alert, stop the live session and
    /// surface the error so the position gets reconciled by hand.
    fn unbooked_fill(&self, ack: &FillAck, reason: &str) -> EngineError {
        self.counters.unbooked_live_fills.fetch_add(1, Ordering::Relaxed);
        alert::emit(
            AlertSeverity::Critical,
            &UnbookedFillAlert {
                timestamp: Utc::now(),
                kind: "unbooked_live_fill",
                order_id: &ack.order_id,
                symbol: &ack.symbol,
                side: ack.side,
                quantity: ack.executed_quantity,
                price: ack.average_price,
                reason,
            },
        );
        self.latch_session_stop(&format!("unbooked live fill {} on {}", ack.order_id, ack.symbol));
        EngineError::UnbookedFill {
            order_id: ack.order_id.clone(),
            symbol: ack.symbol.clone(),
            reason: reason.to_string(),
        }
    }

    fn latch_session_stop(&self, reason: &str) {
        if self.session_stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        error!(reason = %reason, "Live session stopped");
        *self.session_stop_reason.lock() = Some(reason.to_string());
    }

    fn validate_ack(intent: &OrderIntent, ack: &FillAck) -> EngineResult<()> {
        if ack.symbol != intent.symbol || ack.side != intent.side {
            return Err(EngineError::invariant(format!(
                "ack {} {} does not match intent {} {}",
                ack.side, ack.symbol, intent.side, intent.symbol
            )));
        }
        if ack.executed_quantity < Decimal::ZERO || ack.executed_quantity > intent.requested_quantity {
            return Err(EngineError::invariant(format!(
                "executed quantity {} outside [0, {}]",
                ack.executed_quantity, intent.requested_quantity
            )));
        }
        if ack.executed_quantity > Decimal::ZERO && ack.average_price <= Decimal::ZERO {
            return Err(EngineError::invariant(format!(
                "non-positive average price {} on a fill",
                ack.average_price
            )));
        }
        Ok(())
    }

    fn record_closed_trades(&self, closed: &[ClosedTrade]) {
        if closed.is_empty() {
            return;
        }
        let cumulative = to_f64(self.positions.realized_total());
        let mut metrics = self.metrics.lock();
        for trade in closed {
            metrics.record_return(to_f64(trade.return_pct()));
        }
        metrics.record_pnl(cumulative);
    }

    fn latch_shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        let reason = self
            .watchdog
            .lock()
            .shutdown_reason()
            .unwrap_or("watchdog shutdown")
            .to_string();
        error!(reason = %reason, "Shutdown latched, no further opportunities will be evaluated");
        *self.shutdown_reason.lock() = Some(reason);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Whether live orders are refused for the rest of the process.
    pub fn is_session_stopped(&self) -> bool {
        self.session_stopped.load(Ordering::Acquire) || self.live_guard.is_session_stopped()
    }

    pub fn positions(&self) -> &PositionLifecycleManager {
        &self.positions
    }

    pub fn tick_scope(&self) -> &TickScope {
        &self.tick_scope
    }

    pub fn metrics_snapshot(&self) -> RiskMetricsSnapshot {
        self.metrics.lock().snapshot()
    }

    /// Standard stress scenarios on the current exposure.
    pub fn stress_test_suite(&self) -> Vec<StressResult> {
        let exposure = self.positions.exposure();
        self.metrics.lock().stress_test_suite(exposure)
    }

    pub fn get_stats(&self) -> OrchestratorStats {
        let c = &self.counters;
        OrchestratorStats {
            profile: self.profile,
            evaluations: c.evaluations.load(Ordering::Relaxed),
            risk_blocks: c.risk_blocks.load(Ordering::Relaxed),
            guard_blocks: c.guard_blocks.load(Ordering::Relaxed),
            capacity_blocks: c.capacity_blocks.load(Ordering::Relaxed),
            fills: c.fills.load(Ordering::Relaxed),
            partial_fills: c.partial_fills.load(Ordering::Relaxed),
            rejected_fills: c.rejected_fills.load(Ordering::Relaxed),
            live_orders_submitted: c.live_orders_submitted.load(Ordering::Relaxed),
            live_orders_failed: c.live_orders_failed.load(Ordering::Relaxed),
            unbooked_live_fills: c.unbooked_live_fills.load(Ordering::Relaxed),
            shutdown: self.is_shutdown(),
            session_stopped: self.is_session_stopped(),
            tick: self.tick_scope.get_stats(),
            fill: self.fill_model.get_stats(),
            risk_gateway: self.risk_gateway.lock().get_stats(),
            live_guard: self.live_guard.get_stats(),
            positions: self.positions.get_stats(),
            watchdog: self.watchdog.lock().get_stats(),
            metrics: self.metrics.lock().snapshot(),
        }
    }
}
