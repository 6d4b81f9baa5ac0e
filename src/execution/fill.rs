//! Fill simulation for paper execution.
//!
//! Single-level, linear-impact model: the order fills up to the available
//! volume and the effective price moves against the taker in proportion to
//! `requested / available`. The model is deliberately pessimistic and does
//! not walk the book, so calibration statistics stay comparable across runs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::config::FillConfig;
use crate::error::{EngineError, EngineResult};
use crate::exchange::OrderIntent;
use crate::utils::decimal::to_basis_points;

/// Outcome class of a simulated fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FillStatus {
    Filled,
    Partial,
    Rejected,
}

/// Result of simulating one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillResult {
    pub filled_quantity: Decimal,
    pub effective_price: Decimal,
    pub slippage_bps: Decimal,
    pub fill_ratio: Decimal,
    pub status: FillStatus,
}

impl FillResult {
    fn rejected(target_price: Decimal) -> Self {
        Self {
            filled_quantity: Decimal::ZERO,
            effective_price: target_price,
            slippage_bps: Decimal::ZERO,
            fill_ratio: Decimal::ZERO,
            status: FillStatus::Rejected,
        }
    }

    /// Whether anything was executed.
    pub fn has_fill(&self) -> bool {
        self.filled_quantity > Decimal::ZERO
    }

    /// Executed notional at the effective price.
    pub fn notional(&self) -> Decimal {
        self.filled_quantity * self.effective_price
    }

    /// Check the quantity and ratio invariants against the requested size.
    pub fn validate(&self, requested_quantity: Decimal) -> EngineResult<()> {
        if self.filled_quantity < Decimal::ZERO || self.filled_quantity > requested_quantity.max(Decimal::ZERO) {
            return Err(EngineError::invariant(format!(
                "filled quantity {} outside [0, {}]",
                self.filled_quantity, requested_quantity
            )));
        }
        if self.fill_ratio < Decimal::ZERO || self.fill_ratio > Decimal::ONE {
            return Err(EngineError::invariant(format!(
                "fill ratio {} outside [0, 1]",
                self.fill_ratio
            )));
        }
        if self.has_fill() && self.effective_price <= Decimal::ZERO {
            return Err(EngineError::invariant(format!(
                "non-positive effective price {} on a fill",
                self.effective_price
            )));
        }
        Ok(())
    }
}

/// Counters for dashboards.
#[derive(Debug, Clone, Serialize)]
pub struct FillStats {
    pub simulations: u64,
    pub filled: u64,
    pub partial: u64,
    pub rejected: u64,
}

/// Linear slippage fill model.
#[derive(Debug)]
pub struct FillSimulationModel {
    slippage_alpha: Decimal,
    available_volume_factor: Decimal,
    simulations: AtomicU64,
    filled: AtomicU64,
    partial: AtomicU64,
    rejected: AtomicU64,
}

impl FillSimulationModel {
    /// Create a model from validated parameters.
    pub fn new(config: &FillConfig) -> Self {
        Self {
            slippage_alpha: config.slippage_alpha,
            available_volume_factor: config.available_volume_factor,
            simulations: AtomicU64::new(0),
            filled: AtomicU64::new(0),
            partial: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Simulate an order against the resting volume on its side.
    ///
    /// Books too thin to price the order (impact pushing the price to zero
    /// or below, or arithmetic overflow on a vanishing volume) reject the
    /// fill like an empty book does.
    pub fn simulate(&self, intent: &OrderIntent, available_volume: Decimal) -> FillResult {
        self.simulations.fetch_add(1, Ordering::Relaxed);

        let requested = intent.requested_quantity;
        let available = available_volume
            .checked_mul(self.available_volume_factor)
            .unwrap_or(Decimal::ZERO)
            .max(Decimal::ZERO);

        // Zero liquidity short-circuits before the impact division.
        if requested <= Decimal::ZERO || available == Decimal::ZERO {
            return self.reject(intent, available, "no liquidity");
        }

        let filled_quantity = requested.min(available);
        let Some(effective_price) = self.impacted_price(intent, requested, available) else {
            return self.reject(intent, available, "impact overflow");
        };
        if effective_price <= Decimal::ZERO {
            return self.reject(intent, available, "book too thin to price");
        }

        let Some(slippage_bps) = (effective_price - intent.target_price)
            .abs()
            .checked_div(intent.target_price)
            .and_then(to_basis_points)
        else {
            return self.reject(intent, available, "impact overflow");
        };
        let fill_ratio = filled_quantity / requested;

        let status = if filled_quantity == requested {
            self.filled.fetch_add(1, Ordering::Relaxed);
            FillStatus::Filled
        } else {
            self.partial.fetch_add(1, Ordering::Relaxed);
            FillStatus::Partial
        };

        debug!(
            symbol = %intent.symbol,
            side = %intent.side,
            requested = %requested,
            filled = %filled_quantity,
            effective_price = %effective_price,
            slippage_bps = %slippage_bps,
            "Simulated fill"
        );

        FillResult {
            filled_quantity,
            effective_price,
            slippage_bps,
            fill_ratio,
            status,
        }
    }

    /// `target × (1 + sign × alpha × requested / available)`, `None` on overflow.
    fn impacted_price(&self, intent: &OrderIntent, requested: Decimal, available: Decimal) -> Option<Decimal> {
        let impact = requested.checked_div(available)?;
        let shift = self.slippage_alpha.checked_mul(impact)?.checked_mul(intent.side.sign())?;
        intent.target_price.checked_mul(Decimal::ONE.checked_add(shift)?)
    }

    fn reject(&self, intent: &OrderIntent, available: Decimal, reason: &'static str) -> FillResult {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        debug!(
            symbol = %intent.symbol,
            side = %intent.side,
            requested = %intent.requested_quantity,
            available = %available,
            reason,
            "Simulated fill rejected"
        );
        FillResult::rejected(intent.target_price)
    }

    /// Counter snapshot.
    pub fn get_stats(&self) -> FillStats {
        FillStats {
            simulations: self.simulations.load(Ordering::Relaxed),
            filled: self.filled.load(Ordering::Relaxed),
            partial: self.partial.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
