//! Exposure rebalancing.
//!
//! When exposure exceeds the ceiling, compute the exact reduction needed
//! and select positions largest-exposure-first until it is covered.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use super::engine::Position;
use crate::config::RebalanceConfig;

/// Reduction of one position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalanceAction {
    pub symbol: String,
    pub quantity: Decimal,
    /// Entry notional removed by this action
    pub notional: Decimal,
    pub full_close: bool,
}

/// Selected reductions for one rebalance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RebalancePlan {
    pub exposure: Decimal,
    pub ceiling: Decimal,
    /// Exposure that must be removed to get back to the ceiling
    pub required_reduction: Decimal,
    pub planned_reduction: Decimal,
    pub actions: Vec<RebalanceAction>,
}

/// Exposure-triggered position trimming.
#[derive(Debug, Clone)]
pub struct Rebalancer {
    config: RebalanceConfig,
}

impl Rebalancer {
    pub fn new(config: RebalanceConfig) -> Self {
        Self { config }
    }

    /// Ceiling in force for the given risk-mode size multiplier.
    pub fn effective_ceiling(&self, size_multiplier: Decimal) -> Decimal {
        if self.config.scale_with_risk_mode {
            self.config.exposure_ceiling * size_multiplier.clamp(Decimal::ZERO, Decimal::ONE)
        } else {
            self.config.exposure_ceiling
        }
    }

    /// Plan reductions, or `None` when exposure is within the ceiling.
    pub fn plan<'a>(
        &self,
        positions: impl IntoIterator<Item = &'a Position>,
        size_multiplier: Decimal,
    ) -> Option<RebalancePlan> {
        let mut ranked: Vec<&Position> = positions.into_iter().collect();
        let exposure: Decimal = ranked.iter().map(|p| p.notional()).sum();
        let ceiling = self.effective_ceiling(size_multiplier);

        if exposure <= ceiling {
            return None;
        }

        let required_reduction = exposure - ceiling;
        ranked.sort_by(|a, b| {
            b.notional()
                .cmp(&a.notional())
                .then_with(|| a.symbol.cmp(&b.symbol))
        });

        let mut remaining = required_reduction;
        let mut actions = Vec::new();
        for position in ranked {
            if remaining <= Decimal::ZERO {
                break;
            }

            let notional = position.notional();
            if self.config.trim_partially && notional > remaining && position.entry_price > Decimal::ZERO {
                let quantity = remaining / position.entry_price;
                actions.push(RebalanceAction {
                    symbol: position.symbol.clone(),
                    quantity,
                    notional: remaining,
                    full_close: false,
                });
                remaining = Decimal::ZERO;
            } else {
                actions.push(RebalanceAction {
                    symbol: position.symbol.clone(),
                    quantity: position.quantity,
                    notional,
                    full_close: true,
                });
                remaining -= notional;
            }
        }

        let planned_reduction = required_reduction - remaining.max(Decimal::ZERO);
        info!(
            exposure = %exposure,
            ceiling = %ceiling,
            required = %required_reduction,
            planned = %planned_reduction,
            positions = actions.len(),
            "Exposure above ceiling, rebalancing"
        );

        Some(RebalancePlan {
            exposure,
            ceiling,
            required_reduction,
            planned_reduction,
            actions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::OrderSide;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn position(symbol: &str, quantity: Decimal, price: Decimal) -> Position {
        Position {
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            quantity,
            entry_price: price,
            entry_time: Utc::now(),
            unrealized_pnl: Decimal::ZERO,
        }
    }

    fn rebalancer(ceiling: Decimal, partial: bool, scaled: bool) -> Rebalancer {
        Rebalancer::new(RebalanceConfig {
            exposure_ceiling: ceiling,
            trim_partially: partial,
            scale_with_risk_mode: scaled,
        })
    }

    #[test]
    fn test_within_ceiling_is_noop() {
        let positions = [position("A", dec!(1), dec!(100))];
        assert!(rebalancer(dec!(100), false, false).plan(&positions, dec!(1)).is_none());
    }

    #[test]
    fn test_largest_first_until_covered() {
        let positions = [
            position("SMALL", dec!(1), dec!(100)),
            position("LARGE", dec!(1), dec!(500)),
            position("MID", dec!(1), dec!(300)),
        ];
        // exposure 900, ceiling 500 -> need 400: LARGE (500) covers it
        let plan = rebalancer(dec!(500), false, false).plan(&positions, dec!(1)).unwrap();
        assert_eq!(plan.required_reduction, dec!(400));
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].symbol, "LARGE");
        assert!(plan.actions[0].full_close);

        // ceiling 50 -> need 850: LARGE + MID + SMALL
        let plan = rebalancer(dec!(50), false, false).plan(&positions, dec!(1)).unwrap();
        let symbols: Vec<&str> = plan.actions.iter().map(|a| a.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["LARGE", "MID", "SMALL"]);
        assert_eq!(plan.planned_reduction, dec!(850));
    }

    #[test]
    fn test_partial_trim_hits_ceiling_exactly() {
        let positions = [position("A", dec!(2), dec!(500)), position("B", dec!(1), dec!(200))];
        // exposure 1200, ceiling 1000 -> trim 200 of A = 0.4 units
        let plan = rebalancer(dec!(1000), true, false).plan(&positions, dec!(1)).unwrap();
        assert_eq!(plan.actions.len(), 1);
        assert_eq!(plan.actions[0].symbol, "A");
        assert_eq!(plan.actions[0].quantity, dec!(0.4));
        assert!(!plan.actions[0].full_close);
        assert_eq!(plan.planned_reduction, dec!(200));
    }

    #[test]
    fn test_ceiling_scales_with_risk_mode() {
        let positions = [position("A", dec!(1), dec!(600))];
        let scaled = rebalancer(dec!(1000), false, true);
        assert_eq!(scaled.effective_ceiling(dec!(0.5)), dec!(500));
        assert!(scaled.plan(&positions, dec!(0.5)).is_some());
        assert!(rebalancer(dec!(1000), false, false).plan(&positions, dec!(0.5)).is_none());
    }
}
