//! Deterministic stress scenarios.
//!
//! Each scenario is a pure function of position notional and a multiplier;
//! there is no historical simulation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::StressConfig;
use crate::utils::decimal::safe_div;

/// A named stress scenario.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StressScenario {
    /// Adverse move of `base_volatility × multiplier`
    VolatilitySpike { multiplier: Decimal },
    /// Exit cost of `base_spread × multiplier`
    SpreadWidening { multiplier: Decimal },
    /// Venue unreachable while the position is open
    ExchangeOutage { hours: Decimal },
}

impl fmt::Display for StressScenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StressScenario::VolatilitySpike { multiplier } => {
                write!(f, "volatility_spike_x{}", multiplier.normalize())
            }
            StressScenario::SpreadWidening { multiplier } => {
                write!(f, "spread_widening_x{}", multiplier.normalize())
            }
            StressScenario::ExchangeOutage { hours } => {
                write!(f, "exchange_outage_{}h", hours.normalize())
            }
        }
    }
}

/// Estimated loss under one scenario.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StressResult {
    pub scenario: String,
    pub position_notional: Decimal,
    /// Loss as a positive amount
    pub estimated_loss: Decimal,
    /// Loss relative to notional (0.0-1.0)
    pub loss_pct: Decimal,
}

/// Estimate the loss of `position_notional` under `scenario`.
pub fn estimate_loss(
    config: &StressConfig,
    scenario: StressScenario,
    position_notional: Decimal,
) -> StressResult {
    let notional = position_notional.abs();

    let loss = match scenario {
        StressScenario::VolatilitySpike { multiplier } => {
            notional * config.base_volatility * multiplier.max(Decimal::ZERO)
        }
        StressScenario::SpreadWidening { multiplier } => {
            notional * config.base_spread * multiplier.max(Decimal::ZERO)
        }
        StressScenario::ExchangeOutage { hours } => {
            (notional * config.outage_hourly_loss_rate * hours.max(Decimal::ZERO)).min(notional)
        }
    };

    StressResult {
        scenario: scenario.to_string(),
        position_notional: notional,
        estimated_loss: loss,
        loss_pct: safe_div(loss, notional),
    }
}

/// The configured default scenarios.
pub fn standard_scenarios(config: &StressConfig) -> Vec<StressScenario> {
    vec![
        StressScenario::VolatilitySpike {
            multiplier: config.volatility_spike_multiplier,
        },
        StressScenario::SpreadWidening {
            multiplier: config.spread_widening_multiplier,
        },
        StressScenario::ExchangeOutage {
            hours: config.outage_hours,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_volatility_spike_loss() {
        let config = StressConfig::default();
        let result = estimate_loss(
            &config,
            StressScenario::VolatilitySpike { multiplier: dec!(3) },
            dec!(10000),
        );
        // 10_000 * 0.02 * 3
        assert_eq!(result.estimated_loss, dec!(600));
        assert_eq!(result.loss_pct, dec!(0.06));
        assert_eq!(result.scenario, "volatility_spike_x3");
    }

    #[test]
    fn test_spread_widening_loss() {
        let config = StressConfig::default();
        let result = estimate_loss(
            &config,
            StressScenario::SpreadWidening { multiplier: dec!(5) },
            dec!(-2000),
        );
        // |−2000| * 0.001 * 5
        assert_eq!(result.estimated_loss, dec!(10));
        assert_eq!(result.position_notional, dec!(2000));
    }

    #[test]
    fn test_outage_loss_capped_at_notional() {
        let config = StressConfig::default();
        let four_hours = estimate_loss(
            &config,
            StressScenario::ExchangeOutage { hours: dec!(4) },
            dec!(1000),
        );
        assert_eq!(four_hours.estimated_loss, dec!(20));

        let forever = estimate_loss(
            &config,
            StressScenario::ExchangeOutage { hours: dec!(1000) },
            dec!(1000),
        );
        assert_eq!(forever.estimated_loss, dec!(1000));
    }

    #[test]
    fn test_zero_notional_is_zero_loss() {
        let config = StressConfig::default();
        for scenario in standard_scenarios(&config) {
            let result = estimate_loss(&config, scenario, Decimal::ZERO);
            assert_eq!(result.estimated_loss, Decimal::ZERO);
            assert_eq!(result.loss_pct, Decimal::ZERO);
        }
    }
}
