//! Rolling-window quantitative risk metrics.
//!
//! Provides VaR, Expected Shortfall, drawdown, Sharpe and Sortino over fixed
//! windows of realized returns and PnL. Every figure is 0 for an empty or
//! too-short window, since the guard layer consults these from the very
//! first tick.

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::VecDeque;
use tracing::{debug, warn};

use super::stress::{self, StressResult, StressScenario};
use crate::config::{MetricsConfig, StressConfig};

/// Point-in-time copy of every metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskMetricsSnapshot {
    pub samples: usize,
    pub confidence: f64,
    pub value_at_risk: f64,
    pub expected_shortfall: f64,
    pub max_drawdown: f64,
    pub current_drawdown: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub volatility: f64,
}

/// Quantile of an ascending slice with linear interpolation. `p` in [0, 1].
fn quantile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let p = p.clamp(0.0, 1.0);
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let idx = p * (n - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let w = idx - lo as f64;
    sorted[lo] * (1.0 - w) + sorted[hi] * w
}

fn mean(values: &VecDeque<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn std_dev(values: &VecDeque<f64>) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Rolling return and PnL statistics.
#[derive(Debug, Clone)]
pub struct QuantRiskMetrics {
    window_size: usize,
    confidence: f64,
    stress: StressConfig,
    returns: VecDeque<f64>,
    pnl: VecDeque<f64>,
}

impl QuantRiskMetrics {
    /// Create empty windows.
    pub fn new(config: &MetricsConfig, stress: StressConfig) -> Self {
        Self {
            window_size: config.window_size,
            confidence: config.confidence,
            stress,
            returns: VecDeque::with_capacity(config.window_size),
            pnl: VecDeque::with_capacity(config.window_size),
        }
    }

    /// Record a realized return (e.g. -0.002 for a 0.2% loss).
    pub fn record_return(&mut self, value: f64) {
        if !value.is_finite() {
            warn!(value, "Ignoring non-finite return");
            return;
        }
        self.returns.push_back(value);
        while self.returns.len() > self.window_size {
            self.returns.pop_front();
        }
        debug!(value, samples = self.returns.len(), "Recorded return");
    }

    /// Record a point of the cumulative PnL series.
    pub fn record_pnl(&mut self, value: f64) {
        if !value.is_finite() {
            warn!(value, "Ignoring non-finite PnL point");
            return;
        }
        self.pnl.push_back(value);
        while self.pnl.len() > self.window_size {
            self.pnl.pop_front();
        }
    }

    /// Number of returns in the window.
    pub fn sample_count(&self) -> usize {
        self.returns.len()
    }

    fn sorted_returns(&self) -> Vec<f64> {
        let mut sorted: Vec<f64> = self.returns.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        sorted
    }

    /// Empirical VaR at `confidence`, as a positive loss magnitude.
    ///
    /// 95% VaR is the 5th percentile of returns, negated.
    pub fn value_at_risk(&self, confidence: f64) -> f64 {
        let sorted = self.sorted_returns();
        if sorted.is_empty() {
            return 0.0;
        }
        let q = quantile_sorted(&sorted, 1.0 - confidence);
        (-q).max(0.0)
    }

    /// Mean of the returns at or below the VaR quantile, as a positive loss.
    ///
    /// Every tail sample is `<=` the quantile, so this is never smaller than
    /// `value_at_risk` at the same confidence.
    pub fn expected_shortfall(&self, confidence: f64) -> f64 {
        let sorted = self.sorted_returns();
        if sorted.is_empty() {
            return 0.0;
        }
        let q = quantile_sorted(&sorted, 1.0 - confidence);
        let tail: Vec<f64> = sorted.iter().copied().take_while(|r| *r <= q).collect();
        if tail.is_empty() {
            return (-q).max(0.0);
        }
        let tail_mean = tail.iter().sum::<f64>() / tail.len() as f64;
        (-tail_mean).max(0.0)
    }

    /// Largest peak-to-trough decline of the PnL series.
    pub fn max_drawdown(&self) -> f64 {
        let mut iter = self.pnl.iter();
        let Some(first) = iter.next() else {
            return 0.0;
        };

        let mut peak = *first;
        let mut max_dd = 0.0_f64;
        for value in iter {
            if *value > peak {
                peak = *value;
            } else {
                max_dd = max_dd.max(peak - value);
            }
        }
        max_dd
    }

    /// Decline of the latest PnL point from its running peak.
    pub fn current_drawdown(&self) -> f64 {
        let Some(last) = self.pnl.back() else {
            return 0.0;
        };
        let peak = self.pnl.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        (peak - last).max(0.0)
    }

    /// Population standard deviation of returns.
    pub fn volatility(&self) -> f64 {
        std_dev(&self.returns)
    }

    /// Mean return over population std-dev (no annualisation, zero risk-free).
    pub fn sharpe_ratio(&self) -> f64 {
        let sd = std_dev(&self.returns);
        if sd < 1e-12 {
            return 0.0;
        }
        mean(&self.returns) / sd
    }

    /// Mean return over downside deviation.
    pub fn sortino_ratio(&self) -> f64 {
        if self.returns.len() < 2 {
            return 0.0;
        }

        let downside: Vec<f64> = self.returns.iter().copied().filter(|r| *r < 0.0).collect();
        if downside.is_empty() {
            // No losing samples; cap instead of reporting infinity.
            return 100.0;
        }

        let downside_dev =
            (downside.iter().map(|r| r.powi(2)).sum::<f64>() / downside.len() as f64).sqrt();
        if downside_dev < 1e-12 {
            return 100.0;
        }
        mean(&self.returns) / downside_dev
    }

    /// Loss estimate for `position_notional` under `scenario`.
    pub fn stress_test(&self, scenario: StressScenario, position_notional: Decimal) -> StressResult {
        stress::estimate_loss(&self.stress, scenario, position_notional)
    }

    /// Configured standard scenarios, worst first.
    pub fn stress_test_suite(&self, position_notional: Decimal) -> Vec<StressResult> {
        let mut results: Vec<StressResult> = stress::standard_scenarios(&self.stress)
            .into_iter()
            .map(|scenario| self.stress_test(scenario, position_notional))
            .collect();
        results.sort_by(|a, b| b.estimated_loss.cmp(&a.estimated_loss));
        results
    }

    /// All metrics at the configured confidence.
    pub fn snapshot(&self) -> RiskMetricsSnapshot {
        RiskMetricsSnapshot {
            samples: self.returns.len(),
            confidence: self.confidence,
            value_at_risk: self.value_at_risk(self.confidence),
            expected_shortfall: self.expected_shortfall(self.confidence),
            max_drawdown: self.max_drawdown(),
            current_drawdown: self.current_drawdown(),
            sharpe_ratio: self.sharpe_ratio(),
            sortino_ratio: self.sortino_ratio(),
            volatility: self.volatility(),
        }
    }

    /// Alias of `snapshot` for dashboard consumers.
    pub fn get_stats(&self) -> RiskMetricsSnapshot {
        self.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn metrics(window: usize) -> QuantRiskMetrics {
        QuantRiskMetrics::new(
            &MetricsConfig {
                window_size: window,
                confidence: 0.95,
            },
            StressConfig::default(),
        )
    }

    fn sample_returns() -> Vec<f64> {
        vec![
            0.010, -0.020, 0.005, -0.035, 0.012, 0.003, -0.008, 0.020, -0.050, 0.007, 0.001,
            -0.012, 0.009, 0.004, -0.003, 0.015, -0.025, 0.006, 0.002, -0.001,
        ]
    }

    #[test]
    fn test_empty_windows_return_zero() {
        let m = metrics(50);
        assert_eq!(m.value_at_risk(0.95), 0.0);
        assert_eq!(m.expected_shortfall(0.99), 0.0);
        assert_eq!(m.max_drawdown(), 0.0);
        assert_eq!(m.current_drawdown(), 0.0);
        assert_eq!(m.sharpe_ratio(), 0.0);
        assert_eq!(m.sortino_ratio(), 0.0);
        assert_eq!(m.volatility(), 0.0);
    }

    #[test]
    fn test_single_sample_is_safe() {
        let mut m = metrics(50);
        m.record_return(-0.01);
        assert!((m.value_at_risk(0.95) - 0.01).abs() < 1e-12);
        assert_eq!(m.sharpe_ratio(), 0.0);
    }

    #[test]
    fn test_var_is_lower_quantile() {
        let mut m = metrics(100);
        // -0.10, -0.09, ..., 0.09 (20 samples)
        for i in 0..20 {
            m.record_return((i as f64 - 10.0) / 100.0);
        }
        // 5th percentile: idx = 0.05 * 19 = 0.95 -> between -0.10 and -0.09
        let var = m.value_at_risk(0.95);
        assert!(var > 0.09 && var < 0.10, "var = {}", var);
    }

    #[test]
    fn test_expected_shortfall_dominates_var() {
        let mut m = metrics(100);
        for r in sample_returns() {
            m.record_return(r);
        }
        for c in [0.5, 0.8, 0.9, 0.95, 0.975, 0.99] {
            let var = m.value_at_risk(c);
            let es = m.expected_shortfall(c);
            assert!(es >= var, "c={} es={} var={}", c, es, var);
        }
    }

    #[test]
    fn test_all_positive_returns_report_no_loss() {
        let mut m = metrics(10);
        for r in [0.01, 0.02, 0.03] {
            m.record_return(r);
        }
        assert_eq!(m.value_at_risk(0.95), 0.0);
        assert_eq!(m.expected_shortfall(0.95), 0.0);
        assert_eq!(m.sortino_ratio(), 100.0);
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let mut m = metrics(100);
        for r in sample_returns() {
            m.record_return(r);
            m.record_pnl(r * 1000.0);
        }
        let first = m.snapshot();
        let second = m.snapshot();
        assert_eq!(first, second);
    }

    #[test]
    fn test_max_drawdown_peak_to_trough() {
        let mut m = metrics(100);
        for p in [0.0, 50.0, 120.0, 80.0, 30.0, 90.0, 140.0, 100.0] {
            m.record_pnl(p);
        }
        assert_eq!(m.max_drawdown(), 90.0); // 120 -> 30
        assert_eq!(m.current_drawdown(), 40.0); // 140 -> 100
    }

    #[test]
    fn test_sharpe_population_std() {
        let mut m = metrics(10);
        for r in [0.01, 0.03] {
            m.record_return(r);
        }
        // mean 0.02, population std 0.01
        assert!((m.sharpe_ratio() - 2.0).abs() < 1e-9);
        assert!((m.volatility() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_window_is_bounded() {
        let mut m = metrics(3);
        for r in [-0.5, 0.01, 0.02, 0.03] {
            m.record_return(r);
        }
        assert_eq!(m.sample_count(), 3);
        // The -0.5 outlier fell out of the window.
        assert_eq!(m.value_at_risk(0.95), 0.0);
    }

    #[test]
    fn test_non_finite_samples_ignored() {
        let mut m = metrics(10);
        m.record_return(f64::NAN);
        m.record_pnl(f64::INFINITY);
        assert_eq!(m.sample_count(), 0);
        assert_eq!(m.max_drawdown(), 0.0);
    }

    #[test]
    fn test_stress_suite_sorted_worst_first() {
        let m = metrics(10);
        let suite = m.stress_test_suite(dec!(10000));
        assert_eq!(suite.len(), 3);
        // vol x3 = 600, outage 4h = 200, spread x5 = 50
        assert_eq!(suite[0].estimated_loss, dec!(600));
        assert_eq!(suite[1].estimated_loss, dec!(200));
        assert_eq!(suite[2].estimated_loss, dec!(50));
    }
}
