//! Structured risk alerts for the log analysis workflow.

use serde::Serialize;
use tracing::{error, info, warn};

/// Severity levels for alerts.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "INFO",
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Error => "ERROR",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

/// Emit `alert` as a JSON line on the `risk_alert` target.
pub fn emit<T: Serialize>(severity: AlertSeverity, alert: &T) {
    let json = serde_json::to_string(alert).unwrap_or_default();

    match severity {
        AlertSeverity::Info => info!(target: "risk_alert", "RISK_ALERT: {}", json),
        AlertSeverity::Warning => warn!(target: "risk_alert", "RISK_ALERT: {}", json),
        AlertSeverity::Error | AlertSeverity::Critical => {
            error!(target: "risk_alert", "RISK_ALERT: {}", json)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Critical > AlertSeverity::Error);
        assert!(AlertSeverity::Warning > AlertSeverity::Info);
        assert_eq!(AlertSeverity::Warning.as_str(), "WARNING");
    }
}
