//! Error taxonomy for the execution core.
//!
//! Policy rejections and data insufficiency are *not* errors: they are
//! carried by decision values (`RiskDecision`, `GuardDecision`,
//! `FillStatus::Rejected`, `OpenOutcome::NotCreated`). Only programming
//! errors, terminal health states and collaborator failures end up here.

use thiserror::Error;

/// Errors surfaced by the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A model or accounting invariant was broken. Indicates a bug.
    #[error("invariant violation: {context}")]
    InvariantViolation { context: String },

    /// The watchdog latched shutdown. Terminal until process restart.
    #[error("shutdown requested: {reason}")]
    ShutdownRequested { reason: String },

    /// Live order placement was attempted after the session stop latched.
    #[error("live session stopped: {reason}")]
    SessionStopped { reason: String },

    /// The venue filled a live order that the position book could not take.
    /// The position exists on the venue but is not tracked.
    #[error("live fill {order_id} on {symbol} not booked: {reason}")]
    UnbookedFill {
        order_id: String,
        symbol: String,
        reason: String,
    },

    /// The order-submission collaborator failed.
    #[error("order gateway error: {0}")]
    Gateway(#[from] anyhow::Error),
}

impl EngineError {
    /// Build an invariant violation.
    ///
    /// Debug and test builds panic at the detection site so the bug is
    /// caught where it happens; release builds return the error.
    pub fn invariant(context: impl Into<String>) -> Self {
        let context = context.into();
        debug_assert!(false, "invariant violation: {}", context);
        tracing::error!(target: "risk_alert", %context, "Invariant violation");
        EngineError::InvariantViolation { context }
    }

    /// Whether this error is terminal for the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::ShutdownRequested { .. } | EngineError::InvariantViolation { .. }
        )
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let shutdown = EngineError::ShutdownRequested {
            reason: "watchdog".to_string(),
        };
        assert!(shutdown.is_fatal());

        let stopped = EngineError::SessionStopped {
            reason: "daily loss".to_string(),
        };
        assert!(!stopped.is_fatal());
        assert_eq!(stopped.to_string(), "live session stopped: daily loss");
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "invariant violation")]
    fn test_invariant_panics_in_debug() {
        let _ = EngineError::invariant("fill ratio 2 outside [0, 1]");
    }
}
