//! Position lifecycle management.
//!
//! - `engine`: position book, exposure and realized PnL
//! - `stop_loss`: static and ATR stop triggers
//! - `rebalancer`: exposure-ceiling trimming
//! - `manager`: the serialized facade used by the orchestrator

mod engine;
mod manager;
mod rebalancer;
mod stop_loss;

pub use engine::{ClosedTrade, CloseReason, OpenOutcome, Position, PositionEngine};
pub use manager::{PositionDelta, PositionLifecycleManager, PositionStats};
pub use rebalancer::{RebalanceAction, RebalancePlan, Rebalancer};
pub use stop_loss::{StopLossEngine, StopTrigger};
