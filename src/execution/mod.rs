//! Order execution: fill simulation and the per-tick pipeline.

mod fill;
mod orchestrator;

pub use fill::{FillResult, FillSimulationModel, FillStats, FillStatus};
pub use orchestrator::{EvaluationResult, ExecutionOrchestrator, OrchestratorStats};
