//! The three model-driven stages the orchestrator sequences.

pub mod execution;
pub mod planning;
pub mod review;

pub use execution::{ActionKind, ActionStatus, AppliedAction, ExecutionStage, StepExecutionResult};
pub use planning::{PlanningStage, parse_plan};
pub use review::ReviewStage;
