//! # localcoder agent
//!
//! The workflow engine. A goal goes through three model-driven stages:
//!
//! 1. **Plan**: the planner persona returns a JSON plan ([`extract`] pulls it
//!    out of whatever else the model said)
//! 2. **Execute**: for each step the executor returns fenced file writes and
//!    shell commands ([`actions`]), applied after confirmation
//! 3. **Review**: the reviewer grades each step and the whole change set
//!
//! [`Orchestrator`] sequences the stages as a state machine with approval
//! gates and cancellation. [`SessionController`] wraps it in an
//! interactive loop with personas, history, and plan import/export.

pub mod actions;
pub mod artifacts;
pub mod extract;
pub mod orchestrator;
pub mod prompts;
pub mod session;
pub mod stages;
pub mod stream;

#[doc(hidden)]
pub mod test_helpers;

pub use actions::{FileWrite, ParsedActions, parse_actions};
pub use artifacts::ArtifactStore;
pub use extract::{extract_json, parse_structured, strip_reasoning};
pub use orchestrator::{
    Collaborators, Orchestrator, OrchestratorConfig, OrchestratorResult, Outcome, PlanListener,
};
pub use prompts::build_personas;
pub use session::{Reply, Session, SessionController, SessionState};
pub use stages::{ActionKind, ActionStatus, AppliedAction, StepExecutionResult};
