//! # localcoder core
//!
//! Domain types, traits, and error definitions for the localcoder workflow engine.
//! This crate has **no I/O of its own**. It defines the plan/review model, the
//! Markdown plan format, and the collaborator traits every other crate
//! implements against.
//!
//! ## Layout
//!
//! - [`plan`] / [`review`]: the structured artifacts the model produces
//! - [`document`]: the human-editable Markdown rendering of those artifacts
//! - [`provider`]: the streaming model-backend contract
//! - [`workspace`]: filesystem, process, confirmation, and project-context seams
//! - [`event`]: progress events published by the engine

pub mod document;
pub mod error;
pub mod event;
pub mod message;
pub mod persona;
pub mod plan;
pub mod provider;
pub mod review;
pub mod workspace;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, Result, ToolError, WorkflowError};
pub use event::{DomainEvent, EventBus, WorkflowState};
pub use message::{Message, Role};
pub use persona::{Persona, PersonaKind, PersonaSet};
pub use plan::{Complexity, Plan, Step, StepType};
pub use provider::{Provider, ProviderRequest, StreamChunk};
pub use review::{Category, Issue, Review, Severity};
pub use workspace::{Confirmer, ContextProvider, FileSystem, OutputLine, ProcessOutput, ProcessRunner};
