//! Domain event system: progress reporting from the workflow engine.
//!
//! The engine publishes events as it moves through its states; the CLI
//! subscribes and renders them. Neither side knows about the other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::persona::PersonaKind;

/// States of the orchestrator state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "step")]
pub enum WorkflowState {
    Planning,
    AwaitingApproval,
    /// Executing the step with this order.
    Executing(u32),
    /// Reviewing the step with this order.
    Reviewing(u32),
    FinalReview,
    Done,
    Cancelled,
    Failed,
}

impl WorkflowState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Failed)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Planning => write!(f, "planning"),
            Self::AwaitingApproval => write!(f, "awaiting approval"),
            Self::Executing(order) => write!(f, "executing step {order}"),
            Self::Reviewing(order) => write!(f, "reviewing step {order}"),
            Self::FinalReview => write!(f, "final review"),
            Self::Done => write!(f, "done"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The orchestrator entered a new state
    StateChanged {
        state: WorkflowState,
        timestamp: DateTime<Utc>,
    },

    /// The planner produced a valid plan
    PlanCreated {
        goal: String,
        steps: usize,
        outline: String,
    },

    /// A step is about to run
    StepStarted {
        order: u32,
        total: usize,
        description: String,
        timestamp: DateTime<Utc>,
    },

    /// A streamed fragment of model output
    ModelFragment { persona: PersonaKind, text: String },

    /// A file write or shell command was handled
    ActionApplied {
        order: u32,
        action: String,
        status: String,
        detail: Option<String>,
    },

    /// One line of output from a running shell command
    CommandOutput { line: String, is_stderr: bool },

    /// A step finished, successfully or not
    StepFinished {
        order: u32,
        success: bool,
        duration_ms: u64,
        error: Option<String>,
    },

    /// A review was parsed (`order` is `None` for the final review)
    ReviewCompleted {
        order: Option<u32>,
        approved: bool,
        score: u8,
        critical: usize,
        warnings: usize,
    },

    /// A review could not be obtained and was skipped
    ReviewSkipped { order: Option<u32>, reason: String },

    /// A plan or review document was written
    ArtifactSaved { kind: String, path: String },

    /// Writing a plan or review document failed (never fatal)
    ArtifactFailed { kind: String, reason: String },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    pub fn state(state: WorkflowState) -> Self {
        Self::StateChanged {
            state,
            timestamp: Utc::now(),
        }
    }
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
/// Slow subscribers lag rather than blocking the engine.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
