//! Execution stage: ask the executor for one step's changes and apply them.
//!
//! File writes are applied before shell commands. After the first failed
//! action, the remaining ones are recorded as not attempted.

use localcoder_core::error::WorkflowError;
use localcoder_core::event::{DomainEvent, EventBus};
use localcoder_core::message::Message;
use localcoder_core::persona::Persona;
use localcoder_core::plan::{Plan, Step};
use localcoder_core::provider::Provider;
use localcoder_core::workspace::{Confirmer, FileSystem, OutputLine, ProcessRunner};
use localcoder_tools::check_command;
use std::fmt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::actions::{FileWrite, parse_actions};
use crate::extract::strip_reasoning;
use crate::prompts::{FileSnapshot, execution_prompt};
use crate::stream::collect_stream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    WriteFile,
    Shell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    Applied,
    /// Declined by the user. Not a failure.
    Skipped,
    Failed,
    /// An earlier action in the same step failed.
    NotAttempted,
}

impl ActionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::NotAttempted => "not attempted",
        }
    }
}

/// One file write or shell command and what happened to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedAction {
    pub kind: ActionKind,
    /// Path for writes, command text for shell actions.
    pub target: String,
    pub status: ActionStatus,
    pub detail: Option<String>,
}

impl AppliedAction {
    fn new(kind: ActionKind, target: impl Into<String>, status: ActionStatus) -> Self {
        Self {
            kind,
            target: target.into(),
            status,
            detail: None,
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Short label, e.g. `write src/main.rs` or `run cargo test`.
    pub fn label(&self) -> String {
        match self.kind {
            ActionKind::WriteFile => format!("write {}", self.target),
            ActionKind::Shell => format!("run {}", self.target),
        }
    }
}

impl fmt::Display for AppliedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}", self.label(), self.status.as_str())?;
        if let Some(detail) = &self.detail {
            write!(f, ": {detail}")?;
        }
        write!(f, ")")
    }
}

/// Outcome of executing one step.
#[derive(Debug, Clone)]
pub struct StepExecutionResult {
    pub step: Step,
    /// Model response with reasoning blocks removed.
    pub response: String,
    pub actions: Vec<AppliedAction>,
    pub success: bool,
    pub error: Option<String>,
}

impl StepExecutionResult {
    pub fn applied_count(&self) -> usize {
        self.actions
            .iter()
            .filter(|a| a.status == ActionStatus::Applied)
            .count()
    }

    /// One-line summary stored as the step's result text.
    pub fn summary(&self) -> String {
        if self.actions.is_empty() {
            return "no actions".to_string();
        }
        format!("{}/{} actions applied", self.applied_count(), self.actions.len())
    }
}

pub struct ExecutionStage<'a> {
    pub provider: &'a dyn Provider,
    pub persona: &'a Persona,
    pub fs: &'a dyn FileSystem,
    pub runner: &'a dyn ProcessRunner,
    pub confirmer: &'a dyn Confirmer,
    pub bus: &'a EventBus,
    pub blocked_commands: &'a [String],
    pub auto_approve: bool,
    pub max_file_bytes: usize,
}

impl ExecutionStage<'_> {
    /// Run one step. Only cancellation and backend failures are errors;
    /// failed actions are reported through `success` and `error`.
    pub async fn execute(
        &self,
        plan: &Plan,
        step: &Step,
        cancel: &CancellationToken,
    ) -> Result<StepExecutionResult, WorkflowError> {
        let files = self.snapshot_files(step).await;
        let messages = vec![Message::user(execution_prompt(plan, step, &files))];
        let raw = collect_stream(self.provider, self.persona, messages, self.bus, cancel).await?;
        let response = strip_reasoning(&raw);

        let parsed = parse_actions(&response);
        debug!(
            order = step.order,
            writes = parsed.file_writes.len(),
            commands = parsed.commands.len(),
            "Parsed executor actions"
        );

        let mut actions = Vec::with_capacity(parsed.len());
        let mut failure: Option<String> = None;

        for write in &parsed.file_writes {
            let action = if failure.is_some() {
                AppliedAction::new(ActionKind::WriteFile, &write.path, ActionStatus::NotAttempted)
            } else {
                self.apply_write(write, cancel).await?
            };
            self.record(step.order, &action, &mut failure);
            actions.push(action);
        }

        for command in &parsed.commands {
            let action = if failure.is_some() {
                AppliedAction::new(ActionKind::Shell, command, ActionStatus::NotAttempted)
            } else {
                self.run_command(command, cancel).await?
            };
            self.record(step.order, &action, &mut failure);
            actions.push(action);
        }

        info!(order = step.order, actions = actions.len(), success = failure.is_none(), "Step executed");
        Ok(StepExecutionResult {
            step: step.clone(),
            response,
            actions,
            success: failure.is_none(),
            error: failure,
        })
    }

    /// Current content of the step's target files, within the byte budget.
    async fn snapshot_files(&self, step: &Step) -> Vec<FileSnapshot> {
        let mut remaining = self.max_file_bytes;
        let mut snapshots = Vec::with_capacity(step.files.len());
        for path in &step.files {
            let content = self.fs.read(path).await;
            let (content, truncated) = match content {
                Some(text) => {
                    let (text, truncated) = truncate_bytes(text, remaining);
                    remaining -= text.len();
                    (Some(text), truncated)
                }
                None => (None, false),
            };
            snapshots.push(FileSnapshot {
                path: path.clone(),
                content,
                truncated,
            });
        }
        snapshots
    }

    async fn apply_write(
        &self,
        write: &FileWrite,
        cancel: &CancellationToken,
    ) -> Result<AppliedAction, WorkflowError> {
        let action = |status| AppliedAction::new(ActionKind::WriteFile, &write.path, status);

        if let Err(e) = self.fs.resolve(&write.path) {
            return Ok(action(ActionStatus::Failed).with_detail(e.to_string()));
        }

        if !self.auto_approve {
            let current = self.fs.read(&write.path).await;
            let approved = tokio::select! {
                _ = cancel.cancelled() => return Err(WorkflowError::Cancelled),
                ok = self.confirmer.confirm_write(&write.path, current.as_deref(), &write.content) => ok,
            };
            if !approved {
                return Ok(action(ActionStatus::Skipped).with_detail("declined"));
            }
        }

        Ok(match self.fs.write(&write.path, &write.content).await {
            Ok(()) => action(ActionStatus::Applied),
            Err(e) => action(ActionStatus::Failed).with_detail(e.to_string()),
        })
    }

    async fn run_command(
        &self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<AppliedAction, WorkflowError> {
        let action = |status| AppliedAction::new(ActionKind::Shell, command, status);

        if let Err(e) = check_command(command, self.blocked_commands) {
            warn!(command, "Blocked command");
            return Ok(action(ActionStatus::Failed).with_detail(e.to_string()));
        }

        if !self.auto_approve {
            let approved = tokio::select! {
                _ = cancel.cancelled() => return Err(WorkflowError::Cancelled),
                ok = self.confirmer.confirm_command(command) => ok,
            };
            if !approved {
                return Ok(action(ActionStatus::Skipped).with_detail("declined"));
            }
        }

        let bus = self.bus;
        let sink = move |line: OutputLine| {
            let (line, is_stderr) = match line {
                OutputLine::Stdout(l) => (l, false),
                OutputLine::Stderr(l) => (l, true),
            };
            bus.publish(DomainEvent::CommandOutput { line, is_stderr });
        };

        // Dropping the run future on cancellation kills the child.
        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(WorkflowError::Cancelled),
            output = self.runner.run(command, self.fs.root(), &sink) => output,
        };

        Ok(match output {
            Ok(out) if out.success() => action(ActionStatus::Applied),
            Ok(out) => {
                let detail = match out.exit_code {
                    Some(code) => format!("exit code {code}"),
                    None => "terminated by signal".to_string(),
                };
                action(ActionStatus::Failed).with_detail(detail)
            }
            Err(e) => action(ActionStatus::Failed).with_detail(e.to_string()),
        })
    }

    fn record(&self, order: u32, action: &AppliedAction, failure: &mut Option<String>) {
        if action.status == ActionStatus::Failed && failure.is_none() {
            *failure = Some(action.to_string());
        }
        self.bus.publish(DomainEvent::ActionApplied {
            order,
            action: action.label(),
            status: action.status.as_str().to_string(),
            detail: action.detail.clone(),
        });
    }
}

/// Cut `text` to at most `budget` bytes on a char boundary.
fn truncate_bytes(mut text: String, budget: usize) -> (String, bool) {
    if text.len() <= budget {
        return (text, false);
    }
    let mut cut = budget;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    (text, true)
}
