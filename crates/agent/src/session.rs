//! Interactive session: slash commands, persona routing, bounded history.
//!
//! The controller is `Idle` between inputs and `ProcessingGoal` while the
//! orchestrator runs. Successive goals share one history; the oldest
//! entries are dropped once the cap is reached.

use chrono::{DateTime, Utc};
use localcoder_core::document::from_document;
use localcoder_core::error::WorkflowError;
use localcoder_core::message::Message;
use localcoder_core::persona::{PersonaKind, PersonaSet};
use localcoder_core::plan::Plan;
use localcoder_core::workspace::ContextProvider;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::artifacts::ArtifactStore;
use crate::orchestrator::{Collaborators, Orchestrator, OrchestratorConfig, OrchestratorResult, Outcome};
use crate::stream::collect_stream;

/// Past chat turns replayed to executor/reviewer conversations.
const CHAT_CONTEXT_TURNS: usize = 10;

pub const HELP: &str = "\
Commands:
  /help                      Show this help
  /persona [name]            Show or switch persona (planner, executor, reviewer)
  /status                    Session and plan status
  /export [path]             Write the current plan document
  /import <path>             Load a plan document and make it current
  /run                       Execute the current plan (completed steps are skipped)
  /history                   Show recent inputs
  /clear                     Clear history
  /exit, /quit               Leave the session

Anything else is a goal for the planner, or a message to the active persona.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    ProcessingGoal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub at: DateTime<Utc>,
    pub persona: PersonaKind,
    pub input: String,
    pub response: String,
}

/// Per-invocation session state. Nothing here is persisted.
#[derive(Debug)]
pub struct Session {
    pub persona: PersonaKind,
    pub plan: Option<Plan>,
    pub started_at: DateTime<Utc>,
    pub root: PathBuf,
    pub running: bool,
    pub state: SessionState,
    /// Steps completed across every run in this session.
    pub completed_steps: usize,
    history: VecDeque<HistoryEntry>,
    history_limit: usize,
}

impl Session {
    pub fn new(root: impl Into<PathBuf>, history_limit: usize) -> Self {
        Self {
            persona: PersonaKind::default(),
            plan: None,
            started_at: Utc::now(),
            root: root.into(),
            running: true,
            state: SessionState::Idle,
            completed_steps: 0,
            history: VecDeque::new(),
            history_limit: history_limit.max(1),
        }
    }

    pub fn push_history(&mut self, entry: HistoryEntry) {
        while self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(entry);
    }

    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}

/// What the caller should do after an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Print this.
    Text(String),
    /// Output was already streamed through events.
    Silent,
    Exit,
}

pub struct SessionController {
    session: Session,
    orchestrator: Orchestrator,
    deps: Collaborators,
    context: Arc<dyn ContextProvider>,
    artifacts: ArtifactStore,
}

impl SessionController {
    pub fn new(
        deps: Collaborators,
        personas: PersonaSet,
        config: OrchestratorConfig,
        context: Arc<dyn ContextProvider>,
        artifacts: ArtifactStore,
        history_limit: usize,
    ) -> Self {
        let session = Session::new(deps.fs.root(), history_limit);
        let orchestrator = Orchestrator::new(deps.clone(), personas, config);
        Self {
            session,
            orchestrator,
            deps,
            context,
            artifacts,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_running(&self) -> bool {
        self.session.running
    }

    /// Handle one line of user input.
    pub async fn handle_input(&mut self, input: &str, cancel: &CancellationToken) -> Reply {
        let input = input.trim();
        if input.is_empty() {
            return Reply::Silent;
        }
        if let Some(command) = input.strip_prefix('/') {
            let (name, arg) = match command.split_once(char::is_whitespace) {
                Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
                None => (command, None),
            };
            return self.handle_command(name, arg, cancel).await;
        }

        match self.session.persona {
            PersonaKind::Planner => self.process_goal(input, cancel).await,
            kind => self.chat(kind, input, cancel).await,
        }
    }

    async fn handle_command(&mut self, name: &str, arg: Option<&str>, cancel: &CancellationToken) -> Reply {
        debug!(command = name, "Session command");
        match name.to_lowercase().as_str() {
            "help" | "?" => Reply::Text(HELP.to_string()),
            "persona" => self.switch_persona(arg),
            "status" => Reply::Text(self.status()),
            "export" => self.export(arg).await,
            "import" => self.import(arg).await,
            "run" => self.run_bound_plan(cancel).await,
            "history" => Reply::Text(self.render_history()),
            "clear" => {
                self.session.clear_history();
                Reply::Text("History cleared.".into())
            }
            "exit" | "quit" => {
                self.session.running = false;
                Reply::Exit
            }
            other => Reply::Text(format!("Unknown command `/{other}`. Type /help for a list.")),
        }
    }

    fn switch_persona(&mut self, arg: Option<&str>) -> Reply {
        let Some(arg) = arg else {
            return Reply::Text(format!("Active persona: {}", self.session.persona));
        };
        match arg.parse::<PersonaKind>() {
            Ok(kind) => {
                self.session.persona = kind;
                info!(persona = %kind, "Persona switched");
                Reply::Text(format!("Switched to {kind}."))
            }
            Err(message) => Reply::Text(message),
        }
    }

    fn status(&self) -> String {
        let session = &self.session;
        let model = &self.orchestrator.personas().get(session.persona).model;
        let mut out = String::new();
        let _ = writeln!(out, "Persona: {} ({model})", session.persona);
        match &session.plan {
            Some(plan) => {
                let _ = writeln!(
                    out,
                    "Plan: {} ({}/{} steps completed)",
                    plan.goal,
                    plan.completed_steps(),
                    plan.total_steps()
                );
            }
            None => {
                let _ = writeln!(out, "Plan: none");
            }
        }
        let _ = writeln!(out, "Steps completed this session: {}", session.completed_steps);
        let uptime = session.uptime().num_seconds().max(0);
        let _ = writeln!(out, "Uptime: {}m {}s", uptime / 60, uptime % 60);
        let _ = write!(
            out,
            "History: {}/{} entries",
            session.history_len(),
            session.history_limit
        );
        out
    }

    async fn export(&self, target: Option<&str>) -> Reply {
        let Some(plan) = &self.session.plan else {
            return Reply::Text("No plan to export.".into());
        };
        match self.artifacts.export_plan(plan, target).await {
            Ok(path) => Reply::Text(format!("Plan exported to {}", path.display())),
            Err(e) => Reply::Text(format!("Export failed: {e}")),
        }
    }

    async fn import(&mut self, path: Option<&str>) -> Reply {
        let Some(path) = path else {
            return Reply::Text("Usage: /import <path>".into());
        };
        let Some(text) = self.deps.fs.read(path).await else {
            return Reply::Text(format!("Cannot read {path}"));
        };
        match from_document(&text) {
            Ok(plan) => {
                let reply = format!(
                    "Imported plan: {} ({} steps, {} completed)",
                    plan.goal,
                    plan.total_steps(),
                    plan.completed_steps()
                );
                info!(path, steps = plan.total_steps(), "Plan imported");
                self.session.plan = Some(plan);
                Reply::Text(reply)
            }
            Err(e) => Reply::Text(format!("Import failed: {e}")),
        }
    }

    async fn run_bound_plan(&mut self, cancel: &CancellationToken) -> Reply {
        let Some(plan) = self.session.plan.clone() else {
            return Reply::Text("No plan to run. Enter a goal or /import a plan first.".into());
        };
        let label = format!("/run {}", plan.goal);
        self.session.state = SessionState::ProcessingGoal;
        let result = self.orchestrator.execute_plan(plan, cancel, &self.artifacts).await;
        self.absorb(label, result)
    }

    async fn process_goal(&mut self, goal: &str, cancel: &CancellationToken) -> Reply {
        self.session.state = SessionState::ProcessingGoal;
        let context = self.context.project_context(goal).await;
        let result = self
            .orchestrator
            .run(goal, &context, cancel, &self.artifacts)
            .await;
        self.absorb(goal.to_string(), result)
    }

    /// Fold a finished run into the session.
    fn absorb(&mut self, input: String, result: OrchestratorResult) -> Reply {
        self.session.completed_steps += result.step_results.iter().filter(|r| r.success).count();
        let summary = describe(&result);
        if let Some(plan) = result.plan {
            self.session.plan = Some(plan);
        }
        self.session.push_history(HistoryEntry {
            at: Utc::now(),
            persona: PersonaKind::Planner,
            input,
            response: summary.clone(),
        });
        self.session.state = SessionState::Idle;
        Reply::Text(summary)
    }

    /// One streamed turn with the executor or reviewer.
    async fn chat(&mut self, kind: PersonaKind, input: &str, cancel: &CancellationToken) -> Reply {
        let mut messages = Vec::new();
        if let Some(plan) = &self.session.plan {
            messages.push(Message::user(format!(
                "Current plan for \"{}\":\n{}",
                plan.goal,
                plan.outline()
            )));
            messages.push(Message::assistant("Noted."));
        }
        let earlier: Vec<&HistoryEntry> = self
            .session
            .history()
            .filter(|entry| entry.persona == kind)
            .collect();
        for entry in earlier.iter().skip(earlier.len().saturating_sub(CHAT_CONTEXT_TURNS)) {
            messages.push(Message::user(entry.input.clone()));
            messages.push(Message::assistant(entry.response.clone()));
        }
        messages.push(Message::user(input));

        let persona = self.orchestrator.personas().get(kind).clone();
        let reply = collect_stream(
            self.deps.provider.as_ref(),
            &persona,
            messages,
            &self.deps.bus,
            cancel,
        )
        .await;

        match reply {
            Ok(text) => {
                self.session.push_history(HistoryEntry {
                    at: Utc::now(),
                    persona: kind,
                    input: input.to_string(),
                    response: text,
                });
                Reply::Silent
            }
            Err(WorkflowError::Cancelled) => Reply::Text("Cancelled.".into()),
            Err(e) => Reply::Text(format!("Error: {e}")),
        }
    }

    fn render_history(&self) -> String {
        if self.session.history_len() == 0 {
            return "History is empty.".into();
        }
        self.session
            .history()
            .map(|entry| {
                let first_line = entry.response.lines().next().unwrap_or("");
                format!(
                    "[{}] {}> {} → {}",
                    entry.at.format("%H:%M:%S"),
                    entry.persona,
                    entry.input,
                    first_line
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// One-paragraph summary of a run for the user.
pub fn describe(result: &OrchestratorResult) -> String {
    let (done, total) = result
        .plan
        .as_ref()
        .map(|p| (p.completed_steps(), p.total_steps()))
        .unwrap_or((0, 0));
    match &result.outcome {
        Outcome::Success => {
            let mut text = format!("Done: {done}/{total} steps completed.");
            if let Some(review) = &result.final_review {
                let _ = write!(text, " Final review score {}/10.", review.score);
            }
            text
        }
        Outcome::Cancelled => format!("Cancelled ({done}/{total} steps completed)."),
        Outcome::Error(message) => format!("Failed: {message}"),
    }
}
