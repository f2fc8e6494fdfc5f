//! The orchestrator: plan, approve, execute and review each step, final review.
//!
//! ```text
//! Planning → AwaitingApproval → Executing(i) → Reviewing(i) → … → FinalReview → Done
//! ```
//!
//! `Cancelled` and `Failed` are reachable from every state. A failed step
//! ends the run; an unreadable review only skips that review. Every run
//! resolves to exactly one [`Outcome`].

use async_trait::async_trait;
use chrono::Utc;
use localcoder_config::AppConfig;
use localcoder_core::error::WorkflowError;
use localcoder_core::event::{DomainEvent, EventBus, WorkflowState};
use localcoder_core::persona::PersonaSet;
use localcoder_core::plan::Plan;
use localcoder_core::provider::Provider;
use localcoder_core::review::Review;
use localcoder_core::workspace::{Confirmer, FileSystem, ProcessRunner};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::stages::{ExecutionStage, PlanningStage, ReviewStage, StepExecutionResult};

/// Everything the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub provider: Arc<dyn Provider>,
    pub fs: Arc<dyn FileSystem>,
    pub runner: Arc<dyn ProcessRunner>,
    pub confirmer: Arc<dyn Confirmer>,
    pub bus: Arc<EventBus>,
}

/// Workflow switches, resolved from [`AppConfig`] by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    /// Skip every approval gate and the final review.
    pub auto_approve: bool,
    pub review_enabled: bool,
    pub max_steps: usize,
    /// Budget for existing file content in one execution prompt.
    pub max_file_bytes: usize,
    pub blocked_commands: Vec<String>,
}

impl OrchestratorConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            auto_approve: config.workflow.auto_approve,
            review_enabled: config.workflow.review_enabled,
            max_steps: config.workflow.max_steps,
            max_file_bytes: config.workflow.max_file_bytes,
            blocked_commands: config.safety.blocked_commands.clone(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_app(&AppConfig::default())
    }
}

/// How a run ended. Exactly one applies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Cancelled,
    Error(String),
}

/// Everything a run produced, including partial work on failure.
#[derive(Debug, Clone)]
pub struct OrchestratorResult {
    /// `None` only when planning failed.
    pub plan: Option<Plan>,
    pub step_results: Vec<StepExecutionResult>,
    /// Per-step reviews that parsed, keyed by step order.
    pub reviews: Vec<(u32, Review)>,
    pub final_review: Option<Review>,
    pub outcome: Outcome,
}

impl OrchestratorResult {
    fn empty() -> Self {
        Self {
            plan: None,
            step_results: Vec::new(),
            reviews: Vec::new(),
            final_review: None,
            outcome: Outcome::Success,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    pub fn is_cancelled(&self) -> bool {
        self.outcome == Outcome::Cancelled
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Error(message) => Some(message),
            _ => None,
        }
    }
}

/// Hooks for the caller to persist artifacts as the run progresses.
#[async_trait]
pub trait PlanListener: Send + Sync {
    async fn on_plan_created(&self, _plan: &Plan) {}

    async fn on_run_finished(&self, _result: &OrchestratorResult) {}
}

#[async_trait]
impl PlanListener for () {}

pub struct Orchestrator {
    deps: Collaborators,
    personas: PersonaSet,
    config: OrchestratorConfig,
    state: WorkflowState,
}

impl Orchestrator {
    pub fn new(deps: Collaborators, personas: PersonaSet, config: OrchestratorConfig) -> Self {
        Self {
            deps,
            personas,
            config,
            state: WorkflowState::Done,
        }
    }

    /// State of the current or most recent run.
    pub fn state(&self) -> WorkflowState {
        self.state
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn personas(&self) -> &PersonaSet {
        &self.personas
    }

    /// Plan for `goal`, then execute the plan.
    pub async fn run(
        &mut self,
        goal: &str,
        context: &str,
        cancel: &CancellationToken,
        listener: &dyn PlanListener,
    ) -> OrchestratorResult {
        info!(goal, "Starting workflow");
        self.set_state(WorkflowState::Planning);

        let planned = {
            let stage = PlanningStage {
                provider: self.deps.provider.as_ref(),
                persona: &self.personas.planner,
                bus: &self.deps.bus,
                max_steps: self.config.max_steps,
            };
            stage.create_plan(goal, context, cancel).await
        };

        let mut plan = match planned {
            Ok(plan) => plan,
            Err(e) => {
                let outcome = outcome_of(e, "Planning failed");
                let result = self.conclude(OrchestratorResult::empty(), None, outcome);
                listener.on_run_finished(&result).await;
                return result;
            }
        };
        listener.on_plan_created(&plan).await;

        let mut record = OrchestratorResult::empty();
        let outcome = self.drive(&mut plan, &mut record, cancel).await;
        let result = self.conclude(record, Some(plan), outcome);
        listener.on_run_finished(&result).await;
        result
    }

    /// Execute an existing plan, starting at the approval gate. Steps
    /// already marked completed are skipped.
    pub async fn execute_plan(
        &mut self,
        mut plan: Plan,
        cancel: &CancellationToken,
        listener: &dyn PlanListener,
    ) -> OrchestratorResult {
        info!(goal = %plan.goal, "Executing existing plan");
        let mut record = OrchestratorResult::empty();
        let outcome = self.drive(&mut plan, &mut record, cancel).await;
        let result = self.conclude(record, Some(plan), outcome);
        listener.on_run_finished(&result).await;
        result
    }

    async fn drive(
        &mut self,
        plan: &mut Plan,
        record: &mut OrchestratorResult,
        cancel: &CancellationToken,
    ) -> Outcome {
        self.set_state(WorkflowState::AwaitingApproval);
        if !self.config.auto_approve {
            let question = format!("Execute this plan ({} steps)?", plan.total_steps());
            if !self.ask(&question, cancel).await {
                info!("Plan not approved");
                return Outcome::Cancelled;
            }
        }

        let total = plan.total_steps();
        for index in 0..plan.steps.len() {
            let order = plan.steps[index].order;
            if plan.steps[index].completed {
                debug!(order, "Skipping completed step");
                continue;
            }
            if cancel.is_cancelled() {
                return Outcome::Cancelled;
            }

            let unmet = plan.unmet_dependencies(order);
            if !unmet.is_empty() {
                warn!(order, ?unmet, "Step starts before its declared dependencies completed");
            }

            self.set_state(WorkflowState::Executing(order));
            plan.steps[index].mark_started();
            let step = plan.steps[index].clone();
            self.deps.bus.publish(DomainEvent::StepStarted {
                order,
                total,
                description: step.description.clone(),
                timestamp: Utc::now(),
            });

            let executed = {
                let stage = self.execution_stage();
                stage.execute(plan, &step, cancel).await
            };
            let executed = match executed {
                Ok(executed) => executed,
                Err(WorkflowError::Cancelled) => return Outcome::Cancelled,
                Err(e) => {
                    plan.steps[index].mark_failed(e.to_string());
                    self.publish_step_finished(plan, index, Some(e.to_string()));
                    return outcome_of(e, &format!("Step {order} failed"));
                }
            };

            if executed.success {
                plan.steps[index].mark_completed(executed.summary());
            } else {
                plan.steps[index].mark_failed(executed.error.clone().unwrap_or_default());
            }
            self.publish_step_finished(plan, index, executed.error.clone());

            let failure = (!executed.success).then(|| executed.error.clone().unwrap_or_default());
            record.step_results.push(executed);
            if let Some(error) = failure {
                return Outcome::Error(format!("Step {order} failed: {error}"));
            }

            if self.config.review_enabled {
                if cancel.is_cancelled() {
                    return Outcome::Cancelled;
                }
                self.set_state(WorkflowState::Reviewing(order));
                let reviewed = {
                    let stage = self.review_stage();
                    let executed = &record.step_results[record.step_results.len() - 1];
                    stage.review_step(plan, executed, cancel).await
                };
                match reviewed {
                    Ok(review) => {
                        let critical = review.critical_count();
                        record.reviews.push((order, review));
                        if critical > 0 && !self.config.auto_approve {
                            let question = format!(
                                "Review of step {order} found {critical} critical issue(s). Continue anyway?"
                            );
                            if !self.ask(&question, cancel).await {
                                info!(order, "Stopped after critical review issues");
                                return Outcome::Cancelled;
                            }
                        }
                    }
                    Err(WorkflowError::Cancelled) => return Outcome::Cancelled,
                    Err(e) if e.is_output_failure() => {
                        warn!(order, error = %e, "Step review unreadable, skipping it");
                        self.deps.bus.publish(DomainEvent::ReviewSkipped {
                            order: Some(order),
                            reason: e.to_string(),
                        });
                    }
                    Err(e) => return outcome_of(e, &format!("Review of step {order} failed")),
                }
            }
        }

        if self.config.auto_approve || !self.config.review_enabled {
            return Outcome::Success;
        }
        if cancel.is_cancelled() {
            return Outcome::Cancelled;
        }

        self.set_state(WorkflowState::FinalReview);
        let reviewed = {
            let stage = self.review_stage();
            stage.review_plan(plan, &record.step_results, cancel).await
        };
        match reviewed {
            Ok(review) => {
                let approved = review.approved;
                let summary = review.summary.clone();
                record.final_review = Some(review);
                if !approved {
                    return Outcome::Error(format!("Final review did not approve the changes: {summary}"));
                }
                Outcome::Success
            }
            Err(WorkflowError::Cancelled) => Outcome::Cancelled,
            Err(e) if e.is_output_failure() => {
                warn!(error = %e, "Final review unreadable, treating the run as provisionally successful");
                self.deps.bus.publish(DomainEvent::ReviewSkipped {
                    order: None,
                    reason: e.to_string(),
                });
                Outcome::Success
            }
            Err(e) => outcome_of(e, "Final review failed"),
        }
    }

    fn execution_stage(&self) -> ExecutionStage<'_> {
        ExecutionStage {
            provider: self.deps.provider.as_ref(),
            persona: &self.personas.executor,
            fs: self.deps.fs.as_ref(),
            runner: self.deps.runner.as_ref(),
            confirmer: self.deps.confirmer.as_ref(),
            bus: &self.deps.bus,
            blocked_commands: &self.config.blocked_commands,
            auto_approve: self.config.auto_approve,
            max_file_bytes: self.config.max_file_bytes,
        }
    }

    fn review_stage(&self) -> ReviewStage<'_> {
        ReviewStage {
            provider: self.deps.provider.as_ref(),
            persona: &self.personas.reviewer,
            bus: &self.deps.bus,
        }
    }

    /// Approval gate; cancellation counts as "no".
    async fn ask(&self, question: &str, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            answer = self.deps.confirmer.confirm(question) => answer,
        }
    }

    fn publish_step_finished(&self, plan: &Plan, index: usize, error: Option<String>) {
        let step = &plan.steps[index];
        let duration_ms = step
            .duration()
            .map(|d| d.num_milliseconds().max(0) as u64)
            .unwrap_or(0);
        self.deps.bus.publish(DomainEvent::StepFinished {
            order: step.order,
            success: step.completed,
            duration_ms,
            error,
        });
    }

    fn set_state(&mut self, state: WorkflowState) {
        debug!(from = %self.state, to = %state, "State transition");
        self.state = state;
        self.deps.bus.publish(DomainEvent::state(state));
    }

    fn conclude(
        &mut self,
        mut result: OrchestratorResult,
        plan: Option<Plan>,
        outcome: Outcome,
    ) -> OrchestratorResult {
        let state = match &outcome {
            Outcome::Success => WorkflowState::Done,
            Outcome::Cancelled => WorkflowState::Cancelled,
            Outcome::Error(message) => {
                warn!(error = %message, "Workflow failed");
                self.deps.bus.publish(DomainEvent::ErrorOccurred {
                    context: "workflow".into(),
                    error_message: message.clone(),
                    timestamp: Utc::now(),
                });
                WorkflowState::Failed
            }
        };
        self.set_state(state);
        info!(outcome = ?outcome, steps_run = result.step_results.len(), "Workflow finished");
        result.plan = plan;
        result.outcome = outcome;
        result
    }
}

/// Cancellation stays cancellation; everything else becomes an error
/// message, with the failing model output attached when there is one.
fn outcome_of(error: WorkflowError, context: &str) -> Outcome {
    match &error {
        WorkflowError::Cancelled => Outcome::Cancelled,
        WorkflowError::EmptyOutput { raw, .. }
        | WorkflowError::Validation { raw: Some(raw), .. } => {
            Outcome::Error(format!("{context}: {error}\n--- model output ---\n{raw}"))
        }
        _ => Outcome::Error(format!("{context}: {error}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        MemoryFileSystem, ScriptedConfirmer, ScriptedRunner, SequentialMockProvider, personas,
        plan_json, review_json,
    };
    use localcoder_core::plan::{Step, StepType};
    use std::sync::Mutex;

    struct Harness {
        provider: Arc<SequentialMockProvider>,
        fs: Arc<MemoryFileSystem>,
        runner: Arc<ScriptedRunner>,
        confirmer: Arc<dyn Confirmer>,
        bus: Arc<EventBus>,
    }

    impl Harness {
        fn new(responses: Vec<String>, confirmer: Arc<dyn Confirmer>) -> Self {
            Self {
                provider: Arc::new(SequentialMockProvider::new(responses)),
                fs: Arc::new(MemoryFileSystem::new()),
                runner: Arc::new(ScriptedRunner::new()),
                confirmer,
                bus: Arc::new(EventBus::default()),
            }
        }

        fn orchestrator(&self, auto_approve: bool) -> Orchestrator {
            let deps = Collaborators {
                provider: self.provider.clone(),
                fs: self.fs.clone(),
                runner: self.runner.clone(),
                confirmer: self.confirmer.clone(),
                bus: self.bus.clone(),
            };
            let config = OrchestratorConfig {
                auto_approve,
                ..OrchestratorConfig::default()
            };
            Orchestrator::new(deps, personas(), config)
        }
    }

    fn two_step_plan() -> String {
        plan_json(
            "Add greeting",
            &[("Write greeting", &["src/greet.rs"]), ("Document it", &[])],
        )
    }

    fn write(path: &str, body: &str) -> String {
        format!("Done.\n```file: {path}\n{body}\n```")
    }

    #[tokio::test]
    async fn full_run_with_reviews() {
        let h = Harness::new(
            vec![
                two_step_plan(),
                write("src/greet.rs", "pub fn hi() {}"),
                review_json(true, &["info"]),
                "No changes needed.".into(),
                review_json(true, &[]),
                review_json(true, &[]),
            ],
            Arc::new(ScriptedConfirmer::always(true)),
        );
        let mut orchestrator = h.orchestrator(false);
        let mut events = h.bus.subscribe();

        let result = orchestrator
            .run("Add greeting", "", &CancellationToken::new(), &())
            .await;

        assert_eq!(result.outcome, Outcome::Success);
        assert_eq!(orchestrator.state(), WorkflowState::Done);
        let plan = result.plan.as_ref().unwrap();
        assert!(plan.is_complete());
        assert_eq!(result.step_results.len(), 2);
        assert_eq!(result.reviews.len(), 2);
        assert!(result.final_review.is_some());
        assert_eq!(h.fs.get("src/greet.rs").as_deref(), Some("pub fn hi() {}\n"));

        let mut states = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let DomainEvent::StateChanged { state, .. } = event.as_ref() {
                states.push(*state);
            }
        }
        assert_eq!(
            states,
            vec![
                WorkflowState::Planning,
                WorkflowState::AwaitingApproval,
                WorkflowState::Executing(1),
                WorkflowState::Reviewing(1),
                WorkflowState::Executing(2),
                WorkflowState::Reviewing(2),
                WorkflowState::FinalReview,
                WorkflowState::Done,
            ]
        );
    }

    #[tokio::test]
    async fn unreadable_step_review_does_not_abort() {
        let h = Harness::new(
            vec![
                two_step_plan(),
                "Nothing to do.".into(),
                "The code looks great!".into(),
                "Still nothing.".into(),
                review_json(true, &[]),
                review_json(true, &[]),
            ],
            Arc::new(ScriptedConfirmer::always(true)),
        );
        let mut orchestrator = h.orchestrator(false);

        let result = orchestrator
            .run("Add greeting", "", &CancellationToken::new(), &())
            .await;

        assert!(result.is_success());
        assert_eq!(result.step_results.len(), 2);
        assert_eq!(result.reviews.len(), 1);
        assert_eq!(result.reviews[0].0, 2);
    }

    #[tokio::test]
    async fn declining_after_critical_issue_is_cancelled() {
        let h = Harness::new(
            vec![
                two_step_plan(),
                "No edits.".into(),
                review_json(false, &["critical"]),
            ],
            Arc::new(ScriptedConfirmer::new(vec![true, false], true)),
        );
        let mut orchestrator = h.orchestrator(false);

        let result = orchestrator
            .run("Add greeting", "", &CancellationToken::new(), &())
            .await;

        assert_eq!(result.outcome, Outcome::Cancelled);
        assert!(result.error().is_none());
        assert_eq!(orchestrator.state(), WorkflowState::Cancelled);
        let plan = result.plan.unwrap();
        assert!(plan.steps[0].completed);
        assert!(plan.steps[1].started_at.is_none());
        assert_eq!(h.provider.call_count(), 3);
    }

    #[tokio::test]
    async fn critical_issue_with_auto_approve_continues() {
        let h = Harness::new(
            vec![
                two_step_plan(),
                "No edits.".into(),
                review_json(false, &["critical"]),
                "No edits.".into(),
                review_json(true, &[]),
            ],
            Arc::new(ScriptedConfirmer::always(false)),
        );
        let mut orchestrator = h.orchestrator(true);

        let result = orchestrator
            .run("Add greeting", "", &CancellationToken::new(), &())
            .await;

        assert!(result.is_success());
        assert!(result.final_review.is_none());
        assert_eq!(h.provider.call_count(), 5);
    }

    #[tokio::test]
    async fn failed_step_is_terminal() {
        let h = Harness::new(
            vec![two_step_plan(), "```bash\nrm -rf /\n```".into()],
            Arc::new(ScriptedConfirmer::always(true)),
        );
        let mut orchestrator = h.orchestrator(false);

        let result = orchestrator
            .run("Add greeting", "", &CancellationToken::new(), &())
            .await;

        assert!(result.error().unwrap().starts_with("Step 1 failed"));
        assert_eq!(orchestrator.state(), WorkflowState::Failed);
        assert_eq!(result.step_results.len(), 1);
        assert!(!result.step_results[0].success);
        let plan = result.plan.unwrap();
        assert_eq!(plan.steps[0].status_label(), "failed");
        assert_eq!(h.provider.call_count(), 2);
    }

    #[tokio::test]
    async fn malformed_plan_fails_with_raw_output() {
        let h = Harness::new(
            vec!["Sorry, I can't plan that.".into()],
            Arc::new(ScriptedConfirmer::always(true)),
        );
        let mut orchestrator = h.orchestrator(false);

        let result = orchestrator
            .run("Do it", "", &CancellationToken::new(), &())
            .await;

        let error = result.error().unwrap();
        assert!(error.starts_with("Planning failed"));
        assert!(error.contains("Sorry, I can't plan that."));
        assert!(result.plan.is_none());
    }

    #[tokio::test]
    async fn declined_plan_runs_nothing() {
        let h = Harness::new(vec![two_step_plan()], Arc::new(ScriptedConfirmer::always(false)));
        let mut orchestrator = h.orchestrator(false);

        let result = orchestrator
            .run("Add greeting", "", &CancellationToken::new(), &())
            .await;

        assert!(result.is_cancelled());
        assert!(result.step_results.is_empty());
        assert_eq!(h.provider.call_count(), 1);
    }

    #[tokio::test]
    async fn unreadable_final_review_is_provisional_success() {
        let h = Harness::new(
            vec![
                plan_json("One", &[("Only step", &[])]),
                "Nothing.".into(),
                review_json(true, &[]),
                "All good, ship it.".into(),
            ],
            Arc::new(ScriptedConfirmer::always(true)),
        );
        let mut orchestrator = h.orchestrator(false);

        let result = orchestrator
            .run("One", "", &CancellationToken::new(), &())
            .await;

        assert!(result.is_success());
        assert!(result.final_review.is_none());
    }

    #[tokio::test]
    async fn final_review_without_verdict_is_provisional_success() {
        let h = Harness::new(
            vec![
                plan_json("One", &[("Only step", &[])]),
                "Nothing.".into(),
                review_json(true, &[]),
                r#"Here is my assessment: {"verdict": "looks good", "notes": "ship it"}"#.into(),
            ],
            Arc::new(ScriptedConfirmer::always(true)),
        );
        let mut events = h.bus.subscribe();
        let mut orchestrator = h.orchestrator(false);

        let result = orchestrator
            .run("One", "", &CancellationToken::new(), &())
            .await;

        assert!(result.is_success(), "{:?}", result.outcome);
        assert!(result.final_review.is_none());
        let mut skipped_final = false;
        while let Ok(event) = events.try_recv() {
            if let DomainEvent::ReviewSkipped { order: None, .. } = event.as_ref() {
                skipped_final = true;
            }
        }
        assert!(skipped_final);
    }

    #[tokio::test]
    async fn rejected_final_review_is_an_error() {
        let h = Harness::new(
            vec![
                plan_json("One", &[("Only step", &[])]),
                "Nothing.".into(),
                review_json(true, &[]),
                review_json(false, &["warning"]),
            ],
            Arc::new(ScriptedConfirmer::always(true)),
        );
        let mut orchestrator = h.orchestrator(false);

        let result = orchestrator
            .run("One", "", &CancellationToken::new(), &())
            .await;

        assert!(result.error().unwrap().contains("Final review"));
        assert!(result.final_review.is_some());
    }

    /// Approves the plan, then raises the cancellation token.
    struct CancelOnConfirm(CancellationToken);

    #[async_trait]
    impl Confirmer for CancelOnConfirm {
        async fn confirm(&self, _question: &str) -> bool {
            self.0.cancel();
            true
        }

        async fn confirm_write(&self, _path: &str, _current: Option<&str>, _proposed: &str) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn cancellation_is_observed_before_the_next_step() {
        let cancel = CancellationToken::new();
        let h = Harness::new(
            vec![two_step_plan()],
            Arc::new(CancelOnConfirm(cancel.clone())),
        );
        let mut orchestrator = h.orchestrator(false);

        let result = orchestrator.run("Add greeting", "", &cancel, &()).await;

        assert!(result.is_cancelled());
        assert!(result.step_results.is_empty());
        assert!(!result.plan.unwrap().steps[0].completed);
        assert_eq!(h.provider.call_count(), 1);
    }

    #[tokio::test]
    async fn execute_plan_skips_completed_steps() {
        let h = Harness::new(
            vec!["Nothing.".into(), review_json(true, &[])],
            Arc::new(ScriptedConfirmer::always(true)),
        );
        let mut orchestrator = h.orchestrator(true);

        let mut plan = Plan::new("Resume");
        let mut done = Step::new(1, "Already done", StepType::Code);
        done.mark_completed("earlier run");
        plan.steps = vec![done, Step::new(2, "Remaining", StepType::Doc)];

        let result = orchestrator
            .execute_plan(plan, &CancellationToken::new(), &())
            .await;

        assert!(result.is_success());
        assert_eq!(result.step_results.len(), 1);
        assert_eq!(result.step_results[0].step.order, 2);
        assert!(result.plan.unwrap().is_complete());
    }

    #[derive(Default)]
    struct RecordingListener {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PlanListener for RecordingListener {
        async fn on_plan_created(&self, plan: &Plan) {
            self.calls.lock().unwrap().push(format!("created {}", plan.goal));
        }

        async fn on_run_finished(&self, result: &OrchestratorResult) {
            self.calls.lock().unwrap().push(format!("finished {:?}", result.outcome));
        }
    }

    #[tokio::test]
    async fn listener_sees_plan_and_finish() {
        let h = Harness::new(
            vec![plan_json("Hook", &[("Only step", &[])]), "Nothing.".into()],
            Arc::new(ScriptedConfirmer::always(true)),
        );
        let mut orchestrator = Orchestrator::new(
            Collaborators {
                provider: h.provider.clone(),
                fs: h.fs.clone(),
                runner: h.runner.clone(),
                confirmer: h.confirmer.clone(),
                bus: h.bus.clone(),
            },
            personas(),
            OrchestratorConfig {
                auto_approve: true,
                review_enabled: false,
                ..OrchestratorConfig::default()
            },
        );
        let listener = RecordingListener::default();

        let result = orchestrator
            .run("Hook", "", &CancellationToken::new(), &listener)
            .await;

        assert!(result.is_success());
        assert_eq!(
            listener.calls.lock().unwrap().as_slice(),
            ["created Hook", "finished Success"]
        );
    }
}
