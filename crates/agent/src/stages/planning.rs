//! Planning stage: goal + project context in, validated [`Plan`] out.

use localcoder_core::error::{WorkflowError, preview};
use localcoder_core::event::{DomainEvent, EventBus};
use localcoder_core::message::Message;
use localcoder_core::persona::Persona;
use localcoder_core::plan::Plan;
use localcoder_core::provider::Provider;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::extract::parse_structured;
use crate::prompts::planning_prompt;
use crate::stream::collect_stream;

pub struct PlanningStage<'a> {
    pub provider: &'a dyn Provider,
    pub persona: &'a Persona,
    pub bus: &'a EventBus,
    pub max_steps: usize,
}

impl PlanningStage<'_> {
    /// Ask the planner for a plan. Malformed output is an error; there is
    /// no retry.
    pub async fn create_plan(
        &self,
        goal: &str,
        context: &str,
        cancel: &CancellationToken,
    ) -> Result<Plan, WorkflowError> {
        let messages = vec![Message::user(planning_prompt(goal, context))];
        let raw = collect_stream(self.provider, self.persona, messages, self.bus, cancel).await?;
        let plan = parse_plan(&raw, goal, self.max_steps)?;

        info!(goal = %plan.goal, steps = plan.total_steps(), "Plan created");
        self.bus.publish(DomainEvent::PlanCreated {
            goal: plan.goal.clone(),
            steps: plan.total_steps(),
            outline: plan.outline(),
        });
        Ok(plan)
    }
}

/// Extract and validate a plan from raw planner output.
///
/// Missing orders take their 1-based position; a missing goal falls back to
/// the goal that was asked for. Dangling dependencies are only logged.
pub fn parse_plan(raw: &str, goal: &str, max_steps: usize) -> Result<Plan, WorkflowError> {
    let mut plan: Plan = parse_structured(raw, "plan")?;
    if plan.goal.trim().is_empty() {
        plan.goal = goal.to_string();
    }
    plan.fill_missing_orders();

    plan.validate(max_steps).map_err(|e| match e {
        WorkflowError::Validation { message, .. } => WorkflowError::Validation {
            message,
            raw: Some(preview(raw)),
        },
        other => other,
    })?;

    for (step, missing) in plan.dangling_dependencies() {
        warn!(step, missing, "Step depends on a step that is not in the plan");
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{SequentialMockProvider, persona};
    use localcoder_core::persona::PersonaKind;
    use localcoder_core::plan::{Complexity, StepType};

    #[test]
    fn plan_behind_a_reasoning_preamble() {
        let raw = "Thinking...\nplan this\n...done thinking.\n{\"goal\":\"Add auth\",\"steps\":[{\"order\":1,\"description\":\"Create model\"}]}";
        let plan = parse_plan(raw, "ignored", 20).unwrap();
        assert_eq!(plan.goal, "Add auth");
        assert_eq!(plan.total_steps(), 1);
        assert_eq!(plan.steps[0].description, "Create model");
        assert_eq!(plan.steps[0].step_type, StepType::Code);
    }

    #[test]
    fn missing_goal_and_orders_are_filled() {
        let raw = r#"{"complexity": "HIGH", "steps": [{"description": "a"}, {"description": "b", "dependencies": [1]}]}"#;
        let plan = parse_plan(raw, "Refactor", 20).unwrap();
        assert_eq!(plan.goal, "Refactor");
        assert_eq!(plan.complexity, Complexity::High);
        assert_eq!(
            plan.steps.iter().map(|s| s.order).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[test]
    fn zero_steps_is_no_steps() {
        let err = parse_plan(r#"{"goal": "x", "steps": []}"#, "x", 20).unwrap_err();
        assert!(matches!(err, WorkflowError::NoSteps));
    }

    #[test]
    fn too_many_steps_carries_raw_text() {
        let raw = r#"{"goal": "x", "steps": [{"description": "a"}, {"description": "b"}, {"description": "c"}]}"#;
        let err = parse_plan(raw, "x", 2).unwrap_err();
        assert!(matches!(err, WorkflowError::Validation { .. }));
        assert!(err.raw_text().unwrap().contains("\"steps\""));
    }

    #[test]
    fn self_dependency_is_accepted() {
        let raw = r#"{"goal": "x", "steps": [{"order": 1, "description": "a", "dependencies": [1]}]}"#;
        let plan = parse_plan(raw, "x", 20).unwrap();
        assert_eq!(plan.steps[0].dependencies, vec![1]);
    }

    #[test]
    fn prose_only_output_is_empty_output() {
        let err = parse_plan("I'd start by reading the code.", "x", 20).unwrap_err();
        assert!(matches!(err, WorkflowError::EmptyOutput { .. }));
    }

    #[tokio::test]
    async fn create_plan_publishes_plan_created() {
        let provider = SequentialMockProvider::new(vec![
            r#"```json
{"goal": "Add logging", "steps": [{"order": 1, "description": "Add tracing", "files": ["src/main.rs"]}]}
```"#,
        ]);
        let planner = persona(PersonaKind::Planner);
        let bus = EventBus::default();
        let mut events = bus.subscribe();

        let stage = PlanningStage {
            provider: &provider,
            persona: &planner,
            bus: &bus,
            max_steps: 20,
        };
        let plan = stage
            .create_plan("Add logging", "src/main.rs", &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(plan.steps[0].files, vec!["src/main.rs"]);

        let prompt = &provider.requests()[0].messages[1].content;
        assert!(prompt.contains("Add logging"));

        let mut saw_plan = false;
        while let Ok(event) = events.try_recv() {
            if let DomainEvent::PlanCreated { steps, .. } = event.as_ref() {
                assert_eq!(*steps, 1);
                saw_plan = true;
            }
        }
        assert!(saw_plan);
    }
}
