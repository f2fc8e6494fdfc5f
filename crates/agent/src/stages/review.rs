//! Review stage: per-step and whole-plan reviews.

use localcoder_core::error::WorkflowError;
use localcoder_core::event::{DomainEvent, EventBus};
use localcoder_core::message::Message;
use localcoder_core::persona::Persona;
use localcoder_core::plan::Plan;
use localcoder_core::provider::Provider;
use localcoder_core::review::Review;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::extract::parse_structured;
use crate::prompts::{final_review_prompt, step_review_prompt};
use crate::stages::execution::StepExecutionResult;
use crate::stream::collect_stream;

pub struct ReviewStage<'a> {
    pub provider: &'a dyn Provider,
    pub persona: &'a Persona,
    pub bus: &'a EventBus,
}

impl ReviewStage<'_> {
    pub async fn review_step(
        &self,
        plan: &Plan,
        result: &StepExecutionResult,
        cancel: &CancellationToken,
    ) -> Result<Review, WorkflowError> {
        let prompt = step_review_prompt(plan, &result.step, result);
        self.review(prompt, Some(result.step.order), cancel).await
    }

    pub async fn review_plan(
        &self,
        plan: &Plan,
        results: &[StepExecutionResult],
        cancel: &CancellationToken,
    ) -> Result<Review, WorkflowError> {
        self.review(final_review_prompt(plan, results), None, cancel)
            .await
    }

    async fn review(
        &self,
        prompt: String,
        order: Option<u32>,
        cancel: &CancellationToken,
    ) -> Result<Review, WorkflowError> {
        let messages = vec![Message::user(prompt)];
        let raw = collect_stream(self.provider, self.persona, messages, self.bus, cancel).await?;
        let review: Review = parse_structured(&raw, "review")?;

        info!(
            step = ?order,
            approved = review.approved,
            score = review.score,
            critical = review.critical_count(),
            "Review parsed"
        );
        self.bus.publish(DomainEvent::ReviewCompleted {
            order,
            approved: review.approved,
            score: review.score,
            critical: review.critical_count(),
            warnings: review.warning_count(),
        });
        Ok(review)
    }
}
