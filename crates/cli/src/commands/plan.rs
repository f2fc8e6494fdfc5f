//! `localcoder plan`: planning only.

use localcoder_agent::stages::PlanningStage;
use localcoder_core::document::to_document;
use localcoder_core::provider::Provider;
use localcoder_core::workspace::ContextProvider;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::app::{App, CliResult};

pub async fn run(root: Option<PathBuf>, model: Option<String>, goal: &str) -> CliResult {
    let app = App::load(root, model)?;
    let provider = app.provider()?;
    provider
        .probe()
        .await
        .map_err(|e| format!("Backend not ready: {e}"))?;

    let personas = app.personas();
    let context = app.context().project_context(goal).await;
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    println!("Planning with {}...", personas.planner.model);
    let stage = PlanningStage {
        provider: provider.as_ref(),
        persona: &personas.planner,
        bus: &app.bus,
        max_steps: app.config.workflow.max_steps,
    };
    let plan = stage.create_plan(goal, &context, &cancel).await.map_err(|e| {
        match e.raw_text() {
            Some(raw) => format!("Planning failed: {e}\n\nModel output:\n{raw}"),
            None => format!("Planning failed: {e}"),
        }
    })?;

    println!("\n{}", to_document(&plan));
    let path = app.artifacts().save_plan(&plan).await?;
    println!("Saved plan to {}", path.display());
    Ok(())
}
