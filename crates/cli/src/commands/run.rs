//! `localcoder run`: one goal through plan, execute and review.

use localcoder_agent::Orchestrator;
use localcoder_agent::session::describe;
use localcoder_core::provider::Provider;
use localcoder_core::workspace::ContextProvider;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::app::{App, CliResult};
use crate::terminal::render_events;

pub async fn run(
    root: Option<PathBuf>,
    model: Option<String>,
    goal: &str,
    yes: bool,
    no_review: bool,
) -> CliResult {
    let app = App::load(root, model)?;
    let provider = app.provider()?;
    provider
        .probe()
        .await
        .map_err(|e| format!("Backend not ready: {e}"))?;

    let mut config = app.orchestrator_config();
    config.auto_approve |= yes;
    config.review_enabled &= !no_review;

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let renderer = tokio::spawn(render_events(app.bus.subscribe()));
    let result = {
        let context = app.context().project_context(goal).await;
        let artifacts = app.artifacts();
        let mut orchestrator =
            Orchestrator::new(app.collaborators(provider), app.personas(), config);
        orchestrator.run(goal, &context, &cancel, &artifacts).await
    };

    // Closing the bus lets the renderer drain and exit
    drop(app);
    let _ = renderer.await;

    println!("\n{}", describe(&result));
    match result.error() {
        Some(error) => Err(error.to_string().into()),
        None => Ok(()),
    }
}
