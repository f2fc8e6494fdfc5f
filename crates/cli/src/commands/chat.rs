//! `localcoder chat`: interactive session.

use localcoder_agent::{Reply, SessionController};
use localcoder_core::provider::Provider;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::app::{App, CliResult};
use crate::terminal::render_events;

pub async fn run(root: Option<PathBuf>, model: Option<String>) -> CliResult {
    let app = App::load(root, model)?;
    let provider = app.provider()?;

    println!("localcoder: {}", app.root.display());
    println!("Model: {} via {}", app.config.default_model, provider.base_url());
    if let Err(e) = provider.probe().await {
        println!("⚠️  Backend not reachable: {e}");
    }
    println!("Type /help for commands, /exit to quit. Ctrl-C cancels the running goal.\n");

    let renderer = tokio::spawn(render_events(app.bus.subscribe()));

    // Ctrl-C cancels whatever input is being processed, never the session
    let current = Arc::new(Mutex::new(CancellationToken::new()));
    {
        let current = current.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if let Ok(token) = current.lock() {
                    debug!("Interrupt received");
                    token.cancel();
                }
            }
        });
    }

    let mut controller = SessionController::new(
        app.collaborators(provider),
        app.personas(),
        app.orchestrator_config(),
        app.context(),
        app.artifacts(),
        app.config.workflow.history_limit,
    );

    while controller.is_running() {
        let prompt = format!("{}> ", controller.session().persona);
        let line = match app.input.read_line(&prompt).await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read input");
                break;
            }
        };

        let cancel = CancellationToken::new();
        if let Ok(mut slot) = current.lock() {
            *slot = cancel.clone();
        }

        match controller.handle_input(&line, &cancel).await {
            Reply::Text(text) => println!("{text}"),
            Reply::Silent => println!(),
            Reply::Exit => break,
        }
    }

    drop(controller);
    drop(app);
    renderer.abort();
    println!("Goodbye!");
    Ok(())
}
