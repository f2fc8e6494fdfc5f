//! localcoder CLI, the main entry point.
//!
//! Commands:
//! - `chat`    Interactive session (default)
//! - `run`     Plan, execute and review one goal
//! - `plan`    Plan only; print and save the plan document
//! - `doctor`  Check config, backend and models
//! - `init`    Write a project config and rules file
//! - `models`  List models installed on the backend

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod app;
mod commands;
mod terminal;

#[derive(Parser)]
#[command(
    name = "localcoder",
    about = "localcoder: a plan-execute-review coding assistant for local models",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Project root (defaults to the current directory)
    #[arg(long, global = true, env = "LOCALCODER_ROOT")]
    root: Option<PathBuf>,

    /// Override the default model
    #[arg(short, long, global = true)]
    model: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session
    Chat,

    /// Run the full workflow for one goal
    Run {
        goal: String,

        /// Apply every file write and command without asking
        #[arg(short, long)]
        yes: bool,

        /// Skip per-step and final reviews
        #[arg(long)]
        no_review: bool,
    },

    /// Create a plan without executing it
    Plan { goal: String },

    /// Diagnose config and backend health
    Doctor,

    /// Write a default project config
    Init {
        /// Overwrite existing files
        #[arg(short, long)]
        force: bool,
    },

    /// List models available on the backend
    Models,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Logs go to stderr so they never interleave with streamed model output
    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => commands::chat::run(cli.root, cli.model).await?,
        Commands::Run {
            goal,
            yes,
            no_review,
        } => commands::run::run(cli.root, cli.model, &goal, yes, no_review).await?,
        Commands::Plan { goal } => commands::plan::run(cli.root, cli.model, &goal).await?,
        Commands::Doctor => commands::doctor::run(cli.root, cli.model).await?,
        Commands::Init { force } => commands::init::run(cli.root, force).await?,
        Commands::Models => commands::models::run(cli.root).await?,
    }

    Ok(())
}
