//! Wiring shared by every command: config, provider, collaborators.

use localcoder_agent::{ArtifactStore, Collaborators, OrchestratorConfig, build_personas};
use localcoder_config::AppConfig;
use localcoder_core::event::EventBus;
use localcoder_core::persona::{PersonaSet, RULES_FILE};
use localcoder_core::workspace::ContextProvider;
use localcoder_providers::OllamaProvider;
use localcoder_tools::{FileListingContext, LocalFileSystem, ShellRunner};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::terminal::{Input, TerminalConfirmer};

pub type CliResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

pub struct App {
    pub root: PathBuf,
    pub config: AppConfig,
    pub bus: Arc<EventBus>,
    pub input: Input,
}

impl App {
    /// Resolve the project root and load its layered configuration.
    pub fn load(root: Option<PathBuf>, model: Option<String>) -> CliResult<Self> {
        let root = project_root(root)?;
        let mut config =
            AppConfig::load(&root).map_err(|e| format!("Failed to load config: {e}"))?;
        if let Some(model) = model {
            config.default_model = model;
        }
        debug!(root = %root.display(), model = %config.default_model, "Configuration loaded");

        Ok(Self {
            root,
            config,
            bus: Arc::new(EventBus::default()),
            input: Input::new(),
        })
    }

    /// Contents of `.localcoder/RULES.md`, when present.
    pub fn rules(&self) -> Option<String> {
        std::fs::read_to_string(AppConfig::project_dir(&self.root).join(RULES_FILE)).ok()
    }

    pub fn personas(&self) -> PersonaSet {
        build_personas(&self.config, self.rules().as_deref())
    }

    pub fn provider(&self) -> CliResult<Arc<OllamaProvider>> {
        Ok(Arc::new(OllamaProvider::from_config(&self.config.backend)?))
    }

    pub fn collaborators(&self, provider: Arc<OllamaProvider>) -> Collaborators {
        Collaborators {
            provider,
            fs: Arc::new(LocalFileSystem::new(
                &self.root,
                self.config.safety.restrict_to_root,
            )),
            runner: Arc::new(ShellRunner::new(Duration::from_secs(
                self.config.safety.shell_timeout_secs,
            ))),
            confirmer: Arc::new(TerminalConfirmer::new(self.input.clone())),
            bus: self.bus.clone(),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig::from_app(&self.config)
    }

    pub fn context(&self) -> Arc<dyn ContextProvider> {
        Arc::new(FileListingContext::new(&self.root))
    }

    pub fn artifacts(&self) -> ArtifactStore {
        ArtifactStore::new(&self.root, self.config.artifacts.clone(), self.bus.clone())
            .with_restrict_to_root(self.config.safety.restrict_to_root)
    }
}

/// `--root`, or the current directory, canonicalized.
pub fn project_root(root: Option<PathBuf>) -> CliResult<PathBuf> {
    let root = match root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    canonical_dir(&root)
}

fn canonical_dir(path: &Path) -> CliResult<PathBuf> {
    let canonical = path
        .canonicalize()
        .map_err(|e| format!("Project root {}: {e}", path.display()))?;
    if !canonical.is_dir() {
        return Err(format!("Project root {} is not a directory", canonical.display()).into());
    }
    Ok(canonical)
}
