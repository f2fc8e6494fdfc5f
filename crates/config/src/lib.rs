//! Configuration loading, validation, and management for localcoder.
//!
//! Loads `~/.localcoder/config.toml`, overlays the project's
//! `.localcoder/config.toml` when present, then applies environment variable
//! overrides. Validates all settings at startup.

use localcoder_core::PersonaKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory name used both under `$HOME` and under the project root.
pub const CONFIG_DIR_NAME: &str = ".localcoder";
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// The root configuration structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Model used by every persona without its own override
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Temperature used by every persona without its own override
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Model backend connection settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Per-persona overrides
    #[serde(default)]
    pub personas: PersonasConfig,

    /// Workflow engine behavior
    #[serde(default)]
    pub workflow: WorkflowConfig,

    /// Shell and filesystem guard rails
    #[serde(default)]
    pub safety: SafetyConfig,

    /// Plan and review documents written to the project
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

fn default_model() -> String {
    "qwen2.5-coder:7b".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Upper bound for one generation request (models can be slow to load)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Availability probe timeout; kept short so `doctor` answers quickly
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}
fn default_request_timeout() -> u64 {
    600
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_probe_timeout() -> u64 {
    3
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

/// Optional overrides for one persona.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Replaces the built-in system prompt entirely
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonasConfig {
    #[serde(default)]
    pub planner: PersonaConfig,
    #[serde(default)]
    pub executor: PersonaConfig,
    #[serde(default)]
    pub reviewer: PersonaConfig,
}

impl PersonasConfig {
    pub fn get(&self, kind: PersonaKind) -> &PersonaConfig {
        match kind {
            PersonaKind::Planner => &self.planner,
            PersonaKind::Executor => &self.executor,
            PersonaKind::Reviewer => &self.reviewer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Skip every approval prompt and the final review
    #[serde(default)]
    pub auto_approve: bool,

    /// Review each step after it executes
    #[serde(default = "default_true")]
    pub review_enabled: bool,

    /// Plans with more steps than this are rejected
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Bytes of existing file content included per file in executor prompts
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,

    /// Session history ring size
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_max_steps() -> usize {
    20
}
fn default_max_file_bytes() -> usize {
    64 * 1024
}
fn default_history_limit() -> usize {
    50
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            auto_approve: false,
            review_enabled: true,
            max_steps: default_max_steps(),
            max_file_bytes: default_max_file_bytes(),
            history_limit: default_history_limit(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Commands containing any of these substrings are never run
    #[serde(default = "default_blocked_commands")]
    pub blocked_commands: Vec<String>,

    #[serde(default = "default_shell_timeout")]
    pub shell_timeout_secs: u64,

    /// Reject file writes that resolve outside the project root
    #[serde(default = "default_true")]
    pub restrict_to_root: bool,
}

fn default_blocked_commands() -> Vec<String> {
    [
        "rm -rf /",
        "rm -rf ~",
        "rm -rf *",
        "sudo ",
        "mkfs",
        "dd if=",
        ":(){",
        "shutdown",
        "reboot",
        "> /dev/sd",
        "chmod -R 777 /",
        "git push --force",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
fn default_shell_timeout() -> u64 {
    300
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            blocked_commands: default_blocked_commands(),
            shell_timeout_secs: default_shell_timeout(),
            restrict_to_root: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Relative to the project root
    #[serde(default = "default_plans_dir")]
    pub plans_dir: PathBuf,

    /// Relative to the project root
    #[serde(default = "default_reviews_dir")]
    pub reviews_dir: PathBuf,
}

fn default_plans_dir() -> PathBuf {
    PathBuf::from("docs/plans")
}
fn default_reviews_dir() -> PathBuf {
    PathBuf::from("docs/reviews")
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            plans_dir: default_plans_dir(),
            reviews_dir: default_reviews_dir(),
        }
    }
}

impl AppConfig {
    /// Load the layered configuration for a project.
    ///
    /// Order (later wins): built-in defaults, `~/.localcoder/config.toml`,
    /// `<root>/.localcoder/config.toml`, then environment variables:
    /// - `LOCALCODER_MODEL`
    /// - `LOCALCODER_BASE_URL` (highest priority for the backend URL)
    /// - `OLLAMA_HOST`
    pub fn load(project_root: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_layers(&[
            Self::global_config_path(),
            Self::project_config_path(project_root),
        ])?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load_layers(&[path.to_path_buf()])?;
        config.validate()?;
        Ok(config)
    }

    /// Merge the given files in order. Missing files are skipped.
    fn load_layers(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        for path in paths {
            if !path.exists() {
                tracing::debug!("No config file found at {}", path.display());
                continue;
            }
            let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
                path: path.clone(),
                reason: e.to_string(),
            })?;
            let layer: toml::Value =
                toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            tracing::debug!("Loaded config layer {}", path.display());
            merge_toml(&mut merged, layer);
        }

        merged
            .try_into::<Self>()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: paths.last().cloned().unwrap_or_default(),
                reason: e.to_string(),
            })
    }

    /// Apply environment-style overrides through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("LOCALCODER_MODEL").filter(|v| !v.trim().is_empty()) {
            self.default_model = model;
        }
        let base_url = lookup("LOCALCODER_BASE_URL")
            .or_else(|| lookup("OLLAMA_HOST"))
            .filter(|v| !v.trim().is_empty());
        if let Some(url) = base_url {
            self.backend.base_url = normalize_base_url(&url);
        }
    }

    /// Get the global configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(CONFIG_DIR_NAME)
    }

    pub fn global_config_path() -> PathBuf {
        Self::config_dir().join(CONFIG_FILE_NAME)
    }

    /// The project-local directory holding the overlay config and `RULES.md`.
    pub fn project_dir(project_root: &Path) -> PathBuf {
        project_root.join(CONFIG_DIR_NAME)
    }

    pub fn project_config_path(project_root: &Path) -> PathBuf {
        Self::project_dir(project_root).join(CONFIG_FILE_NAME)
    }

    /// Model for a persona, falling back to `default_model`.
    pub fn model_for(&self, kind: PersonaKind) -> &str {
        self.personas
            .get(kind)
            .model
            .as_deref()
            .unwrap_or(&self.default_model)
    }

    /// Temperature for a persona, falling back to `default_temperature`.
    pub fn temperature_for(&self, kind: PersonaKind) -> f32 {
        self.personas
            .get(kind)
            .temperature
            .unwrap_or(self.default_temperature)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_temperature("default_temperature", self.default_temperature)?;
        for kind in PersonaKind::ALL {
            if let Some(t) = self.personas.get(kind).temperature {
                check_temperature(&format!("personas.{kind}.temperature"), t)?;
            }
        }

        if self.backend.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "backend.base_url must not be empty".into(),
            ));
        }
        if self.default_model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "default_model must not be empty".into(),
            ));
        }
        if self.workflow.max_steps == 0 {
            return Err(ConfigError::ValidationError(
                "workflow.max_steps must be > 0".into(),
            ));
        }
        if self.workflow.history_limit == 0 {
            return Err(ConfigError::ValidationError(
                "workflow.history_limit must be > 0".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            default_temperature: default_temperature(),
            backend: BackendConfig::default(),
            personas: PersonasConfig::default(),
            workflow: WorkflowConfig::default(),
            safety: SafetyConfig::default(),
            artifacts: ArtifactsConfig::default(),
        }
    }
}

fn check_temperature(name: &str, value: f32) -> Result<(), ConfigError> {
    if !(0.0..=2.0).contains(&value) {
        return Err(ConfigError::ValidationError(format!(
            "{name} must be between 0.0 and 2.0"
        )));
    }
    Ok(())
}

/// Recursively overlay `layer` onto `base`. Tables merge; everything else replaces.
fn merge_toml(base: &mut toml::Value, layer: toml::Value) {
    match (base, layer) {
        (toml::Value::Table(base), toml::Value::Table(layer)) => {
            for (key, value) in layer {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, layer) => *base = layer,
    }
}

/// `OLLAMA_HOST` is often `host:port` without a scheme.
fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{trimmed}")
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
