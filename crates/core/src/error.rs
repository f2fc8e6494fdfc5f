//! Error types for the localcoder domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; [`Error`] wraps them all.

use thiserror::Error;

/// Maximum number of characters of failing model output kept for diagnostics.
pub const PREVIEW_LIMIT: usize = 500;

/// The top-level error type for all localcoder operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Workflow errors ---
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    // --- Tool errors ---
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures talking to the model backend.
///
/// Transport failures are split into timeout / refused / unresolved so the
/// user gets an actionable message instead of a raw transport error.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Model not found: {0} (pull it with `ollama pull {0}`)")]
    ModelNotFound(String),

    #[error("Request to {0} timed out; the backend may be overloaded or still loading the model")]
    Timeout(String),

    #[error("Connection to {0} was refused; is `ollama serve` running?")]
    ConnectionRefused(String),

    #[error("Could not resolve host for {0}; check the configured base_url")]
    HostUnresolved(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Invalid response from backend: {0}")]
    InvalidResponse(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    /// Whether this error means the backend could not be reached at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::ConnectionRefused(_) | Self::HostUnresolved(_)
        )
    }
}

/// Failures of the planning / execution / review pipeline.
#[derive(Debug, Clone, Error)]
pub enum WorkflowError {
    /// The model produced nothing that looks like a JSON object.
    #[error("The model produced no usable {target}")]
    EmptyOutput { target: &'static str, raw: String },

    /// A JSON object was found but does not match the expected shape.
    #[error("Invalid structured output for {target}: {reason}\n--- attempted ---\n{preview}")]
    InvalidStructuredOutput {
        target: &'static str,
        reason: String,
        preview: String,
    },

    /// The payload parsed but violates a domain rule.
    #[error("Validation failed: {message}")]
    Validation { message: String, raw: Option<String> },

    #[error("No steps found in plan")]
    NoSteps,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Backend(#[from] ProviderError),

    #[error("Failed to persist {path}: {reason}")]
    Persistence { path: String, reason: String },

    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },
}

impl WorkflowError {
    /// Build an `InvalidStructuredOutput` with a bounded preview of `attempted`.
    pub fn invalid_output(target: &'static str, reason: impl Into<String>, attempted: &str) -> Self {
        Self::InvalidStructuredOutput {
            target,
            reason: reason.into(),
            preview: preview(attempted),
        }
    }

    /// The raw model text that failed, when the error carries one.
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            Self::EmptyOutput { raw, .. } => Some(raw),
            Self::InvalidStructuredOutput { preview, .. } => Some(preview),
            Self::Validation { raw, .. } => raw.as_deref(),
            _ => None,
        }
    }

    /// Extraction and validation failures: the model output was unusable.
    pub fn is_output_failure(&self) -> bool {
        matches!(
            self,
            Self::EmptyOutput { .. }
                | Self::InvalidStructuredOutput { .. }
                | Self::Validation { .. }
                | Self::NoSteps
        )
    }
}

/// Truncate `text` to [`PREVIEW_LIMIT`] characters, marking the cut.
pub fn preview(text: &str) -> String {
    if text.chars().count() <= PREVIEW_LIMIT {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(PREVIEW_LIMIT).collect();
    cut.push('…');
    cut
}

/// Failures applying actions to the workspace.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Command blocked by pattern '{pattern}': {command}")]
    Blocked { command: String, pattern: String },

    #[error("Path '{path}' is outside the project root")]
    OutsideRoot { path: String },

    #[error("Command execution failed: {command}: {reason}")]
    ExecutionFailed { command: String, reason: String },

    #[error("Command timed out after {timeout_secs}s: {command}")]
    Timeout { command: String, timeout_secs: u64 },

    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 500,
            message: "model crashed".into(),
        });
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("model crashed"));
    }

    #[test]
    fn connectivity_errors_are_actionable() {
        let refused = ProviderError::ConnectionRefused("http://localhost:11434".into());
        assert!(refused.to_string().contains("ollama serve"));
        assert!(refused.is_unreachable());
        assert!(!ProviderError::ModelNotFound("x".into()).is_unreachable());
    }

    #[test]
    fn invalid_output_preview_is_bounded() {
        let attempted = "x".repeat(2_000);
        let err = WorkflowError::invalid_output("plan", "missing field `steps`", &attempted);
        match &err {
            WorkflowError::InvalidStructuredOutput { preview, .. } => {
                assert!(preview.chars().count() <= PREVIEW_LIMIT + 1);
            }
            other => panic!("unexpected variant: {other:?}"),
        }
        assert!(err.is_output_failure());
        assert!(err.raw_text().is_some());
    }

    #[test]
    fn short_preview_is_untouched() {
        assert_eq!(preview("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn tool_error_displays_correctly() {
        let err = Error::Tool(ToolError::Blocked {
            command: "sudo rm -rf /".into(),
            pattern: "sudo ".into(),
        });
        assert!(err.to_string().contains("sudo"));
        assert!(err.to_string().contains("blocked"));
    }
}
