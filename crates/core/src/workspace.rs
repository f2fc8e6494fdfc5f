//! Workspace collaborators: the seams between the engine and the outside world.
//!
//! The engine never touches the disk, spawns a process, or prompts the user
//! directly. It goes through these traits, which the tools crate implements
//! for real and the tests implement in memory.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ToolError;

/// File access scoped to a project root.
///
/// Paths are given as the model wrote them, relative to the root.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// The project root all relative paths resolve against.
    fn root(&self) -> &Path;

    /// Resolve a relative path, rejecting paths that escape the root.
    fn resolve(&self, path: &str) -> std::result::Result<PathBuf, ToolError>;

    /// Read a file. Missing or unreadable files are `None`, never an error.
    async fn read(&self, path: &str) -> Option<String>;

    /// Write a file, creating parent directories as needed.
    async fn write(&self, path: &str, content: &str) -> std::result::Result<(), ToolError>;
}

/// One line of output from a running command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// What a finished command produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs shell commands.
///
/// Implementations stream each output line to `sink` as it arrives. Dropping
/// the returned future must terminate the child process.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        command: &str,
        cwd: &Path,
        sink: &(dyn Fn(OutputLine) + Send + Sync),
    ) -> std::result::Result<ProcessOutput, ToolError>;
}

/// Interactive approval gates.
#[async_trait]
pub trait Confirmer: Send + Sync {
    /// Ask a yes/no question.
    async fn confirm(&self, question: &str) -> bool;

    /// Show the change to `path` and ask whether to apply it.
    /// `current` is `None` when the file does not exist yet.
    async fn confirm_write(&self, path: &str, current: Option<&str>, proposed: &str) -> bool;

    /// Ask whether to run a shell command.
    async fn confirm_command(&self, command: &str) -> bool {
        self.confirm(&format!("Run `{command}`?")).await
    }
}

/// Builds the project-context text sent to the planner.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn project_context(&self, goal: &str) -> String;
}
