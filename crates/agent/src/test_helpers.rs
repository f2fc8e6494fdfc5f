//! Shared test doubles: a scripted provider and in-memory collaborators.
//!
//! Public so the CLI integration tests can drive the engine without a
//! backend, a real disk, or a terminal.

use async_trait::async_trait;
use localcoder_core::error::{ProviderError, ToolError};
use localcoder_core::persona::{Persona, PersonaKind, PersonaSet};
use localcoder_core::provider::{ChunkStream, Provider, ProviderRequest, StreamChunk};
use localcoder_core::workspace::{
    Confirmer, ContextProvider, FileSystem, OutputLine, ProcessOutput, ProcessRunner,
};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// A mock provider that streams a sequence of scripted responses.
///
/// Each call to `stream` returns the next response, split into a few
/// fragments. Running out of responses is a backend error.
pub struct SequentialMockProvider {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new<S: Into<String>>(responses: Vec<S>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

/// Split `text` into fragments of roughly `size` characters.
fn fragments(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size.max(1)).map(|c| c.iter().collect()).collect()
}

#[async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkStream, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        let Some(response) = self.responses.lock().unwrap().pop_front() else {
            return Err(ProviderError::InvalidResponse(format!(
                "SequentialMockProvider: no response scripted for call #{call}"
            )));
        };

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            for fragment in fragments(&response, 7) {
                if tx.send(Ok(StreamChunk::text(fragment))).await.is_err() {
                    return;
                }
            }
            let _ = tx.send(Ok(StreamChunk::done())).await;
        });
        Ok(rx)
    }
}

pub fn persona(kind: PersonaKind) -> Persona {
    Persona::new(kind, "test-model", 0.1, format!("You are the {kind}."))
}

pub fn personas() -> PersonaSet {
    PersonaSet {
        planner: persona(PersonaKind::Planner),
        executor: persona(PersonaKind::Executor),
        reviewer: persona(PersonaKind::Reviewer),
    }
}

/// An in-memory file tree rooted at a fake path.
pub struct MemoryFileSystem {
    root: PathBuf,
    files: Mutex<BTreeMap<String, String>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/workspace"),
            files: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
        self
    }

    pub fn get(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        let escapes = path.is_empty()
            || Path::new(path).is_absolute()
            || path.split(['/', '\\']).any(|part| part == "..");
        if escapes {
            return Err(ToolError::OutsideRoot {
                path: path.to_string(),
            });
        }
        Ok(self.root.join(path))
    }

    async fn read(&self, path: &str) -> Option<String> {
        self.get(path)
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), ToolError> {
        self.resolve(path)?;
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_string());
        Ok(())
    }
}

/// Records commands and answers with scripted exit codes (default 0).
pub struct ScriptedRunner {
    exit_codes: Mutex<VecDeque<i32>>,
    commands: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::with_exit_codes(Vec::new())
    }

    pub fn with_exit_codes(codes: Vec<i32>) -> Self {
        Self {
            exit_codes: Mutex::new(codes.into()),
            commands: Mutex::new(Vec::new()),
        }
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(
        &self,
        command: &str,
        _cwd: &Path,
        sink: &(dyn Fn(OutputLine) + Send + Sync),
    ) -> Result<ProcessOutput, ToolError> {
        self.commands.lock().unwrap().push(command.to_string());
        let code = self.exit_codes.lock().unwrap().pop_front().unwrap_or(0);
        let line = format!("ran {command}");
        sink(OutputLine::Stdout(line.clone()));
        Ok(ProcessOutput {
            exit_code: Some(code),
            stdout: line,
            stderr: String::new(),
        })
    }
}

/// Answers every question from a script, then falls back to `default`.
pub struct ScriptedConfirmer {
    answers: Mutex<VecDeque<bool>>,
    default: bool,
    questions: Mutex<Vec<String>>,
}

impl ScriptedConfirmer {
    pub fn always(answer: bool) -> Self {
        Self::new(Vec::new(), answer)
    }

    pub fn new(answers: Vec<bool>, default: bool) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            default,
            questions: Mutex::new(Vec::new()),
        }
    }

    /// Every question asked, writes included as `write <path>`.
    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }

    fn answer(&self, question: String) -> bool {
        self.questions.lock().unwrap().push(question);
        self.answers.lock().unwrap().pop_front().unwrap_or(self.default)
    }
}

#[async_trait]
impl Confirmer for ScriptedConfirmer {
    async fn confirm(&self, question: &str) -> bool {
        self.answer(question.to_string())
    }

    async fn confirm_write(&self, path: &str, _current: Option<&str>, _proposed: &str) -> bool {
        self.answer(format!("write {path}"))
    }
}

/// Returns the same context text for every goal.
pub struct StaticContext(pub String);

#[async_trait]
impl ContextProvider for StaticContext {
    async fn project_context(&self, _goal: &str) -> String {
        self.0.clone()
    }
}

/// A planner response with one step per `(description, files)` pair.
pub fn plan_json(goal: &str, steps: &[(&str, &[&str])]) -> String {
    let steps: Vec<serde_json::Value> = steps
        .iter()
        .enumerate()
        .map(|(i, (description, files))| {
            serde_json::json!({
                "order": i + 1,
                "description": description,
                "type": "code",
                "files": files,
            })
        })
        .collect();
    serde_json::json!({
        "goal": goal,
        "context": "test project",
        "complexity": "low",
        "steps": steps,
    })
    .to_string()
}

/// A reviewer response with the given approval and issue severities.
pub fn review_json(approved: bool, severities: &[&str]) -> String {
    let issues: Vec<serde_json::Value> = severities
        .iter()
        .map(|severity| {
            serde_json::json!({
                "severity": severity,
                "category": "bug",
                "message": format!("{severity} issue"),
            })
        })
        .collect();
    serde_json::json!({
        "approved": approved,
        "score": if approved { 8 } else { 3 },
        "issues": issues,
        "summary": "reviewed",
    })
    .to_string()
}
