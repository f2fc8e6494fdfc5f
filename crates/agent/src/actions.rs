//! Action parser: find file writes and shell commands in executor output.
//!
//! File writes are fenced blocks whose info string carries a path directive:
//!
//! ````text
//! ```rust file: src/main.rs
//! fn main() {}
//! ```
//! ````
//!
//! Shell commands come from fenced blocks tagged with a shell-family language
//! (or no tag at all). Parsing is pure: no filesystem or process access.

use tracing::warn;

/// Language tags treated as shell blocks. An empty tag counts too.
const SHELL_TAGS: &[&str] = &[
    "bash",
    "sh",
    "shell",
    "zsh",
    "console",
    "terminal",
    "cmd",
    "powershell",
];

/// A full-content file write proposed by the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWrite {
    pub path: String,
    pub content: String,
}

/// Everything actionable found in one response, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedActions {
    pub file_writes: Vec<FileWrite>,
    pub commands: Vec<String>,
}

impl ParsedActions {
    pub fn is_empty(&self) -> bool {
        self.file_writes.is_empty() && self.commands.is_empty()
    }

    pub fn len(&self) -> usize {
        self.file_writes.len() + self.commands.len()
    }
}

enum BlockKind {
    File(String),
    Shell,
    Other,
}

/// `file: src/a.rs`, `path=src/a.rs`, or `rust file: src/a.rs` → `src/a.rs`.
fn path_directive(info: &str) -> Option<String> {
    let after_lang = info
        .split_once(char::is_whitespace)
        .map(|(_, rest)| rest.trim_start());
    [Some(info), after_lang]
        .into_iter()
        .flatten()
        .find_map(|candidate| {
            let lower = candidate.to_ascii_lowercase();
            let keyword_len = ["file", "path"]
                .iter()
                .find(|k| lower.starts_with(*k))?
                .len();
            let rest = candidate[keyword_len..].trim_start();
            let rest = rest.strip_prefix([':', '='])?;
            let path = rest.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`');
            (!path.is_empty()).then(|| path.to_string())
        })
}

fn classify(info: &str) -> BlockKind {
    let info = info.trim();
    if let Some(path) = path_directive(info) {
        return BlockKind::File(path);
    }
    let tag = info
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    if tag.is_empty() || SHELL_TAGS.contains(&tag.as_str()) {
        BlockKind::Shell
    } else {
        BlockKind::Other
    }
}

/// Turn the body of a shell block into commands.
///
/// Blank and `#` comment lines are dropped, a leading `$ ` prompt is removed,
/// and backslash-continued lines are joined.
fn shell_commands(body: &[&str]) -> Vec<String> {
    let mut commands = Vec::new();
    let mut pending = String::new();

    for line in body {
        let line = line.trim();
        if pending.is_empty() && (line.is_empty() || line.starts_with('#')) {
            continue;
        }
        let line = line.strip_prefix("$ ").unwrap_or(line);
        match line.strip_suffix('\\') {
            Some(head) => {
                pending.push_str(head.trim_end());
                pending.push(' ');
            }
            None => {
                pending.push_str(line);
                let command = pending.trim().to_string();
                if !command.is_empty() {
                    commands.push(command);
                }
                pending.clear();
            }
        }
    }

    let tail = pending.trim();
    if !tail.is_empty() {
        commands.push(tail.to_string());
    }
    commands
}

/// Scan executor output for file writes and shell commands.
pub fn parse_actions(text: &str) -> ParsedActions {
    let mut actions = ParsedActions::default();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let Some(info) = line.trim_start().strip_prefix("```") else {
            continue;
        };
        let kind = classify(info);

        let mut body = Vec::new();
        let mut closed = false;
        for inner in lines.by_ref() {
            if inner.trim_end() == "```" {
                closed = true;
                break;
            }
            body.push(inner);
        }

        match kind {
            BlockKind::File(path) if closed => {
                let mut content = String::new();
                for line in &body {
                    content.push_str(line);
                    content.push('\n');
                }
                actions.file_writes.push(FileWrite { path, content });
            }
            BlockKind::File(path) => {
                warn!(path = %path, "Ignoring unterminated file block");
            }
            BlockKind::Shell => actions.commands.extend(shell_commands(&body)),
            BlockKind::Other => {}
        }
    }

    actions
}
