//! Project context for the planner: a shallow file listing plus a few
//! well-known manifest and readme hints.

use async_trait::async_trait;
use localcoder_core::workspace::ContextProvider;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Directories never worth listing.
const SKIP_DIRS: &[&str] = &[
    ".git",
    "target",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "dist",
    "build",
    ".idea",
    ".vscode",
];

/// Manifest files that reveal the project's language and tooling.
const MANIFESTS: &[(&str, &str)] = &[
    ("Cargo.toml", "Rust (cargo)"),
    ("package.json", "JavaScript/TypeScript (npm)"),
    ("pyproject.toml", "Python"),
    ("requirements.txt", "Python (pip)"),
    ("go.mod", "Go"),
    ("pom.xml", "Java (maven)"),
    ("build.gradle", "Java/Kotlin (gradle)"),
    ("Gemfile", "Ruby (bundler)"),
    ("CMakeLists.txt", "C/C++ (cmake)"),
];

const README_PREVIEW_CHARS: usize = 1_500;

/// Lists files under the project root up to a fixed depth.
#[derive(Debug, Clone)]
pub struct FileListingContext {
    root: PathBuf,
    max_depth: usize,
    max_entries: usize,
}

impl FileListingContext {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            max_depth: 3,
            max_entries: 200,
        }
    }

    pub fn with_limits(mut self, max_depth: usize, max_entries: usize) -> Self {
        self.max_depth = max_depth;
        self.max_entries = max_entries;
        self
    }

    /// Build the context text synchronously.
    pub fn build(&self) -> String {
        let mut out = String::new();
        let name = self
            .root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.root.display().to_string());
        let _ = writeln!(out, "Project: {name}");

        let detected: Vec<&str> = MANIFESTS
            .iter()
            .filter(|(file, _)| self.root.join(file).is_file())
            .map(|(_, label)| *label)
            .collect();
        if !detected.is_empty() {
            let _ = writeln!(out, "Detected: {}", detected.join(", "));
        }

        let mut entries = Vec::new();
        let truncated = walk(&self.root, &self.root, 0, self.max_depth, self.max_entries, &mut entries);
        let _ = writeln!(out, "\nFiles:");
        for entry in &entries {
            let _ = writeln!(out, "{entry}");
        }
        if truncated {
            let _ = writeln!(out, "... (listing truncated at {} entries)", self.max_entries);
        }

        if let Some(readme) = read_readme(&self.root) {
            let _ = writeln!(out, "\nREADME (excerpt):\n{readme}");
        }

        debug!(entries = entries.len(), truncated, "Built project context");
        out
    }
}

#[async_trait]
impl ContextProvider for FileListingContext {
    async fn project_context(&self, _goal: &str) -> String {
        let listing = self.clone();
        tokio::task::spawn_blocking(move || listing.build())
            .await
            .unwrap_or_default()
    }
}

/// Depth-first listing, directories first, sorted by name. Returns `true`
/// when `max_entries` cut the listing short.
fn walk(
    root: &Path,
    dir: &Path,
    depth: usize,
    max_depth: usize,
    max_entries: usize,
    out: &mut Vec<String>,
) -> bool {
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return false;
    };
    let mut children: Vec<(bool, String, PathBuf)> = read_dir
        .filter_map(|e| e.ok())
        .map(|e| {
            let path = e.path();
            let name = e.file_name().to_string_lossy().to_string();
            (path.is_dir(), name, path)
        })
        .filter(|(is_dir, name, _)| {
            !(*is_dir && (SKIP_DIRS.contains(&name.as_str()) || name.starts_with('.')))
        })
        .collect();
    children.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    for (is_dir, _, path) in children {
        if out.len() >= max_entries {
            return true;
        }
        let relative = path.strip_prefix(root).unwrap_or(&path).display().to_string();
        let indent = "  ".repeat(depth);
        if is_dir {
            out.push(format!("{indent}{relative}/"));
            if depth + 1 < max_depth && walk(root, &path, depth + 1, max_depth, max_entries, out) {
                return true;
            }
        } else {
            out.push(format!("{indent}{relative}"));
        }
    }
    false
}

fn read_readme(root: &Path) -> Option<String> {
    ["README.md", "README", "readme.md"]
        .iter()
        .find_map(|name| std::fs::read_to_string(root.join(name)).ok())
        .map(|content| content.chars().take(README_PREVIEW_CHARS).collect())
}
