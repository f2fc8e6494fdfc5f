//! Guard rails for model-proposed actions.
//!
//! Commands are checked against a substring blocklist; file paths must stay
//! inside the project root, both lexically and after resolving symlinks.

use localcoder_core::error::ToolError;
use std::path::{Component, Path, PathBuf};

/// Reject a command containing any blocked pattern (case-insensitive,
/// whitespace-normalized).
pub fn check_command(command: &str, blocked: &[String]) -> Result<(), ToolError> {
    let normalized = normalize(command);
    for pattern in blocked {
        let needle = normalize(pattern);
        if needle.is_empty() {
            continue;
        }
        // Keep a trailing space in patterns like "sudo " meaningful
        let needle = if pattern.ends_with(' ') {
            format!("{needle} ")
        } else {
            needle
        };
        let haystack = format!("{normalized} ");
        if haystack.contains(&needle) {
            return Err(ToolError::Blocked {
                command: command.to_string(),
                pattern: pattern.clone(),
            });
        }
    }
    Ok(())
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Resolve `path` against `root`, refusing anything that lands outside it.
///
/// Absolute paths are accepted only when they already point inside `root`.
/// `..` components may not climb above the root, and the nearest existing
/// ancestor must canonicalize inside the canonical root (no symlink escape).
pub fn resolve_within(root: &Path, path: &str) -> Result<PathBuf, ToolError> {
    let outside = || ToolError::OutsideRoot {
        path: path.to_string(),
    };

    let candidate = Path::new(path.trim());
    let relative = if candidate.is_absolute() {
        candidate.strip_prefix(root).map_err(|_| outside())?
    } else {
        candidate
    };

    let mut normalized = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(outside());
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(outside()),
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(outside());
    }

    let resolved = root.join(&normalized);

    if let Ok(canonical_root) = root.canonicalize() {
        let mut existing = resolved.as_path();
        while !existing.exists() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => break,
            }
        }
        if let Ok(canonical) = existing.canonicalize()
            && !canonical.starts_with(&canonical_root)
        {
            return Err(outside());
        }
    }

    Ok(resolved)
}
