//! Local filesystem access scoped to the project root.

use async_trait::async_trait;
use localcoder_core::error::ToolError;
use localcoder_core::workspace::FileSystem;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::guard::resolve_within;

/// Reads and writes files under a project root.
pub struct LocalFileSystem {
    root: PathBuf,
    restrict_to_root: bool,
}

impl LocalFileSystem {
    pub fn new(root: impl Into<PathBuf>, restrict_to_root: bool) -> Self {
        Self {
            root: root.into(),
            restrict_to_root,
        }
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        if self.restrict_to_root {
            resolve_within(&self.root, path)
        } else {
            Ok(self.root.join(path.trim()))
        }
    }

    async fn read(&self, path: &str) -> Option<String> {
        let resolved = self.resolve(path).ok()?;
        tokio::fs::read_to_string(&resolved).await.ok()
    }

    async fn write(&self, path: &str, content: &str) -> Result<(), ToolError> {
        let resolved = self.resolve(path)?;
        let io_err = |e: std::io::Error| ToolError::Io {
            path: resolved.display().to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&resolved, content).await.map_err(io_err)?;

        debug!(path = %resolved.display(), bytes = content.len(), "Wrote file");
        Ok(())
    }
}
