//! Per-run workspace lifecycle
//!
//! Each run gets a fresh, uniquely named directory that holds the source file
//! and everything the compiler produces. The directory is never reused and
//! is removed when the run ends.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Errors that occur while setting up or using a workspace
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace directory: {0}")]
    CreateFailed(#[source] std::io::Error),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where and how workspace directories are created
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Parent directory for workspaces (system temporary directory if unset)
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Directory name prefix
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: None,
            prefix: default_prefix(),
        }
    }
}

fn default_prefix() -> String {
    "sandbox_run_".to_owned()
}

/// An exclusively owned run directory
///
/// # Cleanup
///
/// Call [`release()`](Self::release) when the run is over. It removes the
/// tree deepest-first and never fails. If a workspace is dropped without
/// being released (a panic or a cancelled future), the directory is still
/// removed on drop and a warning is logged.
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl Workspace {
    /// Create a fresh, uniquely named workspace directory
    #[instrument(skip(config), fields(prefix = %config.prefix))]
    pub fn acquire(config: &WorkspaceConfig) -> Result<Self, WorkspaceError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(&config.prefix);

        let dir = match &config.root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(WorkspaceError::CreateFailed)?;

        let path = dir.path().to_path_buf();
        debug!(?path, "workspace acquired");

        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    /// Path to the workspace directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the path to a file inside the workspace
    ///
    /// Returns an error if the name contains path traversal attempts.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        if name.is_empty() || name.contains("..") || name.starts_with('/') {
            return Err(WorkspaceError::InvalidPath(format!(
                "path traversal not allowed: {name}"
            )));
        }
        Ok(self.path.join(name))
    }

    /// Write a file into the workspace, replacing any previous content
    #[instrument(skip(self, content))]
    pub async fn write_file(&self, name: &str, content: &[u8]) -> Result<(), WorkspaceError> {
        let path = self.file_path(name)?;
        tokio::fs::write(&path, content).await?;
        debug!(?path, len = content.len(), "wrote file to workspace");
        Ok(())
    }

    /// Remove the workspace and everything in it.
    ///
    /// Entries are deleted deepest-first so directories are empty by the time
    /// they are removed. Failures are logged and otherwise ignored; a failed
    /// cleanup must never replace the outcome of the run.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn release(mut self) {
        let Some(dir) = self.dir.take() else {
            return;
        };

        let failures = remove_tree(&self.path).await;
        if failures > 0 {
            warn!(failures, "workspace cleanup left entries behind");
        } else {
            debug!("workspace released");
        }

        // Second pass for anything the walk could not see
        drop(dir);
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.dir.is_some() {
            warn!(
                path = %self.path.display(),
                "Workspace dropped without release, removing it during drop"
            );
        }
    }
}

/// Best-effort deepest-first removal. Returns the number of entries that
/// could not be removed.
async fn remove_tree(root: &Path) -> usize {
    let mut entries: Vec<(usize, PathBuf, bool)> = vec![(0, root.to_path_buf(), true)];
    let mut pending = vec![(0usize, root.to_path_buf())];
    let mut failures = 0;

    while let Some((depth, dir)) = pending.pop() {
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(read_dir) => read_dir,
            Err(e) => {
                debug!(?dir, error = %e, "cannot list directory");
                failures += 1;
                continue;
            }
        };

        loop {
            match read_dir.next_entry().await {
                Ok(Some(entry)) => {
                    // Symlinks are removed as links, never followed
                    let is_dir = entry
                        .file_type()
                        .await
                        .map(|t| t.is_dir())
                        .unwrap_or(false);
                    let path = entry.path();
                    if is_dir {
                        pending.push((depth + 1, path.clone()));
                    }
                    entries.push((depth + 1, path, is_dir));
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(?dir, error = %e, "directory listing interrupted");
                    failures += 1;
                    break;
                }
            }
        }
    }

    entries.sort_by(|a, b| b.0.cmp(&a.0));

    for (_, path, is_dir) in entries {
        let result = if is_dir {
            tokio::fs::remove_dir(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };
        if let Err(e) = result
            && e.kind() != std::io::ErrorKind::NotFound
        {
            debug!(?path, error = %e, "failed to remove entry");
            failures += 1;
        }
    }

    failures
}
