//! Working area lifecycle
//!
//! A working area is a fresh temporary directory owned by exactly one
//! compilation. It is removed when closed or dropped.

use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Prefix of every working area directory name
const AREA_PREFIX: &str = "texcube-";

/// Errors that occur while managing a working area
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create working area: {0}")]
    CreateFailed(#[source] std::io::Error),

    #[error("failed to remove working area {path}: {source}")]
    CleanupFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An isolated, request-scoped directory
///
/// ```rust,ignore
/// let area = WorkingArea::create()?;
/// area.write_file("main.tex", source).await?;
/// // ... run passes ...
/// area.close()?; // or just drop it
/// ```
#[derive(Debug)]
pub struct WorkingArea {
    dir: TempDir,
}

impl WorkingArea {
    /// Create a new working area in the system temporary directory
    pub fn create() -> Result<Self, WorkspaceError> {
        Self::create_in(std::env::temp_dir())
    }

    /// Create a new working area below `parent`
    #[instrument(skip_all)]
    pub fn create_in(parent: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let dir = tempfile::Builder::new()
            .prefix(AREA_PREFIX)
            .tempdir_in(parent)
            .map_err(WorkspaceError::CreateFailed)?;
        debug!(path = %dir.path().display(), "working area created");
        Ok(Self { dir })
    }

    /// Get the path of the working area root
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Get the host path to a file inside the area
    ///
    /// Returns an error if the name is absolute or contains a `..` segment.
    pub fn file_path(&self, name: &str) -> Result<PathBuf, WorkspaceError> {
        let relative = Path::new(name);
        let confined = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !confined {
            return Err(WorkspaceError::InvalidPath(format!(
                "path escapes the working area: {name}"
            )));
        }
        Ok(self.dir.path().join(relative))
    }

    /// Write a file into the area, creating parent directories as needed
    #[instrument(skip(self, content))]
    pub async fn write_file(&self, name: &str, content: &[u8]) -> Result<(), WorkspaceError> {
        let path = self.file_path(name)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(&path, content).await?;
        debug!(?path, len = content.len(), "wrote file to working area");
        Ok(())
    }

    /// Read a file from the area
    #[instrument(skip(self))]
    pub async fn read_file(&self, name: &str) -> Result<Vec<u8>, WorkspaceError> {
        let path = self.file_path(name)?;
        let content = tokio::fs::read(&path).await?;
        debug!(?path, len = content.len(), "read file from working area");
        Ok(content)
    }

    /// Check if a regular file exists in the area
    pub async fn file_exists(&self, name: &str) -> Result<bool, WorkspaceError> {
        let path = self.file_path(name)?;
        Ok(tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false))
    }

    /// Remove the area and everything in it
    ///
    /// Dropping the area also removes it, but errors are then only logged.
    #[must_use = "cleanup errors should be handled"]
    pub fn close(self) -> Result<(), WorkspaceError> {
        let path = self.dir.path().to_path_buf();
        self.dir.close().map_err(|source| {
            warn!(path = %path.display(), error = %source, "working area cleanup failed");
            WorkspaceError::CleanupFailed { path, source }
        })?;
        debug!("working area removed");
        Ok(())
    }
}
