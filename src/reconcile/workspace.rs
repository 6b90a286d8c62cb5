//! Scoped scratch directories for merge attempts.
//!
//! Every attempt gets a fresh, uniquely named directory that is removed when
//! the attempt finishes, whether it succeeded, failed, panicked or was
//! cancelled by a timeout.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

use super::error::Cleanup;

const WORKSPACE_PREFIX: &str = "conflict-mender-";

/// Hands out per-attempt workspaces under an optional parent directory.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceManager {
    root: Option<PathBuf>,
}

/// A directory owned by exactly one merge attempt.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns an empty `name` subdirectory, wiping any residue left by an
    /// interrupted run first.
    pub fn prepare_subdir(&self, name: &str) -> io::Result<PathBuf> {
        let dir = self.path.join(name);
        std::fs::create_dir_all(&dir)?;
        std::fs::remove_dir_all(&dir)?;
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

impl WorkspaceManager {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    /// Runs `f` with a fresh workspace and removes the directory afterwards.
    ///
    /// The result of `f` is returned unchanged; a failure to remove the
    /// directory is logged and does not affect it.
    pub async fn with_workspace<F, Fut, T, E>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(Workspace) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<io::Error>,
    {
        let dir = self.acquire()?;
        let workspace = Workspace {
            path: dir.path().to_path_buf(),
        };
        debug!(path = %workspace.path.display(), "workspace acquired");

        // `dir` stays alive across the await, so a dropped future still removes it.
        let result = f(workspace).await;

        match release(dir) {
            Cleanup::Removed => debug!("workspace removed"),
            Cleanup::Abandoned { reason } => warn!(reason, "workspace could not be removed"),
        }

        result
    }

    fn acquire(&self) -> io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);

        match &self.root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
    }
}

fn release(dir: TempDir) -> Cleanup {
    let path = dir.path().to_path_buf();
    match dir.close() {
        Ok(()) => Cleanup::Removed,
        Err(e) => Cleanup::Abandoned {
            reason: format!("{}: {}", path.display(), e),
        },
    }
}
