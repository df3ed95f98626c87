//! Disposable clones for merge attempts
//!
//! A [`TempWorkspace`] owns a uniquely named directory holding a shared
//! clone (`repo/`) and a scratch area for blob extraction (`scratch/`).
//! The directory is removed by [`TempWorkspace::close`] or, on any other
//! exit path, when the workspace is dropped.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

use super::command::{GitCommand, GitRunner};
use crate::error::{MergeError, Result};

pub struct TempWorkspace {
    root: TempDir,
    repo: PathBuf,
    scratch: PathBuf,
}

impl TempWorkspace {
    /// Create a fresh workspace directory under `temp_root`.
    pub fn new(temp_root: &Path) -> Result<Self> {
        fs::create_dir_all(temp_root)?;
        let root = tempfile::Builder::new().prefix("merge-").tempdir_in(temp_root)?;
        let repo = root.path().join("repo");
        let scratch = root.path().join("scratch");
        fs::create_dir_all(&scratch)?;
        debug!(path = %root.path().display(), "created workspace");
        Ok(Self {
            root,
            repo,
            scratch,
        })
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// The clone's working directory.
    pub fn repo(&self) -> &Path {
        &self.repo
    }

    /// Directory for temporary files that are not part of the clone.
    pub fn scratch(&self) -> &Path {
        &self.scratch
    }

    /// Path of a file inside the clone's git directory.
    pub fn git_path(&self, name: &str) -> PathBuf {
        self.repo.join(".git").join(name)
    }

    /// Shared clone of `source` with HEAD on `branch` and nothing checked out.
    pub fn clone_branch(&self, git: &dyn GitRunner, source: &Path, branch: &str) -> Result<()> {
        if !source.exists() {
            return Err(MergeError::RepoMissing {
                path: source.to_path_buf(),
            });
        }
        let cmd = GitCommand::new("clone")
            .args(["-s", "--no-checkout", "-q", "-b", branch])
            .arg(source.to_string_lossy())
            .arg(self.repo.to_string_lossy())
            .dir(self.root.path());
        let output = git.output(&cmd)?;
        if output.success() {
            return Ok(());
        }
        let stderr = output.stderr.trim().to_string();
        if stderr.contains("not found in upstream") {
            Err(MergeError::BranchNotFound {
                branch: branch.to_string(),
            })
        } else if stderr.contains("does not exist") {
            Err(MergeError::RepoMissing {
                path: source.to_path_buf(),
            })
        } else {
            Err(MergeError::CloneFailed {
                branch: branch.to_string(),
                stderr,
            })
        }
    }

    /// Remove the workspace now, reporting failures.
    pub fn close(self) -> Result<()> {
        let path = self.root.path().to_path_buf();
        self.root.close().map_err(|e| {
            warn!(path = %path.display(), "failed to remove workspace: {e}");
            MergeError::Io(e)
        })
    }
}
