//! Git command abstractions
//!
//! `GitClient` drives the `git` binary through a [`CommandExecutor`] inside one
//! working copy. Output that may echo an authenticated remote URL is scrubbed
//! of registered secrets before it is placed in an error.

use super::command::{CommandError, CommandExecutor, CommandOutput};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

pub type BranchName = String;

const REDACTED: &str = "***";

#[derive(Debug, Error)]
pub enum GitError {
    #[error("Repository not found or not a git repository")]
    RepositoryNotFound,
    #[error("Branch not found: {branch}")]
    BranchNotFound { branch: BranchName },
    #[error("Merge conflict detected in {} file(s)", files.len())]
    MergeConflict { files: Vec<String> },
    #[error("Push of {branch} rejected: {message}")]
    PushRejected { branch: BranchName, message: String },
    #[error("Command execution error: {source}")]
    CommandError {
        #[from]
        source: CommandError,
    },
    #[error("git {command} failed: {message}")]
    GitCommandFailed { command: String, message: String },
}

/// A git working copy driven through an injected executor.
pub struct GitClient {
    executor: Arc<dyn CommandExecutor>,
    workdir: PathBuf,
    secrets: Vec<String>,
}

impl GitClient {
    pub fn new(executor: Arc<dyn CommandExecutor>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            workdir: workdir.into(),
            secrets: Vec::new(),
        }
    }

    /// Registers a value that must never appear in error messages.
    pub fn with_secret(mut self, secret: &str) -> Self {
        if !secret.is_empty() {
            self.secrets.push(secret.to_string());
        }
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Clones `url` into `parent/dir_name` and returns a client for the clone.
    ///
    /// `secret` is the credential embedded in `url`; it is scrubbed from any
    /// failure output.
    pub async fn clone_repository(
        executor: Arc<dyn CommandExecutor>,
        url: &str,
        parent: &Path,
        dir_name: &str,
        secret: Option<&str>,
    ) -> Result<Self, GitError> {
        let cloner = GitClient::new(executor.clone(), parent).with_secret(secret.unwrap_or(""));
        cloner
            .execute_git_command(&["clone", "--quiet", url, dir_name])
            .await?;

        Ok(GitClient::new(executor, parent.join(dir_name)).with_secret(secret.unwrap_or("")))
    }

    pub async fn set_config(&self, key: &str, value: &str) -> Result<(), GitError> {
        self.execute_git_command(&["config", key, value]).await?;
        Ok(())
    }

    pub async fn checkout(&self, branch: &str) -> Result<(), GitError> {
        self.execute_git_command(&["checkout", branch]).await?;
        Ok(())
    }

    /// Creates `branch` from HEAD and switches to it.
    pub async fn create_branch(&self, branch: &str) -> Result<(), GitError> {
        self.execute_git_command(&["checkout", "-b", branch]).await?;
        Ok(())
    }

    /// Merges `branch` into the checked-out branch, always recording a merge commit.
    pub async fn merge(&self, branch: &str, message: &str) -> Result<(), GitError> {
        self.execute_git_command(&["merge", "--no-ff", "-m", message, branch])
            .await?;
        Ok(())
    }

    pub async fn push(&self, remote: &str, branch: &str) -> Result<(), GitError> {
        self.execute_git_command(&["push", remote, branch]).await?;
        Ok(())
    }

    async fn execute_git_command(&self, args: &[&str]) -> Result<String, GitError> {
        let subcommand = args.first().copied().unwrap_or_default();
        debug!(cwd = %self.workdir.display(), subcommand, "running git");

        let output = self.executor.execute(&self.workdir, "git", args).await?;

        if !output.success() {
            return Err(self.classify_git_error(&output, args));
        }

        Ok(output.stdout.trim().to_string())
    }

    fn classify_git_error(&self, output: &CommandOutput, args: &[&str]) -> GitError {
        let stderr = self.redact(&output.stderr);
        let stdout = self.redact(&output.stdout);
        let subcommand = args.first().copied().unwrap_or_default();

        if stderr.contains("not a git repository") {
            return GitError::RepositoryNotFound;
        }

        match subcommand {
            "merge" if stdout.contains("CONFLICT") || stderr.contains("CONFLICT") => {
                GitError::MergeConflict {
                    files: conflicted_files(&stdout),
                }
            }
            "checkout"
                if stderr.contains("did not match any")
                    || stderr.contains("not found")
                    || stderr.contains("invalid reference") =>
            {
                GitError::BranchNotFound {
                    branch: args.last().copied().unwrap_or("unknown").to_string(),
                }
            }
            "push" if stderr.contains("rejected") => GitError::PushRejected {
                branch: args.last().copied().unwrap_or("unknown").to_string(),
                message: stderr.trim().to_string(),
            },
            _ => GitError::GitCommandFailed {
                command: subcommand.to_string(),
                message: if stderr.trim().is_empty() {
                    stdout.trim().to_string()
                } else {
                    stderr.trim().to_string()
                },
            },
        }
    }

    fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret, REDACTED))
    }
}

/// Extracts paths from `CONFLICT (...): Merge conflict in <path>` lines.
fn conflicted_files(merge_output: &str) -> Vec<String> {
    merge_output
        .lines()
        .filter(|line| line.starts_with("CONFLICT"))
        .filter_map(|line| line.rsplit_once("Merge conflict in "))
        .map(|(_, path)| path.trim().to_string())
        .collect()
}
