//! Turns a local merge commit into a server-created commit on the head branch.
//!
//! The merge is pushed to a throwaway branch, read back through the API and
//! re-created with the CI skip marker removed, so the commit that lands on
//! the pull request triggers CI and carries the server's signature.

use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;
use tracing::{info, warn, Instrument, Span};

use super::error::{Cleanup, RepairError, RepairStage};
use super::merge::CI_SKIP_MARKER;
use crate::external::git::GitClient;
use crate::github::{HostingApi, NewCommit, RepoCoordinates};

const REMOTE: &str = "origin";

/// A head branch that now points at a republished commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Republished {
    pub commit_sha: String,
    pub temp_branch: String,
    pub cleanup: Cleanup,
}

pub struct CommitRepublisher {
    api: Arc<dyn HostingApi>,
    prefix: String,
    /// Deletes handed off by attempts that were cancelled mid-flight.
    orphan_cleanup: TaskTracker,
}

impl CommitRepublisher {
    pub fn new(api: Arc<dyn HostingApi>, prefix: impl Into<String>) -> Self {
        Self {
            api,
            prefix: prefix.into(),
            orphan_cleanup: TaskTracker::new(),
        }
    }

    /// Waits for temporary-branch deletes left behind by cancelled attempts.
    pub async fn drain_cleanup(&self) {
        self.orphan_cleanup.close();
        self.orphan_cleanup.wait().await;
        self.orphan_cleanup.reopen();
    }

    /// Publishes the merge commit checked out in `git` and moves `head_ref`
    /// onto its server-created copy.
    ///
    /// The temporary branch is deleted on every path once it has been named,
    /// and a failed delete never changes the result. If the returned future
    /// is dropped first, the delete still runs as a detached cleanup task.
    pub async fn republish(
        &self,
        git: &GitClient,
        repo: &RepoCoordinates,
        head_ref: &str,
    ) -> Result<Republished, RepairError> {
        let temp_branch =
            temp_branch_name(&self.prefix, head_ref, chrono::Utc::now().timestamp_millis());

        let guard = TempBranchGuard {
            api: self.api.clone(),
            repo: repo.clone(),
            branch: temp_branch.clone(),
            tracker: self.orphan_cleanup.clone(),
            armed: true,
        };

        let result = self.publish_through(git, repo, head_ref, &temp_branch).await;
        let cleanup = delete_temp_branch(self.api.as_ref(), repo, &temp_branch).await;
        guard.disarm();

        result.map(|commit_sha| Republished {
            commit_sha,
            temp_branch,
            cleanup,
        })
    }

    async fn publish_through(
        &self,
        git: &GitClient,
        repo: &RepoCoordinates,
        head_ref: &str,
        temp_branch: &str,
    ) -> Result<String, RepairError> {
        git.create_branch(temp_branch)
            .await
            .map_err(RepairError::git(RepairStage::CreateTempBranch))?;
        git.push(REMOTE, temp_branch)
            .await
            .map_err(RepairError::git(RepairStage::PushTempBranch))?;

        let merge_sha = self
            .api
            .get_branch_head(repo, temp_branch)
            .await
            .map_err(RepairError::api(RepairStage::ResolveTempBranch))?;
        let merge_commit = self
            .api
            .get_commit(repo, &merge_sha)
            .await
            .map_err(RepairError::api(RepairStage::ReadMergeCommit))?;

        let created = self
            .api
            .create_commit(
                repo,
                &NewCommit {
                    message: strip_ci_marker(&merge_commit.message),
                    tree: merge_commit.tree_sha.clone(),
                    parents: merge_commit.parents.clone(),
                },
            )
            .await
            .map_err(RepairError::api(RepairStage::CreateCommit))?;

        if created.tree_sha != merge_commit.tree_sha {
            return Err(RepairError::Inconsistent {
                stage: RepairStage::CreateCommit,
                message: format!(
                    "created commit has tree {} instead of {}",
                    created.tree_sha, merge_commit.tree_sha
                ),
            });
        }

        self.api
            .update_branch(repo, head_ref, &created.sha)
            .await
            .map_err(RepairError::api(RepairStage::UpdateHead))?;

        info!(head_ref, commit = %created.sha, "head branch moved to republished commit");
        Ok(created.sha)
    }

}

async fn delete_temp_branch(
    api: &dyn HostingApi,
    repo: &RepoCoordinates,
    temp_branch: &str,
) -> Cleanup {
    match api.delete_branch(repo, temp_branch).await {
        Ok(()) => Cleanup::Removed,
        Err(e) => {
            warn!(temp_branch, error = %e, "could not delete temporary branch");
            Cleanup::Abandoned {
                reason: e.to_string(),
            }
        }
    }
}

/// Deletes the temporary branch if the attempt is dropped before it gets to.
struct TempBranchGuard {
    api: Arc<dyn HostingApi>,
    repo: RepoCoordinates,
    branch: String,
    tracker: TaskTracker,
    armed: bool,
}

impl TempBranchGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TempBranchGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            warn!(temp_branch = %self.branch, "no runtime left to delete temporary branch");
            return;
        };

        warn!(temp_branch = %self.branch, "repair cancelled, deleting temporary branch");
        let api = self.api.clone();
        let repo = self.repo.clone();
        let branch = std::mem::take(&mut self.branch);
        self.tracker.spawn_on(
            async move {
                delete_temp_branch(api.as_ref(), &repo, &branch).await;
            }
            .instrument(Span::current()),
            &handle,
        );
    }
}

/// `{prefix}{head}-{millis}`, lowercased.
pub fn temp_branch_name(prefix: &str, head_ref: &str, millis: i64) -> String {
    format!("{prefix}{head_ref}-{millis}").to_lowercase()
}

/// Removes every CI skip marker from a commit message.
pub fn strip_ci_marker(message: &str) -> String {
    message.replace(CI_SKIP_MARKER, "").trim().to_string()
}
