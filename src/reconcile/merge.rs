//! Local merge of a pull request's base branch into its head branch.

use std::sync::Arc;
use tracing::info;

use super::error::{RepairError, RepairStage};
use super::workspace::Workspace;
use crate::config::RepairConfig;
use crate::credentials::AccessToken;
use crate::external::command::CommandExecutor;
use crate::external::git::{GitClient, GitError};
use crate::github::RepoCoordinates;

/// Marker that keeps CI from running on the intermediate merge commit.
pub const CI_SKIP_MARKER: &str = "[skip ci]";

const CLONE_DIR: &str = "repo";

/// Name and email recorded on the local merge commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub name: String,
    pub email: String,
}

/// Result of a local merge that ran to completion.
pub enum MergeOutcome {
    /// The head branch is checked out with the merge commit on top.
    Merged(GitClient),
    /// Git could not merge automatically; nothing was pushed.
    Conflict { files: Vec<String> },
}

impl std::fmt::Debug for MergeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeOutcome::Merged(git) => f
                .debug_tuple("Merged")
                .field(&git.workdir().display())
                .finish(),
            MergeOutcome::Conflict { files } => {
                f.debug_struct("Conflict").field("files", files).finish()
            }
        }
    }
}

pub struct MergeExecutor {
    executor: Arc<dyn CommandExecutor>,
    identity: BotIdentity,
    git_host: String,
}

impl MergeExecutor {
    pub fn new(executor: Arc<dyn CommandExecutor>, identity: BotIdentity, git_host: String) -> Self {
        Self {
            executor,
            identity,
            git_host,
        }
    }

    pub fn from_config(executor: Arc<dyn CommandExecutor>, config: &RepairConfig) -> Self {
        Self::new(
            executor,
            BotIdentity {
                name: config.bot_name.clone(),
                email: config.bot_email.clone(),
            },
            config.git_host.clone(),
        )
    }

    /// Clones `repo` into `workspace` and merges `base` into `head`.
    ///
    /// Every step must succeed before the next runs. A conflict is an
    /// ordinary outcome, not an error.
    pub async fn attempt_merge(
        &self,
        workspace: &Workspace,
        repo: &RepoCoordinates,
        token: &AccessToken,
        base: &str,
        head: &str,
    ) -> Result<MergeOutcome, RepairError> {
        let clone_dir = workspace.prepare_subdir(CLONE_DIR)?;
        let url = clone_url(&self.git_host, repo, token);

        let git = GitClient::clone_repository(
            self.executor.clone(),
            &url,
            workspace.path(),
            CLONE_DIR,
            Some(token.expose()),
        )
        .await
        .map_err(RepairError::git(RepairStage::Clone))?;
        debug_assert_eq!(git.workdir(), clone_dir.as_path());

        // The final commit is re-created and signed by GitHub, so the local
        // one only needs a stable identity and no signature.
        git.set_config("user.name", &self.identity.name)
            .await
            .map_err(RepairError::git(RepairStage::Configure))?;
        git.set_config("user.email", &self.identity.email)
            .await
            .map_err(RepairError::git(RepairStage::Configure))?;
        git.set_config("commit.gpgsign", "false")
            .await
            .map_err(RepairError::git(RepairStage::Configure))?;

        git.checkout(base)
            .await
            .map_err(RepairError::git(RepairStage::CheckoutBase))?;
        git.checkout(head)
            .await
            .map_err(RepairError::git(RepairStage::CheckoutHead))?;

        match git.merge(base, &merge_message(base, head)).await {
            Ok(()) => {
                info!(base, head, "local merge succeeded");
                Ok(MergeOutcome::Merged(git))
            }
            Err(GitError::MergeConflict { files }) => {
                info!(base, head, conflicted = files.len(), "local merge has conflicts");
                Ok(MergeOutcome::Conflict { files })
            }
            Err(e) => Err(RepairError::git(RepairStage::Merge)(e)),
        }
    }
}

/// Message of the intermediate local merge commit.
pub fn merge_message(base: &str, head: &str) -> String {
    format!("chore: merge '{base}' into '{head}' to resolve conflicts {CI_SKIP_MARKER}")
}

/// HTTPS clone URL carrying an installation token.
fn clone_url(host: &str, repo: &RepoCoordinates, token: &AccessToken) -> String {
    format!(
        "https://x-access-token:{}@{}/{}/{}.git",
        token.expose(),
        host,
        repo.owner,
        repo.name
    )
}
