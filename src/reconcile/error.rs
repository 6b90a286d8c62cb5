use std::fmt;
use thiserror::Error;

use crate::credentials::CredentialError;
use crate::external::git::GitError;
use crate::github::GitHubError;

/// Steps of a repair attempt, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RepairStage {
    Clone,
    Configure,
    CheckoutBase,
    CheckoutHead,
    Merge,
    CreateTempBranch,
    PushTempBranch,
    ResolveTempBranch,
    ReadMergeCommit,
    CreateCommit,
    UpdateHead,
}

impl fmt::Display for RepairStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RepairStage::Clone => "clone",
            RepairStage::Configure => "configure",
            RepairStage::CheckoutBase => "checkout base",
            RepairStage::CheckoutHead => "checkout head",
            RepairStage::Merge => "merge",
            RepairStage::CreateTempBranch => "create temporary branch",
            RepairStage::PushTempBranch => "push temporary branch",
            RepairStage::ResolveTempBranch => "resolve temporary branch",
            RepairStage::ReadMergeCommit => "read merge commit",
            RepairStage::CreateCommit => "create commit",
            RepairStage::UpdateHead => "update head branch",
        };
        f.write_str(s)
    }
}

/// Whether a failure could have left remote state behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Nothing was pushed; only the workspace needs removing.
    PartialRepair,
    /// A temporary branch may exist on the remote.
    PostBranchCreation,
}

#[derive(Debug, Error)]
pub enum RepairError {
    #[error("credentials unavailable: {0}")]
    Credentials(#[from] CredentialError),
    #[error("workspace error: {0}")]
    Workspace(#[from] std::io::Error),
    #[error("{stage} failed: {source}")]
    Git {
        stage: RepairStage,
        #[source]
        source: GitError,
    },
    #[error("{stage} failed: {source}")]
    Api {
        stage: RepairStage,
        #[source]
        source: GitHubError,
    },
    #[error("{stage} produced unexpected state: {message}")]
    Inconsistent { stage: RepairStage, message: String },
}

impl RepairError {
    pub(crate) fn git(stage: RepairStage) -> impl FnOnce(GitError) -> RepairError {
        move |source| RepairError::Git { stage, source }
    }

    pub(crate) fn api(stage: RepairStage) -> impl FnOnce(GitHubError) -> RepairError {
        move |source| RepairError::Api { stage, source }
    }

    pub fn stage(&self) -> Option<RepairStage> {
        match self {
            RepairError::Git { stage, .. }
            | RepairError::Api { stage, .. }
            | RepairError::Inconsistent { stage, .. } => Some(*stage),
            RepairError::Credentials(_) => Some(RepairStage::Clone),
            RepairError::Workspace(_) => None,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self.stage() {
            Some(stage) if stage >= RepairStage::PushTempBranch => FailureKind::PostBranchCreation,
            _ => FailureKind::PartialRepair,
        }
    }
}

/// Result of a best-effort cleanup step. Logged, never escalated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cleanup {
    Removed,
    Abandoned { reason: String },
}

impl Cleanup {
    pub fn is_removed(&self) -> bool {
        matches!(self, Cleanup::Removed)
    }
}
