//! Domain types exchanged with the hosting API.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An `owner/name` repository address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoCoordinates {
    pub owner: String,
    pub name: String,
}

impl RepoCoordinates {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Case-insensitive comparison, matching how GitHub resolves repository names.
    pub fn same_repo(&self, other: &RepoCoordinates) -> bool {
        self.owner.eq_ignore_ascii_case(&other.owner) && self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl fmt::Display for RepoCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoCoordinates {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(owner, name))
            }
            _ => Err(format!("expected OWNER/NAME, got '{s}'")),
        }
    }
}

/// GitHub's `mergeable_state` classification of a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeableState {
    /// Still being computed by the hosting service.
    Unknown,
    Clean,
    /// Conflicts against the base branch.
    Dirty,
    Blocked,
    Behind,
    Unstable,
    HasHooks,
    Draft,
    Other(String),
}

impl MergeableState {
    /// Maps the API string; a missing value means the state is not computed yet.
    pub fn from_api(value: Option<&str>) -> Self {
        match value {
            None | Some("unknown") => MergeableState::Unknown,
            Some("clean") => MergeableState::Clean,
            Some("dirty") => MergeableState::Dirty,
            Some("blocked") => MergeableState::Blocked,
            Some("behind") => MergeableState::Behind,
            Some("unstable") => MergeableState::Unstable,
            Some("has_hooks") => MergeableState::HasHooks,
            Some("draft") => MergeableState::Draft,
            Some(other) => MergeableState::Other(other.to_string()),
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, MergeableState::Unknown)
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self, MergeableState::Dirty)
    }
}

impl fmt::Display for MergeableState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MergeableState::Unknown => "unknown",
            MergeableState::Clean => "clean",
            MergeableState::Dirty => "dirty",
            MergeableState::Blocked => "blocked",
            MergeableState::Behind => "behind",
            MergeableState::Unstable => "unstable",
            MergeableState::HasHooks => "has_hooks",
            MergeableState::Draft => "draft",
            MergeableState::Other(other) => other,
        };
        f.write_str(s)
    }
}

/// An open pull request considered for repair after its base branch moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidatePullRequest {
    pub number: u64,
    pub head_ref: String,
    pub head_sha: String,
    /// `None` when the head repository was deleted.
    pub head_repo: Option<RepoCoordinates>,
    pub base_ref: String,
    pub mergeable_state: MergeableState,
}

impl CandidatePullRequest {
    /// True when the head branch does not live in `repo`.
    pub fn is_from_fork(&self, repo: &RepoCoordinates) -> bool {
        match &self.head_repo {
            Some(head_repo) => !head_repo.same_repo(repo),
            None => true,
        }
    }
}

/// `owner/repo#123`, used to tag log lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PullRequestLocator {
    pub repo: RepoCoordinates,
    pub number: u64,
}

impl fmt::Display for PullRequestLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

/// A commit as stored by the hosting service, detached from any ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitObject {
    pub sha: String,
    pub tree_sha: String,
    pub parents: Vec<String>,
    pub message: String,
}

/// Input for creating a commit object server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCommit {
    pub message: String,
    pub tree: String,
    pub parents: Vec<String>,
}

// ─── Wire payloads ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct PullPayload {
    pub number: u64,
    pub mergeable_state: Option<String>,
    pub head: PullRefPayload,
    pub base: PullRefPayload,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PullRefPayload {
    #[serde(rename = "ref")]
    pub ref_field: String,
    pub sha: String,
    pub repo: Option<RepoPayload>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RepoPayload {
    pub name: String,
    pub owner: OwnerPayload,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OwnerPayload {
    pub login: String,
}

impl From<PullPayload> for CandidatePullRequest {
    fn from(payload: PullPayload) -> Self {
        CandidatePullRequest {
            number: payload.number,
            head_ref: payload.head.ref_field,
            head_sha: payload.head.sha,
            head_repo: payload
                .head
                .repo
                .map(|repo| RepoCoordinates::new(repo.owner.login, repo.name)),
            base_ref: payload.base.ref_field,
            mergeable_state: MergeableState::from_api(payload.mergeable_state.as_deref()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitRefPayload {
    pub object: GitObjectPayload,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitObjectPayload {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GitCommitPayload {
    pub sha: String,
    pub message: String,
    pub tree: GitObjectPayload,
    pub parents: Vec<GitObjectPayload>,
}

impl From<GitCommitPayload> for CommitObject {
    fn from(payload: GitCommitPayload) -> Self {
        CommitObject {
            sha: payload.sha,
            tree_sha: payload.tree.sha,
            parents: payload.parents.into_iter().map(|p| p.sha).collect(),
            message: payload.message,
        }
    }
}
