pub mod branches;
pub mod client;
pub mod commits;
pub mod errors;
pub mod pulls;
pub mod types;

pub use client::{GitHubClient, HostingApi};
pub use errors::GitHubError;
pub use types::{
    CandidatePullRequest, CommitObject, MergeableState, NewCommit, PullRequestLocator,
    RepoCoordinates,
};
