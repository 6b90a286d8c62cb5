use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use octocrab::Octocrab;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::branches::BranchHandler;
use super::commits::CommitHandler;
use super::errors::GitHubError;
use super::pulls::PullRequestHandler;
use super::types::{CandidatePullRequest, CommitObject, NewCommit, RepoCoordinates};
use crate::config::GitHubConfig;

/// Hosting-service operations the reconciliation pipeline depends on.
///
/// Implemented by [`GitHubClient`]; tests substitute in-memory fakes.
#[async_trait]
pub trait HostingApi: Send + Sync {
    /// All open pull requests whose base is `base`, across every page.
    async fn list_open_pull_requests(
        &self,
        repo: &RepoCoordinates,
        base: &str,
    ) -> Result<Vec<CandidatePullRequest>, GitHubError>;

    async fn get_pull_request(
        &self,
        repo: &RepoCoordinates,
        number: u64,
    ) -> Result<CandidatePullRequest, GitHubError>;

    /// Commit sha a branch currently points at.
    async fn get_branch_head(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
    ) -> Result<String, GitHubError>;

    async fn get_commit(
        &self,
        repo: &RepoCoordinates,
        sha: &str,
    ) -> Result<CommitObject, GitHubError>;

    async fn create_commit(
        &self,
        repo: &RepoCoordinates,
        commit: &NewCommit,
    ) -> Result<CommitObject, GitHubError>;

    /// Moves `branch` to `sha` without forcing.
    async fn update_branch(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
        sha: &str,
    ) -> Result<(), GitHubError>;

    async fn delete_branch(&self, repo: &RepoCoordinates, branch: &str)
        -> Result<(), GitHubError>;
}

/// Throttles and bounds every outbound API call.
#[derive(Clone)]
pub(crate) struct RequestGate {
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    timeout: Duration,
}

impl RequestGate {
    fn new(requests_per_second: u32, burst: u32, timeout: Duration) -> Self {
        let per_second = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(per_second);
        let quota = Quota::per_second(per_second).allow_burst(burst);

        Self {
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            timeout,
        }
    }

    pub(crate) async fn call<T, F>(&self, operation: &str, request: F) -> Result<T, GitHubError>
    where
        F: Future<Output = Result<T, GitHubError>>,
    {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
            .await;

        debug!(operation, "GitHub API request");

        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(GitHubError::Timeout {
                operation: operation.to_string(),
                duration_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

/// Octocrab-backed client shared by all repositories the service touches.
#[derive(Clone)]
pub struct GitHubClient {
    octocrab: Octocrab,
    gate: RequestGate,
}

impl GitHubClient {
    /// Builds a client from configuration, honouring `api_base` for
    /// GitHub Enterprise or mock servers.
    pub fn new(token: String, config: &GitHubConfig) -> Result<Self, GitHubError> {
        if token.is_empty() {
            return Err(GitHubError::TokenNotFound(
                "set github.token or GITHUB_TOKEN".to_string(),
            ));
        }

        let mut builder = Octocrab::builder().personal_token(token);
        if let Some(base) = &config.api_base {
            builder = builder.base_uri(base.as_str())?;
        }
        let octocrab = builder.build()?;

        Ok(Self::from_octocrab(octocrab, config))
    }

    /// Wraps a pre-configured Octocrab instance.
    pub fn from_octocrab(octocrab: Octocrab, config: &GitHubConfig) -> Self {
        Self {
            octocrab,
            gate: RequestGate::new(
                config.rate_limit.requests_per_second,
                config.rate_limit.burst,
                Duration::from_secs(config.request_timeout_seconds),
            ),
        }
    }

    pub fn pulls(&self, repo: &RepoCoordinates) -> PullRequestHandler {
        PullRequestHandler::new(self.octocrab.clone(), self.gate.clone(), repo.clone())
    }

    pub fn branches(&self, repo: &RepoCoordinates) -> BranchHandler {
        BranchHandler::new(self.octocrab.clone(), self.gate.clone(), repo.clone())
    }

    pub fn commits(&self, repo: &RepoCoordinates) -> CommitHandler {
        CommitHandler::new(self.octocrab.clone(), self.gate.clone(), repo.clone())
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("request_timeout", &self.gate.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl HostingApi for GitHubClient {
    async fn list_open_pull_requests(
        &self,
        repo: &RepoCoordinates,
        base: &str,
    ) -> Result<Vec<CandidatePullRequest>, GitHubError> {
        self.pulls(repo).list_open_for_base(base).await
    }

    async fn get_pull_request(
        &self,
        repo: &RepoCoordinates,
        number: u64,
    ) -> Result<CandidatePullRequest, GitHubError> {
        self.pulls(repo).get(number).await
    }

    async fn get_branch_head(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
    ) -> Result<String, GitHubError> {
        self.branches(repo).head_sha(branch).await
    }

    async fn get_commit(
        &self,
        repo: &RepoCoordinates,
        sha: &str,
    ) -> Result<CommitObject, GitHubError> {
        self.commits(repo).get(sha).await
    }

    async fn create_commit(
        &self,
        repo: &RepoCoordinates,
        commit: &NewCommit,
    ) -> Result<CommitObject, GitHubError> {
        self.commits(repo).create(commit).await
    }

    async fn update_branch(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
        sha: &str,
    ) -> Result<(), GitHubError> {
        self.branches(repo).update(branch, sha).await
    }

    async fn delete_branch(
        &self,
        repo: &RepoCoordinates,
        branch: &str,
    ) -> Result<(), GitHubError> {
        self.branches(repo).delete(branch).await
    }
}
