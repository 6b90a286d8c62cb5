//! Polls a pull request until GitHub has finished computing its mergeability.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::ProbeConfig;
use crate::github::{GitHubError, HostingApi, MergeableState, RepoCoordinates};

/// Outcome of probing one pull request. Never carries `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Resolved(MergeableState),
    /// Still `unknown` after every attempt; skip this pull request for now.
    Unresolved,
}

pub struct MergeabilityProber {
    api: Arc<dyn HostingApi>,
    max_attempts: u32,
    backoff: Duration,
}

impl MergeabilityProber {
    pub fn new(api: Arc<dyn HostingApi>, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            api,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn from_config(api: Arc<dyn HostingApi>, config: &ProbeConfig) -> Self {
        Self::new(api, config.max_attempts, config.backoff())
    }

    /// Fetches the pull request up to `max_attempts` times, waiting `backoff`
    /// between fetches while the state is `unknown`. API errors end the probe
    /// immediately.
    pub async fn probe(
        &self,
        repo: &RepoCoordinates,
        number: u64,
    ) -> Result<ProbeResult, GitHubError> {
        for attempt in 1..=self.max_attempts {
            let pr = self.api.get_pull_request(repo, number).await?;

            if !pr.mergeable_state.is_unknown() {
                debug!(attempt, state = %pr.mergeable_state, "mergeability resolved");
                return Ok(ProbeResult::Resolved(pr.mergeable_state));
            }

            debug!(attempt, max_attempts = self.max_attempts, "mergeability still unknown");
            if attempt < self.max_attempts {
                tokio::time::sleep(self.backoff).await;
            }
        }

        Ok(ProbeResult::Unresolved)
    }
}
