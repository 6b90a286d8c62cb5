//! Composition root of the reconciliation pipeline.
//!
//! A qualifying push lists the open pull requests targeting the pushed
//! branch, probes each one on the discovery pool and repairs the dirty ones
//! on the repair pool.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

use super::error::RepairError;
use super::merge::{MergeExecutor, MergeOutcome};
use super::prober::{MergeabilityProber, ProbeResult};
use super::republish::{CommitRepublisher, Republished};
use super::scheduler::Scheduler;
use super::workspace::WorkspaceManager;
use crate::config::MenderConfig;
use crate::credentials::{CredentialProvider, TokenScope};
use crate::events::{BranchFilter, PushEvent};
use crate::external::command::CommandExecutor;
use crate::github::{CandidatePullRequest, GitHubError, HostingApi, PullRequestLocator};
use crate::telemetry;

/// What a push event set in motion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushDispatch {
    pub branch: String,
    /// Open pull requests targeting `branch`.
    pub candidates: usize,
    pub skipped_forks: usize,
    /// Pull requests handed to the discovery pool.
    pub scheduled: usize,
}

/// How a repair attempt that ran to completion ended.
#[derive(Debug)]
pub enum RepairOutcome {
    Republished(Republished),
    Conflict { files: Vec<String> },
}

/// Everything a repair task captures at enqueue time.
#[derive(Debug, Clone)]
struct RepairJob {
    locator: PullRequestLocator,
    base: String,
    head: String,
    installation_id: Option<u64>,
}

struct Components {
    api: Arc<dyn HostingApi>,
    credentials: Arc<dyn CredentialProvider>,
    prober: MergeabilityProber,
    merger: MergeExecutor,
    republisher: CommitRepublisher,
    workspaces: WorkspaceManager,
    filter: BranchFilter,
    scheduler: Scheduler,
}

/// Cheap to clone; clones share the same pools.
#[derive(Clone)]
pub struct Reconciler {
    inner: Arc<Components>,
}

impl Reconciler {
    pub fn new(
        config: &MenderConfig,
        api: Arc<dyn HostingApi>,
        credentials: Arc<dyn CredentialProvider>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Self, regex::Error> {
        let filter = BranchFilter::from_config(&config.branches)?;

        Ok(Self {
            inner: Arc::new(Components {
                prober: MergeabilityProber::from_config(api.clone(), &config.probe),
                merger: MergeExecutor::from_config(executor, &config.repair),
                republisher: CommitRepublisher::new(
                    api.clone(),
                    config.repair.temp_branch_prefix.clone(),
                ),
                workspaces: WorkspaceManager::new(
                    config.repair.workspace_root.as_ref().map(PathBuf::from),
                ),
                scheduler: Scheduler::from_config(&config.scheduler),
                filter,
                credentials,
                api,
            }),
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Schedules mergeability probes for every same-repository pull request
    /// targeting the pushed branch.
    ///
    /// Returns `Ok(None)` when the event does not concern a release branch;
    /// nothing is listed in that case. Returns once probes are queued, not
    /// when they finish; see [`Reconciler::drain`].
    pub async fn handle_push(&self, event: &PushEvent) -> Result<Option<PushDispatch>, GitHubError> {
        let Some(branch) = self.inner.filter.accepts(event) else {
            debug!(git_ref = %event.git_ref, "push does not target a release branch");
            return Ok(None);
        };
        let Some(repo) = event.repo() else {
            warn!(git_ref = %event.git_ref, "push event names no repository owner");
            return Ok(None);
        };

        let correlation_id = telemetry::generate_correlation_id();
        let span = telemetry::dispatch_span(&correlation_id, &repo.to_string(), branch);

        async {
            let candidates = self.inner.api.list_open_pull_requests(&repo, branch).await?;
            let mut dispatch = PushDispatch {
                branch: branch.to_string(),
                candidates: candidates.len(),
                skipped_forks: 0,
                scheduled: 0,
            };

            for pr in candidates {
                if pr.is_from_fork(&repo) {
                    debug!(pr = pr.number, "skipping pull request from a fork");
                    dispatch.skipped_forks += 1;
                    continue;
                }

                let locator = PullRequestLocator {
                    repo: repo.clone(),
                    number: pr.number,
                };
                let job = RepairJob {
                    locator: locator.clone(),
                    base: branch.to_string(),
                    head: pr.head_ref.clone(),
                    installation_id: event.installation_id(),
                };
                let this = self.clone();
                self.inner
                    .scheduler
                    .discovery()
                    .spawn(telemetry::discovery_span(&locator), async move {
                        this.discover(pr, job).await;
                    });
                dispatch.scheduled += 1;
            }

            info!(
                candidates = dispatch.candidates,
                skipped_forks = dispatch.skipped_forks,
                scheduled = dispatch.scheduled,
                "mergeability probes scheduled"
            );
            Ok::<_, GitHubError>(Some(dispatch))
        }
        .instrument(span)
        .await
    }

    /// Waits until every probe and repair scheduled so far has finished,
    /// including temporary-branch deletes from cancelled repairs.
    pub async fn drain(&self) {
        self.inner.scheduler.drain().await;
        self.inner.republisher.drain_cleanup().await;
    }

    async fn discover(&self, pr: CandidatePullRequest, job: RepairJob) {
        let locator = &job.locator;
        match self.inner.prober.probe(&locator.repo, locator.number).await {
            Ok(ProbeResult::Resolved(state)) if state.is_dirty() => {
                info!(head = %pr.head_ref, "pull request has conflicts, scheduling repair");
                let span = telemetry::repair_span(locator, &telemetry::generate_correlation_id());
                let this = self.clone();
                self.inner.scheduler.repair().spawn(span, async move {
                    this.repair(job).await;
                });
            }
            Ok(ProbeResult::Resolved(state)) => {
                debug!(%state, "no repair needed");
            }
            Ok(ProbeResult::Unresolved) => {
                info!("mergeability still unknown after probing, skipping");
            }
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "mergeability probe failed");
            }
        }
    }

    async fn repair(&self, job: RepairJob) {
        match self.attempt_repair(&job).await {
            Ok(RepairOutcome::Republished(done)) => info!(
                commit = %done.commit_sha,
                temp_branch = %done.temp_branch,
                temp_branch_removed = done.cleanup.is_removed(),
                "pull request repaired"
            ),
            Ok(RepairOutcome::Conflict { files }) => info!(
                files = ?files,
                "merge needs manual resolution, pull request left unchanged"
            ),
            Err(e) => warn!(
                error = %e,
                stage = ?e.stage(),
                kind = ?e.kind(),
                "repair attempt failed"
            ),
        }
    }

    /// One merge attempt in a fresh workspace. The token is issued right
    /// before cloning and dropped with the attempt.
    async fn attempt_repair(&self, job: &RepairJob) -> Result<RepairOutcome, RepairError> {
        let inner = &self.inner;
        inner
            .workspaces
            .with_workspace(|workspace| async move {
                let token = inner
                    .credentials
                    .issue_token(&TokenScope {
                        repo: job.locator.repo.clone(),
                        installation_id: job.installation_id,
                    })
                    .await?;

                let outcome = inner
                    .merger
                    .attempt_merge(&workspace, &job.locator.repo, &token, &job.base, &job.head)
                    .await?;

                match outcome {
                    MergeOutcome::Conflict { files } => {
                        Ok::<_, RepairError>(RepairOutcome::Conflict { files })
                    }
                    MergeOutcome::Merged(git) => {
                        let done = inner
                            .republisher
                            .republish(&git, &job.locator.repo, &job.head)
                            .await?;
                        Ok(RepairOutcome::Republished(done))
                    }
                }
            })
            .await
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("filter", &self.inner.filter)
            .field("scheduler", &self.inner.scheduler)
            .finish_non_exhaustive()
    }
}
