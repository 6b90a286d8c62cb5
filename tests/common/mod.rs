//! Shared fixtures for pipeline tests: an in-memory hosting service and a
//! scripted `git` that pushes into it.

#![allow(dead_code)]

use async_trait::async_trait;
use conflict_mender::config::MenderConfig;
use conflict_mender::credentials::{CredentialProvider, StaticTokenProvider};
use conflict_mender::external::command::{CommandError, CommandExecutor, CommandOutput};
use conflict_mender::github::{
    CandidatePullRequest, CommitObject, GitHubError, HostingApi, MergeableState, NewCommit,
    RepoCoordinates,
};
use conflict_mender::Reconciler;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const OWNER: &str = "octo";
pub const NAME: &str = "widgets";
pub const TOKEN: &str = "ghs_test_installation_token";

pub fn repo() -> RepoCoordinates {
    RepoCoordinates::new(OWNER, NAME)
}

/// Tracks how many callers are inside a section at once.
#[derive(Debug, Default)]
pub struct Gauge {
    current: usize,
    pub peak: usize,
}

impl Gauge {
    fn enter(&mut self) {
        self.current += 1;
        self.peak = self.peak.max(self.current);
    }

    fn exit(&mut self) {
        self.current -= 1;
    }
}

/// Everything both fakes see: the remote's refs and commits plus call logs.
#[derive(Debug, Default)]
pub struct RemoteState {
    pub branches: HashMap<String, String>,
    pub commits: HashMap<String, CommitObject>,
    pub pulls: Vec<CandidatePullRequest>,
    /// Mergeability answers per pull request; the last one repeats.
    pub status_script: HashMap<u64, VecDeque<MergeableState>>,
    pub failing_status: HashSet<u64>,
    /// Head branches whose merge with the base conflicts.
    pub conflicting_heads: HashSet<String>,
    pub reject_head_updates: bool,

    pub list_calls: usize,
    pub status_calls: HashMap<u64, usize>,
    pub clone_urls: Vec<String>,
    pub pushes: Vec<String>,
    pub created_commits: Vec<NewCommit>,
    pub deleted_branches: Vec<String>,
    pub probes: Gauge,
    pub clones: Gauge,
    next_sha: usize,
}

impl RemoteState {
    fn mint_sha(&mut self, kind: &str) -> String {
        self.next_sha += 1;
        format!("{kind}{:04}", self.next_sha)
    }

    pub fn total_status_calls(&self) -> usize {
        self.status_calls.values().sum()
    }

    pub fn temp_branches(&self, prefix: &str) -> Vec<String> {
        self.branches
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect()
    }
}

pub type SharedRemote = Arc<Mutex<RemoteState>>;

/// In-memory GitHub.
pub struct FakeGitHub {
    pub state: SharedRemote,
    pub probe_delay: Duration,
    pub commit_delay: Duration,
}

fn not_found(resource: &str) -> GitHubError {
    GitHubError::NotFound {
        resource: resource.to_string(),
    }
}

#[async_trait]
impl HostingApi for FakeGitHub {
    async fn list_open_pull_requests(
        &self,
        _repo: &RepoCoordinates,
        base: &str,
    ) -> Result<Vec<CandidatePullRequest>, GitHubError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        Ok(state
            .pulls
            .iter()
            .filter(|pr| pr.base_ref == base)
            .cloned()
            .collect())
    }

    async fn get_pull_request(
        &self,
        _repo: &RepoCoordinates,
        number: u64,
    ) -> Result<CandidatePullRequest, GitHubError> {
        self.state.lock().unwrap().probes.enter();
        tokio::time::sleep(self.probe_delay).await;

        let mut state = self.state.lock().unwrap();
        state.probes.exit();
        *state.status_calls.entry(number).or_default() += 1;

        if state.failing_status.contains(&number) {
            return Err(GitHubError::InvalidResponse("secondary rate limit".to_string()));
        }

        let script = state.status_script.entry(number).or_default();
        let mergeable_state = if script.len() > 1 {
            script.pop_front().unwrap_or(MergeableState::Unknown)
        } else {
            script.front().cloned().unwrap_or(MergeableState::Unknown)
        };

        let mut pr = state
            .pulls
            .iter()
            .find(|pr| pr.number == number)
            .cloned()
            .ok_or_else(|| not_found("pull request"))?;
        pr.mergeable_state = mergeable_state;
        Ok(pr)
    }

    async fn get_branch_head(
        &self,
        _repo: &RepoCoordinates,
        branch: &str,
    ) -> Result<String, GitHubError> {
        let state = self.state.lock().unwrap();
        state.branches.get(branch).cloned().ok_or_else(|| not_found(branch))
    }

    async fn get_commit(
        &self,
        _repo: &RepoCoordinates,
        sha: &str,
    ) -> Result<CommitObject, GitHubError> {
        let state = self.state.lock().unwrap();
        state.commits.get(sha).cloned().ok_or_else(|| not_found(sha))
    }

    async fn create_commit(
        &self,
        _repo: &RepoCoordinates,
        commit: &NewCommit,
    ) -> Result<CommitObject, GitHubError> {
        tokio::time::sleep(self.commit_delay).await;
        let mut state = self.state.lock().unwrap();
        let sha = state.mint_sha("signed");
        let created = CommitObject {
            sha: sha.clone(),
            tree_sha: commit.tree.clone(),
            parents: commit.parents.clone(),
            message: commit.message.clone(),
        };
        state.commits.insert(sha, created.clone());
        state.created_commits.push(commit.clone());
        Ok(created)
    }

    async fn update_branch(
        &self,
        _repo: &RepoCoordinates,
        branch: &str,
        sha: &str,
    ) -> Result<(), GitHubError> {
        let mut state = self.state.lock().unwrap();
        if state.reject_head_updates {
            return Err(GitHubError::InvalidResponse(
                "Update is not a fast forward".to_string(),
            ));
        }
        if !state.branches.contains_key(branch) {
            return Err(not_found(branch));
        }
        state.branches.insert(branch.to_string(), sha.to_string());
        Ok(())
    }

    async fn delete_branch(
        &self,
        _repo: &RepoCoordinates,
        branch: &str,
    ) -> Result<(), GitHubError> {
        let mut state = self.state.lock().unwrap();
        state.deleted_branches.push(branch.to_string());
        state
            .branches
            .remove(branch)
            .map(|_| ())
            .ok_or_else(|| not_found(branch))
    }
}

/// Merge commit waiting in a local clone to be pushed.
#[derive(Debug, Clone)]
struct LocalMerge {
    message: String,
    tree: String,
    parents: Vec<String>,
}

#[derive(Debug, Default)]
struct LocalClone {
    current_branch: Option<String>,
    merge: Option<LocalMerge>,
}

/// Plays `git` against the shared remote.
pub struct ScriptedGit {
    pub state: SharedRemote,
    pub clone_delay: Duration,
    clones: Mutex<HashMap<PathBuf, LocalClone>>,
}

impl ScriptedGit {
    pub fn new(state: SharedRemote, clone_delay: Duration) -> Self {
        Self {
            state,
            clone_delay,
            clones: Mutex::new(HashMap::new()),
        }
    }
}

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        status_code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

fn failed(stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        status_code: 1,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

/// Tree name the fake assigns to the result of merging `base` into `head`.
pub fn merged_tree(head: &str, base: &str) -> String {
    format!("tree-{head}+{base}")
}

#[async_trait]
impl CommandExecutor for ScriptedGit {
    async fn execute(
        &self,
        cwd: &Path,
        program: &str,
        args: &[&str],
    ) -> Result<CommandOutput, CommandError> {
        assert_eq!(program, "git");

        match args {
            ["clone", "--quiet", url, dir] => {
                self.state.lock().unwrap().clones.enter();
                tokio::time::sleep(self.clone_delay).await;
                let mut state = self.state.lock().unwrap();
                state.clones.exit();
                state.clone_urls.push(url.to_string());
                drop(state);

                let path = cwd.join(dir);
                std::fs::create_dir_all(path.join(".git")).map_err(|e| CommandError::Io {
                    message: e.to_string(),
                })?;
                self.clones
                    .lock()
                    .unwrap()
                    .insert(path, LocalClone::default());
                Ok(ok(""))
            }
            ["config", _, _] => Ok(ok("")),
            ["checkout", "-b", branch] => {
                let mut clones = self.clones.lock().unwrap();
                let clone = clones.entry(cwd.to_path_buf()).or_default();
                clone.current_branch = Some(branch.to_string());
                Ok(ok(""))
            }
            ["checkout", branch] => {
                if !self.state.lock().unwrap().branches.contains_key(*branch) {
                    return Ok(failed(
                        "",
                        &format!("error: pathspec '{branch}' did not match any file(s) known to git"),
                    ));
                }
                let mut clones = self.clones.lock().unwrap();
                clones.entry(cwd.to_path_buf()).or_default().current_branch =
                    Some(branch.to_string());
                Ok(ok(""))
            }
            ["merge", "--no-ff", "-m", message, base] => {
                let mut clones = self.clones.lock().unwrap();
                let clone = clones.entry(cwd.to_path_buf()).or_default();
                let head = clone.current_branch.clone().unwrap_or_default();
                let state = self.state.lock().unwrap();

                if state.conflicting_heads.contains(&head) {
                    return Ok(failed(
                        "Auto-merging src/lib.rs\nCONFLICT (content): Merge conflict in src/lib.rs\nAutomatic merge failed; fix conflicts and then commit the result.\n",
                        "",
                    ));
                }

                clone.merge = Some(LocalMerge {
                    message: message.to_string(),
                    tree: merged_tree(&head, base),
                    parents: vec![
                        state.branches.get(&head).cloned().unwrap_or_default(),
                        state.branches.get(*base).cloned().unwrap_or_default(),
                    ],
                });
                Ok(ok("Merge made by the 'ort' strategy.\n"))
            }
            ["push", "origin", branch] => {
                let merge = self
                    .clones
                    .lock()
                    .unwrap()
                    .get(cwd)
                    .and_then(|clone| clone.merge.clone());
                let Some(merge) = merge else {
                    return Ok(failed("", "error: src refspec does not match any"));
                };

                let mut state = self.state.lock().unwrap();
                let sha = state.mint_sha("merge");
                state.commits.insert(
                    sha.clone(),
                    CommitObject {
                        sha: sha.clone(),
                        tree_sha: merge.tree,
                        parents: merge.parents,
                        message: merge.message,
                    },
                );
                state.branches.insert(branch.to_string(), sha);
                state.pushes.push(branch.to_string());
                Ok(ok(""))
            }
            other => Ok(failed("", &format!("unexpected git invocation: {other:?}"))),
        }
    }
}

/// A reconciler wired to the fakes, with its own workspace root.
pub struct Harness {
    pub reconciler: Reconciler,
    pub state: SharedRemote,
    pub config: MenderConfig,
    pub workspace_root: TempDir,
}

pub struct HarnessOptions {
    pub discovery_concurrency: usize,
    pub repair_concurrency: usize,
    pub probe_delay: Duration,
    pub clone_delay: Duration,
    pub commit_delay: Duration,
    pub task_timeout_seconds: u64,
    pub token: Option<String>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            discovery_concurrency: 4,
            repair_concurrency: 3,
            probe_delay: Duration::ZERO,
            clone_delay: Duration::ZERO,
            commit_delay: Duration::ZERO,
            task_timeout_seconds: 1800,
            token: Some(TOKEN.to_string()),
        }
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(HarnessOptions::default())
    }

    pub fn with_options(options: HarnessOptions) -> Self {
        let workspace_root = tempfile::tempdir().unwrap();
        let state: SharedRemote = Arc::new(Mutex::new(RemoteState::default()));
        state
            .lock()
            .unwrap()
            .branches
            .extend([("main".to_string(), "base0001".to_string()), ("7-x-y".to_string(), "base0002".to_string())]);

        let mut config = MenderConfig::default();
        config.scheduler.discovery_concurrency = options.discovery_concurrency;
        config.scheduler.repair_concurrency = options.repair_concurrency;
        config.scheduler.task_timeout_seconds = options.task_timeout_seconds;
        config.probe.backoff_seconds = 0;
        config.repair.workspace_root = Some(workspace_root.path().display().to_string());

        let api = Arc::new(FakeGitHub {
            state: state.clone(),
            probe_delay: options.probe_delay,
            commit_delay: options.commit_delay,
        });
        let git = Arc::new(ScriptedGit::new(state.clone(), options.clone_delay));
        let credentials: Arc<dyn CredentialProvider> =
            Arc::new(StaticTokenProvider::new(options.token));

        let reconciler = Reconciler::new(&config, api, credentials, git).unwrap();

        Self {
            reconciler,
            state,
            config,
            workspace_root,
        }
    }

    /// Adds an open pull request from `head_owner`'s copy of the repository
    /// and gives its head branch a commit.
    pub fn add_pull(
        &self,
        number: u64,
        head: &str,
        base: &str,
        head_owner: Option<&str>,
        states: Vec<MergeableState>,
    ) {
        let mut state = self.state.lock().unwrap();
        let head_sha = format!("head{number:04}");
        state.branches.insert(head.to_string(), head_sha.clone());
        state.pulls.push(CandidatePullRequest {
            number,
            head_ref: head.to_string(),
            head_sha,
            head_repo: head_owner.map(|owner| RepoCoordinates::new(owner, NAME)),
            base_ref: base.to_string(),
            mergeable_state: MergeableState::Unknown,
        });
        state.status_script.insert(number, states.into());
    }

    pub fn branch_head(&self, branch: &str) -> Option<String> {
        self.state.lock().unwrap().branches.get(branch).cloned()
    }

    pub fn temp_prefix(&self) -> &str {
        &self.config.repair.temp_branch_prefix
    }

    /// Entries left under the workspace root.
    pub fn workspace_residue(&self) -> usize {
        std::fs::read_dir(self.workspace_root.path()).unwrap().count()
    }
}
