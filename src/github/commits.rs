use super::client::RequestGate;
use super::errors::GitHubError;
use super::types::{CommitObject, GitCommitPayload, NewCommit, RepoCoordinates};
use octocrab::Octocrab;

/// Handler for the git database commit endpoints.
///
/// Commits created here are built and signed by GitHub itself, which is what
/// lets a republished merge show up as verified.
#[derive(Clone)]
pub struct CommitHandler {
    octocrab: Octocrab,
    gate: RequestGate,
    repo: RepoCoordinates,
}

impl CommitHandler {
    pub(crate) fn new(octocrab: Octocrab, gate: RequestGate, repo: RepoCoordinates) -> Self {
        Self {
            octocrab,
            gate,
            repo,
        }
    }

    pub async fn get(&self, sha: &str) -> Result<CommitObject, GitHubError> {
        let route = format!(
            "/repos/{}/{}/git/commits/{}",
            self.repo.owner, self.repo.name, sha
        );

        let payload: GitCommitPayload = self
            .gate
            .call("get_commit", async {
                self.octocrab
                    .get(&route, None::<&()>)
                    .await
                    .map_err(|e| GitHubError::from_octocrab(e, format!("commit {sha}")))
            })
            .await?;

        Ok(payload.into())
    }

    /// Create a commit object from an existing tree and parents.
    pub async fn create(&self, commit: &NewCommit) -> Result<CommitObject, GitHubError> {
        let route = format!("/repos/{}/{}/git/commits", self.repo.owner, self.repo.name);

        let payload: GitCommitPayload = self
            .gate
            .call("create_commit", async {
                self.octocrab
                    .post(&route, Some(commit))
                    .await
                    .map_err(|e| GitHubError::from_octocrab(e, format!("tree {}", commit.tree)))
            })
            .await?;

        if payload.tree.sha != commit.tree {
            return Err(GitHubError::InvalidResponse(format!(
                "created commit {} has tree {} but {} was requested",
                payload.sha, payload.tree.sha, commit.tree
            )));
        }

        Ok(payload.into())
    }
}
