use super::client::RequestGate;
use super::errors::GitHubError;
use super::types::{GitRefPayload, RepoCoordinates};
use octocrab::params::repos::Reference;
use octocrab::Octocrab;
use serde::Serialize;

/// Handler for GitHub branch (git ref) operations
#[derive(Clone)]
pub struct BranchHandler {
    octocrab: Octocrab,
    gate: RequestGate,
    repo: RepoCoordinates,
}

#[derive(Serialize)]
struct UpdateRefRequest<'a> {
    sha: &'a str,
    force: bool,
}

impl BranchHandler {
    pub(crate) fn new(octocrab: Octocrab, gate: RequestGate, repo: RepoCoordinates) -> Self {
        Self {
            octocrab,
            gate,
            repo,
        }
    }

    /// Route for writes to a branch ref.
    fn refs_route(&self, branch: &str) -> String {
        format!(
            "/repos/{}/{}/git/refs/heads/{}",
            self.repo.owner, self.repo.name, branch
        )
    }

    /// Route for reading exactly one branch ref; `git/refs` may answer a
    /// prefix match with a list.
    fn single_ref_route(&self, branch: &str) -> String {
        format!(
            "/repos/{}/{}/git/ref/heads/{}",
            self.repo.owner, self.repo.name, branch
        )
    }

    /// Commit sha the branch points at.
    pub async fn head_sha(&self, branch: &str) -> Result<String, GitHubError> {
        let route = self.single_ref_route(branch);

        let payload: GitRefPayload = self
            .gate
            .call("get_ref", async {
                self.octocrab
                    .get(&route, None::<&()>)
                    .await
                    .map_err(|e| GitHubError::from_octocrab(e, format!("branch {branch}")))
            })
            .await?;

        Ok(payload.object.sha)
    }

    /// Point `branch` at `sha`. Not forced: GitHub rejects the update unless it
    /// is a fast-forward.
    pub async fn update(&self, branch: &str, sha: &str) -> Result<(), GitHubError> {
        let route = self.refs_route(branch);

        let _: serde_json::Value = self
            .gate
            .call("update_ref", async {
                self.octocrab
                    .patch(&route, Some(&UpdateRefRequest { sha, force: false }))
                    .await
                    .map_err(|e| GitHubError::from_octocrab(e, format!("branch {branch}")))
            })
            .await?;

        Ok(())
    }

    /// Delete a branch
    pub async fn delete(&self, branch: &str) -> Result<(), GitHubError> {
        self.gate
            .call("delete_ref", async {
                self.octocrab
                    .repos(&self.repo.owner, &self.repo.name)
                    .delete_ref(&Reference::Branch(branch.to_string()))
                    .await
                    .map_err(|e| GitHubError::from_octocrab(e, format!("branch {branch}")))
            })
            .await
    }
}
