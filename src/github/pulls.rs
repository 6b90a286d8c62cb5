use super::client::RequestGate;
use super::errors::GitHubError;
use super::types::{CandidatePullRequest, PullPayload, RepoCoordinates};
use octocrab::Octocrab;
use serde::Serialize;

const PAGE_SIZE: u32 = 100;

/// Handler for GitHub pull request operations
#[derive(Clone)]
pub struct PullRequestHandler {
    octocrab: Octocrab,
    gate: RequestGate,
    repo: RepoCoordinates,
}

#[derive(Serialize)]
struct ListParams<'a> {
    state: &'static str,
    base: &'a str,
    per_page: u32,
    page: u32,
}

impl PullRequestHandler {
    pub(crate) fn new(octocrab: Octocrab, gate: RequestGate, repo: RepoCoordinates) -> Self {
        Self {
            octocrab,
            gate,
            repo,
        }
    }

    /// List open pull requests targeting `base`, following pagination until a
    /// short page is returned.
    pub async fn list_open_for_base(
        &self,
        base: &str,
    ) -> Result<Vec<CandidatePullRequest>, GitHubError> {
        let route = format!("/repos/{}/{}/pulls", self.repo.owner, self.repo.name);
        let mut page = 1u32;
        let mut all_prs = Vec::new();

        loop {
            let params = ListParams {
                state: "open",
                base,
                per_page: PAGE_SIZE,
                page,
            };

            let items: Vec<PullPayload> = self
                .gate
                .call("list_pull_requests", async {
                    self.octocrab
                        .get(&route, Some(&params))
                        .await
                        .map_err(|e| GitHubError::from_octocrab(e, format!("pulls of {}", self.repo)))
                })
                .await?;

            let is_last_page = items.len() < PAGE_SIZE as usize;
            all_prs.extend(items.into_iter().map(CandidatePullRequest::from));

            if is_last_page {
                break;
            }
            page += 1;
        }

        Ok(all_prs)
    }

    /// Get a specific pull request by number, including its mergeable state.
    pub async fn get(&self, number: u64) -> Result<CandidatePullRequest, GitHubError> {
        let route = format!(
            "/repos/{}/{}/pulls/{}",
            self.repo.owner, self.repo.name, number
        );

        let payload: PullPayload = self
            .gate
            .call("get_pull_request", async {
                self.octocrab
                    .get(&route, None::<&()>)
                    .await
                    .map_err(|e| GitHubError::from_octocrab(e, format!("{}#{}", self.repo, number)))
            })
            .await?;

        Ok(payload.into())
    }
}
