//! Branch-update events and the release-branch predicate.

use regex::Regex;
use serde::Deserialize;

use crate::config::BranchFilterConfig;
use crate::github::types::RepoCoordinates;

const BRANCH_REF_PREFIX: &str = "refs/heads/";

/// The subset of a `push` webhook payload the pipeline acts on.
#[derive(Debug, Clone, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub deleted: bool,
    pub repository: EventRepository,
    #[serde(default)]
    pub installation: Option<EventInstallation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventRepository {
    pub name: String,
    pub owner: EventOwner,
}

/// Push payloads carry `name` for the owner, other events carry `login`.
#[derive(Debug, Clone, Deserialize)]
pub struct EventOwner {
    #[serde(default)]
    pub login: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventInstallation {
    pub id: u64,
}

impl PushEvent {
    /// Builds a push event for `branch`, as if the hosting service had sent it.
    pub fn for_branch(repo: &RepoCoordinates, branch: &str) -> Self {
        PushEvent {
            git_ref: format!("{BRANCH_REF_PREFIX}{branch}"),
            deleted: false,
            repository: EventRepository {
                name: repo.name.clone(),
                owner: EventOwner {
                    login: Some(repo.owner.clone()),
                    name: None,
                },
            },
            installation: None,
        }
    }

    pub fn from_json(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Repository coordinates, or `None` if the payload names no owner.
    pub fn repo(&self) -> Option<RepoCoordinates> {
        let owner = self
            .repository
            .owner
            .login
            .as_ref()
            .or(self.repository.owner.name.as_ref())?;
        Some(RepoCoordinates::new(owner.clone(), self.repository.name.clone()))
    }

    pub fn installation_id(&self) -> Option<u64> {
        self.installation.as_ref().map(|i| i.id)
    }
}

/// Decides which pushed refs start a reconciliation pass.
#[derive(Debug, Clone)]
pub struct BranchFilter {
    primary: String,
    release_line: Regex,
}

impl BranchFilter {
    pub fn new(primary: impl Into<String>, release_pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            primary: primary.into(),
            release_line: Regex::new(release_pattern)?,
        })
    }

    pub fn from_config(config: &BranchFilterConfig) -> Result<Self, regex::Error> {
        Self::new(config.primary.clone(), &config.release_pattern)
    }

    /// Short branch name when `git_ref` is a branch ref for the primary branch
    /// or a release line.
    pub fn qualifying_branch<'a>(&self, git_ref: &'a str) -> Option<&'a str> {
        let branch = git_ref.strip_prefix(BRANCH_REF_PREFIX)?;
        if branch == self.primary || self.release_line.is_match(branch) {
            Some(branch)
        } else {
            None
        }
    }

    /// Like [`BranchFilter::qualifying_branch`], but also drops branch deletions.
    pub fn accepts<'a>(&self, event: &'a PushEvent) -> Option<&'a str> {
        if event.deleted {
            return None;
        }
        self.qualifying_branch(&event.git_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn default_filter() -> BranchFilter {
        BranchFilter::from_config(&BranchFilterConfig::default()).unwrap()
    }

    #[test]
    fn test_primary_and_release_lines_qualify() {
        let filter = default_filter();
        assert_eq!(filter.qualifying_branch("refs/heads/main"), Some("main"));
        assert_eq!(filter.qualifying_branch("refs/heads/7-x-y"), Some("7-x-y"));
        assert_eq!(filter.qualifying_branch("refs/heads/32-x-y"), Some("32-x-y"));
    }

    #[test]
    fn test_other_refs_do_not_qualify() {
        let filter = default_filter();
        assert_eq!(filter.qualifying_branch("refs/heads/feature/foo"), None);
        assert_eq!(filter.qualifying_branch("refs/heads/7-X-Y"), None);
        assert_eq!(filter.qualifying_branch("refs/heads/x-x-y"), None);
        assert_eq!(filter.qualifying_branch("refs/heads/7-x-y-backport"), None);
        assert_eq!(filter.qualifying_branch("refs/tags/main"), None);
        assert_eq!(filter.qualifying_branch("main"), None);
    }

    #[test]
    fn test_branch_deletion_is_ignored() {
        let filter = default_filter();
        let mut event = PushEvent::for_branch(&RepoCoordinates::new("octo", "widgets"), "main");
        assert_eq!(filter.accepts(&event), Some("main"));

        event.deleted = true;
        assert_eq!(filter.accepts(&event), None);
    }

    #[test]
    fn test_push_payload_parsing() {
        let event = PushEvent::from_json(
            r#"{
                "ref": "refs/heads/7-x-y",
                "before": "a", "after": "b",
                "repository": {"name": "widgets", "owner": {"name": "octo", "email": null}},
                "installation": {"id": 99}
            }"#,
        )
        .unwrap();

        assert_eq!(event.repo(), Some(RepoCoordinates::new("octo", "widgets")));
        assert_eq!(event.installation_id(), Some(99));
        assert!(!event.deleted);
    }

    proptest! {
        #[test]
        fn release_lines_always_qualify(major in 0u32..10_000) {
            let filter = default_filter();
            let git_ref = format!("refs/heads/{major}-x-y");
            prop_assert!(filter.qualifying_branch(&git_ref).is_some());
        }

        #[test]
        fn feature_branches_never_qualify(name in "feature/[a-z]{1,12}") {
            let filter = default_filter();
            let git_ref = format!("refs/heads/{name}");
            prop_assert!(filter.qualifying_branch(&git_ref).is_none());
        }
    }
}
