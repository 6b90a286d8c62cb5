//! Short-lived credentials for cloning and pushing.
//!
//! The repair pipeline asks a [`CredentialProvider`] for a fresh token right
//! before each clone and drops it when the attempt ends. Tokens are never
//! cached here and never printed: [`AccessToken`] redacts itself in `Debug`.

use async_trait::async_trait;
use thiserror::Error;

use crate::github::types::RepoCoordinates;

/// A bearer token usable for one repair attempt.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token. Callers must not log the returned value.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// What a token must be valid for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenScope {
    pub repo: RepoCoordinates,
    /// GitHub App installation that delivered the triggering event, if any.
    pub installation_id: Option<u64>,
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no credentials configured: {0}")]
    NotConfigured(String),
    #[error("token issuance failed for {repo}: {message}")]
    IssuanceFailed { repo: String, message: String },
}

/// Issues repository-scoped access tokens.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn issue_token(&self, scope: &TokenScope) -> Result<AccessToken, CredentialError>;
}

/// Hands out the same configured token for every scope.
///
/// Suitable for single-repository deployments driven by a personal or
/// fine-grained token; GitHub App deployments plug an installation-token
/// issuer in behind the same trait.
pub struct StaticTokenProvider {
    token: Option<AccessToken>,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.is_empty()).map(AccessToken::new),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenProvider {
    async fn issue_token(&self, scope: &TokenScope) -> Result<AccessToken, CredentialError> {
        self.token.clone().ok_or_else(|| {
            CredentialError::NotConfigured(format!(
                "set github.token or GITHUB_TOKEN to repair {}",
                scope.repo
            ))
        })
    }
}
