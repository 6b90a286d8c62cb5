use octocrab::Error as OctocrabError;

#[derive(Debug)]
pub enum GitHubError {
    TokenNotFound(String),
    ApiError(OctocrabError),
    NotFound {
        resource: String,
    },
    Timeout {
        operation: String,
        duration_ms: u64,
    },
    InvalidResponse(String),
}

impl GitHubError {
    /// HTTP status reported by the API, when there was one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            GitHubError::ApiError(OctocrabError::GitHub { source, .. }) => {
                Some(source.status_code.as_u16())
            }
            GitHubError::NotFound { .. } => Some(404),
            _ => None,
        }
    }

    /// Network trouble, rate limiting and server errors; worth trying again on
    /// a later event rather than a sign of a bad request.
    pub fn is_transient(&self) -> bool {
        match self {
            GitHubError::Timeout { .. } => true,
            GitHubError::ApiError(OctocrabError::GitHub { source, .. }) => {
                let status = source.status_code.as_u16();
                let message = source.message.to_lowercase();
                status == 429 || status >= 500 || (status == 403 && message.contains("rate limit"))
            }
            GitHubError::ApiError(other) => {
                let text = other.to_string().to_lowercase();
                text.contains("timed out") || text.contains("connection")
            }
            _ => false,
        }
    }

    /// Converts a 404 into [`GitHubError::NotFound`] naming the resource.
    pub(crate) fn from_octocrab(err: OctocrabError, resource: impl Into<String>) -> Self {
        match &err {
            OctocrabError::GitHub { source, .. } if source.status_code.as_u16() == 404 => {
                GitHubError::NotFound {
                    resource: resource.into(),
                }
            }
            _ => GitHubError::ApiError(err),
        }
    }
}

impl From<OctocrabError> for GitHubError {
    fn from(err: OctocrabError) -> Self {
        GitHubError::ApiError(err)
    }
}

impl std::fmt::Display for GitHubError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitHubError::TokenNotFound(msg) => {
                write!(f, "GitHub authentication error: {msg}")
            }
            GitHubError::ApiError(octocrab_err) => match octocrab_err {
                OctocrabError::GitHub { source, .. } => {
                    write!(
                        f,
                        "GitHub API error: HTTP {}: {}",
                        source.status_code, source.message
                    )
                }
                _ => write!(f, "GitHub API error: {octocrab_err}"),
            },
            GitHubError::NotFound { resource } => {
                write!(f, "GitHub resource not found: {resource}")
            }
            GitHubError::Timeout {
                operation,
                duration_ms,
            } => {
                write!(
                    f,
                    "GitHub operation '{operation}' timed out after {duration_ms}ms"
                )
            }
            GitHubError::InvalidResponse(msg) => {
                write!(f, "Unexpected GitHub response: {msg}")
            }
        }
    }
}

impl std::error::Error for GitHubError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GitHubError::ApiError(err) => Some(err),
            _ => None,
        }
    }
}
