use anyhow::{anyhow, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::ObservabilityConfig;
use crate::github::types::PullRequestLocator;

/// Initialize structured logging.
///
/// `RUST_LOG` takes precedence over the configured level. JSON output carries
/// the current span and span list so every line of a repair attempt can be
/// tied back to its pull request.
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| anyhow!("invalid log level '{}': {}", config.log_level, e))?;

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };
    result.map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))?;

    tracing::info!("conflict-mender telemetry initialized");
    Ok(())
}

/// Generate a correlation ID for linking related operations
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Span for everything done on behalf of one push event.
pub fn dispatch_span(correlation_id: &str, repo: &str, branch: &str) -> tracing::Span {
    tracing::info_span!(
        "dispatch",
        correlation.id = correlation_id,
        repo = repo,
        branch = branch
    )
}

/// Span for a mergeability probe of one pull request.
pub fn discovery_span(locator: &PullRequestLocator) -> tracing::Span {
    tracing::info_span!("discovery", pr = %locator)
}

/// Span for one merge attempt.
pub fn repair_span(locator: &PullRequestLocator, attempt_id: &str) -> tracing::Span {
    tracing::info_span!("repair", pr = %locator, attempt.id = attempt_id)
}
