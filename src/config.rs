use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const CONFIG_FILE_STEM: &str = "conflict-mender";
const ENV_PREFIX: &str = "CONFLICT_MENDER";

/// Main configuration structure for conflict-mender
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct MenderConfig {
    /// GitHub API access
    pub github: GitHubConfig,
    /// Concurrency of the discovery and repair queues
    pub scheduler: SchedulerConfig,
    /// Mergeability polling
    pub probe: ProbeConfig,
    /// Local merge and republish settings
    pub repair: RepairConfig,
    /// Which pushed branches trigger a pass
    pub branches: BranchFilterConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token (can be set via env var)
    pub token: Option<String>,
    /// API base URL; unset means api.github.com
    pub api_base: Option<String>,
    /// Upper bound on a single API call
    pub request_timeout_seconds: u64,
    /// Client-side throttling
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    pub burst: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Simultaneous mergeability probes
    pub discovery_concurrency: usize,
    /// Simultaneous clone-and-merge attempts
    pub repair_concurrency: usize,
    /// Upper bound on any single queued task
    pub task_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Status fetches before giving up on an `unknown` state
    pub max_attempts: u32,
    /// Fixed wait between fetches
    pub backoff_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Identity recorded on the local merge commit
    pub bot_name: String,
    pub bot_email: String,
    /// Prefix of the short-lived branch used to transport the merge
    pub temp_branch_prefix: String,
    /// Host the repository is cloned from
    pub git_host: String,
    /// Upper bound on a single git subprocess
    pub command_timeout_seconds: u64,
    /// Parent directory for per-attempt workspaces; system temp dir when unset
    pub workspace_root: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BranchFilterConfig {
    /// The primary release branch
    pub primary: String,
    /// Release-line branches, matched case-sensitively against the short name
    pub release_pattern: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None, // Will be read from env var
            api_base: None,
            request_timeout_seconds: 30,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10,
            burst: 50,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            discovery_concurrency: 4,
            repair_concurrency: 3,
            task_timeout_seconds: 1800, // 30 minutes
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_seconds: 5,
        }
    }
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            bot_name: "conflict-mender[bot]".to_string(),
            bot_email: "conflict-mender[bot]@users.noreply.github.com".to_string(),
            temp_branch_prefix: "conflict-mender/".to_string(),
            git_host: "github.com".to_string(),
            command_timeout_seconds: 600,
            workspace_root: None,
        }
    }
}

impl Default for BranchFilterConfig {
    fn default() -> Self {
        Self {
            primary: "main".to_string(),
            release_pattern: r"^[0-9]+-x-y$".to_string(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: true,
        }
    }
}

impl SchedulerConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_seconds)
    }
}

impl ProbeConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_secs(self.backoff_seconds)
    }
}

impl RepairConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }
}

impl MenderConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. `conflict-mender.toml` in the working directory
    /// 3. An explicit file passed on the command line
    /// 4. Environment variables (prefixed with CONFLICT_MENDER__)
    pub fn load(explicit_file: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(
            Config::try_from(&MenderConfig::default()).context("Failed to seed defaults")?,
        );

        if Path::new(&format!("{CONFIG_FILE_STEM}.toml")).exists() {
            builder = builder.add_source(File::with_name(CONFIG_FILE_STEM));
        }

        if let Some(path) = explicit_file {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut mender_config: MenderConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Failed to parse configuration")?;

        // Special handling for GitHub token - fall back to the conventional variable
        if mender_config.github.token.is_none() {
            if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                mender_config.github.token = Some(token);
            }
        }

        mender_config.validate()?;
        Ok(mender_config)
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler.discovery_concurrency == 0 {
            bail!("scheduler.discovery_concurrency must be at least 1");
        }
        if self.scheduler.repair_concurrency == 0 {
            bail!("scheduler.repair_concurrency must be at least 1");
        }
        if self.probe.max_attempts == 0 {
            bail!("probe.max_attempts must be at least 1");
        }
        regex::Regex::new(&self.branches.release_pattern).with_context(|| {
            format!(
                "branches.release_pattern '{}' is not a valid regex",
                self.branches.release_pattern
            )
        })?;
        Ok(())
    }
}
