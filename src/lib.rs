// Conflict Mender Library - keeps pull requests mergeable after release branches move
// This exposes the core components for testing and integration

pub mod config;
pub mod credentials;
pub mod events;
pub mod external;
pub mod github;
pub mod reconcile;
pub mod telemetry;

// Re-export key types for easy access
pub use config::MenderConfig;
pub use credentials::{AccessToken, CredentialError, CredentialProvider, StaticTokenProvider, TokenScope};
pub use events::{BranchFilter, PushEvent};
pub use external::{CommandExecutor, GitClient, GitError, ProcessCommandExecutor};
pub use github::{GitHubClient, GitHubError, HostingApi, MergeableState, RepoCoordinates};
pub use reconcile::{
    MergeabilityProber,
    ProbeResult,
    PushDispatch,
    Reconciler,
    RepairError,
    RepairOutcome,
    Scheduler,
    TaskPool,
    WorkspaceManager,
};
pub use telemetry::{generate_correlation_id, init_telemetry};
