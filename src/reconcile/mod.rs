//! Repair of conflicted pull requests after their base branch moves.

pub mod error;
pub mod merge;
pub mod pipeline;
pub mod prober;
pub mod republish;
pub mod scheduler;
pub mod workspace;

pub use error::{Cleanup, FailureKind, RepairError, RepairStage};
pub use merge::{MergeExecutor, MergeOutcome, CI_SKIP_MARKER};
pub use pipeline::{PushDispatch, Reconciler, RepairOutcome};
pub use prober::{MergeabilityProber, ProbeResult};
pub use republish::{CommitRepublisher, Republished};
pub use scheduler::{Scheduler, TaskPool};
pub use workspace::{Workspace, WorkspaceManager};
