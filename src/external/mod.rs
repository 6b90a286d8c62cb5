//! External tool abstractions
//!
//! Trait-based wrappers around subprocesses so git can be driven for real in
//! production and scripted in tests.

pub mod command;
pub mod git;

pub use command::{CommandError, CommandExecutor, CommandOutput, ProcessCommandExecutor};
pub use git::{GitClient, GitError};
