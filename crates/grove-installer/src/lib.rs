//! Installation for Grove
//!
//! Turns a resolved graph into a plan of install, update and remove
//! operations against an environment snapshot, then executes the plan
//! sequentially or on a bounded worker pool through an
//! `EnvironmentProvider`.

pub mod environment;
pub mod executor;
pub mod installer;
pub mod operation;
pub mod plan;
pub mod report;

pub use environment::{
    DirectoryEnvironment, EnvironmentHandle, EnvironmentProvider, MemoryEnvironment, OperationError,
    OperationErrorKind, Snapshot,
};
pub use executor::{Executor, ExecutorMode};
pub use installer::{InstallOptions, Installer};
pub use operation::{InstalledPackage, Operation};
pub use plan::{InstallMode, Plan, Selection};
pub use report::{InstallReport, Outcome, OutcomeTable, RunStatus};

use grove_core::error::GroveError;

/// Result type for installer operations
pub type InstallResult<T> = Result<T, GroveError>;
