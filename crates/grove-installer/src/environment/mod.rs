//! Environment providers
//!
//! The installer never touches an environment directly; it locates one,
//! reads what is installed, and hands each operation to the provider.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use thiserror::Error;

use grove_core::error::GroveError;
use grove_core::PackageName;

use crate::operation::{InstalledPackage, Operation};

pub mod directory;
pub mod memory;

pub use directory::DirectoryEnvironment;
pub use memory::MemoryEnvironment;

/// Installed packages by name
pub type Snapshot = BTreeMap<PackageName, InstalledPackage>;

/// A located environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentHandle {
    pub root: Utf8PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationErrorKind {
    Download,
    Integrity,
    Build,
    Install,
    /// The environment itself is gone or unusable; fatal for the run
    EnvironmentUnavailable,
}

impl fmt::Display for OperationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            OperationErrorKind::Download => "download",
            OperationErrorKind::Integrity => "integrity",
            OperationErrorKind::Build => "build",
            OperationErrorKind::Install => "install",
            OperationErrorKind::EnvironmentUnavailable => "environment unavailable",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} error: {message}")]
pub struct OperationError {
    pub kind: OperationErrorKind,
    pub message: String,
}

impl OperationError {
    pub fn new(kind: OperationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::EnvironmentUnavailable, message)
    }

    pub fn is_fatal(&self) -> bool {
        self.kind == OperationErrorKind::EnvironmentUnavailable
    }

    /// Classify a fetch or unpack failure
    pub fn from_grove(kind: OperationErrorKind, error: &GroveError) -> Self {
        let kind = match error {
            GroveError::IntegrityFailure { .. } => OperationErrorKind::Integrity,
            _ => kind,
        };
        Self::new(kind, error.to_string())
    }
}

/// Where packages get installed
#[async_trait]
pub trait EnvironmentProvider: Send + Sync {
    /// Find (or create) the environment
    async fn locate(&self) -> Result<EnvironmentHandle, OperationError>;

    async fn installed_snapshot(&self, handle: &EnvironmentHandle) -> Result<Snapshot, OperationError>;

    async fn execute_operation(&self, handle: &EnvironmentHandle, operation: &Operation) -> Result<(), OperationError>;
}
