//! Error types and result aliases for Grove operations.
//!
//! Provides a unified error type that covers every failure class of the
//! dependency manager, from manifest parsing to environment operations,
//! with actionable messages.

use thiserror::Error;

use crate::types::marker::MarkerError;
use crate::types::version::VersionError;

/// Unified error type for all Grove operations
#[derive(Error, Debug)]
pub enum GroveError {
    // Manifest and configuration errors
    #[error("Failed to parse {file}: {message} at line {line}, column {column}")]
    TomlParse {
        file: String,
        message: String,
        line: usize,
        column: usize,
    },

    #[error("Failed to parse JSON document: {message}")]
    JsonParse { message: String },

    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    #[error("No grove.toml found in {searched_from} or any parent directory")]
    ManifestNotFound { searched_from: String },

    // Constraint model errors
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Marker(#[from] MarkerError),

    // Pool errors
    #[error("Package '{name}' not found in any configured source")]
    PackageNotFound { name: String },

    #[error("Source '{source_name}' failed: {message}")]
    SourceError {
        source_name: String,
        message: String,
    },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Operation timed out after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },

    // Solver errors
    #[error("Version solving failed:\n\n{report}")]
    ResolutionFailure { report: String },

    // Lock errors
    #[error("Lock file not found at {path}")]
    LockNotFound { path: String },

    #[error("Lock file is out of date: expected content hash {expected}, found {found}")]
    LockStale { expected: String, found: String },

    #[error("Lock file is inconsistent: {reason}")]
    LockInconsistent { reason: String },

    // Installer errors
    #[error("Operation on {package} failed: {message}")]
    OperationFailure { package: String, message: String },

    #[error("Environment unavailable: {message}")]
    EnvironmentUnavailable { message: String },

    #[error("Integrity check failed for {package}: expected {expected}, got {actual}")]
    IntegrityFailure {
        package: String,
        expected: String,
        actual: String,
    },

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for Grove operations
pub type GroveResult<T> = Result<T, GroveError>;

impl GroveError {
    /// Create a network error from any error type
    pub fn network<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Network {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Create an IO error from std::io::Error
    pub fn io(message: String, source: std::io::Error) -> Self {
        Self::Io { message, source }
    }

    /// TOML parse error at a byte offset of `content`; lines and columns
    /// are 1-based
    pub fn toml_parse(file: impl Into<String>, content: &str, message: impl Into<String>, offset: Option<usize>) -> Self {
        let (line, column) = match offset {
            Some(offset) => {
                let before = &content[..offset.min(content.len())];
                let line = before.matches('\n').count() + 1;
                let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
                (line, column)
            },
            None => (0, 0),
        };
        Self::TomlParse {
            file: file.into(),
            message: message.into(),
            line,
            column,
        }
    }

    pub fn source_error(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceError {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Check if this error is transient and worth retrying
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GroveError::Network { .. }
                | GroveError::Io { .. }
                | GroveError::SourceError { .. }
                | GroveError::Timeout { .. }
        )
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            GroveError::PackageNotFound { .. } => {
                Some("Check the package name spelling and the [[source]] entries in grove.toml")
            },
            GroveError::Network { .. } | GroveError::Timeout { .. } => {
                Some("Check your internet connection and try again")
            },
            GroveError::ResolutionFailure { .. } => {
                Some("Relax the conflicting constraints in grove.toml, then run 'grove lock'")
            },
            GroveError::LockNotFound { .. } => Some("Run 'grove lock' to create grove.lock"),
            GroveError::LockStale { .. } | GroveError::LockInconsistent { .. } => {
                Some("Run 'grove lock' to bring grove.lock up to date")
            },
            GroveError::ManifestNotFound { .. } => {
                Some("Run grove from a project directory containing grove.toml")
            },
            GroveError::IntegrityFailure { .. } => {
                Some("Clear the artifact cache with 'grove cache clear' and retry")
            },
            GroveError::EnvironmentUnavailable { .. } => {
                Some("Check that the environment directory exists and is writable")
            },
            _ => None,
        }
    }
}
