//! Project manifest and settings for Grove
//!
//! This crate handles parsing and validation of `grove.toml`, the layered
//! settings the installer and sources run with, and format-preserving
//! manifest edits.

pub mod edit;
pub mod manifest;
pub mod settings;

// Re-export main types
pub use edit::ManifestEditor;
pub use manifest::{find_manifest, InstallerTable, Manifest, Project, ProjectSection, SourceSpec, MANIFEST_FILE_NAME};
pub use settings::{InstallerSettings, NetworkSettings, Settings, SettingsLayer, SettingsLoader};

use grove_core::error::GroveError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, GroveError>;
