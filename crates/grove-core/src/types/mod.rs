//! Core data types for Grove dependency management.
//!
//! This module provides the constraint model used throughout the workspace:
//! - Versions, version sets and constraints
//! - Environment markers
//! - Package identity, candidates and dependencies
//! - Root requirements of a project

pub mod constraint;
pub mod dependency;
pub mod marker;
pub mod package;
pub mod project;
pub mod version;
pub mod version_set;

pub use constraint::Constraint;
pub use dependency::{Dependency, DependencyKind, DependencySpec, DetailedDependency};
pub use marker::{Marker, MarkerEnvironment, MarkerError};
pub use package::{Distribution, PackageCandidate, PackageId, PackageName, SourceRef};
pub use project::RootRequirements;
pub use version::{PartialVersion, Version, VersionError};
pub use version_set::VersionSet;
