//! # grove-core
//!
//! Core types and utilities shared across all Grove crates.
//!
//! This crate provides:
//! - `Version`, `VersionSet` and `Constraint`, the value types the solver
//!   reasons about
//! - `Marker` expressions and the `MarkerEnvironment` they evaluate against
//! - `PackageId`, `PackageCandidate` and `Dependency`
//! - `GroveError`, the unified error taxonomy
//! - Integrity hashing and safe path helpers
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: the constraint model (no I/O)
//! - `error`: error types and result aliases
//! - `utils`: hashing and path helpers

pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{GroveError, GroveResult};
pub use types::{
    Constraint, Dependency, DependencyKind, DependencySpec, Marker, MarkerEnvironment,
    PackageCandidate, PackageId, PackageName, RootRequirements, SourceRef, Version, VersionSet,
};
