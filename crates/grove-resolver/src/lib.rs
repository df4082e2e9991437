//! Dependency resolution engine for Grove
//!
//! This crate finds one version per package that satisfies every
//! requirement reachable from a project's root requirements, or explains
//! why no such selection exists.
//!
//! The solver follows the PubGrub approach: decisions and derivations are
//! tracked in a partial solution, conflicts are analysed into learned
//! incompatibilities, and a failed resolution carries the derivation tree
//! it was proven from.

pub mod graph;
pub mod incompatibility;
pub mod package;
mod partial_solution;
pub mod report;
pub mod solver;
pub mod term;

// Re-export main types
pub use graph::{ResolvedEdge, ResolvedGraph, ResolvedNode};
pub use incompatibility::{IncompatId, Incompatibility, Kind};
pub use package::SolverPackage;
pub use report::{DerivationTree, External, Step};
pub use solver::{NoSolution, ResolveError, Resolver, ResolverOptions, ROOT_VERSION};
pub use term::Term;

use grove_core::error::GroveError;

/// Result type for resolver operations
pub type ResolverResult<T> = Result<T, GroveError>;
