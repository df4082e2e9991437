//! Package sources and the candidate Pool for Grove
//!
//! This crate provides the pluggable sources that answer "what versions of
//! this package exist" and "give me this archive" (an HTTP index client, a
//! local index directory and an in-memory index), plus the `Pool` that
//! memoizes their answers for the lifetime of a resolution run.

pub mod api;
pub mod cache;
pub mod client;
pub mod local;
pub mod memory;
pub mod pool;
pub mod retry;
pub mod source;

// Re-export main types
pub use api::{DistInfo, PackageMetadata, VersionMetadata};
pub use cache::{CacheStats, OnceMap};
pub use client::{AuthConfig, RegistryClient};
pub use local::LocalIndex;
pub use memory::MemorySource;
pub use pool::{Pool, PoolConfig, PoolError};
pub use retry::{with_retry, RetryConfig};
pub use source::PackageSource;

use grove_core::error::GroveError;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, GroveError>;
