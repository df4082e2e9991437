//! Content-addressed artifact cache for Grove
//!
//! Downloaded package archives are stored under their Blake3 hash so a
//! package shared by several environments is fetched once. The crate also
//! provides safe gzip tarball extraction and creation.

pub mod cas;
pub mod tarball;

pub use cas::{format_size, CacheEntry, CasIndex, CasStore, ClearSummary, ContentHash};
pub use tarball::{extract_tarball, pack_files};

use grove_core::error::GroveError;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, GroveError>;
