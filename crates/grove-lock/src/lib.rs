//! Lock file support for Grove
//!
//! A lock file records the outcome of a resolution: one entry per selected
//! package with its version, origin, archive location and hashes, plus the
//! content hash of the root requirements it was resolved from.
//!
//! - `hash`: content hash of root requirements
//! - `lockfile`: the `grove.lock` document and its graph view
//! - `store`: atomic reads and writes, freshness validation
//! - `export`: requirements-style export

pub mod export;
pub mod hash;
pub mod lockfile;
pub mod store;

pub use export::{requirements, ExportOptions};
pub use hash::content_hash;
pub use lockfile::{LockEntry, LockFile, LockedDependency, LOCK_FORMAT_VERSION};
pub use store::{Freshness, LockStore, LOCK_FILE_NAME};

use grove_core::error::GroveError;

/// Result type for lock operations
pub type LockResult<T> = Result<T, GroveError>;
