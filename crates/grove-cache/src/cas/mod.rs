//! Content-addressable storage
//!
//! Blobs live at `<root>/ab/cd/abcd...` keyed by their Blake3 hash; a JSON
//! index records size, timestamps, the `sha256:` integrity string and a
//! human label for every blob.

pub mod hash;
pub mod index;
pub mod store;

pub use hash::ContentHash;
pub use index::{CacheEntry, CasIndex};
pub use store::{format_size, CasStore, ClearSummary};
