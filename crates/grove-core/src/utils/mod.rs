//! Utility functions and helpers.
//!
//! Common functionality used across multiple Grove crates.

pub mod hash;
pub mod path;

pub use hash::{integrity_of, sha256_hex, verify_integrity};
pub use path::{is_safe_relative, normalize_path, safe_join};
