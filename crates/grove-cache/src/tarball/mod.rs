//! Gzip tarball extraction and creation

pub mod create;
pub mod extract;

pub use create::pack_files;
pub use extract::extract_tarball;
