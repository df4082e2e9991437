//! The seam between the Pool and the places packages come from.

use async_trait::async_trait;
use grove_core::{PackageCandidate, PackageName, SourceRef};
use std::fmt::Debug;

use crate::api::PackageMetadata;
use crate::RegistryResult;

/// A place package metadata and archives can be fetched from.
///
/// Implementations return `GroveError::PackageNotFound` when they do not
/// know a package, which lets the Pool fall through to the next source.
#[async_trait]
pub trait PackageSource: Send + Sync + Debug {
    /// Name used in logs and error messages
    fn name(&self) -> &str;

    /// Whether this source answers for packages with the given origin
    fn handles(&self, source: &SourceRef) -> bool;

    /// Fetch the metadata document listing every version of `name`
    async fn fetch_metadata(&self, name: &PackageName) -> RegistryResult<PackageMetadata>;

    /// Fetch the archive bytes of one candidate
    async fn fetch_archive(&self, candidate: &PackageCandidate) -> RegistryResult<Vec<u8>>;
}
