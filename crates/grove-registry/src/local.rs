//! Index stored in a local directory.
//!
//! Layout: `{root}/{name}.json` holds the metadata document of `name`;
//! archive urls inside it are paths relative to `root` (or `file://` urls).

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use grove_core::error::GroveError;
use grove_core::utils::path::local_path_from_location;
use grove_core::utils::safe_join;
use grove_core::{PackageCandidate, PackageName, SourceRef};

use crate::api::PackageMetadata;
use crate::source::PackageSource;
use crate::RegistryResult;

#[derive(Debug, Clone)]
pub struct LocalIndex {
    name: String,
    origin: SourceRef,
    root: Utf8PathBuf,
}

impl LocalIndex {
    /// Local directory standing in for the default index
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            name: "local".to_string(),
            origin: SourceRef::Registry,
            root: root.into(),
        }
    }

    /// Local directory serving a named `[[source]]` index
    pub fn named(name: &str, root: impl Into<Utf8PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            origin: SourceRef::Index {
                name: name.to_string(),
            },
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    fn archive_path(&self, location: &str) -> RegistryResult<Utf8PathBuf> {
        match local_path_from_location(location) {
            Some(path) if location.starts_with("file://") => Ok(path),
            Some(_) => safe_join(&self.root, location),
            None => Err(GroveError::source_error(
                &self.name,
                format!("'{}' is not a local archive location", location),
            )),
        }
    }
}

#[async_trait]
impl PackageSource for LocalIndex {
    fn name(&self) -> &str {
        &self.name
    }

    fn handles(&self, source: &SourceRef) -> bool {
        *source == self.origin
    }

    async fn fetch_metadata(&self, name: &PackageName) -> RegistryResult<PackageMetadata> {
        let path = safe_join(&self.root, &format!("{}.json", name))?;
        debug!(source = %self.name, %path, "reading metadata");

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GroveError::PackageNotFound {
                    name: name.to_string(),
                });
            },
            Err(e) => return Err(GroveError::io(format!("Failed to read {}", path), e)),
        };

        serde_json::from_str(&content)
            .map_err(|e| GroveError::source_error(&self.name, format!("invalid metadata in {}: {}", path, e)))
    }

    async fn fetch_archive(&self, candidate: &PackageCandidate) -> RegistryResult<Vec<u8>> {
        let location = candidate.dist.url.as_deref().ok_or_else(|| {
            GroveError::source_error(&self.name, format!("{} has no archive url", candidate))
        })?;
        let path = self.archive_path(location)?;

        tokio::fs::read(&path)
            .await
            .map_err(|e| GroveError::io(format!("Failed to read archive {}", path), e))
    }
}
