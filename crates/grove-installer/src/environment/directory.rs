//! Directory-backed environment
//!
//! Layout under the environment root:
//!
//! ```text
//! packages/<name>/        unpacked package tree
//! installed/<name>.json   install record
//! .staging/               scratch space for unpacking
//! ```
//!
//! Archives are fetched through the Pool (with its retry policy), checked
//! against the recorded `sha256:` hashes and kept in the artifact cache.
//! A package tree is unpacked into staging and renamed into place, so a
//! failed install never leaves a half-written tree behind.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use grove_cache::{extract_tarball, CasStore};
use grove_core::PackageCandidate;
use grove_registry::Pool;

use super::{EnvironmentHandle, EnvironmentProvider, OperationError, OperationErrorKind, Snapshot};
use crate::operation::{InstalledPackage, Operation};

const PACKAGES_DIR: &str = "packages";
const INSTALLED_DIR: &str = "installed";
const STAGING_DIR: &str = ".staging";

/// Contents of `installed/<name>.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
    #[serde(flatten)]
    pub package: InstalledPackage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    pub files: usize,
}

pub struct DirectoryEnvironment {
    root: Utf8PathBuf,
    pool: Arc<Pool>,
    cache: Option<Arc<CasStore>>,
}

impl DirectoryEnvironment {
    pub fn new(root: impl Into<Utf8PathBuf>, pool: Arc<Pool>) -> Self {
        Self {
            root: root.into(),
            pool,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<CasStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Archive bytes of `candidate`, from the cache when possible
    async fn fetch(&self, candidate: &PackageCandidate) -> Result<Vec<u8>, OperationError> {
        if let (Some(cache), false) = (&self.cache, candidate.dist.hashes.is_empty()) {
            let cache = cache.clone();
            let hashes = candidate.dist.hashes.clone();
            if let Ok(Some((entry, bytes))) = tokio::task::spawn_blocking(move || cache.find(&hashes)).await {
                debug!(package = %candidate, hash = %entry.hash, "using cached archive");
                return Ok(bytes);
            }
        }

        if candidate.dist.hashes.is_empty() {
            warn!(package = %candidate, "no integrity hash recorded; archive is not verified");
        }
        let bytes = self
            .pool
            .fetch_archive(candidate)
            .await
            .map_err(|e| OperationError::from_grove(OperationErrorKind::Download, &e))?;

        if let Some(cache) = &self.cache {
            let cache = cache.clone();
            let label = candidate.to_string();
            let blob = bytes.clone();
            let stored = tokio::task::spawn_blocking(move || {
                cache.store(&blob, &label)?;
                cache.save_index()
            })
            .await;
            if let Ok(Err(e)) = stored {
                warn!(package = %candidate, error = %e, "could not cache archive");
            }
        }
        Ok(bytes)
    }
}

#[async_trait]
impl EnvironmentProvider for DirectoryEnvironment {
    async fn locate(&self) -> Result<EnvironmentHandle, OperationError> {
        if self.root.exists() && !self.root.is_dir() {
            return Err(OperationError::unavailable(format!("{} is not a directory", self.root)));
        }
        for dir in [PACKAGES_DIR, INSTALLED_DIR, STAGING_DIR] {
            let path = self.root.join(dir);
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| OperationError::unavailable(format!("cannot create {}: {}", path, e)))?;
        }
        debug!(root = %self.root, "located environment");
        Ok(EnvironmentHandle {
            root: self.root.clone(),
        })
    }

    async fn installed_snapshot(&self, handle: &EnvironmentHandle) -> Result<Snapshot, OperationError> {
        let dir = handle.root.join(INSTALLED_DIR);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| OperationError::unavailable(format!("cannot read {}: {}", dir, e)))?;

        let mut snapshot = Snapshot::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| OperationError::unavailable(format!("cannot read {}: {}", dir, e)))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unreadable install record");
                    continue;
                },
            };
            match serde_json::from_str::<InstallRecord>(&content) {
                Ok(record) => {
                    snapshot.insert(record.package.name.clone(), record.package);
                },
                Err(e) => warn!(path = %path.display(), error = %e, "skipping corrupt install record"),
            }
        }
        Ok(snapshot)
    }

    async fn execute_operation(&self, handle: &EnvironmentHandle, operation: &Operation) -> Result<(), OperationError> {
        let root = handle.root.clone();
        if !root.join(PACKAGES_DIR).is_dir() {
            return Err(OperationError::unavailable(format!("{} has disappeared", root)));
        }

        let result = match operation {
            Operation::Install(target) | Operation::Update { to: target, .. } => {
                let bytes = self.fetch(target).await?;
                let record = InstallRecord {
                    package: InstalledPackage::of(target),
                    integrity: target.dist.hashes.first().cloned(),
                    files: 0,
                };
                tokio::task::spawn_blocking(move || place(&root, record, &bytes)).await
            },
            Operation::Remove(installed) => {
                let name = installed.name.to_string();
                tokio::task::spawn_blocking(move || remove(&root, &name)).await
            },
        };

        result.map_err(|e| OperationError::new(OperationErrorKind::Install, format!("worker failed: {}", e)))??;
        info!(operation = %operation, "done");
        Ok(())
    }
}

fn install_error(message: String) -> OperationError {
    OperationError::new(OperationErrorKind::Install, message)
}

/// Unpack into staging, swap the tree into place, then write the record
fn place(root: &Utf8Path, mut record: InstallRecord, bytes: &[u8]) -> Result<(), OperationError> {
    let name = record.package.name.to_string();
    let staging = tempfile::Builder::new()
        .prefix(&format!("{}-", name))
        .tempdir_in(root.join(STAGING_DIR))
        .map_err(|e| install_error(format!("cannot create staging directory: {}", e)))?;

    let tree = staging.path().join("tree");
    record.files = extract_tarball(bytes, &tree).map_err(|e| OperationError::from_grove(OperationErrorKind::Build, &e))?;

    let dest = root.join(PACKAGES_DIR).join(&name);
    swap_tree(&tree, dest.as_std_path(), &staging.path().join("previous"))?;

    write_record(root, &name, &record)
}

/// Move `tree` to `dest`, parking any existing tree at `backup`.
/// The existing tree is put back when the move fails.
fn swap_tree(tree: &Path, dest: &Path, backup: &Path) -> Result<(), OperationError> {
    let had_previous = dest.exists();
    if had_previous {
        std::fs::rename(dest, backup)
            .map_err(|e| install_error(format!("cannot move {} aside: {}", dest.display(), e)))?;
    }
    if let Err(e) = std::fs::rename(tree, dest) {
        if had_previous {
            if let Err(restore) = std::fs::rename(backup, dest) {
                warn!(path = %dest.display(), error = %restore, "cannot restore previous install");
            }
        }
        return Err(install_error(format!("cannot move package into {}: {}", dest.display(), e)));
    }
    Ok(())
}

fn write_record(root: &Utf8Path, name: &str, record: &InstallRecord) -> Result<(), OperationError> {
    let dir = root.join(INSTALLED_DIR);
    let content =
        serde_json::to_string_pretty(record).map_err(|e| install_error(format!("cannot encode install record: {}", e)))?;
    let mut temp =
        tempfile::NamedTempFile::new_in(&dir).map_err(|e| install_error(format!("cannot write to {}: {}", dir, e)))?;
    temp.write_all(content.as_bytes())
        .map_err(|e| install_error(format!("cannot write install record: {}", e)))?;
    temp.persist(dir.join(format!("{}.json", name)))
        .map_err(|e| install_error(format!("cannot write install record: {}", e.error)))?;
    Ok(())
}

fn remove(root: &Utf8Path, name: &str) -> Result<(), OperationError> {
    let tree = root.join(PACKAGES_DIR).join(name);
    match std::fs::remove_dir_all(&tree) {
        Ok(()) => {},
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => return Err(install_error(format!("cannot remove {}: {}", tree, e))),
    }
    let record = root.join(INSTALLED_DIR).join(format!("{}.json", name));
    match std::fs::remove_file(&record) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(install_error(format!("cannot remove {}: {}", record, e))),
    }
}

#[cfg(test)]
mod tests;
