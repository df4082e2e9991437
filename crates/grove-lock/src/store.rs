//! Reading, writing and validating the lock file on disk

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info};

use grove_core::error::GroveError;
use grove_core::RootRequirements;
use grove_resolver::ResolvedGraph;

use crate::hash::content_hash;
use crate::lockfile::{LockEntry, LockFile};
use crate::LockResult;

/// Lock file name inside a project directory
pub const LOCK_FILE_NAME: &str = "grove.lock";

/// Whether a lock still matches the root requirements
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    Stale { expected: String, found: String },
}

#[derive(Debug, Clone)]
pub struct LockStore {
    path: Utf8PathBuf,
}

impl LockStore {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store for `grove.lock` in a project directory
    pub fn in_project(project_dir: &Utf8Path) -> Self {
        Self::new(project_dir.join(LOCK_FILE_NAME))
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Write the lock for a resolution of `root`
    pub fn write(&self, graph: &ResolvedGraph, root: &RootRequirements) -> LockResult<Vec<LockEntry>> {
        let lock = LockFile::from_graph(graph, content_hash(root));
        self.write_lock(&lock)?;
        Ok(lock.packages)
    }

    /// Atomically replace the lock file: write a temporary file next to it,
    /// then rename it into place
    pub fn write_lock(&self, lock: &LockFile) -> LockResult<()> {
        let content = lock.to_toml()?;

        if let Ok(existing) = std::fs::read_to_string(&self.path) {
            if existing == content {
                debug!(path = %self.path, "lock file unchanged");
                return Ok(());
            }
        }

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent.to_path_buf(),
            _ => Utf8PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)
            .map_err(|e| GroveError::io(format!("Failed to create directory {}", dir), e))?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| GroveError::io(format!("Failed to create temporary file in {}", dir), e))?;
        temp.write_all(content.as_bytes())
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|e| GroveError::io(format!("Failed to write {}", self.path), e))?;
        temp.persist(&self.path)
            .map_err(|e| GroveError::io(format!("Failed to replace {}", self.path), e.error))?;

        info!(path = %self.path, packages = lock.packages.len(), "wrote lock file");
        Ok(())
    }

    pub fn read(&self) -> LockResult<LockFile> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GroveError::LockNotFound {
                    path: self.path.to_string(),
                })
            },
            Err(e) => return Err(GroveError::io(format!("Failed to read {}", self.path), e)),
        };
        LockFile::from_toml(&content, self.path.as_str())
    }

    /// Compare the lock's content hash with the hash of `root`
    pub fn validate(lock: &LockFile, root: &RootRequirements) -> Freshness {
        let expected = content_hash(root);
        if lock.content_hash == expected {
            Freshness::Fresh
        } else {
            Freshness::Stale {
                expected,
                found: lock.content_hash.clone(),
            }
        }
    }

    /// Read the lock and fail with `LockStale` when it no longer matches
    pub fn read_fresh(&self, root: &RootRequirements) -> LockResult<LockFile> {
        let lock = self.read()?;
        match Self::validate(&lock, root) {
            Freshness::Fresh => Ok(lock),
            Freshness::Stale { expected, found } => Err(GroveError::LockStale { expected, found }),
        }
    }
}
