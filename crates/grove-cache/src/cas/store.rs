//! CAS store

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, info, warn};

use grove_core::error::GroveError;
use grove_core::utils::integrity_of;

use super::{CacheEntry, CasIndex, ContentHash};
use crate::CacheResult;

/// Content-addressable blob store rooted at a cache directory
#[derive(Debug)]
pub struct CasStore {
    root_path: Utf8PathBuf,
    index: CasIndex,
}

/// What `CasStore::clear` removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearSummary {
    pub entries_removed: usize,
    pub freed_space: u64,
}

impl CasStore {
    pub fn new(root_path: impl AsRef<Utf8Path>) -> CacheResult<Self> {
        let root_path = root_path.as_ref().to_path_buf();
        std::fs::create_dir_all(&root_path)
            .map_err(|e| GroveError::io(format!("Failed to create cache directory {}", root_path), e))?;

        let index = CasIndex::load_or_create(root_path.join("index.json"));
        Ok(Self { root_path, index })
    }

    pub fn root_path(&self) -> &Utf8Path {
        &self.root_path
    }

    /// Stored as store/ab/cd/abcd...
    fn blob_path(&self, hash: &ContentHash) -> Utf8PathBuf {
        let hex = hash.to_hex();
        self.root_path.join(&hex[0..2]).join(&hex[2..4]).join(&hex)
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.blob_path(hash).is_file()
    }

    /// Store `content` under its hash. Storing the same content twice is a
    /// no-op apart from refreshing the access time.
    pub fn store(&self, content: &[u8], label: &str) -> CacheResult<ContentHash> {
        let hash = ContentHash::of(content);
        let path = self.blob_path(&hash);

        if path.is_file() {
            if self.index.get(&hash).is_none() {
                self.index
                    .insert(CacheEntry::new(hash, integrity_of(content), label, content.len() as u64));
            }
            return Ok(hash);
        }

        let dir = path.parent().map(Utf8Path::to_path_buf).unwrap_or_else(|| self.root_path.clone());
        std::fs::create_dir_all(&dir)
            .map_err(|e| GroveError::io(format!("Failed to create cache directory {}", dir), e))?;

        // Concurrent writers of the same blob race on the rename only
        let mut temp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| GroveError::io(format!("Failed to create temporary file in {}", dir), e))?;
        temp.write_all(content)
            .map_err(|e| GroveError::io(format!("Failed to write cache blob {}", path), e))?;
        temp.persist(&path)
            .map_err(|e| GroveError::io(format!("Failed to store cache blob {}", path), e.error))?;

        self.index
            .insert(CacheEntry::new(hash, integrity_of(content), label, content.len() as u64));
        debug!(%hash, label, bytes = content.len(), "stored blob");
        Ok(hash)
    }

    /// Content of `hash`; a blob that no longer matches its hash is
    /// evicted and reported as an integrity failure
    pub fn get(&self, hash: &ContentHash) -> CacheResult<Vec<u8>> {
        let path = self.blob_path(hash);
        let content = std::fs::read(&path).map_err(|e| GroveError::io(format!("Failed to read cache blob {}", path), e))?;

        if ContentHash::of(&content) != *hash {
            warn!(%hash, "evicting corrupt cache blob");
            let _ = std::fs::remove_file(&path);
            self.index.remove(hash);
            return Err(GroveError::IntegrityFailure {
                package: path.to_string(),
                expected: hash.to_hex(),
                actual: ContentHash::of(&content).to_hex(),
            });
        }

        self.index.get(hash);
        Ok(content)
    }

    /// Cached blob matching one of the `sha256:` integrity strings
    pub fn find(&self, integrity: &[String]) -> Option<(CacheEntry, Vec<u8>)> {
        let entry = self.index.find_by_integrity(integrity)?;
        match self.get(&entry.hash) {
            Ok(content) => Some((entry, content)),
            Err(e) => {
                debug!(hash = %entry.hash, error = %e, "cache entry unusable");
                self.index.remove(&entry.hash);
                None
            },
        }
    }

    pub fn verify(&self, hash: &ContentHash) -> bool {
        self.get(hash).is_ok()
    }

    /// Index entries, sorted by label
    pub fn entries(&self) -> Vec<CacheEntry> {
        self.index.entries()
    }

    /// Remove every blob and empty the index
    pub fn clear(&self) -> CacheResult<ClearSummary> {
        let entries = self.index.entries();
        let mut freed_space = 0;
        for entry in &entries {
            let path = self.blob_path(&entry.hash);
            if let Ok(metadata) = std::fs::metadata(&path) {
                freed_space += metadata.len();
            }
            if let Err(e) = std::fs::remove_file(&path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(GroveError::io(format!("Failed to remove cache blob {}", path), e));
                }
            }
            // Prune the fan-out directories when they become empty
            if let Some(parent) = path.parent() {
                let _ = std::fs::remove_dir(parent);
                if let Some(grandparent) = parent.parent() {
                    let _ = std::fs::remove_dir(grandparent);
                }
            }
        }
        self.index.clear();
        self.index.save()?;

        let summary = ClearSummary {
            entries_removed: entries.len(),
            freed_space,
        };
        info!(entries = summary.entries_removed, bytes = freed_space, "cleared cache");
        Ok(summary)
    }

    pub fn save_index(&self) -> CacheResult<()> {
        self.index.save()
    }
}

impl ClearSummary {
    /// Freed space in human-readable form
    pub fn format_freed_space(&self) -> String {
        format_size(self.freed_space)
    }
}

/// Byte count in human-readable form: `512 B`, `1.5 KB`
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::{tempdir, TempDir};

    fn store_in(dir: &TempDir) -> CasStore {
        CasStore::new(Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap()).unwrap()
    }

    #[test]
    fn test_store_and_retrieve() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);

        let hash = store.store(b"hello world", "greeting 1.0.0").unwrap();
        assert!(store.contains(&hash));
        assert_eq!(store.get(&hash).unwrap(), b"hello world");
        assert_eq!(store.store(b"hello world", "greeting 1.0.0").unwrap(), hash);
        assert_eq!(store.entries().len(), 1);
    }

    #[test]
    fn test_find_by_sha256_integrity() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        store.store(b"archive", "a 1.0.0").unwrap();

        let (entry, content) = store.find(&[integrity_of(b"archive")]).unwrap();
        assert_eq!(entry.label, "a 1.0.0");
        assert_eq!(content, b"archive");
        assert!(store.find(&[integrity_of(b"other")]).is_none());
    }

    #[test]
    fn test_corrupt_blob_is_evicted() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        let hash = store.store(b"original", "a 1.0.0").unwrap();
        std::fs::write(store.blob_path(&hash), b"tampered").unwrap();

        assert!(matches!(store.get(&hash), Err(GroveError::IntegrityFailure { .. })));
        assert!(!store.contains(&hash));
        assert!(store.find(&[integrity_of(b"original")]).is_none());
    }

    #[test]
    fn test_clear() {
        let dir = tempdir().unwrap();
        let store = store_in(&dir);
        let first = store.store(b"content1", "a 1.0.0").unwrap();
        let second = store.store(b"content22", "b 1.0.0").unwrap();

        let summary = store.clear().unwrap();
        assert_eq!(summary.entries_removed, 2);
        assert_eq!(summary.freed_space, 17);
        assert!(!store.contains(&first));
        assert!(!store.contains(&second));
        assert!(store.entries().is_empty());
    }

    #[test]
    fn test_index_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = store_in(&dir);
            store.store(b"content", "a 1.0.0").unwrap();
            store.save_index().unwrap();
        }
        assert_eq!(store_in(&dir).entries().len(), 1);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1024 * 1024 * 1024 + 512 * 1024 * 1024), "1.5 GB");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]
        #[test]
        fn stored_content_round_trips(content in prop::collection::vec(any::<u8>(), 0..1000)) {
            let dir = tempdir().unwrap();
            let store = store_in(&dir);
            let hash = store.store(&content, "blob").unwrap();
            prop_assert_eq!(store.get(&hash).unwrap(), content);
            prop_assert!(store.verify(&hash));
        }
    }
}
