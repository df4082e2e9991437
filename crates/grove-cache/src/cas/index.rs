//! Cache index: metadata for every stored blob

use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use grove_core::error::GroveError;

use super::ContentHash;
use crate::CacheResult;

/// Metadata for a cached blob
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: ContentHash,
    /// `sha256:<hex>` of the blob, matched against lock file hashes
    pub integrity: String,
    /// What the blob is, e.g. `requests 2.31.0`
    pub label: String,
    pub size: u64,
    pub stored_at: i64,
    pub last_accessed: i64,
}

impl CacheEntry {
    pub fn new(hash: ContentHash, integrity: String, label: impl Into<String>, size: u64) -> Self {
        let now = Utc::now().timestamp();
        Self {
            hash,
            integrity,
            label: label.into(),
            size,
            stored_at: now,
            last_accessed: now,
        }
    }

    pub fn touch(&mut self) {
        self.last_accessed = Utc::now().timestamp();
    }
}

/// In-memory index persisted as `index.json`
#[derive(Debug)]
pub struct CasIndex {
    entries: DashMap<ContentHash, CacheEntry>,
    index_path: Utf8PathBuf,
}

impl CasIndex {
    /// Load the index, starting empty when it is missing or unreadable
    pub fn load_or_create(index_path: impl Into<Utf8PathBuf>) -> Self {
        let index_path = index_path.into();
        let entries = DashMap::new();

        if let Ok(content) = std::fs::read_to_string(&index_path) {
            match serde_json::from_str::<Vec<CacheEntry>>(&content) {
                Ok(loaded) => {
                    for entry in loaded {
                        entries.insert(entry.hash, entry);
                    }
                },
                Err(e) => warn!(path = %index_path, error = %e, "ignoring unreadable cache index"),
            }
        }

        Self { entries, index_path }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.index_path
    }

    pub fn insert(&self, entry: CacheEntry) {
        self.entries.insert(entry.hash, entry);
    }

    /// Entry for `hash`, marking it as accessed
    pub fn get(&self, hash: &ContentHash) -> Option<CacheEntry> {
        let mut entry = self.entries.get_mut(hash)?;
        entry.touch();
        Some(entry.clone())
    }

    /// First entry whose integrity string is in `integrity`
    pub fn find_by_integrity(&self, integrity: &[String]) -> Option<CacheEntry> {
        let hash = self
            .entries
            .iter()
            .find(|entry| integrity.iter().any(|i| i.eq_ignore_ascii_case(&entry.integrity)))
            .map(|entry| entry.hash)?;
        self.get(&hash)
    }

    pub fn remove(&self, hash: &ContentHash) -> Option<CacheEntry> {
        self.entries.remove(hash).map(|(_, entry)| entry)
    }

    /// All entries, sorted by label then hash
    pub fn entries(&self) -> Vec<CacheEntry> {
        let mut entries: Vec<CacheEntry> = self.entries.iter().map(|entry| entry.value().clone()).collect();
        entries.sort_by(|a, b| (&a.label, a.hash).cmp(&(&b.label, b.hash)));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Write the index next to the blobs, replacing the old file atomically
    pub fn save(&self) -> CacheResult<()> {
        let content = serde_json::to_string_pretty(&self.entries()).map_err(|e| GroveError::JsonParse {
            message: format!("cannot serialize cache index: {}", e),
        })?;

        let dir = self
            .index_path
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| Utf8PathBuf::from("."));
        std::fs::create_dir_all(&dir)
            .map_err(|e| GroveError::io(format!("Failed to create cache directory {}", dir), e))?;

        let mut temp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| GroveError::io(format!("Failed to create temporary file in {}", dir), e))?;
        temp.write_all(content.as_bytes())
            .map_err(|e| GroveError::io(format!("Failed to write {}", self.index_path), e))?;
        temp.persist(&self.index_path)
            .map_err(|e| GroveError::io(format!("Failed to replace {}", self.index_path), e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(content: &[u8], label: &str) -> CacheEntry {
        CacheEntry::new(
            ContentHash::of(content),
            grove_core::utils::integrity_of(content),
            label,
            content.len() as u64,
        )
    }

    fn index_in(dir: &tempfile::TempDir) -> CasIndex {
        let path = Utf8PathBuf::from_path_buf(dir.path().join("index.json")).unwrap();
        CasIndex::load_or_create(path)
    }

    #[test]
    fn test_insert_and_find_by_integrity() {
        let dir = tempdir().unwrap();
        let index = index_in(&dir);
        let stored = entry(b"archive bytes", "a 1.0.0");
        index.insert(stored.clone());

        let found = index.find_by_integrity(&[stored.integrity.to_uppercase().replace("SHA256", "sha256")]);
        assert_eq!(found.map(|e| e.hash), Some(stored.hash));
        assert!(index.find_by_integrity(&["sha256:00".to_string()]).is_none());
    }

    #[test]
    fn test_persistence() {
        let dir = tempdir().unwrap();
        {
            let index = index_in(&dir);
            index.insert(entry(b"b", "b 1.0.0"));
            index.insert(entry(b"a", "a 1.0.0"));
            index.save().unwrap();
        }

        let index = index_in(&dir);
        let labels: Vec<String> = index.entries().into_iter().map(|e| e.label).collect();
        assert_eq!(labels, vec!["a 1.0.0", "b 1.0.0"]);
    }

    #[test]
    fn test_corrupt_index_starts_empty() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("index.json"), "{ not json").unwrap();
        assert!(index_in(&dir).is_empty());
    }
}
