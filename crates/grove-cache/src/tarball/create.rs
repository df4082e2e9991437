//! Tarball creation
//!
//! Archives are reproducible: entries carry a zero mtime and fixed modes.

use flate2::write::GzEncoder;
use flate2::Compression;
use tar::{Builder, Header};

use grove_core::error::GroveError;

use crate::CacheResult;

fn write_error(e: std::io::Error) -> GroveError {
    GroveError::io("Failed to write archive".to_string(), e)
}

/// Gzipped tarball of in-memory files, in the order given
pub fn pack_files(files: &[(&str, &[u8])]) -> CacheResult<Vec<u8>> {
    let mut buffer = Vec::new();
    {
        let mut builder = Builder::new(GzEncoder::new(&mut buffer, Compression::default()));
        for (path, content) in files {
            let mut header = Header::new_gnu();
            header.set_mtime(0);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(content.len() as u64);
            builder.append_data(&mut header, path, *content).map_err(write_error)?;
        }
        builder.into_inner().and_then(|gz| gz.finish()).map_err(write_error)?;
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tarball::extract::extract_tarball;
    use proptest::prelude::*;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_nested_paths_round_trip() {
        let bytes = pack_files(&[("pkg/__init__.py", b"x = 1"), ("pkg/sub/mod.py", b"y = 2")]).unwrap();

        let dir = tempdir().unwrap();
        assert_eq!(extract_tarball(bytes.as_slice(), dir.path()).unwrap(), 2);
        assert_eq!(fs::read_to_string(dir.path().join("pkg/sub/mod.py")).unwrap(), "y = 2");
    }

    #[test]
    fn test_archives_are_reproducible() {
        let files: [(&str, &[u8]); 2] = [("a.txt", b"a"), ("b.txt", b"b")];
        assert_eq!(pack_files(&files).unwrap(), pack_files(&files).unwrap());
    }

    #[test]
    fn test_empty_archive() {
        let bytes = pack_files(&[]).unwrap();
        assert!(!bytes.is_empty());
        let dir = tempdir().unwrap();
        assert_eq!(extract_tarball(bytes.as_slice(), dir.path()).unwrap(), 0);
    }

    fn file_tree() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
        prop::collection::btree_map(
            "[a-z0-9_]{1,8}(/[a-z0-9_]{1,8}){0,2}\\.[a-z]{1,3}",
            prop::collection::vec(any::<u8>(), 0..256),
            0..8,
        )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]
        #[test]
        fn packed_files_extract_unchanged(files in file_tree()) {
            let entries: Vec<(&str, &[u8])> = files.iter().map(|(p, c)| (p.as_str(), c.as_slice())).collect();
            let bytes = pack_files(&entries).unwrap();

            let dir = tempdir().unwrap();
            extract_tarball(bytes.as_slice(), dir.path()).unwrap();
            for (path, content) in &files {
                prop_assert_eq!(&fs::read(dir.path().join(path)).unwrap(), content);
            }
        }
    }
}
