//! Safe tarball extraction
//!
//! Entry paths are validated before anything is written: absolute paths,
//! `..` components and symlinks pointing outside the destination are
//! rejected. Device files and other special entries are skipped.

use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::debug;

use grove_core::error::GroveError;

use crate::CacheResult;

/// Extract a gzipped tarball into `dest_dir`, returning the number of
/// regular files written
pub fn extract_tarball<R: Read>(reader: R, dest_dir: &Path) -> CacheResult<usize> {
    let mut archive = Archive::new(GzDecoder::new(reader));
    fs::create_dir_all(dest_dir)
        .map_err(|e| GroveError::io(format!("Failed to create {}", dest_dir.display()), e))?;

    let read_error = |e: std::io::Error| GroveError::io("Failed to read archive".to_string(), e);
    let mut files = 0;

    for entry in archive.entries().map_err(read_error)? {
        let mut entry = entry.map_err(read_error)?;
        let entry_path = entry.path().map_err(read_error)?.into_owned();
        let safe_path = validate_extract_path(&entry_path, dest_dir)?;
        let mode = entry.header().mode().ok();

        match entry.header().entry_type() {
            tar::EntryType::Regular => {
                extract_regular_file(&mut entry, &safe_path)?;
                files += 1;
            },
            tar::EntryType::Directory => {
                fs::create_dir_all(&safe_path)
                    .map_err(|e| GroveError::io(format!("Failed to create {}", safe_path.display()), e))?;
            },
            tar::EntryType::Symlink => extract_symlink(&mut entry, &safe_path, dest_dir)?,
            other => {
                debug!(path = %entry_path.display(), kind = ?other, "skipping archive entry");
                continue;
            },
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = mode.filter(|_| safe_path.is_file()) {
                let _ = fs::set_permissions(&safe_path, fs::Permissions::from_mode(mode & 0o755));
            }
        }
        #[cfg(not(unix))]
        let _ = mode;
    }

    Ok(files)
}

fn unsafe_entry(entry_path: &Path, reason: &str) -> GroveError {
    GroveError::IntegrityFailure {
        package: "archive".to_string(),
        expected: "entries inside the destination".to_string(),
        actual: format!("{}: {}", reason, entry_path.display()),
    }
}

/// Join `entry_path` to `dest_dir`, refusing anything that would escape it
fn validate_extract_path(entry_path: &Path, dest_dir: &Path) -> CacheResult<PathBuf> {
    let mut safe_path = dest_dir.to_path_buf();

    for component in entry_path.components() {
        match component {
            Component::Normal(name) => safe_path.push(name),
            Component::CurDir => {},
            Component::ParentDir => return Err(unsafe_entry(entry_path, "directory traversal")),
            Component::RootDir | Component::Prefix(_) => return Err(unsafe_entry(entry_path, "absolute path")),
        }
    }

    if !safe_path.starts_with(dest_dir) {
        return Err(unsafe_entry(entry_path, "path escapes destination"));
    }
    Ok(safe_path)
}

fn extract_regular_file<R: Read>(entry: &mut tar::Entry<R>, dest_path: &Path) -> CacheResult<()> {
    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent).map_err(|e| GroveError::io(format!("Failed to create {}", parent.display()), e))?;
    }
    let mut file = fs::File::create(dest_path)
        .map_err(|e| GroveError::io(format!("Failed to create {}", dest_path.display()), e))?;
    std::io::copy(entry, &mut file).map_err(|e| GroveError::io(format!("Failed to write {}", dest_path.display()), e))?;
    Ok(())
}

fn extract_symlink<R: Read>(entry: &mut tar::Entry<R>, dest_path: &Path, dest_dir: &Path) -> CacheResult<()> {
    let Some(target) = entry
        .link_name()
        .map_err(|e| GroveError::io("Failed to read symlink target".to_string(), e))?
    else {
        return Ok(());
    };
    let target = target.into_owned();

    if target.is_absolute() {
        return Err(unsafe_entry(dest_path, "absolute symlink target"));
    }
    // Resolve the target lexically against the link's directory
    let mut resolved = dest_path.parent().unwrap_or(dest_dir).to_path_buf();
    for component in target.components() {
        match component {
            Component::ParentDir => {
                if !resolved.pop() || !resolved.starts_with(dest_dir) {
                    return Err(unsafe_entry(dest_path, "symlink escapes destination"));
                }
            },
            Component::Normal(name) => resolved.push(name),
            _ => {},
        }
    }
    if !resolved.starts_with(dest_dir) {
        return Err(unsafe_entry(dest_path, "symlink escapes destination"));
    }

    if let Some(parent) = dest_path.parent() {
        fs::create_dir_all(parent).map_err(|e| GroveError::io(format!("Failed to create {}", parent.display()), e))?;
    }
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(&target, dest_path)
            .map_err(|e| GroveError::io(format!("Failed to create symlink {}", dest_path.display()), e))?;
    }
    #[cfg(not(unix))]
    {
        debug!(path = %dest_path.display(), "symlinks are not extracted on this platform");
    }
    Ok(())
}
