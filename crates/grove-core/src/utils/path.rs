//! Path utilities for safe file system operations.
//!
//! Index documents and package names end up as path components, so every
//! join goes through `safe_join` to keep the result inside its base.

use crate::error::{GroveError, GroveResult};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};

/// Normalize a path by resolving `.` and `..` components
pub fn normalize_path(path: &Utf8Path) -> Utf8PathBuf {
    let mut components: Vec<Utf8Component<'_>> = Vec::new();

    for component in path.components() {
        match component {
            Utf8Component::CurDir => {},
            Utf8Component::ParentDir => match components.last() {
                Some(Utf8Component::Normal(_)) => {
                    components.pop();
                },
                _ => components.push(component),
            },
            other => components.push(other),
        }
    }

    components.iter().map(|c| c.as_str()).collect()
}

/// Check that a relative path never escapes its base directory
pub fn is_safe_relative(path: &Utf8Path) -> bool {
    if path.is_absolute() {
        return false;
    }

    let mut depth = 0i32;
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {},
            Utf8Component::ParentDir => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            },
            Utf8Component::Normal(_) => depth += 1,
            _ => return false,
        }
    }

    true
}

/// Join `relative` onto `base`, rejecting traversal outside `base`
pub fn safe_join(base: &Utf8Path, relative: &str) -> GroveResult<Utf8PathBuf> {
    let relative = Utf8Path::new(relative);
    if !is_safe_relative(relative) {
        return Err(GroveError::IntegrityFailure {
            package: relative.to_string(),
            expected: format!("a path inside {}", base),
            actual: "a path escaping its base directory".to_string(),
        });
    }

    Ok(base.join(normalize_path(relative)))
}

/// Turn a `file://` URL or plain path into a filesystem path
pub fn local_path_from_location(location: &str) -> Option<Utf8PathBuf> {
    if let Some(rest) = location.strip_prefix("file://") {
        return Some(Utf8PathBuf::from(rest));
    }
    if location.contains("://") {
        return None;
    }
    Some(Utf8PathBuf::from(location))
}
