//! Requirements-style export of a lock file

use std::fmt::Write;

use grove_core::SourceRef;

use crate::lockfile::{LockEntry, LockFile};

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Append `--hash=` options for every recorded hash
    pub with_hashes: bool,
    /// Include packages only needed for development
    pub with_dev: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            with_hashes: true,
            with_dev: false,
        }
    }
}

/// Render `lock` as one requirement per line, sorted by name
pub fn requirements(lock: &LockFile, options: &ExportOptions) -> String {
    let mut entries: Vec<&LockEntry> = lock
        .packages
        .iter()
        .filter(|entry| options.with_dev || entry.category.is_runtime())
        .collect();
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let mut out = String::new();
    for entry in entries {
        out.push_str(&requirement_line(entry));
        if options.with_hashes {
            for hash in &entry.hashes {
                // `sha256:abc` is written as `--hash=sha256:abc`
                let _ = write!(out, " \\\n    --hash={}", hash);
            }
        }
        out.push('\n');
    }
    out
}

fn requirement_line(entry: &LockEntry) -> String {
    let name = if entry.extras.is_empty() {
        entry.name.to_string()
    } else {
        let extras: Vec<&str> = entry.extras.iter().map(String::as_str).collect();
        format!("{}[{}]", entry.name, extras.join(","))
    };

    match &entry.source {
        SourceRef::Registry | SourceRef::Index { .. } => format!("{}=={}", name, entry.version),
        SourceRef::Url { url } => format!("{} @ {}", name, url),
        SourceRef::Path { path } => format!("{} @ file://{}", name, path),
        SourceRef::Git { url, rev: Some(rev) } => format!("{} @ git+{}@{}", name, url, rev),
        SourceRef::Git { url, rev: None } => format!("{} @ git+{}", name, url),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::{DependencyKind, PackageName};
    use std::collections::{BTreeMap, BTreeSet};

    fn entry(name: &str, version: &str, category: DependencyKind) -> LockEntry {
        LockEntry {
            name: PackageName::new(name),
            version: version.parse().unwrap(),
            source: SourceRef::Registry,
            url: None,
            hashes: vec![format!("sha256:{}", "ab".repeat(32))],
            extras: BTreeSet::new(),
            category,
            dependencies: BTreeMap::new(),
        }
    }

    fn lock() -> LockFile {
        let mut web = entry("web", "1.2.0", DependencyKind::Main);
        web.extras.insert("tls".to_string());
        let mut local = entry("local", "0.1.0", DependencyKind::Main);
        local.source = SourceRef::Path {
            path: "/src/local".to_string(),
        };
        local.hashes.clear();

        LockFile {
            version: crate::LOCK_FORMAT_VERSION.to_string(),
            content_hash: "sha256:00".to_string(),
            packages: vec![web, entry("pytest", "7.4.0", DependencyKind::Dev), local],
        }
    }

    #[test]
    fn test_export_with_hashes() {
        let text = requirements(&lock(), &ExportOptions::default());
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "local @ file:///src/local");
        assert_eq!(lines[1], "web[tls]==1.2.0 \\");
        assert!(lines[2].trim_start().starts_with("--hash=sha256:abab"));
        assert!(!text.contains("pytest"));
    }

    #[test]
    fn test_export_without_hashes_with_dev() {
        let options = ExportOptions {
            with_hashes: false,
            with_dev: true,
        };
        let text = requirements(&lock(), &options);
        assert_eq!(text, "local @ file:///src/local\npytest==7.4.0\nweb[tls]==1.2.0\n");
    }
}
