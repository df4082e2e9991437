//! Package identity and candidate types.
//!
//! A `PackageId` is a normalized name plus the origin it is fetched from.
//! A `PackageCandidate` is one concrete version of a package together with
//! the dependencies and distribution metadata that version declares.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

use super::dependency::Dependency;
use super::version::Version;

/// Normalized package name: lowercase, with runs of `-`, `_` and `.`
/// collapsed into a single `-`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageName(String);

impl PackageName {
    pub fn new(raw: &str) -> Self {
        let mut normalized = String::with_capacity(raw.len());
        let mut last_was_separator = false;
        for c in raw.trim().chars() {
            if matches!(c, '-' | '_' | '.') {
                if !last_was_separator {
                    normalized.push('-');
                }
                last_was_separator = true;
            } else {
                normalized.extend(c.to_lowercase());
                last_was_separator = false;
            }
        }
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if a raw name is acceptable as a package name
    pub fn is_valid(raw: &str) -> bool {
        let raw = raw.trim();
        !raw.is_empty()
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && raw.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
            && raw.chars().last().is_some_and(|c| c.is_ascii_alphanumeric())
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PackageName {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl Serialize for PackageName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for PackageName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::new(&raw))
    }
}

/// Where a package is fetched from
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceRef {
    /// The default package index
    Registry,
    /// A named index declared in the project manifest
    Index { name: String },
    /// A direct archive URL
    Url { url: String },
    /// A local directory or archive
    Path { path: String },
    /// A version control repository
    Git { url: String, rev: Option<String> },
}

impl SourceRef {
    pub fn is_registry(&self) -> bool {
        matches!(self, SourceRef::Registry)
    }
}

impl Default for SourceRef {
    fn default() -> Self {
        SourceRef::Registry
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRef::Registry => write!(f, "registry"),
            SourceRef::Index { name } => write!(f, "index {}", name),
            SourceRef::Url { url } => write!(f, "url {}", url),
            SourceRef::Path { path } => write!(f, "path {}", path),
            SourceRef::Git { url, rev: Some(rev) } => write!(f, "git {}@{}", url, rev),
            SourceRef::Git { url, rev: None } => write!(f, "git {}", url),
        }
    }
}

/// Package identity: normalized name plus origin
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageId {
    pub name: PackageName,
    #[serde(default)]
    pub source: SourceRef,
}

impl PackageId {
    /// A package from the default index
    pub fn registry(name: &str) -> Self {
        Self {
            name: PackageName::new(name),
            source: SourceRef::Registry,
        }
    }

    pub fn new(name: PackageName, source: SourceRef) -> Self {
        Self { name, source }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source.is_registry() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} ({})", self.name, self.source)
        }
    }
}

/// Archive location and integrity hashes of a candidate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Distribution {
    pub url: Option<String>,
    #[serde(default)]
    pub hashes: Vec<String>,
}

/// One concrete version of a package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageCandidate {
    pub id: PackageId,
    pub version: Version,
    pub dependencies: Vec<Dependency>,
    /// Extra name to the optional dependencies it enables
    pub extras: BTreeMap<String, Vec<PackageName>>,
    pub dist: Distribution,
    pub yanked: bool,
}

impl PackageCandidate {
    pub fn new(id: PackageId, version: Version) -> Self {
        Self {
            id,
            version,
            dependencies: Vec::new(),
            extras: BTreeMap::new(),
            dist: Distribution::default(),
            yanked: false,
        }
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_dist(mut self, dist: Distribution) -> Self {
        self.dist = dist;
        self
    }

    pub fn name(&self) -> &PackageName {
        &self.id.name
    }

    pub fn is_prerelease(&self) -> bool {
        self.version.is_prerelease()
    }
}

impl fmt::Display for PackageCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}
