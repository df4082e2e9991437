//! Operations an installer run performs

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use grove_core::{PackageCandidate, PackageId, PackageName, SourceRef, Version};

/// A package present in an environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub name: PackageName,
    pub version: Version,
    #[serde(default, skip_serializing_if = "SourceRef::is_registry")]
    pub source: SourceRef,
}

impl InstalledPackage {
    pub fn new(name: &str, version: Version) -> Self {
        Self {
            name: PackageName::new(name),
            version,
            source: SourceRef::Registry,
        }
    }

    pub fn of(candidate: &PackageCandidate) -> Self {
        Self {
            name: candidate.name().clone(),
            version: candidate.version.clone(),
            source: candidate.id.source.clone(),
        }
    }

    pub fn id(&self) -> PackageId {
        PackageId::new(self.name.clone(), self.source.clone())
    }

    /// Whether `candidate` is exactly what is installed
    pub fn matches(&self, candidate: &PackageCandidate) -> bool {
        self.version == candidate.version && self.source == candidate.id.source
    }
}

impl fmt::Display for InstalledPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Install(Arc<PackageCandidate>),
    Update {
        from: InstalledPackage,
        to: Arc<PackageCandidate>,
    },
    Remove(InstalledPackage),
}

impl Operation {
    pub fn name(&self) -> &PackageName {
        match self {
            Operation::Install(target) | Operation::Update { to: target, .. } => target.name(),
            Operation::Remove(installed) => &installed.name,
        }
    }

    /// Candidate the operation installs, if any
    pub fn target(&self) -> Option<&Arc<PackageCandidate>> {
        match self {
            Operation::Install(target) | Operation::Update { to: target, .. } => Some(target),
            Operation::Remove(_) => None,
        }
    }

    pub fn is_remove(&self) -> bool {
        matches!(self, Operation::Remove(_))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Install(target) => write!(f, "install {} {}", target.name(), target.version),
            Operation::Update { from, to } => {
                write!(f, "update {} {} -> {}", to.name(), from.version, to.version)
            },
            Operation::Remove(installed) => write!(f, "remove {}", installed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, version: &str) -> Arc<PackageCandidate> {
        Arc::new(PackageCandidate::new(PackageId::registry(name), version.parse().unwrap()))
    }

    #[test]
    fn test_display() {
        let from = InstalledPackage::new("a", "1.0.0".parse().unwrap());
        assert_eq!(Operation::Install(candidate("a", "1.0.0")).to_string(), "install a 1.0.0");
        assert_eq!(
            Operation::Update {
                from: from.clone(),
                to: candidate("a", "1.1.0")
            }
            .to_string(),
            "update a 1.0.0 -> 1.1.0"
        );
        assert_eq!(Operation::Remove(from).to_string(), "remove a 1.0.0");
    }

    #[test]
    fn test_matches_compares_version_and_origin() {
        let installed = InstalledPackage::new("a", "1.0.0".parse().unwrap());
        assert!(installed.matches(&candidate("a", "1.0.0")));
        assert!(!installed.matches(&candidate("a", "1.0.1")));

        let local = PackageCandidate::new(
            PackageId::new(
                PackageName::new("a"),
                SourceRef::Path {
                    path: "../a".to_string(),
                },
            ),
            "1.0.0".parse().unwrap(),
        );
        assert!(!installed.matches(&local));
    }

    #[test]
    fn test_record_omits_registry_source() {
        let installed = InstalledPackage::new("Foo_Bar", "2.0.0".parse().unwrap());
        let json = serde_json::to_string(&installed).unwrap();
        assert_eq!(json, r#"{"name":"foo-bar","version":"2.0.0"}"#);
    }
}
