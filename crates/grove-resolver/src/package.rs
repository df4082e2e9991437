//! Packages as the solver sees them

use std::fmt;

use grove_core::PackageId;

/// A package the solver assigns versions to.
///
/// `Extra(p, e)` is a virtual package: selecting it at version `v` pins
/// `Package(p)` to `v` and pulls in the dependencies extra `e` enables.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SolverPackage {
    /// The project being resolved
    Root(String),
    Package(PackageId),
    Extra(PackageId, String),
}

impl SolverPackage {
    /// The real package behind this solver package
    pub fn id(&self) -> Option<&PackageId> {
        match self {
            SolverPackage::Root(_) => None,
            SolverPackage::Package(id) | SolverPackage::Extra(id, _) => Some(id),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, SolverPackage::Root(_))
    }
}

impl fmt::Display for SolverPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverPackage::Root(name) => write!(f, "{}", name),
            SolverPackage::Package(id) => write!(f, "{}", id),
            SolverPackage::Extra(id, extra) if id.source.is_registry() => {
                write!(f, "{}[{}]", id.name, extra)
            },
            SolverPackage::Extra(id, extra) => write!(f, "{}[{}] ({})", id.name, extra, id.source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let id = PackageId::registry("Requests");
        assert_eq!(SolverPackage::Root("app".to_string()).to_string(), "app");
        assert_eq!(SolverPackage::Package(id.clone()).to_string(), "requests");
        assert_eq!(
            SolverPackage::Extra(id, "socks".to_string()).to_string(),
            "requests[socks]"
        );
    }
}
