//! Incompatibilities: sets of terms that must never all hold together.

use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;

use grove_core::{Version, VersionSet};

use crate::package::SolverPackage;
use crate::report::{DerivationTree, Derived, External};
use crate::term::{Term, TermRelation};

/// Index of an incompatibility in the solver's store
pub type IncompatId = usize;

/// Why an incompatibility exists
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Kind {
    /// The root package must be selected at its own version
    NotRoot(SolverPackage, Version),
    /// No candidate of the package lies in the set
    NoVersions(SolverPackage, VersionSet),
    /// The package could not be queried or its metadata is unusable
    Unavailable(SolverPackage, VersionSet, String),
    /// The first package at the first set depends on the second package
    /// at the second set
    FromDependency(SolverPackage, VersionSet, SolverPackage, VersionSet),
    /// Two origins of the same package name cannot both be selected
    SourceConflict(SolverPackage, SolverPackage),
    /// Learned from two earlier incompatibilities
    DerivedFrom(IncompatId, IncompatId),
}

/// Relation between an incompatibility and the partial solution
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Relation {
    /// Every term holds: the partial solution violates the incompatibility
    Satisfied,
    /// Some term is impossible, so the incompatibility cannot bite
    Contradicted(SolverPackage),
    /// All terms hold except the term for this package, which is undecided
    AlmostSatisfied(SolverPackage),
    Inconclusive,
}

#[derive(Debug, Clone)]
pub struct Incompatibility {
    package_terms: IndexMap<SolverPackage, Term>,
    kind: Kind,
}

impl Incompatibility {
    pub fn not_root(package: SolverPackage, version: Version) -> Self {
        let mut package_terms = IndexMap::new();
        package_terms.insert(package.clone(), Term::Negative(VersionSet::singleton(version.clone())));
        Self {
            package_terms,
            kind: Kind::NotRoot(package, version),
        }
    }

    /// No version in `term` exists. `term` is expected to be positive.
    pub fn no_versions(package: SolverPackage, term: Term) -> Self {
        let set = term.version_set().clone();
        let mut package_terms = IndexMap::new();
        package_terms.insert(package.clone(), term);
        Self {
            package_terms,
            kind: Kind::NoVersions(package, set),
        }
    }

    pub fn unavailable(package: SolverPackage, versions: VersionSet, reason: String) -> Self {
        let mut package_terms = IndexMap::new();
        package_terms.insert(package.clone(), Term::Positive(versions.clone()));
        Self {
            package_terms,
            kind: Kind::Unavailable(package, versions, reason),
        }
    }

    pub fn from_dependency(
        package: SolverPackage,
        version: Version,
        dependency: (SolverPackage, VersionSet),
    ) -> Self {
        let versions = VersionSet::singleton(version);
        let (dep_package, dep_versions) = dependency;
        let mut package_terms = IndexMap::new();
        package_terms.insert(package.clone(), Term::Positive(versions.clone()));
        package_terms.insert(dep_package.clone(), Term::Negative(dep_versions.clone()));
        Self {
            package_terms,
            kind: Kind::FromDependency(package, versions, dep_package, dep_versions),
        }
    }

    pub fn source_conflict(first: SolverPackage, second: SolverPackage) -> Self {
        let mut package_terms = IndexMap::new();
        package_terms.insert(first.clone(), Term::Positive(VersionSet::full()));
        package_terms.insert(second.clone(), Term::Positive(VersionSet::full()));
        Self {
            package_terms,
            kind: Kind::SourceConflict(first, second),
        }
    }

    /// Learn a new incompatibility from `incompat` and the cause of the
    /// satisfier of `package`.
    pub fn prior_cause(
        incompat: IncompatId,
        satisfier_cause: IncompatId,
        package: &SolverPackage,
        store: &[Incompatibility],
    ) -> Self {
        let mut package_terms = store[incompat].package_terms.clone();
        let first = package_terms.shift_remove(package).unwrap_or_else(Term::empty);

        let satisfier_terms = &store[satisfier_cause].package_terms;
        for (other, term) in satisfier_terms.iter().filter(|(p, _)| *p != package) {
            match package_terms.get_mut(other) {
                Some(existing) => *existing = existing.intersection(term),
                None => {
                    package_terms.insert(other.clone(), term.clone());
                },
            }
        }

        let second = satisfier_terms.get(package).cloned().unwrap_or_else(Term::empty);
        let term = first.union(&second);
        if term != Term::any() {
            package_terms.insert(package.clone(), term);
        }

        Self {
            package_terms,
            kind: Kind::DerivedFrom(incompat, satisfier_cause),
        }
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn get(&self, package: &SolverPackage) -> Option<&Term> {
        self.package_terms.get(package)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SolverPackage, &Term)> {
        self.package_terms.iter()
    }

    pub fn len(&self) -> usize {
        self.package_terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.package_terms.is_empty()
    }

    /// An incompatibility that rules out the root itself ends the search
    pub fn is_terminal(&self, root: &SolverPackage, root_version: &Version) -> bool {
        match self.package_terms.len() {
            0 => true,
            1 => self
                .package_terms
                .iter()
                .next()
                .is_some_and(|(package, term)| package == root && term.contains(root_version)),
            _ => false,
        }
    }

    pub fn causes(&self) -> Option<(IncompatId, IncompatId)> {
        match self.kind {
            Kind::DerivedFrom(first, second) => Some((first, second)),
            _ => None,
        }
    }

    /// Relation with the partial solution, given per-package accumulated terms
    pub(crate) fn relation<'a>(&self, assignments: impl Fn(&SolverPackage) -> Option<&'a Term>) -> Relation {
        let mut relation = Relation::Satisfied;
        for (package, incompat_term) in &self.package_terms {
            match assignments(package).map(|term| incompat_term.relation_with(term)) {
                Some(TermRelation::Satisfied) => {},
                Some(TermRelation::Contradicted) => return Relation::Contradicted(package.clone()),
                None | Some(TermRelation::Inconclusive) => {
                    if let Relation::AlmostSatisfied(_) = relation {
                        return Relation::Inconclusive;
                    }
                    relation = Relation::AlmostSatisfied(package.clone());
                },
            }
        }
        relation
    }

    /// Build the derivation tree rooted at `id`
    pub(crate) fn build_derivation_tree(
        id: IncompatId,
        shared_ids: &HashSet<IncompatId>,
        store: &[Incompatibility],
    ) -> DerivationTree {
        let incompat = &store[id];
        match &incompat.kind {
            Kind::DerivedFrom(first, second) => DerivationTree::Derived(Derived {
                terms: incompat.package_terms.clone(),
                shared_id: shared_ids.contains(&id).then_some(id),
                cause1: Box::new(Self::build_derivation_tree(*first, shared_ids, store)),
                cause2: Box::new(Self::build_derivation_tree(*second, shared_ids, store)),
            }),
            Kind::NotRoot(package, version) => {
                DerivationTree::External(External::NotRoot(package.clone(), version.clone()))
            },
            Kind::NoVersions(package, set) => {
                DerivationTree::External(External::NoVersions(package.clone(), set.clone()))
            },
            Kind::Unavailable(package, set, reason) => DerivationTree::External(External::Unavailable(
                package.clone(),
                set.clone(),
                reason.clone(),
            )),
            Kind::FromDependency(package, set, dep, dep_set) => DerivationTree::External(
                External::FromDependencyOf(package.clone(), set.clone(), dep.clone(), dep_set.clone()),
            ),
            Kind::SourceConflict(first, second) => {
                DerivationTree::External(External::SourceConflict(first.clone(), second.clone()))
            },
        }
    }
}

impl fmt::Display for Incompatibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self
            .package_terms
            .iter()
            .map(|(package, term)| format!("{} {}", package, term))
            .collect();
        write!(f, "{{{}}}", terms.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::PackageId;

    fn pkg(name: &str) -> SolverPackage {
        SolverPackage::Package(PackageId::registry(name))
    }

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_from_dependency_terms() {
        let incompat = Incompatibility::from_dependency(
            pkg("a"),
            v("1.0.0"),
            (pkg("b"), VersionSet::higher_than(v("2.0.0"))),
        );
        assert_eq!(incompat.len(), 2);
        assert_eq!(incompat.get(&pkg("a")), Some(&Term::exact(v("1.0.0"))));
        assert!(!incompat.get(&pkg("b")).unwrap().is_positive());
    }

    #[test]
    fn test_terminal_detection() {
        let root = SolverPackage::Root("app".to_string());
        let root_version = Version::new(0, 0, 0);

        let not_root = Incompatibility::not_root(root.clone(), root_version.clone());
        assert!(!not_root.is_terminal(&root, &root_version));

        let forbidden = Incompatibility::no_versions(root.clone(), Term::exact(root_version.clone()));
        assert!(forbidden.is_terminal(&root, &root_version));
    }

    #[test]
    fn test_relation_almost_satisfied() {
        let incompat = Incompatibility::from_dependency(
            pkg("a"),
            v("1.0.0"),
            (pkg("b"), VersionSet::higher_than(v("2.0.0"))),
        );
        let decided_a = Term::exact(v("1.0.0"));
        let relation = incompat.relation(|p| if *p == pkg("a") { Some(&decided_a) } else { None });
        assert_eq!(relation, Relation::AlmostSatisfied(pkg("b")));
    }

    #[test]
    fn test_prior_cause_resolves_shared_package() {
        // {a 1.0.0, not b >=2} and {b >=2} resolved on b
        let store = vec![
            Incompatibility::from_dependency(pkg("a"), v("1.0.0"), (pkg("b"), VersionSet::higher_than(v("2.0.0")))),
            Incompatibility::no_versions(pkg("b"), Term::Positive(VersionSet::higher_than(v("2.0.0")))),
        ];
        let learned = Incompatibility::prior_cause(0, 1, &pkg("b"), &store);

        // not b>=2 union b>=2 is any, so only a remains
        assert_eq!(learned.len(), 1);
        assert_eq!(learned.get(&pkg("a")), Some(&Term::exact(v("1.0.0"))));
        assert_eq!(learned.causes(), Some((0, 1)));
    }
}
