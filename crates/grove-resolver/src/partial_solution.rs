//! The partial solution: every decision and derivation made so far,
//! grouped per package and stamped with a global index and decision level.

use indexmap::IndexMap;

use grove_core::{Version, VersionSet};

use crate::incompatibility::{IncompatId, Incompatibility, Relation};
use crate::package::SolverPackage;
use crate::term::Term;

pub(crate) type DecisionLevel = u32;

#[derive(Debug, Clone)]
struct DatedDerivation {
    global_index: u32,
    decision_level: DecisionLevel,
    cause: IncompatId,
}

#[derive(Debug, Clone)]
enum AssignmentsIntersection {
    Decision { global_index: u32, version: Version, term: Term },
    Derivations(Term),
}

impl AssignmentsIntersection {
    fn term(&self) -> &Term {
        match self {
            AssignmentsIntersection::Decision { term, .. } => term,
            AssignmentsIntersection::Derivations(term) => term,
        }
    }
}

#[derive(Debug, Clone)]
struct PackageAssignments {
    smallest_decision_level: DecisionLevel,
    highest_decision_level: DecisionLevel,
    dated_derivations: Vec<DatedDerivation>,
    assignments_intersection: AssignmentsIntersection,
}

/// Where the satisfier of an incompatibility sits
#[derive(Debug, Clone, Copy)]
struct Satisfier {
    /// Index into the package's derivations; equal to their count when the
    /// satisfier is the decision
    index: usize,
    global_index: u32,
    decision_level: DecisionLevel,
}

/// Outcome of looking for the satisfier of a conflicting incompatibility
#[derive(Debug, Clone)]
pub(crate) enum SatisfierSearch {
    /// Backjump to `previous_satisfier_level`
    DifferentDecisionLevels { previous_satisfier_level: DecisionLevel },
    /// Combine the incompatibility with the satisfier's cause
    SameDecisionLevels { satisfier_cause: IncompatId },
}

fn derived_term(store: &[Incompatibility], cause: IncompatId, package: &SolverPackage) -> Term {
    store[cause].get(package).map_or_else(Term::any, Term::negate)
}

impl PackageAssignments {
    /// First assignment from which the accumulated term (starting at
    /// `start_term`) lies inside `incompat_term`
    fn satisfier(
        &self,
        package: &SolverPackage,
        incompat_term: &Term,
        start_term: Term,
        store: &[Incompatibility],
    ) -> Satisfier {
        let mut accumulated = start_term;
        for (index, dated) in self.dated_derivations.iter().enumerate() {
            accumulated = accumulated.intersection(&derived_term(store, dated.cause, package));
            if accumulated.subset_of(incompat_term) {
                return Satisfier {
                    index,
                    global_index: dated.global_index,
                    decision_level: dated.decision_level,
                };
            }
        }

        // Not among the derivations, so it is the decision
        let global_index = match &self.assignments_intersection {
            AssignmentsIntersection::Decision { global_index, .. } => *global_index,
            AssignmentsIntersection::Derivations(_) => self
                .dated_derivations
                .last()
                .map_or(0, |dated| dated.global_index),
        };
        Satisfier {
            index: self.dated_derivations.len(),
            global_index,
            decision_level: self.highest_decision_level,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct PartialSolution {
    next_global_index: u32,
    current_decision_level: DecisionLevel,
    package_assignments: IndexMap<SolverPackage, PackageAssignments>,
}

impl PartialSolution {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn decision_level(&self) -> DecisionLevel {
        self.current_decision_level
    }

    pub(crate) fn add_decision(&mut self, package: SolverPackage, version: Version) {
        self.current_decision_level += 1;
        let level = self.current_decision_level;
        let global_index = self.next_global_index;
        self.next_global_index += 1;

        let term = Term::exact(version.clone());
        let decision = AssignmentsIntersection::Decision {
            global_index,
            version,
            term,
        };
        match self.package_assignments.get_mut(&package) {
            Some(assignments) => {
                assignments.highest_decision_level = level;
                assignments.assignments_intersection = decision;
            },
            None => {
                self.package_assignments.insert(
                    package,
                    PackageAssignments {
                        smallest_decision_level: level,
                        highest_decision_level: level,
                        dated_derivations: Vec::new(),
                        assignments_intersection: decision,
                    },
                );
            },
        }
    }

    pub(crate) fn add_derivation(&mut self, package: SolverPackage, cause: IncompatId, store: &[Incompatibility]) {
        let term = derived_term(store, cause, &package);
        let dated = DatedDerivation {
            global_index: self.next_global_index,
            decision_level: self.current_decision_level,
            cause,
        };
        self.next_global_index += 1;

        match self.package_assignments.get_mut(&package) {
            Some(assignments) => {
                assignments.highest_decision_level = self.current_decision_level;
                if let AssignmentsIntersection::Derivations(accumulated) = &mut assignments.assignments_intersection {
                    *accumulated = accumulated.intersection(&term);
                }
                assignments.dated_derivations.push(dated);
            },
            None => {
                self.package_assignments.insert(
                    package,
                    PackageAssignments {
                        smallest_decision_level: self.current_decision_level,
                        highest_decision_level: self.current_decision_level,
                        dated_derivations: vec![dated],
                        assignments_intersection: AssignmentsIntersection::Derivations(term),
                    },
                );
            },
        }
    }

    /// Undecided packages required by a positive derivation, in discovery order
    pub(crate) fn potential_packages(&self) -> Vec<(SolverPackage, VersionSet)> {
        self.package_assignments
            .iter()
            .filter_map(|(package, assignments)| match &assignments.assignments_intersection {
                AssignmentsIntersection::Derivations(Term::Positive(set)) => Some((package.clone(), set.clone())),
                _ => None,
            })
            .collect()
    }

    /// The decided version of every package, once nothing is left undecided
    pub(crate) fn extract_solution(&self) -> IndexMap<SolverPackage, Version> {
        self.package_assignments
            .iter()
            .filter_map(|(package, assignments)| match &assignments.assignments_intersection {
                AssignmentsIntersection::Decision { version, .. } => Some((package.clone(), version.clone())),
                AssignmentsIntersection::Derivations(_) => None,
            })
            .collect()
    }

    pub(crate) fn decided_version(&self, package: &SolverPackage) -> Option<&Version> {
        match &self.package_assignments.get(package)?.assignments_intersection {
            AssignmentsIntersection::Decision { version, .. } => Some(version),
            AssignmentsIntersection::Derivations(_) => None,
        }
    }

    /// Drop every assignment made above `decision_level`
    pub(crate) fn backtrack(&mut self, decision_level: DecisionLevel, store: &[Incompatibility]) {
        self.current_decision_level = decision_level;
        self.package_assignments.retain(|package, assignments| {
            if assignments.smallest_decision_level > decision_level {
                return false;
            }
            if assignments.highest_decision_level <= decision_level {
                return true;
            }

            // smallest <= decision_level < highest
            while assignments
                .dated_derivations
                .last()
                .is_some_and(|dated| dated.decision_level > decision_level)
            {
                assignments.dated_derivations.pop();
            }
            assignments.highest_decision_level = assignments
                .dated_derivations
                .last()
                .map_or(assignments.smallest_decision_level, |dated| dated.decision_level);
            let accumulated = assignments
                .dated_derivations
                .iter()
                .fold(Term::any(), |acc, dated| acc.intersection(&derived_term(store, dated.cause, package)));
            assignments.assignments_intersection = AssignmentsIntersection::Derivations(accumulated);
            true
        });
    }

    /// Decide `version` unless one of the freshly added dependency
    /// incompatibilities would immediately be satisfied by it
    pub(crate) fn add_version(
        &mut self,
        package: SolverPackage,
        version: Version,
        new_incompatibilities: std::ops::Range<IncompatId>,
        store: &[Incompatibility],
    ) {
        let exact = Term::exact(version.clone());
        let satisfied = store[new_incompatibilities].iter().any(|incompat| {
            incompat.relation(|p| {
                if *p == package {
                    Some(&exact)
                } else {
                    self.term_intersection_for_package(p)
                }
            }) == Relation::Satisfied
        });
        if !satisfied {
            self.add_decision(package, version);
        }
    }

    pub(crate) fn term_intersection_for_package(&self, package: &SolverPackage) -> Option<&Term> {
        self.package_assignments
            .get(package)
            .map(|assignments| assignments.assignments_intersection.term())
    }

    pub(crate) fn relation(&self, incompat: &Incompatibility) -> Relation {
        incompat.relation(|package| self.term_intersection_for_package(package))
    }

    /// Find the package whose assignment made `incompat` satisfied, and
    /// whether conflict resolution should backjump or keep deriving
    pub(crate) fn satisfier_search(
        &self,
        incompat: &Incompatibility,
        store: &[Incompatibility],
    ) -> Option<(SolverPackage, SatisfierSearch)> {
        let mut satisfiers: IndexMap<SolverPackage, Satisfier> = IndexMap::new();
        for (package, incompat_term) in incompat.iter() {
            let assignments = self.package_assignments.get(package)?;
            satisfiers.insert(package.clone(), assignments.satisfier(package, incompat_term, Term::any(), store));
        }

        let (package, satisfier) = satisfiers
            .iter()
            .max_by_key(|(_, satisfier)| satisfier.global_index)
            .map(|(package, satisfier)| (package.clone(), *satisfier))?;

        let previous_level = self.previous_satisfier_level(incompat, &package, satisfier, satisfiers, store)?;
        if previous_level < satisfier.decision_level {
            return Some((
                package,
                SatisfierSearch::DifferentDecisionLevels {
                    previous_satisfier_level: previous_level,
                },
            ));
        }

        let assignments = self.package_assignments.get(&package)?;
        let dated = assignments.dated_derivations.get(satisfier.index)?;
        Some((
            package,
            SatisfierSearch::SameDecisionLevels {
                satisfier_cause: dated.cause,
            },
        ))
    }

    /// Decision level at which the incompatibility was satisfied before
    /// the satisfier of `package` was assigned
    fn previous_satisfier_level(
        &self,
        incompat: &Incompatibility,
        package: &SolverPackage,
        satisfier: Satisfier,
        mut satisfiers: IndexMap<SolverPackage, Satisfier>,
        store: &[Incompatibility],
    ) -> Option<DecisionLevel> {
        let assignments = self.package_assignments.get(package)?;
        let start_term = match assignments.dated_derivations.get(satisfier.index) {
            Some(dated) => derived_term(store, dated.cause, package),
            None => assignments.assignments_intersection.term().clone(),
        };

        let incompat_term = incompat.get(package)?;
        satisfiers.insert(
            package.clone(),
            assignments.satisfier(package, incompat_term, start_term, store),
        );

        let level = satisfiers
            .values()
            .max_by_key(|satisfier| satisfier.global_index)
            .map(|satisfier| satisfier.decision_level)?;
        Some(level.max(1))
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
    fn test_derivations_then_decision() {
        let root = SolverPackage::Root("app".to_string());
        let store = vec![
            Incompatibility::not_root(root.clone(), Version::new(0, 0, 0)),
            Incompatibility::from_dependency(root.clone(), Version::new(0, 0, 0), (pkg("a"), VersionSet::higher_than(v("1.0.0")))),
        ];

        let mut solution = PartialSolution::new();
        solution.add_derivation(root.clone(), 0, &store);
        solution.add_decision(root.clone(), Version::new(0, 0, 0));
        solution.add_derivation(pkg("a"), 1, &store);

        let potential = solution.potential_packages();
        assert_eq!(potential, vec![(pkg("a"), VersionSet::higher_than(v("1.0.0")))]);

        solution.add_decision(pkg("a"), v("1.2.0"));
        assert!(solution.potential_packages().is_empty());
        assert_eq!(solution.decided_version(&pkg("a")), Some(&v("1.2.0")));
        assert_eq!(solution.extract_solution().len(), 2);
        assert_eq!(solution.decision_level(), 2);
    }

    #[test]
    fn test_backtrack_drops_higher_levels() {
        let root = SolverPackage::Root("app".to_string());
        let store = vec![
            Incompatibility::not_root(root.clone(), Version::new(0, 0, 0)),
            Incompatibility::from_dependency(root.clone(), Version::new(0, 0, 0), (pkg("a"), VersionSet::full())),
        ];

        let mut solution = PartialSolution::new();
        solution.add_derivation(root.clone(), 0, &store);
        solution.add_decision(root.clone(), Version::new(0, 0, 0));
        solution.add_derivation(pkg("a"), 1, &store);
        solution.add_decision(pkg("a"), v("1.0.0"));

        solution.backtrack(1, &store);
        assert_eq!(solution.decision_level(), 1);
        assert!(solution.decided_version(&pkg("a")).is_none());
        assert_eq!(solution.potential_packages().len(), 1);
    }
}
