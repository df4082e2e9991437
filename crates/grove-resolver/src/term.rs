//! Terms: a statement about the versions one package may take.

use std::fmt;

use grove_core::{Version, VersionSet};

/// `Positive(s)`: the package is selected at a version in `s`.
/// `Negative(s)`: the package is either not selected or at a version
/// outside `s`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Positive(VersionSet),
    Negative(VersionSet),
}

/// How a term relates to the accumulated assignments of its package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TermRelation {
    Satisfied,
    Contradicted,
    Inconclusive,
}

impl Term {
    /// Holds for every assignment
    pub fn any() -> Self {
        Term::Negative(VersionSet::empty())
    }

    /// Holds for no assignment
    pub fn empty() -> Self {
        Term::Positive(VersionSet::empty())
    }

    pub fn exact(version: Version) -> Self {
        Term::Positive(VersionSet::singleton(version))
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, Term::Positive(_))
    }

    pub fn negate(&self) -> Self {
        match self {
            Term::Positive(set) => Term::Negative(set.clone()),
            Term::Negative(set) => Term::Positive(set.clone()),
        }
    }

    pub fn version_set(&self) -> &VersionSet {
        match self {
            Term::Positive(set) | Term::Negative(set) => set,
        }
    }

    /// Whether selecting `version` is compatible with this term
    pub fn contains(&self, version: &Version) -> bool {
        match self {
            Term::Positive(set) => set.contains(version),
            Term::Negative(set) => !set.contains(version),
        }
    }

    pub fn intersection(&self, other: &Term) -> Term {
        match (self, other) {
            (Term::Positive(a), Term::Positive(b)) => Term::Positive(a.intersection(b)),
            (Term::Positive(a), Term::Negative(b)) => Term::Positive(a.intersection(&b.complement())),
            (Term::Negative(a), Term::Positive(b)) => Term::Positive(a.complement().intersection(b)),
            (Term::Negative(a), Term::Negative(b)) => Term::Negative(a.union(b)),
        }
    }

    pub fn union(&self, other: &Term) -> Term {
        self.negate().intersection(&other.negate()).negate()
    }

    pub fn subset_of(&self, other: &Term) -> bool {
        self.intersection(other) == *self
    }

    pub fn is_disjoint(&self, other: &Term) -> bool {
        self.intersection(other) == Term::empty()
    }

    /// Relation of this incompatibility term with the intersection of all
    /// assignments made for its package
    pub(crate) fn relation_with(&self, assignments: &Term) -> TermRelation {
        let full_intersection = self.intersection(assignments);
        if full_intersection == *assignments {
            TermRelation::Satisfied
        } else if full_intersection == Term::empty() {
            TermRelation::Contradicted
        } else {
            TermRelation::Inconclusive
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Positive(set) => write!(f, "{}", set),
            Term::Negative(set) => write!(f, "not {}", set),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_any_and_empty() {
        assert!(Term::any().contains(&v("1.0.0")));
        assert!(!Term::empty().contains(&v("1.0.0")));
        assert_eq!(Term::any().negate(), Term::empty());
    }

    #[test]
    fn test_intersection_mixed_polarity() {
        let at_least_one = Term::Positive(VersionSet::higher_than(v("1.0.0")));
        let not_two = Term::Negative(VersionSet::singleton(v("2.0.0")));

        let both = at_least_one.intersection(&not_two);
        assert!(both.is_positive());
        assert!(both.contains(&v("1.5.0")));
        assert!(!both.contains(&v("2.0.0")));
        assert!(!both.contains(&v("0.5.0")));
    }

    #[test]
    fn test_relation_with() {
        let incompat_term = Term::Positive(VersionSet::between(v("1.0.0"), v("2.0.0")));

        let decided = Term::exact(v("1.5.0"));
        assert_eq!(incompat_term.relation_with(&decided), TermRelation::Satisfied);

        let elsewhere = Term::exact(v("3.0.0"));
        assert_eq!(incompat_term.relation_with(&elsewhere), TermRelation::Contradicted);

        let wide = Term::Positive(VersionSet::higher_than(v("0.1.0")));
        assert_eq!(incompat_term.relation_with(&wide), TermRelation::Inconclusive);
    }

    fn arb_set() -> impl Strategy<Value = VersionSet> {
        (0u64..5, 0u64..5, any::<bool>()).prop_map(|(a, b, flip)| {
            let (lo, hi) = if a <= b { (a, b + 1) } else { (b, a + 1) };
            let set = VersionSet::between(Version::new(lo, 0, 0), Version::new(hi, 0, 0));
            if flip {
                set.complement()
            } else {
                set
            }
        })
    }

    fn arb_term() -> impl Strategy<Value = Term> {
        (arb_set(), any::<bool>()).prop_map(|(set, positive)| {
            if positive {
                Term::Positive(set)
            } else {
                Term::Negative(set)
            }
        })
    }

    proptest! {
        #[test]
        fn prop_intersection_matches_membership(a in arb_term(), b in arb_term(), major in 0u64..7) {
            let version = Version::new(major, 0, 0);
            prop_assert_eq!(
                a.intersection(&b).contains(&version),
                a.contains(&version) && b.contains(&version)
            );
        }

        #[test]
        fn prop_intersection_is_subset(a in arb_term(), b in arb_term()) {
            prop_assert!(a.intersection(&b).subset_of(&a));
        }

        #[test]
        fn prop_double_negation(a in arb_term()) {
            prop_assert_eq!(a.negate().negate(), a);
        }
    }
}
