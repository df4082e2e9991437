//! Sets of versions as unions of disjoint intervals.
//!
//! A `VersionSet` is kept normalized: intervals are sorted, non-empty and
//! never touch, so two equal sets always share one representation and
//! structural equality is set equality. The solver relies on this.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Bound::{self, Excluded, Included, Unbounded};

use super::version::Version;

type Interval = (Bound<Version>, Bound<Version>);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionSet {
    segments: Vec<Interval>,
}

impl VersionSet {
    pub fn empty() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    pub fn full() -> Self {
        Self {
            segments: vec![(Unbounded, Unbounded)],
        }
    }

    pub fn singleton(version: Version) -> Self {
        Self {
            segments: vec![(Included(version.clone()), Included(version))],
        }
    }

    /// `>= version`
    pub fn higher_than(version: Version) -> Self {
        Self {
            segments: vec![(Included(version), Unbounded)],
        }
    }

    /// `> version`
    pub fn strictly_higher_than(version: Version) -> Self {
        Self {
            segments: vec![(Excluded(version), Unbounded)],
        }
    }

    /// `<= version`
    pub fn lower_than(version: Version) -> Self {
        Self {
            segments: vec![(Unbounded, Included(version))],
        }
    }

    /// `< version`
    pub fn strictly_lower_than(version: Version) -> Self {
        Self {
            segments: vec![(Unbounded, Excluded(version))],
        }
    }

    /// `>= lower, < upper`
    pub fn between(lower: Version, upper: Version) -> Self {
        let segment = (Included(lower), Excluded(upper));
        if valid_segment(&segment.0, &segment.1) {
            Self {
                segments: vec![segment],
            }
        } else {
            Self::empty()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_full(&self) -> bool {
        matches!(self.segments.as_slice(), [(Unbounded, Unbounded)])
    }

    /// The only version in this set, if it is a singleton
    pub fn as_singleton(&self) -> Option<&Version> {
        match self.segments.as_slice() {
            [(Included(a), Included(b))] if a == b => Some(a),
            _ => None,
        }
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.segments.iter().any(|(lower, upper)| {
            let above = match lower {
                Unbounded => true,
                Included(v) => version >= v,
                Excluded(v) => version > v,
            };
            let below = match upper {
                Unbounded => true,
                Included(v) => version <= v,
                Excluded(v) => version < v,
            };
            above && below
        })
    }

    pub fn complement(&self) -> Self {
        let mut segments = Vec::with_capacity(self.segments.len() + 1);
        let mut next_lower = Unbounded;

        for (lower, upper) in &self.segments {
            match lower {
                Unbounded => {},
                Included(v) => segments.push((next_lower.clone(), Excluded(v.clone()))),
                Excluded(v) => segments.push((next_lower.clone(), Included(v.clone()))),
            }
            next_lower = match upper {
                Unbounded => return Self { segments },
                Included(v) => Excluded(v.clone()),
                Excluded(v) => Included(v.clone()),
            };
        }

        segments.push((next_lower, Unbounded));
        Self { segments }
    }

    pub fn intersection(&self, other: &Self) -> Self {
        let mut segments = Vec::new();
        let (mut i, mut j) = (0, 0);

        while i < self.segments.len() && j < other.segments.len() {
            let (a_lower, a_upper) = &self.segments[i];
            let (b_lower, b_upper) = &other.segments[j];

            let lower = if cmp_lower(a_lower, b_lower) == Ordering::Less {
                b_lower
            } else {
                a_lower
            };
            let upper = if cmp_upper(a_upper, b_upper) == Ordering::Less {
                a_upper
            } else {
                b_upper
            };
            if valid_segment(lower, upper) {
                segments.push((lower.clone(), upper.clone()));
            }

            if cmp_upper(a_upper, b_upper) == Ordering::Less {
                i += 1;
            } else {
                j += 1;
            }
        }

        Self { segments }
    }

    pub fn union(&self, other: &Self) -> Self {
        self.complement()
            .intersection(&other.complement())
            .complement()
    }

    pub fn subset_of(&self, other: &Self) -> bool {
        &self.intersection(other) == self
    }

    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.intersection(other).is_empty()
    }

    /// Iterate over the normalized intervals
    pub fn intervals(&self) -> impl Iterator<Item = (&Bound<Version>, &Bound<Version>)> {
        self.segments.iter().map(|(lower, upper)| (lower, upper))
    }
}

fn cmp_lower(a: &Bound<Version>, b: &Bound<Version>) -> Ordering {
    match (a, b) {
        (Unbounded, Unbounded) => Ordering::Equal,
        (Unbounded, _) => Ordering::Less,
        (_, Unbounded) => Ordering::Greater,
        (Included(x), Included(y)) | (Excluded(x), Excluded(y)) => x.cmp(y),
        (Included(x), Excluded(y)) => x.cmp(y).then(Ordering::Less),
        (Excluded(x), Included(y)) => x.cmp(y).then(Ordering::Greater),
    }
}

fn cmp_upper(a: &Bound<Version>, b: &Bound<Version>) -> Ordering {
    match (a, b) {
        (Unbounded, Unbounded) => Ordering::Equal,
        (Unbounded, _) => Ordering::Greater,
        (_, Unbounded) => Ordering::Less,
        (Included(x), Included(y)) | (Excluded(x), Excluded(y)) => x.cmp(y),
        (Included(x), Excluded(y)) => x.cmp(y).then(Ordering::Greater),
        (Excluded(x), Included(y)) => x.cmp(y).then(Ordering::Less),
    }
}

fn valid_segment(lower: &Bound<Version>, upper: &Bound<Version>) -> bool {
    match (lower, upper) {
        (Unbounded, _) | (_, Unbounded) => true,
        (Included(a), Included(b)) => a <= b,
        (Included(a), Excluded(b)) | (Excluded(a), Included(b)) | (Excluded(a), Excluded(b)) => {
            a < b
        },
    }
}

impl fmt::Display for VersionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "∅");
        }

        // `!=v` reads better than two open intervals
        if let [(Unbounded, Excluded(a)), (Excluded(b), Unbounded)] = self.segments.as_slice() {
            if a == b {
                return write!(f, "!={}", a);
            }
        }

        for (idx, (lower, upper)) in self.segments.iter().enumerate() {
            if idx > 0 {
                write!(f, " || ")?;
            }
            match (lower, upper) {
                (Unbounded, Unbounded) => write!(f, "*")?,
                (Included(a), Included(b)) if a == b => write!(f, "=={}", a)?,
                (Unbounded, Included(b)) => write!(f, "<={}", b)?,
                (Unbounded, Excluded(b)) => write!(f, "<{}", b)?,
                (Included(a), Unbounded) => write!(f, ">={}", a)?,
                (Excluded(a), Unbounded) => write!(f, ">{}", a)?,
                (lower, upper) => {
                    match lower {
                        Included(a) => write!(f, ">={}", a)?,
                        Excluded(a) => write!(f, ">{}", a)?,
                        Unbounded => {},
                    }
                    match upper {
                        Included(b) => write!(f, ", <={}", b)?,
                        Excluded(b) => write!(f, ", <{}", b)?,
                        Unbounded => {},
                    }
                },
            }
        }
        Ok(())
    }
}
