//! Explaining resolution failures.
//!
//! A failed resolution ends with an incompatibility derived from earlier
//! ones. Walking its causes gives a `DerivationTree` whose leaves are
//! external facts (dependencies, missing versions). The tree is flattened
//! into numbered `Step`s, each either a fact or a conclusion drawn from two
//! earlier steps, and rendered as "Because X and Y, Z." sentences.

use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;

use grove_core::{Version, VersionSet};

use crate::package::SolverPackage;
use crate::term::Term;

#[derive(Debug, Clone)]
pub enum DerivationTree {
    External(External),
    Derived(Derived),
}

/// Facts that were not learned during solving
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum External {
    NotRoot(SolverPackage, Version),
    NoVersions(SolverPackage, VersionSet),
    Unavailable(SolverPackage, VersionSet, String),
    FromDependencyOf(SolverPackage, VersionSet, SolverPackage, VersionSet),
    SourceConflict(SolverPackage, SolverPackage),
}

/// A learned incompatibility and the two incompatibilities it came from
#[derive(Debug, Clone)]
pub struct Derived {
    pub terms: IndexMap<SolverPackage, Term>,
    /// Set when this node is referenced more than once in the tree
    pub shared_id: Option<usize>,
    pub cause1: Box<DerivationTree>,
    pub cause2: Box<DerivationTree>,
}

/// One line of the explanation chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Fact(String),
    Conclusion {
        /// Indices of the two earlier steps this follows from
        causes: (usize, usize),
        text: String,
    },
}

impl Step {
    pub fn text(&self) -> &str {
        match self {
            Step::Fact(text) | Step::Conclusion { text, .. } => text,
        }
    }
}

fn package_in(package: &SolverPackage, set: &VersionSet) -> String {
    if set.is_full() || package.is_root() {
        package.to_string()
    } else {
        format!("{} {}", package, set)
    }
}

impl fmt::Display for External {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            External::NotRoot(package, version) => {
                write!(f, "we are solving dependencies of {} {}", package, version)
            },
            External::NoVersions(package, set) if set.is_full() => {
                write!(f, "there is no available version for {}", package)
            },
            External::NoVersions(package, set) => {
                write!(f, "there is no version of {} in {}", package, set)
            },
            External::Unavailable(package, set, reason) => {
                write!(f, "{} is unavailable ({})", package_in(package, set), reason)
            },
            External::FromDependencyOf(package, set, dep, dep_set) => {
                write!(f, "{} depends on {}", package_in(package, set), package_in(dep, dep_set))
            },
            External::SourceConflict(first, second) => {
                write!(f, "{} and {} cannot both be selected", first, second)
            },
        }
    }
}

/// Plain-language reading of a set of incompatible terms
fn describe_terms(terms: &IndexMap<SolverPackage, Term>) -> String {
    let root = terms
        .iter()
        .find(|(package, term)| package.is_root() && matches!(term, Term::Positive(_)))
        .map(|(package, _)| package);
    if let Some(root) = root.filter(|_| terms.len() > 1) {
        return describe_root_terms(root, terms);
    }

    let terms: Vec<(&SolverPackage, &Term)> = terms.iter().collect();
    match terms.as_slice() {
        [] => "version solving failed".to_string(),
        [(package, Term::Positive(_))] if package.is_root() => "version solving failed".to_string(),
        [(package, Term::Positive(set))] => format!("{} is forbidden", package_in(package, set)),
        [(package, Term::Negative(set))] => format!("{} is required", package_in(package, set)),
        [(p1, Term::Positive(s1)), (p2, Term::Negative(s2))]
        | [(p2, Term::Negative(s2)), (p1, Term::Positive(s1))] => {
            External::FromDependencyOf((*p1).clone(), s1.clone(), (*p2).clone(), s2.clone()).to_string()
        },
        many => {
            let parts: Vec<String> = many
                .iter()
                .map(|(package, term)| match term {
                    Term::Positive(set) => package_in(package, set),
                    Term::Negative(set) => format!("not {}", package_in(package, set)),
                })
                .collect();
            format!("{} are incompatible", parts.join(", "))
        },
    }
}

/// The root is always selected, so its terms read as what it depends on
fn describe_root_terms(root: &SolverPackage, terms: &IndexMap<SolverPackage, Term>) -> String {
    let mut required = Vec::new();
    let mut forbidden = Vec::new();
    for (package, term) in terms.iter().filter(|(package, _)| *package != root) {
        match term {
            Term::Negative(set) => required.push(package_in(package, set)),
            Term::Positive(set) => forbidden.push(package_in(package, set)),
        }
    }
    match (required.is_empty(), forbidden.is_empty()) {
        (false, true) => format!("{} depends on {}", root, required.join(" or ")),
        (true, _) => format!("{} depends on not {}", root, forbidden.join(" and not ")),
        (false, false) => format!(
            "{} depends on {} when {}",
            root,
            required.join(" or "),
            forbidden.join(" and ")
        ),
    }
}

impl DerivationTree {
    /// Flatten the tree into an ordered explanation chain
    pub fn steps(&self) -> Vec<Step> {
        let mut steps = Vec::new();
        let mut shared = HashMap::new();
        self.collect_steps(&mut steps, &mut shared);
        steps
    }

    fn collect_steps(&self, steps: &mut Vec<Step>, shared: &mut HashMap<usize, usize>) -> usize {
        match self {
            DerivationTree::External(external) => {
                steps.push(Step::Fact(external.to_string()));
                steps.len() - 1
            },
            DerivationTree::Derived(derived) => {
                if let Some(index) = derived.shared_id.and_then(|id| shared.get(&id)) {
                    return *index;
                }
                let first = derived.cause1.collect_steps(steps, shared);
                let second = derived.cause2.collect_steps(steps, shared);
                steps.push(Step::Conclusion {
                    causes: (first, second),
                    text: describe_terms(&derived.terms),
                });
                let index = steps.len() - 1;
                if let Some(id) = derived.shared_id {
                    shared.insert(id, index);
                }
                index
            },
        }
    }

    /// Human-readable report: one sentence per conclusion
    pub fn render(&self) -> String {
        render_steps(&self.steps())
    }

    /// Every package mentioned anywhere in the tree
    pub fn packages(&self) -> Vec<SolverPackage> {
        let mut packages = Vec::new();
        self.collect_packages(&mut packages);
        packages
    }

    fn collect_packages(&self, packages: &mut Vec<SolverPackage>) {
        let mut push = |package: &SolverPackage| {
            if !packages.contains(package) {
                packages.push(package.clone());
            }
        };
        match self {
            DerivationTree::External(external) => match external {
                External::NotRoot(p, _) | External::NoVersions(p, _) | External::Unavailable(p, _, _) => push(p),
                External::FromDependencyOf(p, _, d, _) | External::SourceConflict(p, d) => {
                    push(p);
                    push(d);
                },
            },
            DerivationTree::Derived(derived) => {
                derived.terms.keys().for_each(push);
                derived.cause1.collect_packages(packages);
                derived.cause2.collect_packages(packages);
            },
        }
    }
}

/// Render steps, numbering conclusions that later steps refer back to
pub fn render_steps(steps: &[Step]) -> String {
    let mut referenced_later = vec![false; steps.len()];
    for (index, step) in steps.iter().enumerate() {
        if let Step::Conclusion { causes: (a, b), .. } = step {
            for cause in [*a, *b] {
                if matches!(steps[cause], Step::Conclusion { .. }) && cause + 1 != index {
                    referenced_later[cause] = true;
                }
            }
        }
    }

    let mut labels = HashMap::new();
    let mut lines = Vec::new();
    let describe = |cause: usize, labels: &HashMap<usize, usize>| match (&steps[cause], labels.get(&cause)) {
        (Step::Conclusion { text, .. }, Some(label)) => format!("{} ({})", text, label),
        (step, _) => step.text().to_string(),
    };

    for (index, step) in steps.iter().enumerate() {
        let Step::Conclusion { causes: (a, b), text } = step else {
            continue;
        };
        let mut line = format!(
            "Because {} and {}, {}.",
            describe(*a, &labels),
            describe(*b, &labels),
            text
        );
        if referenced_later[index] {
            let label = labels.len() + 1;
            labels.insert(index, label);
            line.push_str(&format!(" ({})", label));
        }
        lines.push(line);
    }

    if lines.is_empty() {
        if let Some(step) = steps.last() {
            lines.push(format!("{}.", capitalize(step.text())));
        }
    }

    lines.join("\n")
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
