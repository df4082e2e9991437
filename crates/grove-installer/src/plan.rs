//! Install planning: desired state, diff and ordering
//!
//! The desired state is the part of a resolved graph a selection activates
//! (groups, extras, target packages). Diffing it against the environment
//! snapshot yields the operations; installs and updates follow the graph's
//! install order, removes come last.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use grove_core::error::GroveError;
use grove_core::{PackageId, PackageName};
use grove_resolver::ResolvedGraph;

use crate::environment::Snapshot;
use crate::operation::{InstalledPackage, Operation};
use crate::InstallResult;

/// Whether packages missing from the desired state are removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstallMode {
    /// Also remove installed packages the desired state does not contain
    Sync,
    /// Never remove
    #[default]
    Additive,
}

/// Which part of the graph to install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub with_dev: bool,
    pub extras: BTreeSet<String>,
    /// Limit the run to these packages and their dependencies
    pub targets: Vec<PackageName>,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            with_dev: true,
            extras: BTreeSet::new(),
            targets: Vec::new(),
        }
    }
}

impl Selection {
    pub fn without_dev(mut self) -> Self {
        self.with_dev = false;
        self
    }

    pub fn with_extra(mut self, extra: &str) -> Self {
        self.extras.insert(grove_core::types::marker::normalize_extra(extra));
        self
    }

    pub fn with_target(mut self, name: &str) -> Self {
        self.targets.push(PackageName::new(name));
        self
    }
}

/// Ordered operations plus the scheduling constraints between them
#[derive(Debug, Clone, Default)]
pub struct Plan {
    operations: Vec<Operation>,
    /// For each operation, the earlier operations on its transitive
    /// dependencies
    prerequisites: Vec<BTreeSet<usize>>,
    unchanged: usize,
}

impl Plan {
    /// Diff the desired part of `graph` against `snapshot`
    pub fn build(graph: &ResolvedGraph, snapshot: &Snapshot, selection: &Selection, mode: InstallMode) -> InstallResult<Self> {
        let desired = desired_packages(graph, selection)?;
        let order = graph.install_order(Some(&desired));

        // Transitive dependencies of every desired package. A dependency
        // placed later in the order only happens inside a cycle, where the
        // order has already broken the edge.
        let position: BTreeMap<&PackageId, usize> = order.iter().enumerate().map(|(i, id)| (id, i)).collect();
        let mut closure: BTreeMap<&PackageId, BTreeSet<&PackageId>> = BTreeMap::new();
        for (index, id) in order.iter().enumerate() {
            let mut reached = BTreeSet::new();
            for (dependency, _) in graph.dependencies_of(id) {
                let Some(&dep_index) = position.get(dependency.id()) else {
                    continue;
                };
                if dep_index < index {
                    let dep_id = &order[dep_index];
                    reached.insert(dep_id);
                    if let Some(transitive) = closure.get(dep_id) {
                        reached.extend(transitive.iter().copied());
                    }
                }
            }
            closure.insert(id, reached);
        }

        let mut plan = Plan::default();
        let mut op_of: BTreeMap<&PackageId, usize> = BTreeMap::new();
        for id in &order {
            let Some(node) = graph.get(id) else {
                continue;
            };
            let operation = match snapshot.get(node.name()) {
                None => Operation::Install(node.candidate.clone()),
                Some(installed) if !installed.matches(&node.candidate) => Operation::Update {
                    from: installed.clone(),
                    to: node.candidate.clone(),
                },
                Some(_) => {
                    plan.unchanged += 1;
                    continue;
                },
            };

            let prerequisites = closure
                .get(id)
                .map(|deps| deps.iter().filter_map(|dep| op_of.get(dep).copied()).collect())
                .unwrap_or_default();
            op_of.insert(id, plan.operations.len());
            plan.operations.push(operation);
            plan.prerequisites.push(prerequisites);
        }

        // A targeted run touches the targets only, even in sync mode
        if mode == InstallMode::Sync && selection.targets.is_empty() {
            let keep: BTreeSet<&PackageName> = desired.iter().map(|id| &id.name).collect();
            let stale: Vec<&InstalledPackage> = snapshot.values().filter(|p| !keep.contains(&p.name)).collect();
            for installed in stale {
                plan.operations.push(Operation::Remove(installed.clone()));
                plan.prerequisites.push(BTreeSet::new());
            }
        }

        info!(
            operations = plan.operations.len(),
            unchanged = plan.unchanged,
            ?mode,
            "planned installation"
        );
        Ok(plan)
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Operations `index` must wait for
    pub fn prerequisites(&self, index: usize) -> &BTreeSet<usize> {
        static NONE: BTreeSet<usize> = BTreeSet::new();
        self.prerequisites.get(index).unwrap_or(&NONE)
    }

    /// Operations that (transitively) depend on `index`
    pub fn dependents(&self, index: usize) -> Vec<usize> {
        (0..self.operations.len())
            .filter(|&i| self.prerequisites[i].contains(&index))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Desired packages already installed at the right version
    pub fn unchanged(&self) -> usize {
        self.unchanged
    }

    /// Counts of installs, updates and removes
    pub fn counts(&self) -> (usize, usize, usize) {
        self.operations.iter().fold((0, 0, 0), |(i, u, r), op| match op {
            Operation::Install(_) => (i + 1, u, r),
            Operation::Update { .. } => (i, u + 1, r),
            Operation::Remove(_) => (i, u, r + 1),
        })
    }
}

/// Packages the selection activates, narrowed to targets and their
/// transitive dependencies when targets are given
fn desired_packages(graph: &ResolvedGraph, selection: &Selection) -> InstallResult<BTreeSet<PackageId>> {
    let active: BTreeSet<PackageId> = graph.activate(selection.with_dev, &selection.extras).into_keys().collect();
    if selection.targets.is_empty() {
        return Ok(active);
    }

    let mut desired = BTreeSet::new();
    let mut stack = Vec::new();
    for target in &selection.targets {
        let node = graph
            .find(target)
            .filter(|node| active.contains(node.id()))
            .ok_or_else(|| GroveError::PackageNotFound {
                name: target.to_string(),
            })?;
        stack.push(node.id().clone());
    }
    while let Some(id) = stack.pop() {
        if !desired.insert(id.clone()) {
            continue;
        }
        for (dependency, _) in graph.dependencies_of(&id) {
            if active.contains(dependency.id()) && !desired.contains(dependency.id()) {
                stack.push(dependency.id().clone());
            }
        }
    }
    debug!(targets = selection.targets.len(), packages = desired.len(), "narrowed to targets");
    Ok(desired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_core::{Constraint, Dependency, PackageCandidate, RootRequirements};
    use grove_resolver::{ResolvedEdge, ResolvedNode};
    use std::sync::Arc;

    fn id(name: &str) -> PackageId {
        PackageId::registry(name)
    }

    /// app -> web -> (idna, certifi); dev: pytest -> pluggy
    fn graph() -> ResolvedGraph {
        let root = RootRequirements::new("app")
            .with_dependency(Dependency::parse("web", "*").unwrap())
            .with_dependency(Dependency::parse("pytest", "*").unwrap().dev())
            .with_dependency(Dependency::parse("socks", "*").unwrap().optional())
            .with_extra("proxy", &["socks"]);
        let mut graph = ResolvedGraph::new(root);
        for (name, version) in [
            ("web", "1.0.0"),
            ("idna", "3.0.0"),
            ("certifi", "2024.1.0"),
            ("pytest", "7.0.0"),
            ("pluggy", "1.0.0"),
            ("socks", "1.0.0"),
        ] {
            graph.add_package(ResolvedNode::new(Arc::new(PackageCandidate::new(
                id(name),
                version.parse().unwrap(),
            ))));
        }
        for (from, to) in [("web", "idna"), ("web", "certifi"), ("pytest", "pluggy")] {
            graph
                .add_dependency(&id(from), &id(to), ResolvedEdge::new(Constraint::any()))
                .unwrap();
        }
        graph
    }

    fn names(plan: &Plan) -> Vec<String> {
        plan.operations().iter().map(|op| op.to_string()).collect()
    }

    fn installed(name: &str, version: &str) -> (PackageName, InstalledPackage) {
        (PackageName::new(name), InstalledPackage::new(name, version.parse().unwrap()))
    }

    #[test]
    fn test_fresh_install_in_dependency_order() {
        let plan = Plan::build(&graph(), &Snapshot::new(), &Selection::default(), InstallMode::Additive).unwrap();
        assert_eq!(
            names(&plan),
            vec![
                "install certifi 2024.1.0",
                "install idna 3.0.0",
                "install pluggy 1.0.0",
                "install pytest 7.0.0",
                "install web 1.0.0",
            ]
        );
        // web waits for certifi and idna; pytest for pluggy
        assert_eq!(plan.prerequisites(4), &BTreeSet::from([0, 1]));
        assert_eq!(plan.prerequisites(3), &BTreeSet::from([2]));
        assert_eq!(plan.dependents(0), vec![4]);
    }

    #[test]
    fn test_no_dev_and_extras() {
        let selection = Selection::default().without_dev().with_extra("proxy");
        let plan = Plan::build(&graph(), &Snapshot::new(), &selection, InstallMode::Additive).unwrap();
        let touched: Vec<&str> = plan.operations().iter().map(|op| op.name().as_str()).collect();
        assert_eq!(touched, vec!["certifi", "idna", "socks", "web"]);
    }

    #[test]
    fn test_diff_against_snapshot() {
        let snapshot: Snapshot = [
            installed("web", "1.0.0"),
            installed("idna", "2.0.0"),
            installed("leftover", "0.1.0"),
        ]
        .into_iter()
        .collect();
        let selection = Selection::default().without_dev();

        let additive = Plan::build(&graph(), &snapshot, &selection, InstallMode::Additive).unwrap();
        assert_eq!(names(&additive), vec!["install certifi 2024.1.0", "update idna 2.0.0 -> 3.0.0"]);
        assert_eq!(additive.unchanged(), 1);

        let sync = Plan::build(&graph(), &snapshot, &selection, InstallMode::Sync).unwrap();
        assert_eq!(sync.operations().last().map(|op| op.to_string()).as_deref(), Some("remove leftover 0.1.0"));
        assert_eq!(sync.counts(), (1, 1, 1));
    }

    #[test]
    fn test_unchanged_dependency_still_links_dependents() {
        let snapshot: Snapshot = [installed("idna", "3.0.0")].into_iter().collect();
        let plan = Plan::build(&graph(), &snapshot, &Selection::default().without_dev(), InstallMode::Additive).unwrap();
        assert_eq!(names(&plan), vec!["install certifi 2024.1.0", "install web 1.0.0"]);
        assert_eq!(plan.prerequisites(1), &BTreeSet::from([0]));
    }

    #[test]
    fn test_targets_limit_the_run() {
        let selection = Selection::default().with_target("PyTest");
        let plan = Plan::build(&graph(), &Snapshot::new(), &selection, InstallMode::Sync).unwrap();
        assert_eq!(names(&plan), vec!["install pluggy 1.0.0", "install pytest 7.0.0"]);

        let unknown = Selection::default().with_target("nope");
        assert!(matches!(
            Plan::build(&graph(), &Snapshot::new(), &unknown, InstallMode::Additive),
            Err(GroveError::PackageNotFound { .. })
        ));
    }

    #[test]
    fn test_fully_installed_is_empty() {
        let snapshot: Snapshot = graph().packages().map(|node| (node.name().clone(), InstalledPackage::of(&node.candidate))).collect();
        let plan = Plan::build(&graph(), &snapshot, &Selection::default().with_extra("proxy"), InstallMode::Sync).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.unchanged(), 6);
    }

    #[test]
    fn test_cycle_members_do_not_wait_on_each_other() {
        let root = RootRequirements::new("app").with_dependency(Dependency::parse("x", "*").unwrap());
        let mut graph = ResolvedGraph::new(root);
        for name in ["x", "y"] {
            graph.add_package(ResolvedNode::new(Arc::new(PackageCandidate::new(id(name), "1.0.0".parse().unwrap()))));
        }
        graph.add_dependency(&id("x"), &id("y"), ResolvedEdge::new(Constraint::any())).unwrap();
        graph.add_dependency(&id("y"), &id("x"), ResolvedEdge::new(Constraint::any())).unwrap();

        let plan = Plan::build(&graph, &Snapshot::new(), &Selection::default(), InstallMode::Additive).unwrap();
        assert_eq!(names(&plan), vec!["install x 1.0.0", "install y 1.0.0"]);
        assert!(plan.prerequisites(0).is_empty());
        assert_eq!(plan.prerequisites(1), &BTreeSet::from([0]));
    }

    proptest::proptest! {
        #[test]
        fn test_prerequisites_precede_and_cover_dependencies(
            size in 1usize..12,
            edges in proptest::collection::vec((0usize..12, 0usize..12), 0..30),
        ) {
            let name = |i: usize| format!("p{:02}", i);
            let mut root = RootRequirements::new("app");
            for i in 0..size {
                root = root.with_dependency(Dependency::parse(&name(i), "*").unwrap());
            }
            let mut graph = ResolvedGraph::new(root);
            for i in 0..size {
                graph.add_package(ResolvedNode::new(Arc::new(PackageCandidate::new(id(&name(i)), "1.0.0".parse().unwrap()))));
            }
            // Higher index depends on lower: acyclic
            let edges: BTreeSet<(usize, usize)> = edges
                .into_iter()
                .filter(|(a, b)| a < &size && b < &size && a > b)
                .collect();
            for (from, to) in &edges {
                graph.add_dependency(&id(&name(*from)), &id(&name(*to)), ResolvedEdge::new(Constraint::any())).unwrap();
            }

            let plan = Plan::build(&graph, &Snapshot::new(), &Selection::default(), InstallMode::Sync).unwrap();
            proptest::prop_assert_eq!(plan.len(), size);
            let position = |n: usize| plan.operations().iter().position(|op| op.name().as_str() == name(n)).unwrap();
            for index in 0..plan.len() {
                proptest::prop_assert!(plan.prerequisites(index).iter().all(|&p| p < index));
            }
            for (from, to) in &edges {
                proptest::prop_assert!(plan.prerequisites(position(*from)).contains(&position(*to)));
            }
        }
    }
}
