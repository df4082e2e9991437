//! Resolved dependency graph using petgraph
//!
//! The output of a resolution: one node per selected package, one edge per
//! dependency between selected packages. Provides cycle detection, a
//! deterministic install order and reachability queries used to decide
//! what a given group/extra selection installs.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use indexmap::IndexMap;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use grove_core::error::GroveError;
use grove_core::{Constraint, Dependency, DependencyKind, PackageCandidate, PackageId, PackageName, RootRequirements, Version};

use crate::ResolverResult;

/// A selected package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNode {
    pub candidate: Arc<PackageCandidate>,
    /// Extras of this package some requester activated
    pub extras: BTreeSet<String>,
}

impl ResolvedNode {
    pub fn new(candidate: Arc<PackageCandidate>) -> Self {
        Self {
            candidate,
            extras: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> &PackageId {
        &self.candidate.id
    }

    pub fn name(&self) -> &PackageName {
        &self.candidate.id.name
    }

    pub fn version(&self) -> &Version {
        &self.candidate.version
    }
}

/// Dependency relationship between two selected packages
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEdge {
    pub constraint: Constraint,
    /// Extras requested from the target
    pub extras: BTreeSet<String>,
    /// Extra of the source package that pulls this dependency in
    pub via_extra: Option<String>,
}

impl ResolvedEdge {
    pub fn new(constraint: Constraint) -> Self {
        Self {
            constraint,
            extras: BTreeSet::new(),
            via_extra: None,
        }
    }

    pub fn from_dependency(dependency: &Dependency, via_extra: Option<&str>) -> Self {
        Self {
            constraint: dependency.constraint.clone(),
            extras: dependency.extras.clone(),
            via_extra: via_extra.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedGraph {
    graph: DiGraph<ResolvedNode, ResolvedEdge>,
    node_map: IndexMap<PackageId, NodeIndex>,
    root: RootRequirements,
}

impl ResolvedGraph {
    pub fn new(root: RootRequirements) -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: IndexMap::new(),
            root,
        }
    }

    /// Add a package, returning the existing node if already present
    pub fn add_package(&mut self, node: ResolvedNode) -> NodeIndex {
        if let Some(index) = self.node_map.get(node.id()) {
            return *index;
        }
        let id = node.id().clone();
        let index = self.graph.add_node(node);
        self.node_map.insert(id, index);
        index
    }

    pub fn add_dependency(&mut self, from: &PackageId, to: &PackageId, edge: ResolvedEdge) -> ResolverResult<()> {
        let from_index = self.index_of(from)?;
        let to_index = self.index_of(to)?;
        self.graph.add_edge(from_index, to_index, edge);
        Ok(())
    }

    fn index_of(&self, id: &PackageId) -> ResolverResult<NodeIndex> {
        self.node_map.get(id).copied().ok_or_else(|| GroveError::PackageNotFound {
            name: id.to_string(),
        })
    }

    pub fn root(&self) -> &RootRequirements {
        &self.root
    }

    pub fn get(&self, id: &PackageId) -> Option<&ResolvedNode> {
        let index = self.node_map.get(id)?;
        self.graph.node_weight(*index)
    }

    /// First selected package with this name, whatever its origin
    pub fn find(&self, name: &PackageName) -> Option<&ResolvedNode> {
        self.packages().find(|node| node.name() == name)
    }

    pub fn contains(&self, id: &PackageId) -> bool {
        self.node_map.contains_key(id)
    }

    /// Packages in insertion order
    pub fn packages(&self) -> impl Iterator<Item = &ResolvedNode> {
        self.node_map.values().filter_map(|index| self.graph.node_weight(*index))
    }

    pub fn package_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Direct dependencies of a package, sorted by name
    pub fn dependencies_of(&self, id: &PackageId) -> Vec<(&ResolvedNode, &ResolvedEdge)> {
        let Some(&index) = self.node_map.get(id) else {
            return Vec::new();
        };
        let mut dependencies: Vec<_> = self
            .graph
            .edges(index)
            .map(|edge| (&self.graph[edge.target()], edge.weight()))
            .collect();
        dependencies.sort_by(|a, b| a.0.id().cmp(b.0.id()));
        dependencies
    }

    /// Packages depending directly on `id`, sorted by name
    pub fn dependents_of(&self, id: &PackageId) -> Vec<&ResolvedNode> {
        let Some(&index) = self.node_map.get(id) else {
            return Vec::new();
        };
        let mut dependents: Vec<_> = self
            .graph
            .neighbors_directed(index, Direction::Incoming)
            .map(|source| &self.graph[source])
            .collect();
        dependents.sort_by(|a, b| a.id().cmp(b.id()));
        dependents.dedup_by(|a, b| a.id() == b.id());
        dependents
    }

    /// Packages a selection installs, with the extras active on each.
    ///
    /// Starts from the root dependencies `with_dev` and `extras` select and
    /// follows edges; an edge gated by an extra of its source is only
    /// followed once some requester activated that extra.
    pub fn activate(&self, with_dev: bool, extras: &BTreeSet<String>) -> BTreeMap<PackageId, BTreeSet<String>> {
        let mut active: BTreeMap<PackageId, BTreeSet<String>> = BTreeMap::new();
        let mut queue: VecDeque<(PackageId, BTreeSet<String>)> = self
            .root
            .selected(with_dev, extras)
            .into_iter()
            .map(|dep| (dep.id.clone(), dep.extras.clone()))
            .collect();

        while let Some((id, requested)) = queue.pop_front() {
            let Some(&index) = self.node_map.get(&id) else {
                continue;
            };

            let (first_visit, added) = match active.get_mut(&id) {
                None => {
                    active.insert(id.clone(), requested.clone());
                    (true, requested)
                },
                Some(existing) => {
                    let added: BTreeSet<String> = requested.difference(existing).cloned().collect();
                    if added.is_empty() {
                        continue;
                    }
                    existing.extend(added.iter().cloned());
                    (false, added)
                },
            };

            for edge in self.graph.edges(index) {
                let follow = match &edge.weight().via_extra {
                    None => first_visit,
                    Some(extra) => added.contains(extra),
                };
                if follow {
                    queue.push_back((self.graph[edge.target()].id().clone(), edge.weight().extras.clone()));
                }
            }
        }
        active
    }

    /// Main when any runtime selection reaches the package, Dev otherwise
    pub fn categories(&self) -> BTreeMap<PackageId, DependencyKind> {
        let runtime = self.activate(false, &self.root.extra_names());
        self.node_map
            .keys()
            .map(|id| {
                let kind = if runtime.contains_key(id) {
                    DependencyKind::Main
                } else {
                    DependencyKind::Dev
                };
                (id.clone(), kind)
            })
            .collect()
    }

    /// Packages in dependency order: every package comes after the
    /// packages it depends on. Ties are broken by name; a cycle is broken
    /// at its smallest member.
    pub fn install_order(&self, subset: Option<&BTreeSet<PackageId>>) -> Vec<PackageId> {
        let included = |id: &PackageId| subset.map_or(true, |s| s.contains(id));

        let mut pending: BTreeMap<PackageId, usize> = BTreeMap::new();
        for (id, &index) in &self.node_map {
            if !included(id) {
                continue;
            }
            let mut targets: Vec<NodeIndex> = self
                .graph
                .neighbors(index)
                .filter(|target| *target != index && included(self.graph[*target].id()))
                .collect();
            targets.sort();
            targets.dedup();
            pending.insert(id.clone(), targets.len());
        }

        let mut ready: BTreeSet<PackageId> = pending.iter().filter(|(_, &n)| n == 0).map(|(id, _)| id.clone()).collect();
        let mut order = Vec::with_capacity(pending.len());

        while order.len() < pending.len() {
            let next = match ready.pop_first() {
                Some(id) => id,
                None => {
                    // Only cycles remain
                    let placed: BTreeSet<&PackageId> = order.iter().collect();
                    match pending.keys().find(|id| !placed.contains(id)) {
                        Some(id) => id.clone(),
                        None => break,
                    }
                },
            };
            if order.contains(&next) {
                continue;
            }

            let index = self.node_map[&next];
            let mut dependents: Vec<NodeIndex> = self.graph.neighbors_directed(index, Direction::Incoming).collect();
            dependents.sort();
            dependents.dedup();
            for dependent in dependents {
                let id = self.graph[dependent].id();
                if dependent == index || order.contains(id) {
                    continue;
                }
                if let Some(count) = pending.get_mut(id) {
                    *count = count.saturating_sub(1);
                    if *count == 0 {
                        ready.insert(id.clone());
                    }
                }
            }
            ready.remove(&next);
            order.push(next);
        }
        order
    }

    /// Strongly connected components with more than one package, or a
    /// package depending on itself
    pub fn detect_cycles(&self) -> Vec<Vec<PackageId>> {
        let mut cycles: Vec<Vec<PackageId>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1 || self.graph.contains_edge(component[0], component[0])
            })
            .map(|component| {
                let mut ids: Vec<PackageId> = component.iter().map(|i| self.graph[*i].id().clone()).collect();
                ids.sort();
                ids
            })
            .collect();
        cycles.sort();
        cycles
    }

    /// Format cycle as "a -> b -> c -> a"
    pub fn format_cycle(cycle: &[PackageId]) -> String {
        if cycle.is_empty() {
            return "no cycle".to_string();
        }
        let mut names: Vec<String> = cycle.iter().map(|id| id.name.to_string()).collect();
        names.push(names[0].clone());
        names.join(" -> ")
    }

    /// Edges whose target version falls outside the edge constraint
    pub fn violations(&self) -> Vec<String> {
        self.graph
            .edge_references()
            .filter(|edge| !edge.weight().constraint.matches(self.graph[edge.target()].version()))
            .map(|edge| {
                format!(
                    "{} requires {} {} but {} is selected",
                    self.graph[edge.source()].candidate,
                    self.graph[edge.target()].name(),
                    edge.weight().constraint,
                    self.graph[edge.target()].version()
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests;
