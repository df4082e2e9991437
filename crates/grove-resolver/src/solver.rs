//! Version solving: unit propagation plus conflict-driven clause learning
//! over the candidates the Pool provides.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use grove_core::error::GroveError;
use grove_core::{Dependency, PackageCandidate, PackageId, PackageName, RootRequirements, Version, VersionSet};
use grove_registry::Pool;

use crate::graph::{ResolvedEdge, ResolvedGraph, ResolvedNode};
use crate::incompatibility::{IncompatId, Incompatibility, Relation};
use crate::package::SolverPackage;
use crate::partial_solution::{PartialSolution, SatisfierSearch};
use crate::report::{DerivationTree, Step};
use crate::term::Term;

/// Version the root package is solved at
pub const ROOT_VERSION: Version = Version {
    major: 0,
    minor: 0,
    patch: 0,
    prerelease: None,
    build: None,
};

/// Knobs for one resolution run
#[derive(Debug, Clone, Default)]
pub struct ResolverOptions {
    /// Versions to try first, typically taken from an existing lock
    pub preferences: BTreeMap<PackageName, Version>,
    /// Treat prereleases like stable versions
    pub allow_prereleases: bool,
}

/// Why no solution exists
#[derive(Debug, Clone)]
pub struct NoSolution {
    pub tree: DerivationTree,
    /// Explanation chain; every step is a fact or follows from two earlier ones
    pub steps: Vec<Step>,
    pub report: String,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("{}", .0.report)]
    NoSolution(Box<NoSolution>),

    #[error("solver invariant violated: {0}")]
    Internal(String),
}

impl From<ResolveError> for GroveError {
    fn from(error: ResolveError) -> Self {
        GroveError::ResolutionFailure {
            report: error.to_string(),
        }
    }
}

type Dependencies = IndexMap<SolverPackage, VersionSet>;

/// Solver state for one run
struct State {
    root_package: SolverPackage,
    root_version: Version,
    /// Incompatibilities mentioning each package
    incompatibilities: IndexMap<SolverPackage, Vec<IncompatId>>,
    /// Incompatibilities already contradicted at the current decision level
    contradicted: HashSet<IncompatId>,
    partial_solution: PartialSolution,
    store: Vec<Incompatibility>,
    propagation_buffer: Vec<SolverPackage>,
}

impl State {
    fn init(root_package: SolverPackage, root_version: Version) -> Self {
        let mut state = Self {
            root_package: root_package.clone(),
            root_version: root_version.clone(),
            incompatibilities: IndexMap::new(),
            contradicted: HashSet::new(),
            partial_solution: PartialSolution::new(),
            store: Vec::new(),
            propagation_buffer: Vec::new(),
        };
        state.add_incompatibility(Incompatibility::not_root(root_package, root_version));
        state
    }

    fn add_incompatibility(&mut self, incompat: Incompatibility) -> IncompatId {
        self.store.push(incompat);
        let id = self.store.len() - 1;
        self.merge_incompatibility(id);
        id
    }

    fn add_incompatibilities_from_dependencies(
        &mut self,
        package: &SolverPackage,
        version: &Version,
        dependencies: Dependencies,
    ) -> std::ops::Range<IncompatId> {
        let start = self.store.len();
        for dependency in dependencies {
            self.add_incompatibility(Incompatibility::from_dependency(package.clone(), version.clone(), dependency));
        }
        start..self.store.len()
    }

    fn merge_incompatibility(&mut self, id: IncompatId) {
        for (package, _) in self.store[id].iter() {
            self.incompatibilities.entry(package.clone()).or_default().push(id);
        }
    }

    /// Derive every assignment forced by the incompatibilities, starting
    /// from the changes made to `package`
    fn unit_propagation(&mut self, package: SolverPackage) -> Result<(), ResolveError> {
        self.propagation_buffer.clear();
        self.propagation_buffer.push(package);

        while let Some(current) = self.propagation_buffer.pop() {
            let mut conflict = None;
            let ids = self.incompatibilities.get(&current).cloned().unwrap_or_default();

            // Newest incompatibilities first
            for &id in ids.iter().rev() {
                if self.contradicted.contains(&id) {
                    continue;
                }
                match self.partial_solution.relation(&self.store[id]) {
                    Relation::Satisfied => {
                        conflict = Some(id);
                        break;
                    },
                    Relation::AlmostSatisfied(almost) => {
                        self.propagation_buffer.push(almost.clone());
                        self.partial_solution.add_derivation(almost, id, &self.store);
                        self.contradicted.insert(id);
                    },
                    Relation::Contradicted(_) => {
                        self.contradicted.insert(id);
                    },
                    Relation::Inconclusive => {},
                }
            }

            if let Some(id) = conflict {
                let (almost, root_cause) = self.conflict_resolution(id)?;
                self.propagation_buffer.clear();
                self.propagation_buffer.push(almost.clone());
                self.partial_solution.add_derivation(almost, root_cause, &self.store);
                self.contradicted.insert(root_cause);
            }
        }
        Ok(())
    }

    /// Learn from a satisfied incompatibility until it can be turned into
    /// a derivation after backjumping
    fn conflict_resolution(&mut self, incompat: IncompatId) -> Result<(SolverPackage, IncompatId), ResolveError> {
        let mut current = incompat;
        let mut changed = false;

        loop {
            if self.store[current].is_terminal(&self.root_package, &self.root_version) {
                return Err(self.no_solution(current));
            }

            let (package, search) = self
                .partial_solution
                .satisfier_search(&self.store[current], &self.store)
                .ok_or_else(|| ResolveError::Internal(format!("no satisfier for {}", self.store[current])))?;

            match search {
                SatisfierSearch::DifferentDecisionLevels {
                    previous_satisfier_level,
                } => {
                    debug!(
                        incompatibility = %self.store[current],
                        level = previous_satisfier_level,
                        "backjumping"
                    );
                    self.partial_solution.backtrack(previous_satisfier_level, &self.store);
                    self.contradicted.clear();
                    if changed {
                        self.merge_incompatibility(current);
                    }
                    return Ok((package, current));
                },
                SatisfierSearch::SameDecisionLevels { satisfier_cause } => {
                    let learned = Incompatibility::prior_cause(current, satisfier_cause, &package, &self.store);
                    debug!(learned = %learned, "derived incompatibility");
                    self.store.push(learned);
                    current = self.store.len() - 1;
                    changed = true;
                },
            }
        }
    }

    fn no_solution(&self, incompat: IncompatId) -> ResolveError {
        let shared = self.shared_ids(incompat);
        let tree = Incompatibility::build_derivation_tree(incompat, &shared, &self.store);
        let steps = tree.steps();
        let report = crate::report::render_steps(&steps);
        ResolveError::NoSolution(Box::new(NoSolution { tree, steps, report }))
    }

    /// Derived incompatibilities reachable through more than one path
    fn shared_ids(&self, incompat: IncompatId) -> HashSet<IncompatId> {
        let mut all = HashSet::new();
        let mut shared = HashSet::new();
        let mut stack = vec![incompat];
        while let Some(id) = stack.pop() {
            if let Some((first, second)) = self.store[id].causes() {
                if all.contains(&id) {
                    shared.insert(id);
                } else {
                    all.insert(id);
                    stack.push(first);
                    stack.push(second);
                }
            }
        }
        shared
    }
}

/// Bookkeeping shared across the decisions of one run
#[derive(Default)]
struct Context {
    /// Versions whose dependencies were already added
    added: HashMap<SolverPackage, HashSet<Version>>,
    /// Requesters whose constraint on a name opted into prereleases
    prerelease_opt_in: HashMap<PackageName, Vec<(SolverPackage, Version)>>,
    /// Origins seen per package name
    origins: IndexMap<PackageName, Vec<PackageId>>,
}

pub struct Resolver<'a> {
    pool: &'a Pool,
    options: ResolverOptions,
}

impl<'a> Resolver<'a> {
    pub fn new(pool: &'a Pool, options: ResolverOptions) -> Self {
        Self { pool, options }
    }

    /// Resolve `root` into a graph of exactly one version per package
    pub async fn resolve(&self, root: &RootRequirements) -> Result<ResolvedGraph, ResolveError> {
        info!(project = %root.name, requirements = root.dependencies.len(), "resolving dependencies");

        let root_package = SolverPackage::Root(root.name.clone());
        let mut state = State::init(root_package.clone(), ROOT_VERSION);
        let mut context = Context::default();
        let mut next = root_package;
        let mut decisions = 0usize;

        loop {
            state.unit_propagation(next)?;

            let potential = state.partial_solution.potential_packages();
            if potential.is_empty() {
                let solution = state.partial_solution.extract_solution();
                let packages = solution.keys().filter(|p| matches!(p, SolverPackage::Package(_))).count();
                info!(packages, decisions, "resolution complete");
                return self.build_graph(root, &solution).await;
            }

            let (package, versions) = self.choose_package(potential, &state).await;
            next = package.clone();

            let version = match self.choose_version(&package, &versions, &state, &context).await {
                Ok(Some(version)) => version,
                Ok(None) => {
                    debug!(package = %package, versions = %versions, "no compatible version");
                    state.add_incompatibility(Incompatibility::no_versions(package, Term::Positive(versions)));
                    continue;
                },
                Err(reason) => {
                    warn!(package = %package, reason = %reason, "package unavailable");
                    state.add_incompatibility(Incompatibility::unavailable(package, VersionSet::full(), reason));
                    continue;
                },
            };

            decisions += 1;
            debug!(package = %package, version = %version, level = state.partial_solution.decision_level() + 1, "deciding");

            let is_new = context.added.entry(package.clone()).or_default().insert(version.clone());
            if !is_new {
                state.partial_solution.add_decision(package, version);
                continue;
            }

            match self.dependencies_of(&package, &version, root, &mut context, &mut state).await {
                Ok(dependencies) => {
                    let range = state.add_incompatibilities_from_dependencies(&package, &version, dependencies);
                    state.partial_solution.add_version(package, version, range, &state.store);
                },
                Err(reason) => {
                    state.add_incompatibility(Incompatibility::unavailable(
                        package,
                        VersionSet::singleton(version),
                        reason,
                    ));
                },
            }
        }
    }

    /// The undecided package with the fewest compatible candidates, first
    /// discovered on ties
    async fn choose_package(
        &self,
        potential: Vec<(SolverPackage, VersionSet)>,
        state: &State,
    ) -> (SolverPackage, VersionSet) {
        let mut best: Option<(usize, SolverPackage, VersionSet)> = None;
        for (package, versions) in potential {
            let count = match &package {
                SolverPackage::Root(_) => usize::from(versions.contains(&state.root_version)),
                _ => self.compatible_count(&package, &versions).await,
            };
            if best.as_ref().map_or(true, |(best_count, _, _)| count < *best_count) {
                best = Some((count, package, versions));
            }
            if count == 0 {
                break;
            }
        }
        match best {
            Some((_, package, versions)) => (package, versions),
            // potential is never empty here
            None => (state.root_package.clone(), VersionSet::singleton(state.root_version.clone())),
        }
    }

    async fn compatible_count(&self, package: &SolverPackage, versions: &VersionSet) -> usize {
        let Some(id) = package.id() else {
            return 0;
        };
        match self.pool.candidates(id).await {
            Ok(candidates) => candidates.iter().filter(|c| versions.contains(&c.version)).count(),
            Err(_) => 0,
        }
    }

    /// Pick the version to try for `package`.
    ///
    /// Order: the version a sibling (the package or one of its extras) is
    /// already decided at, a preferred version, the newest stable
    /// non-yanked version, then the newest prerelease. Yanked versions are
    /// only picked when the set pins exactly one version.
    async fn choose_version(
        &self,
        package: &SolverPackage,
        versions: &VersionSet,
        state: &State,
        context: &Context,
    ) -> Result<Option<Version>, String> {
        let id = match package {
            SolverPackage::Root(_) => {
                return Ok(versions.contains(&state.root_version).then(|| state.root_version.clone()));
            },
            SolverPackage::Package(id) | SolverPackage::Extra(id, _) => id,
        };

        let candidates = self.pool.candidates(id).await.map_err(|e| e.to_string())?;
        let available = |version: &Version| {
            versions.contains(version) && candidates.iter().any(|c| &c.version == version)
        };

        if let Some(version) = self.sibling_decision(package, id, state).filter(|v| available(v)) {
            return Ok(Some(version));
        }
        if let Some(preferred) = self.options.preferences.get(&id.name).filter(|v| available(v)) {
            return Ok(Some(preferred.clone()));
        }

        let pinned = versions.as_singleton().is_some();
        let allow_prereleases = self.options.allow_prereleases || opted_in(&id.name, state, context);
        let mut compatible = candidates
            .iter()
            .filter(|c| versions.contains(&c.version))
            .filter(|c| pinned || !c.yanked);

        let stable = compatible
            .clone()
            .find(|c| allow_prereleases || !c.is_prerelease());
        Ok(stable.or_else(|| compatible.next()).map(|c| c.version.clone()))
    }

    fn sibling_decision(&self, package: &SolverPackage, id: &PackageId, state: &State) -> Option<Version> {
        let base = SolverPackage::Package(id.clone());
        if *package != base {
            if let Some(version) = state.partial_solution.decided_version(&base) {
                return Some(version.clone());
            }
        }
        state
            .partial_solution
            .extract_solution()
            .into_iter()
            .find(|(other, _)| matches!(other, SolverPackage::Extra(other_id, _) if other_id == id) && other != package)
            .map(|(_, version)| version)
    }

    async fn candidate(&self, id: &PackageId, version: &Version) -> Result<Arc<PackageCandidate>, String> {
        let candidates = self.pool.candidates(id).await.map_err(|e| e.to_string())?;
        candidates
            .iter()
            .find(|c| &c.version == version)
            .cloned()
            .ok_or_else(|| format!("{} {} is not offered by any source", id, version))
    }

    async fn dependencies_of(
        &self,
        package: &SolverPackage,
        version: &Version,
        root: &RootRequirements,
        context: &mut Context,
        state: &mut State,
    ) -> Result<Dependencies, String> {
        let mut dependencies = Dependencies::new();
        match package {
            SolverPackage::Root(_) => {
                let extras = root.extra_names();
                for dependency in &root.dependencies {
                    if dependency.applies_to(self.pool.environment(), &extras) {
                        add_requirement(&mut dependencies, dependency, (package, version), context, state);
                    }
                }
            },
            SolverPackage::Package(id) => {
                let candidate = self.candidate(id, version).await?;
                for dependency in self.pool.dependencies(&candidate, None).iter() {
                    add_requirement(&mut dependencies, dependency, (package, version), context, state);
                }
            },
            SolverPackage::Extra(id, extra) => {
                let candidate = self.candidate(id, version).await?;
                if !candidate.extras.contains_key(extra) {
                    warn!(package = %candidate, extra = %extra, "extra is not declared by this version");
                }
                dependencies.insert(SolverPackage::Package(id.clone()), VersionSet::singleton(version.clone()));
                for dependency in self.pool.dependencies(&candidate, Some(extra)).iter() {
                    add_requirement(&mut dependencies, dependency, (package, version), context, state);
                }
            },
        }
        Ok(dependencies)
    }

    async fn build_graph(
        &self,
        root: &RootRequirements,
        solution: &IndexMap<SolverPackage, Version>,
    ) -> Result<ResolvedGraph, ResolveError> {
        let mut selected: BTreeMap<PackageId, (Version, BTreeSet<String>)> = BTreeMap::new();
        for (package, version) in solution {
            match package {
                SolverPackage::Root(_) => {},
                SolverPackage::Package(id) => {
                    selected.entry(id.clone()).or_insert_with(|| (version.clone(), BTreeSet::new())).0 = version.clone();
                },
                SolverPackage::Extra(id, extra) => {
                    selected
                        .entry(id.clone())
                        .or_insert_with(|| (version.clone(), BTreeSet::new()))
                        .1
                        .insert(extra.clone());
                },
            }
        }

        let mut graph = ResolvedGraph::new(root.clone());
        for (id, (version, extras)) in &selected {
            let candidate = self.candidate(id, version).await.map_err(ResolveError::Internal)?;
            graph.add_package(ResolvedNode {
                candidate,
                extras: extras.clone(),
            });
        }

        for (id, (version, extras)) in &selected {
            let candidate = self.candidate(id, version).await.map_err(ResolveError::Internal)?;
            let groups = std::iter::once(None).chain(extras.iter().map(|e| Some(e.as_str())));
            for extra in groups {
                for dependency in self.pool.dependencies(&candidate, extra).iter() {
                    if dependency.id == *id || !graph.contains(&dependency.id) {
                        continue;
                    }
                    let edge = ResolvedEdge::from_dependency(dependency, extra);
                    graph
                        .add_dependency(id, &dependency.id, edge)
                        .map_err(|e| ResolveError::Internal(e.to_string()))?;
                }
            }
        }

        for cycle in graph.detect_cycles() {
            debug!(cycle = %ResolvedGraph::format_cycle(&cycle), "dependency cycle");
        }
        Ok(graph)
    }
}

/// Add `dependency` to the requirement map, intersecting with earlier
/// requirements on the same package
fn add_requirement(
    dependencies: &mut Dependencies,
    dependency: &Dependency,
    requester: (&SolverPackage, &Version),
    context: &mut Context,
    state: &mut State,
) {
    let versions = dependency.constraint.versions();
    if dependency.constraint.allows_prereleases() {
        let requesters = context.prerelease_opt_in.entry(dependency.name().clone()).or_default();
        let requester = (requester.0.clone(), requester.1.clone());
        if !requesters.contains(&requester) {
            requesters.push(requester);
        }
    }

    let owner = match requester.0 {
        SolverPackage::Root(_) => None,
        SolverPackage::Package(id) | SolverPackage::Extra(id, _) => Some(id),
    };

    let mut targets = Vec::with_capacity(dependency.extras.len() + 1);
    if owner == Some(&dependency.id) {
        if dependency.extras.is_empty() {
            warn!(package = %dependency.id, "ignoring dependency of a package on itself");
        }
    } else {
        note_origin(&dependency.id, context, state);
        targets.push(SolverPackage::Package(dependency.id.clone()));
    }
    for extra in &dependency.extras {
        targets.push(SolverPackage::Extra(dependency.id.clone(), extra.clone()));
    }

    for target in targets {
        match dependencies.get_mut(&target) {
            Some(existing) => *existing = existing.intersection(versions),
            None => {
                dependencies.insert(target, versions.clone());
            },
        }
    }
}

/// Whether a requester that is still decided opted `name` into prereleases.
/// Opt-ins from versions abandoned by backtracking no longer count.
fn opted_in(name: &PackageName, state: &State, context: &Context) -> bool {
    context.prerelease_opt_in.get(name).is_some_and(|requesters| {
        requesters
            .iter()
            .any(|(package, version)| state.partial_solution.decided_version(package) == Some(version))
    })
}

/// Record the origin of `id`; a second origin for the same name conflicts
fn note_origin(id: &PackageId, context: &mut Context, state: &mut State) {
    let seen = context.origins.entry(id.name.clone()).or_default();
    if seen.contains(id) {
        return;
    }
    for other in seen.iter() {
        debug!(first = %other, second = %id, "conflicting origins");
        state.add_incompatibility(Incompatibility::source_conflict(
            SolverPackage::Package(other.clone()),
            SolverPackage::Package(id.clone()),
        ));
    }
    seen.push(id.clone());
}
