use super::*;
use proptest::prelude::*;
use std::collections::HashSet;

fn node(name: &str, version: &str) -> ResolvedNode {
    ResolvedNode::new(Arc::new(PackageCandidate::new(
        PackageId::registry(name),
        version.parse().unwrap(),
    )))
}

fn id(name: &str) -> PackageId {
    PackageId::registry(name)
}

fn edge(constraint: &str) -> ResolvedEdge {
    ResolvedEdge::new(Constraint::parse(constraint).unwrap())
}

fn graph_of(root: RootRequirements, nodes: &[(&str, &str)], edges: &[(&str, &str, &str)]) -> ResolvedGraph {
    let mut graph = ResolvedGraph::new(root);
    for (name, version) in nodes {
        graph.add_package(node(name, version));
    }
    for (from, to, constraint) in edges {
        graph.add_dependency(&id(from), &id(to), edge(constraint)).unwrap();
    }
    graph
}

#[test]
fn test_add_package_deduplicates() {
    let mut graph = ResolvedGraph::new(RootRequirements::new("app"));
    let first = graph.add_package(node("requests", "2.31.0"));
    let second = graph.add_package(node("Requests", "2.31.0"));

    assert_eq!(first, second);
    assert_eq!(graph.package_count(), 1);
    assert!(graph.get(&id("requests")).is_some());
    assert!(graph.find(&PackageName::new("REQUESTS")).is_some());
}

#[test]
fn test_add_dependency_missing_package() {
    let mut graph = ResolvedGraph::new(RootRequirements::new("app"));
    graph.add_package(node("a", "1.0.0"));

    let result = graph.add_dependency(&id("a"), &id("b"), edge("*"));
    assert!(matches!(result, Err(GroveError::PackageNotFound { .. })));
    assert_eq!(graph.dependency_count(), 0);
}

#[test]
fn test_install_order_dependencies_first() {
    let graph = graph_of(
        RootRequirements::new("app"),
        &[("a", "1.0.0"), ("b", "1.0.0"), ("c", "1.0.0"), ("d", "1.0.0")],
        &[("a", "b", "*"), ("a", "c", "*"), ("b", "c", "*")],
    );

    let order: Vec<String> = graph.install_order(None).iter().map(|id| id.name.to_string()).collect();
    // c and d are both free at the start; ties go by name
    assert_eq!(order, vec!["c", "b", "a", "d"]);
}

#[test]
fn test_install_order_breaks_cycles_deterministically() {
    let graph = graph_of(
        RootRequirements::new("app"),
        &[("x", "1.0.0"), ("y", "1.0.0"), ("z", "1.0.0")],
        &[("x", "y", "*"), ("y", "x", "*"), ("z", "x", "*")],
    );

    let order = graph.install_order(None);
    assert_eq!(order, vec![id("x"), id("y"), id("z")]);
    assert_eq!(graph.install_order(None), order);
}

#[test]
fn test_install_order_subset() {
    let graph = graph_of(
        RootRequirements::new("app"),
        &[("a", "1.0.0"), ("b", "1.0.0"), ("c", "1.0.0")],
        &[("a", "b", "*"), ("b", "c", "*")],
    );
    let subset: BTreeSet<PackageId> = [id("a"), id("b")].into_iter().collect();
    assert_eq!(graph.install_order(Some(&subset)), vec![id("b"), id("a")]);
}

#[test]
fn test_cycle_detection() {
    let acyclic = graph_of(
        RootRequirements::new("app"),
        &[("a", "1.0.0"), ("b", "1.0.0")],
        &[("a", "b", "*")],
    );
    assert!(acyclic.detect_cycles().is_empty());

    let cyclic = graph_of(
        RootRequirements::new("app"),
        &[("a", "1.0.0"), ("b", "1.0.0"), ("c", "1.0.0")],
        &[("a", "b", "*"), ("b", "c", "*"), ("c", "a", "*")],
    );
    let cycles = cyclic.detect_cycles();
    assert_eq!(cycles.len(), 1);
    assert_eq!(ResolvedGraph::format_cycle(&cycles[0]), "a -> b -> c -> a");
}

#[test]
fn test_activation_follows_groups_and_extras() {
    let root = RootRequirements::new("app")
        .with_dependency(Dependency::parse("web", "^1.0").unwrap().with_extra("tls"))
        .with_dependency(Dependency::parse("pytest", "*").unwrap().dev())
        .with_dependency(Dependency::parse("socks", "*").unwrap().optional())
        .with_extra("proxy", &["socks"]);

    let mut graph = graph_of(
        root,
        &[("web", "1.2.0"), ("certifi", "2024.1.0"), ("idna", "3.0.0"), ("pytest", "7.0.0"), ("socks", "1.0.0"), ("pluggy", "1.0.0")],
        &[("web", "idna", "*"), ("pytest", "pluggy", "*")],
    );
    let mut tls = edge("*");
    tls.via_extra = Some("tls".to_string());
    graph.add_dependency(&id("web"), &id("certifi"), tls).unwrap();

    let runtime = graph.activate(false, &BTreeSet::new());
    let names: Vec<&str> = runtime.keys().map(|id| id.name.as_str()).collect();
    assert_eq!(names, vec!["certifi", "idna", "web"]);
    assert!(runtime[&id("web")].contains("tls"));

    let everything = graph.activate(true, &["proxy".to_string()].into_iter().collect());
    assert_eq!(everything.len(), 6);

    let categories = graph.categories();
    assert_eq!(categories[&id("idna")], DependencyKind::Main);
    assert_eq!(categories[&id("socks")], DependencyKind::Main);
    assert_eq!(categories[&id("pluggy")], DependencyKind::Dev);
}

#[test]
fn test_extra_edge_skipped_without_extra() {
    let root = RootRequirements::new("app").with_dependency(Dependency::parse("web", "*").unwrap());
    let mut graph = graph_of(root, &[("web", "1.0.0"), ("certifi", "1.0.0")], &[]);
    let mut tls = edge("*");
    tls.via_extra = Some("tls".to_string());
    graph.add_dependency(&id("web"), &id("certifi"), tls).unwrap();

    let active = graph.activate(true, &BTreeSet::new());
    assert!(!active.contains_key(&id("certifi")));
}

#[test]
fn test_violations_and_neighbours() {
    let graph = graph_of(
        RootRequirements::new("app"),
        &[("a", "1.0.0"), ("b", "2.0.0"), ("c", "1.0.0")],
        &[("a", "b", "^1.0"), ("c", "b", ">=2")],
    );

    let violations = graph.violations();
    assert_eq!(violations.len(), 1);
    assert!(violations[0].contains("a 1.0.0 requires b ^1.0"));

    let dependents: Vec<&str> = graph.dependents_of(&id("b")).iter().map(|n| n.name().as_str()).collect();
    assert_eq!(dependents, vec!["a", "c"]);
    assert_eq!(graph.dependencies_of(&id("a")).len(), 1);
}

proptest! {
    #[test]
    fn install_order_respects_acyclic_edges(
        count in 2usize..8,
        edges in prop::collection::vec((0usize..8, 0usize..8), 0..16)
    ) {
        let mut graph = ResolvedGraph::new(RootRequirements::new("app"));
        let ids: Vec<PackageId> = (0..count).map(|i| id(&format!("pkg{}", i))).collect();
        for i in 0..count {
            graph.add_package(node(&format!("pkg{}", i), "1.0.0"));
        }
        // Only edges towards higher indices keep the graph acyclic
        for (from, to) in edges {
            if from < count && to < count && from < to {
                graph.add_dependency(&ids[from], &ids[to], edge("*")).unwrap();
            }
        }

        let order = graph.install_order(None);
        prop_assert_eq!(order.len(), count);
        let unique: HashSet<_> = order.iter().collect();
        prop_assert_eq!(unique.len(), count);

        for package in &ids {
            let position = order.iter().position(|p| p == package).unwrap();
            for (dependency, _) in graph.dependencies_of(package) {
                let dep_position = order.iter().position(|p| p == dependency.id()).unwrap();
                prop_assert!(dep_position < position, "{} installed before its dependency", package);
            }
        }
        prop_assert!(graph.detect_cycles().is_empty());
    }

    #[test]
    fn install_order_is_total_with_cycles(
        count in 2usize..7,
        edges in prop::collection::vec((0usize..7, 0usize..7), 0..20)
    ) {
        let mut graph = ResolvedGraph::new(RootRequirements::new("app"));
        for i in 0..count {
            graph.add_package(node(&format!("pkg{}", i), "1.0.0"));
        }
        for (from, to) in edges {
            if from < count && to < count {
                let _ = graph.add_dependency(&id(&format!("pkg{}", from)), &id(&format!("pkg{}", to)), edge("*"));
            }
        }

        let order = graph.install_order(None);
        prop_assert_eq!(order.len(), count);
        prop_assert_eq!(graph.install_order(None), order);
    }
}
