//! Grove benchmarking suite
//!
//! Shared fixtures for the resolver, installer, hashing and parsing
//! benchmarks. Every fixture is in memory so runs never touch the network.

use std::time::Duration;

use criterion::Criterion;
use pprof::criterion::{Output, PProfProfiler};

use grove_core::{Dependency, RootRequirements};
use grove_registry::MemorySource;

/// Criterion with flamegraph profiling
pub fn criterion_config() -> Criterion {
    Criterion::default()
        .warm_up_time(Duration::from_secs(3))
        .measurement_time(Duration::from_secs(10))
        .sample_size(50)
        .with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)))
}

/// Current-thread runtime for driving the async resolver and installer
pub fn runtime() -> tokio::runtime::Runtime {
    match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => panic!("cannot start tokio runtime: {}", error),
    }
}

pub fn package_name(layer: usize, index: usize) -> String {
    format!("pkg-{}-{}", layer, index)
}

/// An index of `layers` layers of `width` packages, each with `versions`
/// releases. Every package depends on two packages of the next layer.
pub fn layered_index(layers: usize, width: usize, versions: usize) -> MemorySource {
    let mut source = MemorySource::new("bench");
    for layer in 0..layers {
        for index in 0..width {
            let name = package_name(layer, index);
            let deps: Vec<(String, String)> = if layer + 1 < layers {
                [index, (index + 1) % width]
                    .iter()
                    .map(|next| (package_name(layer + 1, *next), "^1.0".to_string()))
                    .collect()
            } else {
                Vec::new()
            };
            let deps: Vec<(&str, &str)> = deps.iter().map(|(n, c)| (n.as_str(), c.as_str())).collect();
            for minor in 0..versions {
                source = source.package(&name, &format!("1.{}.0", minor), &deps);
            }
        }
    }
    source
}

/// Root requiring every package of the first layer
pub fn layered_root(width: usize) -> RootRequirements {
    (0..width).fold(RootRequirements::new("bench-app"), |root, index| {
        match Dependency::parse(&package_name(0, index), ">=1.0,<2.0") {
            Ok(dependency) => root.with_dependency(dependency),
            Err(error) => panic!("invalid fixture constraint: {}", error),
        }
    })
}

/// Root that cannot be satisfied: the first layer pins the bottom layer to
/// a release that does not exist
pub fn conflicting_root(layers: usize, width: usize) -> RootRequirements {
    let mut root = layered_root(width);
    if let Ok(dependency) = Dependency::parse(&package_name(layers - 1, 0), "^2.0") {
        root = root.with_dependency(dependency);
    }
    root
}
