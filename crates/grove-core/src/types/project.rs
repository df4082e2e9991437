//! Root requirements of a project: what the manifest asks for.

use std::collections::{BTreeMap, BTreeSet};

use super::dependency::Dependency;
use super::package::PackageName;

/// Everything a resolution starts from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootRequirements {
    /// Project name, used as the solver's root package
    pub name: String,
    /// Main and dev dependencies, optional ones included
    pub dependencies: Vec<Dependency>,
    /// Project extras: extra name to the optional root dependencies it enables
    pub extras: BTreeMap<String, Vec<PackageName>>,
}

impl RootRequirements {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    pub fn with_extra(mut self, extra: &str, names: &[&str]) -> Self {
        self.extras.insert(
            super::marker::normalize_extra(extra),
            names.iter().map(|n| PackageName::new(n)).collect(),
        );
        self
    }

    /// Extra names declared by the project
    pub fn extra_names(&self) -> BTreeSet<String> {
        self.extras.keys().cloned().collect()
    }

    /// Root dependencies to install for the given selection.
    ///
    /// Optional dependencies are only kept when a selected extra names them.
    pub fn selected(&self, with_dev: bool, extras: &BTreeSet<String>) -> Vec<&Dependency> {
        let enabled: BTreeSet<&PackageName> = self
            .extras
            .iter()
            .filter(|(extra, _)| extras.contains(*extra))
            .flat_map(|(_, names)| names.iter())
            .collect();

        self.dependencies
            .iter()
            .filter(|dep| with_dev || dep.kind.is_runtime())
            .filter(|dep| !dep.optional || enabled.contains(dep.name()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> RootRequirements {
        RootRequirements::new("app")
            .with_dependency(Dependency::parse("requests", "^2.0").unwrap())
            .with_dependency(Dependency::parse("pytest", "^7.0").unwrap().dev())
            .with_dependency(Dependency::parse("pysocks", ">=1.5").unwrap().optional())
            .with_extra("SOCKS", &["PySocks"])
    }

    #[test]
    fn test_selection_by_group_and_extra() {
        let project = project();
        let names = |deps: Vec<&Dependency>| -> Vec<String> {
            deps.iter().map(|d| d.name().to_string()).collect()
        };

        assert_eq!(names(project.selected(false, &BTreeSet::new())), vec!["requests"]);
        assert_eq!(
            names(project.selected(true, &BTreeSet::new())),
            vec!["requests", "pytest"]
        );
        assert_eq!(
            names(project.selected(false, &BTreeSet::from(["socks".to_string()]))),
            vec!["requests", "pysocks"]
        );
        assert_eq!(project.extra_names(), BTreeSet::from(["socks".to_string()]));
    }
}
