//! The `grove.lock` document

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use grove_core::error::GroveError;
use grove_core::types::Distribution;
use grove_core::{
    Constraint, Dependency, DependencyKind, Marker, PackageCandidate, PackageId, PackageName, RootRequirements,
    SourceRef, Version,
};
use grove_resolver::{ResolvedEdge, ResolvedGraph, ResolvedNode};

use crate::LockResult;

/// Format version written to new lock files
pub const LOCK_FORMAT_VERSION: &str = "1";

const HEADER: &str = "# This file is generated by grove. Do not edit it by hand.\n\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LockFile {
    pub version: String,
    /// Content hash of the root requirements the lock was resolved from
    pub content_hash: String,
    #[serde(default, rename = "package", skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<LockEntry>,
}

/// One locked package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEntry {
    pub name: PackageName,
    pub version: Version,
    #[serde(default, skip_serializing_if = "SourceRef::is_registry")]
    pub source: SourceRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hashes: Vec<String>,
    /// Extras activated on this package
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub extras: BTreeSet<String>,
    pub category: DependencyKind,
    /// Direct dependencies: name to constraint text
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, LockedDependency>,
}

/// A locked dependency edge: the constraint text, or a table when the edge
/// requests extras or is pulled in by one of the package's own extras
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LockedDependency {
    Simple(String),
    Detailed {
        version: String,
        #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
        extras: BTreeSet<String>,
        /// Extra of the depending package that enables this edge
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extra: Option<String>,
    },
}

impl LockedDependency {
    fn from_edge(edge: &ResolvedEdge) -> Self {
        if edge.extras.is_empty() && edge.via_extra.is_none() {
            return LockedDependency::Simple(edge.constraint.text().to_string());
        }
        LockedDependency::Detailed {
            version: edge.constraint.text().to_string(),
            extras: edge.extras.clone(),
            extra: edge.via_extra.clone(),
        }
    }

    pub fn constraint_text(&self) -> &str {
        match self {
            LockedDependency::Simple(text) => text,
            LockedDependency::Detailed { version, .. } => version,
        }
    }

    pub fn extras(&self) -> BTreeSet<String> {
        match self {
            LockedDependency::Simple(_) => BTreeSet::new(),
            LockedDependency::Detailed { extras, .. } => extras.clone(),
        }
    }

    pub fn via_extra(&self) -> Option<&str> {
        match self {
            LockedDependency::Simple(_) => None,
            LockedDependency::Detailed { extra, .. } => extra.as_deref(),
        }
    }

    /// Combine two edges to the same package
    fn merge(&self, other: &LockedDependency) -> LockedDependency {
        let version = if self.constraint_text() == other.constraint_text() {
            self.constraint_text().to_string()
        } else {
            match (self.constraint(), other.constraint()) {
                (Ok(a), Ok(b)) => a.and(&b).text().to_string(),
                _ => format!("{}, {}", self.constraint_text(), other.constraint_text()),
            }
        };
        let mut extras = self.extras();
        extras.extend(other.extras());
        // An unconditional edge makes the merged edge unconditional
        let extra = match (self.via_extra(), other.via_extra()) {
            (Some(a), Some(_)) => Some(a.to_string()),
            _ => None,
        };
        if extras.is_empty() && extra.is_none() {
            LockedDependency::Simple(version)
        } else {
            LockedDependency::Detailed { version, extras, extra }
        }
    }

    fn constraint(&self) -> Result<Constraint, String> {
        Constraint::parse(self.constraint_text()).map_err(|e| e.to_string())
    }
}

impl LockEntry {
    pub fn id(&self) -> PackageId {
        PackageId::new(self.name.clone(), self.source.clone())
    }

    /// Candidate view of the entry, without the Pool
    pub fn to_candidate(&self) -> LockResult<PackageCandidate> {
        let mut candidate = PackageCandidate::new(self.id(), self.version.clone()).with_dist(Distribution {
            url: self.url.clone(),
            hashes: self.hashes.clone(),
        });
        for (name, locked) in &self.dependencies {
            let constraint = locked.constraint().map_err(|reason| GroveError::LockInconsistent {
                reason: format!("{} depends on {} with invalid constraint: {}", self.name, name, reason),
            })?;
            let mut dependency = Dependency::new(name, constraint);
            dependency.extras = locked.extras();
            if let Some(extra) = locked.via_extra() {
                dependency = dependency.with_marker(Marker::extra(extra));
            }
            candidate.dependencies.push(dependency);
        }
        Ok(candidate)
    }
}

impl LockFile {
    /// Project a resolved graph into a lock document
    pub fn from_graph(graph: &ResolvedGraph, content_hash: String) -> Self {
        let categories = graph.categories();
        let mut packages: Vec<LockEntry> = graph
            .packages()
            .map(|node| {
                let mut dependencies: BTreeMap<String, LockedDependency> = BTreeMap::new();
                for (target, edge) in graph.dependencies_of(node.id()) {
                    let locked = LockedDependency::from_edge(edge);
                    let key = target.name().to_string();
                    let merged = match dependencies.get(&key) {
                        Some(existing) => existing.merge(&locked),
                        None => locked,
                    };
                    dependencies.insert(key, merged);
                }

                LockEntry {
                    name: node.name().clone(),
                    version: node.version().clone(),
                    source: node.id().source.clone(),
                    url: node.candidate.dist.url.clone(),
                    hashes: node.candidate.dist.hashes.clone(),
                    extras: node.extras.clone(),
                    category: categories.get(node.id()).copied().unwrap_or(DependencyKind::Main),
                    dependencies,
                }
            })
            .collect();
        packages.sort_by(|a, b| (&a.name, &a.source).cmp(&(&b.name, &b.source)));

        Self {
            version: LOCK_FORMAT_VERSION.to_string(),
            content_hash,
            packages,
        }
    }

    pub fn entry(&self, name: &PackageName) -> Option<&LockEntry> {
        self.packages.iter().find(|entry| &entry.name == name)
    }

    /// Locked versions, used as solver preferences when re-locking
    pub fn preferences(&self) -> BTreeMap<PackageName, Version> {
        self.packages
            .iter()
            .map(|entry| (entry.name.clone(), entry.version.clone()))
            .collect()
    }

    pub fn to_toml(&self) -> LockResult<String> {
        let body = toml::to_string_pretty(self).map_err(|e| GroveError::LockInconsistent {
            reason: format!("cannot serialize lock file: {}", e),
        })?;
        Ok(format!("{}{}", HEADER, body))
    }

    pub fn from_toml(content: &str, file: &str) -> LockResult<Self> {
        toml::from_str(content)
            .map_err(|e| GroveError::toml_parse(file, content, e.message(), e.span().map(|span| span.start)))
    }

    /// Check the lock against itself: every locked dependency must be
    /// present and satisfied by the locked version
    pub fn check_consistency(&self) -> LockResult<()> {
        let mut seen = BTreeSet::new();
        for entry in &self.packages {
            if !seen.insert(&entry.name) {
                return Err(GroveError::LockInconsistent {
                    reason: format!("{} is locked more than once", entry.name),
                });
            }
        }

        for entry in &self.packages {
            for (name, locked) in &entry.dependencies {
                let target = self
                    .entry(&PackageName::new(name))
                    .ok_or_else(|| GroveError::LockInconsistent {
                        reason: format!("{} depends on {}, which is not locked", entry.name, name),
                    })?;
                let constraint = locked.constraint().map_err(|reason| GroveError::LockInconsistent {
                    reason: format!("{} depends on {} with invalid constraint: {}", entry.name, name, reason),
                })?;
                if !constraint.matches(&target.version) {
                    return Err(GroveError::LockInconsistent {
                        reason: format!(
                            "{} requires {} {} but {} is locked",
                            entry.name, name, constraint, target.version
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Rebuild the resolved graph the lock was written from
    pub fn to_graph_view(&self, root: &RootRequirements) -> LockResult<ResolvedGraph> {
        let mut graph = ResolvedGraph::new(root.clone());
        for entry in &self.packages {
            let mut node = ResolvedNode::new(Arc::new(entry.to_candidate()?));
            node.extras = entry.extras.clone();
            graph.add_package(node);
        }

        for entry in &self.packages {
            for (name, locked) in &entry.dependencies {
                let Some(target) = self.entry(&PackageName::new(name)) else {
                    return Err(GroveError::LockInconsistent {
                        reason: format!("{} depends on {}, which is not locked", entry.name, name),
                    });
                };
                let constraint = locked.constraint().map_err(|reason| GroveError::LockInconsistent { reason })?;
                let edge = ResolvedEdge {
                    constraint,
                    extras: locked.extras(),
                    via_extra: locked.via_extra().map(str::to_string),
                };
                graph.add_dependency(&entry.id(), &target.id(), edge)?;
            }
        }
        Ok(graph)
    }
}
