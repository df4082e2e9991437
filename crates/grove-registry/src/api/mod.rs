//! Index metadata documents
//!
//! Every source answers a metadata query with one `PackageMetadata`
//! document: all published versions of a package, their dependencies,
//! extras and distribution info.

use std::collections::BTreeMap;

use grove_core::types::marker::normalize_extra;
use grove_core::{
    DependencyKind, DependencySpec, Marker, PackageCandidate, PackageId, PackageName, Version,
};
use grove_core::types::Distribution;
use serde::{Deserialize, Serialize};

use crate::RegistryResult;

/// Metadata for every version of one package
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PackageMetadata {
    /// Package name as published
    pub name: String,
    /// Version string to its metadata
    #[serde(default)]
    pub versions: BTreeMap<String, VersionMetadata>,
}

/// Metadata for a specific package version
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct VersionMetadata {
    #[serde(default)]
    pub dependencies: BTreeMap<String, DependencySpec>,
    /// Extra name to the optional dependencies it enables
    #[serde(default)]
    pub extras: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub dist: DistInfo,
    #[serde(default)]
    pub yanked: bool,
}

/// Distribution information for a package archive
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DistInfo {
    /// Archive location, absolute or relative to the index
    pub url: Option<String>,
    /// Integrity hashes (`sha256:<hex>`)
    #[serde(default)]
    pub hashes: Vec<String>,
}

impl PackageMetadata {
    /// Build candidates for `id`, newest version first
    pub fn into_candidates(self, id: &PackageId) -> RegistryResult<Vec<PackageCandidate>> {
        let mut candidates = Vec::with_capacity(self.versions.len());
        for (raw_version, metadata) in self.versions {
            let version: Version = raw_version.parse()?;
            candidates.push(metadata.into_candidate(id.clone(), version)?);
        }

        candidates.sort_by(|a, b| b.version.cmp(&a.version));
        candidates.dedup_by(|a, b| a.version == b.version);
        Ok(candidates)
    }
}

impl VersionMetadata {
    /// Convert to a candidate. Optional dependencies are gated behind an
    /// `extra == "<name>"` marker for every extra that lists them, and
    /// dropped when no extra does.
    pub fn into_candidate(self, id: PackageId, version: Version) -> RegistryResult<PackageCandidate> {
        let extras: BTreeMap<String, Vec<PackageName>> = self
            .extras
            .iter()
            .map(|(extra, names)| {
                let names = names.iter().map(|n| PackageName::new(n)).collect();
                (normalize_extra(extra), names)
            })
            .collect();

        let mut candidate = PackageCandidate::new(id, version);
        for (name, spec) in &self.dependencies {
            let mut dependency = spec.to_dependency(name, DependencyKind::Main)?;
            if dependency.optional {
                let gate = extras
                    .iter()
                    .filter(|(_, names)| names.contains(dependency.name()))
                    .map(|(extra, _)| Marker::extra(extra))
                    .reduce(Marker::or);
                let Some(gate) = gate else {
                    continue;
                };
                let marker = match dependency.marker().cloned() {
                    Some(existing) => existing.and(gate),
                    None => gate,
                };
                dependency = dependency.with_marker(marker);
            }
            candidate.dependencies.push(dependency);
        }

        candidate.extras = extras;
        candidate.dist = Distribution {
            url: self.dist.url,
            hashes: self.dist.hashes,
        };
        candidate.yanked = self.yanked;
        Ok(candidate)
    }
}
