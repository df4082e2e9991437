//! In-memory index with a builder API.
//!
//! Used by tests, benches and callers embedding Grove with a fixed package
//! universe. Supports injected transient failures, artificial latency and
//! fetch counters.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use grove_core::error::GroveError;
use grove_core::utils::integrity_of;
use grove_core::types::DetailedDependency;
use grove_core::{DependencySpec, PackageCandidate, PackageName, SourceRef, Version};

use crate::api::{PackageMetadata, VersionMetadata};
use crate::source::PackageSource;
use crate::RegistryResult;

#[derive(Debug, Default)]
pub struct MemorySource {
    name: String,
    /// `None` answers for every origin
    origins: Option<Vec<SourceRef>>,
    packages: BTreeMap<PackageName, PackageMetadata>,
    archives: HashMap<(PackageName, String), Vec<u8>>,
    /// Remaining injected failures per package
    metadata_failures: Mutex<HashMap<PackageName, u32>>,
    archive_failures: Mutex<HashMap<PackageName, u32>>,
    latency: Option<Duration>,
    metadata_fetches: AtomicUsize,
    archive_fetches: AtomicUsize,
}

fn version_key(version: &str) -> String {
    version
        .parse::<Version>()
        .map(|v| v.to_string())
        .unwrap_or_else(|_| version.to_string())
}

impl MemorySource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Answer only for the given origin (may be called repeatedly)
    pub fn serving(mut self, origin: SourceRef) -> Self {
        self.origins.get_or_insert_with(Vec::new).push(origin);
        self
    }

    /// Add a version with plain `name -> constraint` dependencies
    pub fn package(self, name: &str, version: &str, dependencies: &[(&str, &str)]) -> Self {
        let metadata = VersionMetadata {
            dependencies: dependencies
                .iter()
                .map(|(dep, constraint)| (dep.to_string(), DependencySpec::Simple(constraint.to_string())))
                .collect(),
            ..VersionMetadata::default()
        };
        self.version(name, version, metadata)
    }

    /// Add a version with full metadata
    pub fn version(mut self, name: &str, version: &str, metadata: VersionMetadata) -> Self {
        let document = self
            .packages
            .entry(PackageName::new(name))
            .or_insert_with(|| PackageMetadata {
                name: name.to_string(),
                versions: BTreeMap::new(),
            });
        document.versions.insert(version.to_string(), metadata);
        self
    }

    /// Declare `extra` on an existing version, enabling optional dependencies
    pub fn extra(mut self, name: &str, version: &str, extra: &str, dependencies: &[(&str, &str)]) -> Self {
        if let Some(metadata) = self.version_mut(name, version) {
            for (dep, constraint) in dependencies {
                metadata.dependencies.insert(
                    dep.to_string(),
                    DependencySpec::Detailed(DetailedDependency {
                        version: Some(constraint.to_string()),
                        optional: true,
                        ..DetailedDependency::default()
                    }),
                );
                metadata
                    .extras
                    .entry(extra.to_string())
                    .or_default()
                    .push(dep.to_string());
            }
        }
        self
    }

    /// Mark an existing version as yanked
    pub fn yanked(mut self, name: &str, version: &str) -> Self {
        if let Some(metadata) = self.version_mut(name, version) {
            metadata.yanked = true;
        }
        self
    }

    /// Attach archive bytes to an existing version and record their hash
    pub fn archive(mut self, name: &str, version: &str, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        if let Some(metadata) = self.version_mut(name, version) {
            metadata.dist.url = Some(format!("memory://{}/{}", PackageName::new(name), version));
            metadata.dist.hashes = vec![integrity_of(&bytes)];
        }
        self.archives
            .insert((PackageName::new(name), version_key(version)), bytes);
        self
    }

    /// Fail the next `times` metadata fetches of `name` with a transient error
    pub fn fail_metadata(self, name: &str, times: u32) -> Self {
        self.metadata_failures.lock().insert(PackageName::new(name), times);
        self
    }

    /// Fail the next `times` archive fetches of `name` with a transient error
    pub fn fail_archive(self, name: &str, times: u32) -> Self {
        self.archive_failures.lock().insert(PackageName::new(name), times);
        self
    }

    /// Delay every fetch by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn metadata_fetches(&self) -> usize {
        self.metadata_fetches.load(Ordering::Relaxed)
    }

    pub fn archive_fetches(&self) -> usize {
        self.archive_fetches.load(Ordering::Relaxed)
    }

    fn version_mut(&mut self, name: &str, version: &str) -> Option<&mut VersionMetadata> {
        self.packages
            .get_mut(&PackageName::new(name))
            .and_then(|document| document.versions.get_mut(version))
    }

    fn take_failure(&self, failures: &Mutex<HashMap<PackageName, u32>>, name: &PackageName) -> bool {
        let mut failures = failures.lock();
        match failures.get_mut(name) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            },
            _ => false,
        }
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl PackageSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn handles(&self, source: &SourceRef) -> bool {
        self.origins
            .as_ref()
            .map_or(true, |origins| origins.contains(source))
    }

    async fn fetch_metadata(&self, name: &PackageName) -> RegistryResult<PackageMetadata> {
        self.metadata_fetches.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;

        if self.take_failure(&self.metadata_failures, name) {
            return Err(GroveError::source_error(&self.name, format!("injected failure for {}", name)));
        }

        self.packages
            .get(name)
            .cloned()
            .ok_or_else(|| GroveError::PackageNotFound {
                name: name.to_string(),
            })
    }

    async fn fetch_archive(&self, candidate: &PackageCandidate) -> RegistryResult<Vec<u8>> {
        self.archive_fetches.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency().await;

        if self.take_failure(&self.archive_failures, candidate.name()) {
            return Err(GroveError::source_error(
                &self.name,
                format!("injected archive failure for {}", candidate),
            ));
        }

        self.archives
            .get(&(candidate.name().clone(), candidate.version.to_string()))
            .cloned()
            .ok_or_else(|| GroveError::source_error(&self.name, format!("no archive for {}", candidate)))
    }
}
