//! The candidate Pool: memoized metadata queries over ordered sources.
//!
//! For each package the Pool asks the configured sources in order; the
//! first source that handles the package's origin and knows the package
//! wins. Answers (failures included) are memoized for the Pool's lifetime,
//! keyed by package and marker environment fingerprint.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info};

use grove_core::error::GroveError;
use grove_core::utils::verify_integrity;
use grove_core::{Dependency, MarkerEnvironment, PackageCandidate, PackageId, Version};
use std::collections::BTreeSet;

use crate::cache::OnceMap;
use crate::retry::{timeout_error, with_retry, RetryConfig};
use crate::source::PackageSource;
use crate::RegistryResult;

/// Candidates of one package, newest first
pub type Candidates = Arc<Vec<Arc<PackageCandidate>>>;

/// Cloneable failure of a Pool query
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("package '{name}' was not found in any configured source")]
    NotFound { name: String },

    #[error("could not fetch '{name}': {message}")]
    Source { name: String, message: String },
}

impl From<PoolError> for GroveError {
    fn from(error: PoolError) -> Self {
        match error {
            PoolError::NotFound { name } => GroveError::PackageNotFound { name },
            PoolError::Source { name, message } => GroveError::SourceError {
                source_name: name,
                message,
            },
        }
    }
}

/// Pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub retry: RetryConfig,
    /// Upper bound for each individual fetch attempt
    pub fetch_timeout: Duration,
    /// Environment dependency markers are evaluated against
    pub environment: MarkerEnvironment,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            fetch_timeout: Duration::from_secs(30),
            environment: MarkerEnvironment::current(),
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    /// Calls made to sources, retries included
    pub fetches: u64,
}

type DependencyKey = (PackageId, Version, Option<String>);

pub struct Pool {
    sources: Vec<Arc<dyn PackageSource>>,
    config: PoolConfig,
    fingerprint: String,
    candidates: OnceMap<(PackageId, String), Result<Candidates, PoolError>>,
    dependencies: DashMap<DependencyKey, Arc<Vec<Dependency>>>,
    /// Source that answered for each package
    origins: DashMap<PackageId, usize>,
    fetches: AtomicU64,
}

impl std::fmt::Debug for Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("sources", &self.source_names())
            .field("environment", &self.fingerprint)
            .finish()
    }
}

impl Pool {
    pub fn new(sources: Vec<Arc<dyn PackageSource>>, config: PoolConfig) -> Self {
        let fingerprint = config.environment.fingerprint();
        Self {
            sources,
            config,
            fingerprint,
            candidates: OnceMap::new(),
            dependencies: DashMap::new(),
            origins: DashMap::new(),
            fetches: AtomicU64::new(0),
        }
    }

    /// Pool over a single source with default settings
    pub fn single(source: impl PackageSource + 'static) -> Self {
        Self::new(vec![Arc::new(source)], PoolConfig::default())
    }

    pub fn environment(&self) -> &MarkerEnvironment {
        &self.config.environment
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|source| source.name()).collect()
    }

    /// Name of the source that provided `id`, once it has been queried
    pub fn origin_of(&self, id: &PackageId) -> Option<&str> {
        let index = *self.origins.get(id)?;
        self.sources.get(index).map(|source| source.name())
    }

    pub fn stats(&self) -> PoolStats {
        let cache = self.candidates.stats();
        PoolStats {
            hits: cache.hits,
            misses: cache.misses,
            fetches: self.fetches.load(Ordering::Relaxed),
        }
    }

    /// All known candidates of `id`, newest first
    pub async fn candidates(&self, id: &PackageId) -> Result<Candidates, PoolError> {
        let key = (id.clone(), self.fingerprint.clone());
        self.candidates.get_or_init(key, || self.load(id)).await
    }

    /// Dependencies of `candidate` that apply in the Pool's environment.
    ///
    /// With `extra = None` these are the unconditional dependencies; with
    /// `Some(e)` only the dependencies that extra `e` switches on.
    pub fn dependencies(&self, candidate: &PackageCandidate, extra: Option<&str>) -> Arc<Vec<Dependency>> {
        let key = (candidate.id.clone(), candidate.version.clone(), extra.map(str::to_string));
        if let Some(cached) = self.dependencies.get(&key) {
            return cached.clone();
        }

        let env = &self.config.environment;
        let none = BTreeSet::new();
        let filtered: Vec<Dependency> = match extra {
            None => candidate
                .dependencies
                .iter()
                .filter(|dep| dep.applies_to(env, &none))
                .cloned()
                .collect(),
            Some(extra) => {
                let active = BTreeSet::from([grove_core::types::marker::normalize_extra(extra)]);
                candidate
                    .dependencies
                    .iter()
                    .filter(|dep| dep.applies_to(env, &active) && !dep.applies_to(env, &none))
                    .cloned()
                    .collect()
            },
        };

        self.dependencies.entry(key).or_insert_with(|| Arc::new(filtered)).clone()
    }

    /// Download the archive of `candidate` and verify its recorded hashes
    pub async fn fetch_archive(&self, candidate: &PackageCandidate) -> RegistryResult<Vec<u8>> {
        let source = self.archive_source(&candidate.id).ok_or_else(|| GroveError::PackageNotFound {
            name: candidate.id.to_string(),
        })?;

        let label = format!("archive {}", candidate);
        let bytes = with_retry(&self.config.retry, &label, || {
            self.fetches.fetch_add(1, Ordering::Relaxed);
            self.timed(&label, source.fetch_archive(candidate))
        })
        .await?;

        verify_integrity(&candidate.to_string(), &bytes, &candidate.dist.hashes)?;
        debug!(package = %candidate, bytes = bytes.len(), "archive fetched");
        Ok(bytes)
    }

    fn archive_source(&self, id: &PackageId) -> Option<&dyn PackageSource> {
        if let Some(index) = self.origins.get(id).map(|entry| *entry) {
            return self.sources.get(index).map(|source| source.as_ref());
        }
        self.sources
            .iter()
            .find(|source| source.handles(&id.source))
            .map(|source| source.as_ref())
    }

    async fn load(&self, id: &PackageId) -> Result<Candidates, PoolError> {
        let serving = self
            .sources
            .iter()
            .enumerate()
            .filter(|(_, source)| source.handles(&id.source));

        for (index, source) in serving {
            let label = format!("metadata {} from {}", id, source.name());
            let source = source.as_ref();
            let result = with_retry(&self.config.retry, &label, || {
                self.fetches.fetch_add(1, Ordering::Relaxed);
                self.timed(&label, source.fetch_metadata(&id.name))
            })
            .await;

            match result {
                Ok(metadata) => {
                    let candidates = metadata.into_candidates(id).map_err(|e| PoolError::Source {
                        name: id.to_string(),
                        message: e.to_string(),
                    })?;
                    info!(package = %id, source = source.name(), versions = candidates.len(), "fetched metadata");
                    self.origins.insert(id.clone(), index);
                    return Ok(Arc::new(candidates.into_iter().map(Arc::new).collect()));
                },
                Err(GroveError::PackageNotFound { .. }) => {
                    debug!(package = %id, source = source.name(), "not found, trying next source");
                },
                Err(error) => {
                    return Err(PoolError::Source {
                        name: id.to_string(),
                        message: error.to_string(),
                    });
                },
            }
        }

        Err(PoolError::NotFound { name: id.to_string() })
    }

    async fn timed<T>(&self, label: &str, fetch: impl Future<Output = RegistryResult<T>>) -> RegistryResult<T> {
        let limit = self.config.fetch_timeout;
        match tokio::time::timeout(limit, fetch).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error(label, limit)),
        }
    }
}

#[cfg(test)]
mod tests;
