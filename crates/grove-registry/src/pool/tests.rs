//! Unit tests for the candidate Pool

use super::*;
use crate::memory::MemorySource;
use grove_core::{PackageName, SourceRef};

fn fast_config() -> PoolConfig {
    PoolConfig {
        retry: RetryConfig {
            max_retries: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        },
        fetch_timeout: Duration::from_secs(5),
        environment: MarkerEnvironment::new().with("sys_platform", "linux"),
    }
}

fn pool_of(sources: Vec<Arc<dyn PackageSource>>) -> Pool {
    Pool::new(sources, fast_config())
}

fn versions(candidates: &Candidates) -> Vec<String> {
    candidates.iter().map(|c| c.version.to_string()).collect()
}

#[tokio::test]
async fn test_candidates_newest_first_and_memoized() {
    let source = Arc::new(
        MemorySource::new("mem")
            .package("b", "2.0.0", &[])
            .package("b", "2.1.0", &[])
            .package("b", "1.9.0", &[]),
    );
    let pool = pool_of(vec![source.clone()]);
    let id = PackageId::registry("b");

    let first = pool.candidates(&id).await.unwrap();
    assert_eq!(versions(&first), vec!["2.1.0", "2.0.0", "1.9.0"]);

    let second = pool.candidates(&id).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(source.metadata_fetches(), 1);

    let stats = pool.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.fetches, 1);
}

#[tokio::test]
async fn test_not_found_falls_through_to_next_source() {
    let primary = Arc::new(MemorySource::new("primary").package("a", "1.0.0", &[]));
    let mirror = Arc::new(MemorySource::new("mirror").package("b", "1.0.0", &[]));
    let pool = pool_of(vec![primary, mirror]);

    let b = PackageId::registry("b");
    assert_eq!(pool.candidates(&b).await.unwrap().len(), 1);
    assert_eq!(pool.origin_of(&b), Some("mirror"));

    let missing = pool.candidates(&PackageId::registry("ghost")).await;
    assert_eq!(
        missing.unwrap_err(),
        PoolError::NotFound {
            name: "ghost".to_string()
        }
    );
}

#[tokio::test]
async fn test_named_index_only_asks_serving_sources() {
    let default = Arc::new(MemorySource::new("default").serving(SourceRef::Registry).package("a", "1.0.0", &[]));
    let private = Arc::new(
        MemorySource::new("private")
            .serving(SourceRef::Index {
                name: "private".to_string(),
            })
            .package("a", "9.0.0", &[]),
    );
    let pool = pool_of(vec![default.clone(), private]);

    let id = PackageId::new(
        PackageName::new("a"),
        SourceRef::Index {
            name: "private".to_string(),
        },
    );
    let candidates = pool.candidates(&id).await.unwrap();
    assert_eq!(versions(&candidates), vec!["9.0.0"]);
    assert_eq!(default.metadata_fetches(), 0);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let source = Arc::new(MemorySource::new("mem").package("a", "1.0.0", &[]).fail_metadata("a", 2));
    let pool = pool_of(vec![source.clone()]);

    let candidates = pool.candidates(&PackageId::registry("a")).await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(source.metadata_fetches(), 3);
}

#[tokio::test]
async fn test_exhausted_retries_are_memoized_source_errors() {
    let source = Arc::new(MemorySource::new("mem").package("a", "1.0.0", &[]).fail_metadata("a", 10));
    let pool = pool_of(vec![source.clone()]);
    let id = PackageId::registry("a");

    let error = pool.candidates(&id).await.unwrap_err();
    assert!(matches!(error, PoolError::Source { .. }));

    // The failure is write-once for the Pool's lifetime
    assert_eq!(pool.candidates(&id).await.unwrap_err(), error);
    assert_eq!(source.metadata_fetches(), 3);
}

#[tokio::test]
async fn test_slow_source_times_out() {
    let source = Arc::new(
        MemorySource::new("slow")
            .package("a", "1.0.0", &[])
            .with_latency(Duration::from_millis(200)),
    );
    let config = PoolConfig {
        retry: RetryConfig::none(),
        fetch_timeout: Duration::from_millis(10),
        ..fast_config()
    };
    let pool = Pool::new(vec![source], config);

    let error = pool.candidates(&PackageId::registry("a")).await.unwrap_err();
    assert!(matches!(error, PoolError::Source { message, .. } if message.contains("timed out")));
}

#[tokio::test]
async fn test_dependencies_filtered_by_marker_and_extra() {
    let source = MemorySource::new("mem")
        .version(
            "app",
            "1.0.0",
            serde_json::from_value(serde_json::json!({
                "dependencies": {
                    "core": "^1.0",
                    "winapi": { "version": "*", "markers": "sys_platform == 'win32'" },
                    "pysocks": { "version": ">=1.5", "optional": true }
                },
                "extras": { "socks": ["pysocks"] }
            }))
            .unwrap(),
        );
    let pool = pool_of(vec![Arc::new(source)]);
    let candidates = pool.candidates(&PackageId::registry("app")).await.unwrap();
    let app = &candidates[0];

    let base: Vec<String> = pool
        .dependencies(app, None)
        .iter()
        .map(|d| d.name().to_string())
        .collect();
    assert_eq!(base, vec!["core"]);

    let socks: Vec<String> = pool
        .dependencies(app, Some("SOCKS"))
        .iter()
        .map(|d| d.name().to_string())
        .collect();
    assert_eq!(socks, vec!["pysocks"]);

    assert!(Arc::ptr_eq(&pool.dependencies(app, None), &pool.dependencies(app, None)));
}

#[tokio::test]
async fn test_fetch_archive_verifies_integrity() {
    let source = MemorySource::new("mem")
        .package("a", "1.0.0", &[])
        .archive("a", "1.0.0", b"payload".to_vec());
    let pool = pool_of(vec![Arc::new(source)]);
    let candidates = pool.candidates(&PackageId::registry("a")).await.unwrap();

    let bytes = pool.fetch_archive(&candidates[0]).await.unwrap();
    assert_eq!(bytes, b"payload");

    let mut tampered = (*candidates[0]).clone();
    tampered.dist.hashes = vec!["sha256:0000".to_string()];
    let error = pool.fetch_archive(&tampered).await.unwrap_err();
    assert!(matches!(error, GroveError::IntegrityFailure { .. }));
}

#[test]
fn test_pool_error_converts_to_grove_error() {
    let error: GroveError = PoolError::NotFound {
        name: "ghost".to_string(),
    }
    .into();
    assert!(matches!(error, GroveError::PackageNotFound { .. }));
}
