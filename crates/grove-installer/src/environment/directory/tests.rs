use super::*;
use std::time::Duration;

use grove_cache::pack_files;
use grove_core::{MarkerEnvironment, PackageId};
use grove_registry::{MemorySource, PackageSource, PoolConfig, RetryConfig};
use tempfile::TempDir;

fn archive(files: &[(&str, &str)]) -> Vec<u8> {
    let entries: Vec<(&str, &[u8])> = files.iter().map(|(p, c)| (*p, c.as_bytes())).collect();
    pack_files(&entries).unwrap()
}

fn source() -> MemorySource {
    MemorySource::new("mem")
        .package("a", "1.0.0", &[])
        .package("a", "2.0.0", &[])
        .archive("a", "1.0.0", archive(&[("a/__init__.py", "v1"), ("a/old.py", "old")]))
        .archive("a", "2.0.0", archive(&[("a/__init__.py", "v2"), ("a/new.py", "new")]))
        .package("broken", "1.0.0", &[])
        .archive("broken", "1.0.0", b"not a tarball".to_vec())
}

fn pool_of(source: Arc<MemorySource>) -> Arc<Pool> {
    let config = PoolConfig {
        retry: RetryConfig {
            max_retries: 1,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            multiplier: 1.0,
        },
        fetch_timeout: Duration::from_secs(5),
        environment: MarkerEnvironment::new(),
    };
    Arc::new(Pool::new(vec![source as Arc<dyn PackageSource>], config))
}

fn utf8(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().join("env")).unwrap()
}

async fn candidate(pool: &Pool, name: &str, version: &str) -> Arc<PackageCandidate> {
    pool.candidates(&PackageId::registry(name))
        .await
        .unwrap()
        .iter()
        .find(|c| c.version.to_string() == version)
        .cloned()
        .unwrap()
}

#[tokio::test]
async fn test_install_update_remove() {
    let dir = tempfile::tempdir().unwrap();
    let pool = pool_of(Arc::new(source()));
    let env = DirectoryEnvironment::new(utf8(&dir), pool.clone());
    let handle = env.locate().await.unwrap();
    let tree = handle.root.join("packages/a/a");

    let v1 = candidate(&pool, "a", "1.0.0").await;
    env.execute_operation(&handle, &Operation::Install(v1.clone())).await.unwrap();
    assert_eq!(std::fs::read_to_string(tree.join("__init__.py")).unwrap(), "v1");

    let snapshot = env.installed_snapshot(&handle).await.unwrap();
    assert_eq!(snapshot.len(), 1);
    assert!(snapshot[&v1.id.name].matches(&v1));

    let record: InstallRecord =
        serde_json::from_str(&std::fs::read_to_string(handle.root.join("installed/a.json")).unwrap()).unwrap();
    assert_eq!(record.files, 2);
    assert_eq!(record.integrity, v1.dist.hashes.first().cloned());

    let v2 = candidate(&pool, "a", "2.0.0").await;
    let update = Operation::Update {
        from: InstalledPackage::of(&v1),
        to: v2.clone(),
    };
    env.execute_operation(&handle, &update).await.unwrap();
    assert_eq!(std::fs::read_to_string(tree.join("__init__.py")).unwrap(), "v2");
    assert!(!tree.join("old.py").exists());
    assert!(tree.join("new.py").exists());

    env.execute_operation(&handle, &Operation::Remove(InstalledPackage::of(&v2)))
        .await
        .unwrap();
    assert!(!handle.root.join("packages/a").exists());
    assert!(env.installed_snapshot(&handle).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_integrity_mismatch_installs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let pool = pool_of(Arc::new(source()));
    let env = DirectoryEnvironment::new(utf8(&dir), pool.clone());
    let handle = env.locate().await.unwrap();

    let mut tampered = (*candidate(&pool, "a", "1.0.0").await).clone();
    tampered.dist.hashes = vec![format!("sha256:{}", "0".repeat(64))];
    let error = env
        .execute_operation(&handle, &Operation::Install(Arc::new(tampered)))
        .await
        .unwrap_err();

    assert_eq!(error.kind, OperationErrorKind::Integrity);
    assert!(!handle.root.join("packages/a").exists());
    assert!(!handle.root.join("installed/a.json").exists());
}

#[tokio::test]
async fn test_malformed_archive_is_a_build_error() {
    let dir = tempfile::tempdir().unwrap();
    let pool = pool_of(Arc::new(source()));
    let env = DirectoryEnvironment::new(utf8(&dir), pool.clone());
    let handle = env.locate().await.unwrap();

    let broken = candidate(&pool, "broken", "1.0.0").await;
    let error = env.execute_operation(&handle, &Operation::Install(broken)).await.unwrap_err();
    assert_eq!(error.kind, OperationErrorKind::Build);
    assert!(!handle.root.join("packages/broken").exists());
}

#[tokio::test]
async fn test_transient_download_failure_is_retried() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(source().fail_archive("a", 1));
    let pool = pool_of(source.clone());
    let env = DirectoryEnvironment::new(utf8(&dir), pool.clone());
    let handle = env.locate().await.unwrap();

    let v1 = candidate(&pool, "a", "1.0.0").await;
    env.execute_operation(&handle, &Operation::Install(v1)).await.unwrap();
    assert_eq!(source.archive_fetches(), 2);
}

#[tokio::test]
async fn test_cached_archive_skips_download() {
    let dir = tempfile::tempdir().unwrap();
    let cache_dir = Utf8PathBuf::from_path_buf(dir.path().join("cache")).unwrap();
    let cache = Arc::new(CasStore::new(&cache_dir).unwrap());
    let source = Arc::new(source());
    let pool = pool_of(source.clone());
    let v1 = candidate(&pool, "a", "1.0.0").await;

    for env_name in ["one", "two"] {
        let root = Utf8PathBuf::from_path_buf(dir.path().join(env_name)).unwrap();
        let env = DirectoryEnvironment::new(root, pool.clone()).with_cache(cache.clone());
        let handle = env.locate().await.unwrap();
        env.execute_operation(&handle, &Operation::Install(v1.clone())).await.unwrap();
        assert!(handle.root.join("packages/a/a/__init__.py").is_file());
    }

    assert_eq!(source.archive_fetches(), 1);
    assert_eq!(cache.entries().len(), 1);
}

#[tokio::test]
async fn test_unavailable_environment() {
    let dir = tempfile::tempdir().unwrap();
    let pool = pool_of(Arc::new(source()));

    let file = Utf8PathBuf::from_path_buf(dir.path().join("file")).unwrap();
    std::fs::write(&file, "not a directory").unwrap();
    let error = DirectoryEnvironment::new(file, pool.clone()).locate().await.unwrap_err();
    assert!(error.is_fatal());

    let env = DirectoryEnvironment::new(utf8(&dir), pool.clone());
    let handle = env.locate().await.unwrap();
    std::fs::remove_dir_all(&handle.root).unwrap();
    let v1 = candidate(&pool, "a", "1.0.0").await;
    let error = env.execute_operation(&handle, &Operation::Install(v1)).await.unwrap_err();
    assert!(error.is_fatal());
}

#[tokio::test]
async fn test_corrupt_record_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let env = DirectoryEnvironment::new(utf8(&dir), pool_of(Arc::new(source())));
    let handle = env.locate().await.unwrap();
    std::fs::write(handle.root.join("installed/junk.json"), "{").unwrap();
    std::fs::write(handle.root.join("installed/notes.txt"), "ignored").unwrap();

    assert!(env.installed_snapshot(&handle).await.unwrap().is_empty());
}

#[test]
fn test_failed_swap_restores_previous_tree() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("a");
    std::fs::create_dir(&dest).unwrap();
    std::fs::write(dest.join("__init__.py"), "v1").unwrap();

    // Nothing was staged, so moving the new tree in fails
    let error = swap_tree(&dir.path().join("missing"), &dest, &dir.path().join("previous")).unwrap_err();
    assert!(error.to_string().contains("cannot move package"));
    assert_eq!(std::fs::read_to_string(dest.join("__init__.py")).unwrap(), "v1");
    assert!(!dir.path().join("previous").exists());
}

#[test]
fn test_swap_parks_previous_tree() {
    let dir = tempfile::tempdir().unwrap();
    let tree = dir.path().join("tree");
    let dest = dir.path().join("a");
    std::fs::create_dir(&tree).unwrap();
    std::fs::write(tree.join("__init__.py"), "v2").unwrap();
    std::fs::create_dir(&dest).unwrap();
    std::fs::write(dest.join("__init__.py"), "v1").unwrap();

    swap_tree(&tree, &dest, &dir.path().join("previous")).unwrap();
    assert_eq!(std::fs::read_to_string(dest.join("__init__.py")).unwrap(), "v2");
    assert_eq!(std::fs::read_to_string(dir.path().join("previous/__init__.py")).unwrap(), "v1");
}
