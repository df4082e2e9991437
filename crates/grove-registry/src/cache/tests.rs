//! Unit tests for the write-once memo table

use super::*;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

#[tokio::test]
async fn test_first_requester_initializes() {
    let map: OnceMap<String, u32> = OnceMap::new();

    let value = map.get_or_init("a".to_string(), || async { 1 }).await;
    assert_eq!(value, 1);

    // A second initializer never runs once the key is set
    let value = map.get_or_init("a".to_string(), || async { 2 }).await;
    assert_eq!(value, 1);

    let stats = map.stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.hits, 1);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_get_and_contains() {
    let map: OnceMap<u8, &'static str> = OnceMap::default();
    assert!(map.get(&1).is_none());
    assert!(!map.contains(&1));

    map.get_or_init(1, || async { "one" }).await;
    assert_eq!(map.get(&1), Some("one"));
    assert!(map.contains(&1));
}

#[tokio::test]
async fn test_failures_are_memoized_too() {
    let map: OnceMap<&'static str, Result<u32, String>> = OnceMap::new();

    let first = map.get_or_init("broken", || async { Err("offline".to_string()) }).await;
    let second = map.get_or_init("broken", || async { Ok(7) }).await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_concurrent_requesters_share_one_fetch() {
    let map: Arc<OnceMap<&'static str, usize>> = Arc::new(OnceMap::new());
    let runs = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let map = map.clone();
        let runs = runs.clone();
        handles.push(tokio::spawn(async move {
            map.get_or_init("shared", || async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                runs.fetch_add(1, Ordering::SeqCst) + 100
            })
            .await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), 100);
    }
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let stats = map.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 7);
}
