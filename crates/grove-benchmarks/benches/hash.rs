//! Hashing benchmarks: blake3 content addressing, cache writes and the
//! lock content hash

use camino::Utf8PathBuf;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::tempdir;

use grove_benchmarks::{criterion_config, layered_root};
use grove_cache::{CasStore, ContentHash};
use grove_lock::content_hash;

fn archive(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i % 251) as u8).collect()
}

fn bench_content_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("content_hash");

    for size in [1024, 102_400, 10_240_000] {
        let content = archive(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("blake3", size), &content, |b, content| {
            b.iter(|| black_box(ContentHash::of(content)));
        });
    }

    group.finish();
}

fn bench_cas_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("cas_store");
    group.sample_size(20);

    for size in [10_240, 1_024_000] {
        let dir = tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let store = CasStore::new(&root).unwrap();
        let content = archive(size);
        store.store(&content, "warm").unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        // Same bytes again: hashed, found in the index, not rewritten
        group.bench_with_input(BenchmarkId::new("store_existing", size), &content, |b, content| {
            b.iter(|| black_box(store.store(content, "warm").unwrap()));
        });
        let hash = ContentHash::of(&content);
        group.bench_with_input(BenchmarkId::new("get_verified", size), &hash, |b, hash| {
            b.iter(|| black_box(store.get(hash).unwrap().len()));
        });
    }

    group.finish();
}

fn bench_lock_hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("lock_content_hash");

    for width in [10, 100, 1000] {
        let root = layered_root(width);
        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::new("dependencies", width), &root, |b, root| {
            b.iter(|| black_box(content_hash(root)));
        });
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_content_hash, bench_cas_store, bench_lock_hash
}
criterion_main!(benches);
