//! Insert and lookup throughput over an in-memory store.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use blockbtree::{BTreeIndex, IndexConfig, MemoryBlockStore, DEFAULT_BLOCK_SIZE};

fn new_index(count: u64) -> BTreeIndex<MemoryBlockStore> {
    let store = MemoryBlockStore::new(DEFAULT_BLOCK_SIZE, count / 20 + 64);
    BTreeIndex::create(store, IndexConfig::new(16, 16)).unwrap()
}

/// Deterministic permutation of `0..count`.
fn scrambled(count: u64) -> Vec<u64> {
    (0..count).map(|i| (i * 7919) % count).collect()
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree_insert");

    for count in [1_000u64, 10_000] {
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::new("sequential", count), &count, |b, &count| {
            b.iter_with_setup(
                || new_index(count),
                |mut index| {
                    for i in 0..count {
                        index.insert(&i.to_be_bytes(), &i.to_le_bytes()).unwrap();
                    }
                    index
                },
            );
        });

        group.bench_with_input(BenchmarkId::new("random", count), &count, |b, &count| {
            b.iter_with_setup(
                || (new_index(count), scrambled(count)),
                |(mut index, keys)| {
                    for i in keys {
                        index.insert(&i.to_be_bytes(), &i.to_le_bytes()).unwrap();
                    }
                    index
                },
            );
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("btree_lookup");

    for count in [1_000u64, 10_000] {
        let mut index = new_index(count);
        for i in scrambled(count) {
            index.insert(&i.to_be_bytes(), &i.to_le_bytes()).unwrap();
        }

        group.bench_with_input(BenchmarkId::new("existing_key", count), &count, |b, &count| {
            let mut i = 0u64;
            b.iter(|| {
                i = (i + 7919) % count;
                black_box(index.lookup(&i.to_be_bytes()).unwrap())
            });
        });

        group.bench_with_input(BenchmarkId::new("missing_key", count), &count, |b, &count| {
            let mut i = 0u64;
            b.iter(|| {
                i += 1;
                black_box(index.lookup(&(count + i).to_be_bytes()).is_err())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_insert, bench_lookup);
criterion_main!(benches);
