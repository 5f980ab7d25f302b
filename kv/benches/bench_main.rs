use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lockcache::lockset::Lockset;
use lockcache::store::cachekv::CacheKv;
use lockcache::store::memory::MemoryStore;
use lockcache::store::KvStore;

fn cache_flush(c: &mut Criterion) {
    c.bench_function("cachekv: buffer and flush 100 writes", |b| {
        b.iter(|| {
            let mut cache = CacheKv::new(Box::new(MemoryStore::new()));
            for i in 0u32..100 {
                cache.set(&i.to_be_bytes(), vec![0u8; 8]).unwrap();
            }
            cache.write().unwrap();
            black_box(cache);
        })
    });
}

fn lock_round_trip(c: &mut Criterion) {
    let lockset = Lockset::new();
    c.bench_function("lockset: acquire/release a single exclusive lock", |b| {
        b.iter(|| {
            lockset.lock(black_box(&[b"bench"])).unwrap();
            lockset.unlock(black_box(&[b"bench"])).unwrap();
        })
    });
}

fn multi_name_lock_round_trip(c: &mut Criterion) {
    let lockset = Lockset::new();
    c.bench_function("lockset: acquire/release a four-name exclusive group", |b| {
        b.iter(|| {
            let names: [&[u8]; 4] = [b"a", b"b", b"c", b"d"];
            lockset.lock(black_box(&names)).unwrap();
            lockset.unlock(black_box(&names)).unwrap();
        })
    });
}

criterion_group!(benches, cache_flush, lock_round_trip, multi_name_lock_round_trip);
criterion_main!(benches);
