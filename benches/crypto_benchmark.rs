//! Encrypt/decrypt throughput through the engine.
//!
//! Every call derives the record key from the stored material, so these
//! numbers include one HKDF expansion per operation.
//!
//! Run with: `cargo bench --bench crypto_benchmark`

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lockwell::audit::AuditTrail;
use lockwell::clock::ManualClock;
use lockwell::engine::EncryptionEngine;
use lockwell::keys::KeyManager;
use lockwell::store::MemoryCredentialStore;

fn engine() -> EncryptionEngine {
    let audit = AuditTrail::new(Arc::new(ManualClock::starting_now()));
    let keys = Arc::new(KeyManager::new(Arc::new(MemoryCredentialStore::new()), audit.clone()));
    EncryptionEngine::new(keys, audit)
}

fn benchmark_engine(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine");
    let engine = engine();

    let sizes = [("100B", 100), ("1KB", 1024), ("64KB", 64 * 1024)];

    for (name, size) in sizes {
        let payload = vec![0u8; size];
        let sealed = engine.encrypt(&payload).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("encrypt", name), &payload, |b, payload| {
            b.iter(|| engine.encrypt(black_box(payload)).unwrap());
        });
        group.bench_with_input(BenchmarkId::new("decrypt", name), &sealed, |b, sealed| {
            b.iter(|| engine.decrypt(black_box(sealed)).unwrap());
        });
    }
    group.finish();
}

fn benchmark_rotation(c: &mut Criterion) {
    let mut group = c.benchmark_group("rotation");
    group.sample_size(20);

    let engine = engine();
    let records: Vec<Vec<u8>> = (0..100)
        .map(|i| engine.encrypt(format!("record {i}").as_bytes()).unwrap())
        .collect();

    // Each iteration reseals the previous iteration's output, so the batch
    // stays decryptable under the current key.
    let mut current = records;
    group.bench_function("reencrypt_100_records", |b| {
        b.iter(|| {
            current = engine.rotate_reencrypting(black_box(&current)).unwrap();
        });
    });
    group.finish();
}

criterion_group!(benches, benchmark_engine, benchmark_rotation);
criterion_main!(benches);
