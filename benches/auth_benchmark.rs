//! Cost of the gate bookkeeping, excluding any real prompt.
//!
//! Run with: `cargo bench --bench auth_benchmark`

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lockwell::clock::ManualClock;
use lockwell::config::SecurityConfig;
use lockwell::gate::testing::AlwaysGrant;
use lockwell::store::MemoryCredentialStore;
use lockwell::DataGuard;

fn fresh_guard() -> DataGuard {
    DataGuard::new(
        Arc::new(MemoryCredentialStore::new()),
        Arc::new(AlwaysGrant::default()),
        Arc::new(ManualClock::starting_now()),
        SecurityConfig::default(),
    )
    .unwrap()
}

fn benchmark_auth(c: &mut Criterion) {
    let mut group = c.benchmark_group("auth");

    let guard = fresh_guard();
    group.bench_function("authenticate_logout_cycle", |b| {
        b.iter(|| {
            let result = guard.authenticate(black_box("unlock"));
            assert!(result.is_success());
            guard.logout();
        });
    });

    let guard = fresh_guard();
    guard.authenticate("unlock");
    group.bench_function("session_check", |b| {
        b.iter(|| black_box(guard.is_session_valid()));
    });

    // Gated call: session touch plus a full decrypt.
    let sealed = guard.encrypt(&[0u8; 1024]).unwrap();
    group.bench_function("guarded_decrypt_1kb", |b| {
        b.iter(|| guard.decrypt(black_box(&sealed)).unwrap());
    });

    group.finish();
}

criterion_group!(benches, benchmark_auth);
criterion_main!(benches);
