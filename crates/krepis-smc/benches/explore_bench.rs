//! Exploration Benchmark Suite - Explicit vs Derived Coherence
//!
//! Drives litmus programs of growing size through the explorer with both
//! coherence strategies.
//!
//! # Scenarios
//!
//! 1. **Store-buffering ring**: N threads, each writes its own variable and
//!    reads its neighbour's
//!    - Executions grow as 2^N - 1 under SC, 2^N under RC11
//!
//! 2. **Mutex counter**: N threads increment under one lock
//!    - Exercises lock blocking and backward revisits by unlocks
//!
//! 3. **Fetch-add counter**: N threads race atomic increments
//!    - Exercises atomic-update chains

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use krepis_smc::adapters::{reg, verify, LitmusTest};
use krepis_smc::{CheckerConfig, CoherenceKind, MemOrdering, MemoryModel};

// ============================================================================
// Program generators
// ============================================================================

fn sb_ring(n: usize) -> LitmusTest {
    let mut test = LitmusTest::new(format!("sb-ring-{n}"));
    for i in 0..n {
        let own = format!("x{i}");
        let next = format!("x{}", (i + 1) % n);
        test = test.thread(|t| {
            t.store(own.as_str(), 1, MemOrdering::Relaxed)
                .load(0, next.as_str(), MemOrdering::Relaxed)
        });
    }
    test
}

fn mutex_counter(n: usize) -> LitmusTest {
    let mut test = LitmusTest::new(format!("mutex-counter-{n}"));
    for _ in 0..n {
        test = test.thread(|t| {
            t.lock("m")
                .load(0, "c", MemOrdering::NotAtomic)
                .add(1, reg(0), 1)
                .store("c", reg(1), MemOrdering::NotAtomic)
                .unlock("m")
        });
    }
    test.observe("c")
}

fn fetch_add_counter(n: usize) -> LitmusTest {
    let mut test = LitmusTest::new(format!("faa-counter-{n}"));
    for _ in 0..n {
        test = test.thread(|t| t.fetch_add(0, "c", 1, MemOrdering::Relaxed));
    }
    test.observe("c")
}

fn config(model: MemoryModel, coherence: CoherenceKind) -> CheckerConfig {
    CheckerConfig::default()
        .with_model(model)
        .with_coherence(coherence)
        .keep_going()
}

// ============================================================================
// Benchmarks
// ============================================================================

fn bench_family(c: &mut Criterion, group: &str, model: MemoryModel, make: fn(usize) -> LitmusTest) {
    let mut group = c.benchmark_group(group);
    for n in 2..=4 {
        let test = make(n);
        for coherence in [CoherenceKind::ExplicitOrder, CoherenceKind::DerivedOrder] {
            let config = config(model, coherence);
            group.bench_with_input(BenchmarkId::new(coherence.to_string(), n), &test, |b, test| {
                b.iter(|| {
                    let result = verify(black_box(test), &config).unwrap_or_default();
                    black_box(result.stats.complete)
                });
            });
        }
    }
    group.finish();
}

fn bench_sb_ring(c: &mut Criterion) {
    bench_family(c, "sb_ring_rc11", MemoryModel::Rc11, sb_ring);
    bench_family(c, "sb_ring_sc", MemoryModel::Sc, sb_ring);
}

fn bench_mutex_counter(c: &mut Criterion) {
    bench_family(c, "mutex_counter", MemoryModel::Rc11, mutex_counter);
}

fn bench_fetch_add_counter(c: &mut Criterion) {
    bench_family(c, "fetch_add_counter", MemoryModel::Rc11, fetch_add_counter);
}

criterion_group!(
    benches,
    bench_sb_ring,
    bench_mutex_counter,
    bench_fetch_add_counter
);
criterion_main!(benches);
