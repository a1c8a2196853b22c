//! Integration Test: Parallel Exploration
//!
//! The worker pool must explore exactly the executions the sequential
//! explorer does, whatever the number of workers.

#![cfg(feature = "parallel")]

use krepis_smc::adapters::{catalog, verify, LitmusInterpreter};
use krepis_smc::{CheckerConfig, CoherenceKind, LitmusTest, MemoryModel, WorkerPool};

fn compare(test: &LitmusTest, model: MemoryModel, coherence: CoherenceKind) {
    let config = CheckerConfig::default()
        .with_model(model)
        .with_coherence(coherence)
        .keep_going();
    let sequential = verify(test, &config).unwrap();
    for workers in [2, 4] {
        let parallel = verify(test, &config.clone().with_workers(workers)).unwrap();
        assert_eq!(
            parallel.stats.complete, sequential.stats.complete,
            "{} with {workers} workers under {model}/{coherence}",
            test.name
        );
        assert_eq!(parallel.outcomes, sequential.outcomes, "{}", test.name);
        assert_eq!(parallel.findings.is_empty(), sequential.findings.is_empty());
    }
}

#[test]
fn test_pool_matches_sequential_search() {
    for coherence in [CoherenceKind::ExplicitOrder, CoherenceKind::DerivedOrder] {
        compare(&catalog::sb(), MemoryModel::Rc11, coherence);
        compare(&catalog::mp(), MemoryModel::Ra, coherence);
        compare(&catalog::two_plus_two_w(), MemoryModel::Sc, coherence);
        compare(&catalog::lock_counter(), MemoryModel::Rc11, coherence);
    }
}

#[test]
fn test_pool_halts_on_first_finding() {
    let pool = WorkerPool::new(CheckerConfig::default().with_workers(4));
    let test = catalog::race();
    let result = pool.run(|| LitmusInterpreter::new(&test)).unwrap();
    assert!(!result.is_clean());
    assert!(result.findings.iter().all(|f| f.kind() == "data-race"));
}

#[test]
fn test_single_worker_runs_inline() {
    let pool = WorkerPool::new(CheckerConfig::default().keep_going());
    assert_eq!(pool.workers(), 1);
    let test = catalog::sb();
    let result = pool.run(|| LitmusInterpreter::new(&test)).unwrap();
    assert_eq!(result.stats.complete, 4);
}
