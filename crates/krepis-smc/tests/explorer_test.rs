//! Integration Test: Explorer Boundaries
//!
//! Custom detectors plugged in through the read-only graph query, graph
//! invariants after a search, JSON results and the graph-size bound.

use krepis_smc::adapters::{catalog, LitmusInterpreter, LitmusTest};
use krepis_smc::domain::revisit::{ErrorDetector, GraphQuery};
use krepis_smc::{
    CheckerConfig, CoherenceKind, Explorer, Finding, LabelKind, MemOrdering, MemoryModel,
    VerificationResult,
};

/// Flags every execution in which some store writes a watched value
#[derive(Debug)]
struct ValueWatch(i64);

impl ErrorDetector for ValueWatch {
    fn name(&self) -> &'static str {
        "value-watch"
    }

    fn check(&self, graph: GraphQuery<'_>) -> Vec<Finding> {
        graph
            .labels()
            .filter(|l| matches!(l.kind(), LabelKind::Write(w) if w.value == self.0))
            .map(|l| Finding::AssertionViolation {
                thread: l.pos().thread,
                message: format!("stored {}", self.0),
            })
            .collect()
    }
}

#[test]
fn test_custom_detector_sees_consistent_executions() {
    let test = LitmusTest::new("watch")
        .thread(|t| t.store("x", 42, MemOrdering::Relaxed))
        .thread(|t| t.load(0, "x", MemOrdering::Relaxed));
    let mut explorer = Explorer::new(CheckerConfig::default().keep_going())
        .with_detector(Box::new(ValueWatch(42)));
    let result = explorer.run(&mut LitmusInterpreter::new(&test)).unwrap();
    assert_eq!(result.stats.complete, 2);
    assert_eq!(result.findings.len(), 1, "identical findings are reported once");
    assert_eq!(result.findings[0].kind(), "assertion");
}

#[test]
fn test_graphs_keep_their_invariants() {
    for coherence in [CoherenceKind::ExplicitOrder, CoherenceKind::DerivedOrder] {
        for model in [MemoryModel::Sc, MemoryModel::Rc11, MemoryModel::Lkmm] {
            for test in [catalog::sb(), catalog::lock_counter(), catalog::rcu_mp()] {
                let config = CheckerConfig::default()
                    .with_model(model)
                    .with_coherence(coherence)
                    .keep_going();
                let mut explorer = Explorer::new(config);
                explorer.run(&mut LitmusInterpreter::new(&test)).unwrap();
                for state in explorer.frontier() {
                    state.graph.check_invariants().unwrap();
                }
            }
        }
    }
}

#[test]
fn test_result_json_roundtrip() {
    let test = catalog::sb();
    let mut explorer = Explorer::new(CheckerConfig::default().keep_going());
    let result = explorer.run(&mut LitmusInterpreter::new(&test)).unwrap();

    let json = serde_json::to_string(&result).unwrap();
    let back: VerificationResult = serde_json::from_str(&json).unwrap();
    assert_eq!(back.outcomes, result.outcomes);
    assert_eq!(back.stats, result.stats);
}

#[test]
fn test_graph_bound_is_a_warning() {
    let long = LitmusTest::new("long").thread(|mut t| {
        for i in 0..8 {
            t = t.store("x", i, MemOrdering::Relaxed);
        }
        t
    });
    let config = CheckerConfig::default().with_max_thread_events(4);
    let mut explorer = Explorer::new(config);
    let result = explorer.run(&mut LitmusInterpreter::new(&long)).unwrap();
    assert_eq!(result.stats.complete, 0);
    assert!(!result.warnings.is_empty());
    assert!(result.findings.is_empty());
}
