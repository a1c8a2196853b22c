//! Integration Test: Snapshot Export and Import
//!
//! A search halted on its first finding is captured, encoded, decoded and
//! resumed; together the two halves must cover exactly the executions of
//! an uninterrupted search.

use krepis_smc::adapters::{catalog, verify, LitmusInterpreter};
use krepis_smc::{
    export_state, import_state, CheckStrength, CheckerConfig, CoherenceKind, Explorer, MemoryModel,
    Snapshot,
};
use std::collections::BTreeSet;

#[test]
fn test_halted_search_resumes_where_it_stopped() {
    let test = catalog::race();
    for coherence in [CoherenceKind::ExplicitOrder, CoherenceKind::DerivedOrder] {
        let config = CheckerConfig::default().with_coherence(coherence);

        let mut first = Explorer::new(config.clone());
        let head = first.run(&mut LitmusInterpreter::new(&test)).unwrap();
        assert_eq!(head.stats.complete, 1);
        assert_eq!(head.findings.len(), 1);

        let json = Snapshot::capture(&first).to_json().unwrap();
        let mut resumed = Snapshot::from_json(&json).unwrap().into_explorer();
        assert_eq!(resumed.config(), &config);
        let tail = resumed.run(&mut LitmusInterpreter::new(&test)).unwrap();
        assert_eq!(tail.stats.complete, 1, "{coherence}");

        let seen: BTreeSet<_> = head.outcomes.keys().chain(tail.outcomes.keys()).cloned().collect();
        let full = verify(&test, &config.clone().keep_going()).unwrap();
        let all: BTreeSet<_> = full.outcomes.keys().cloned().collect();
        assert_eq!(seen, all);
    }
}

#[test]
fn test_snapshot_file_roundtrip() {
    let test = catalog::uaf();
    let mut explorer = Explorer::new(CheckerConfig::default().with_model(MemoryModel::Ra));
    explorer.run(&mut LitmusInterpreter::new(&test)).unwrap();

    let path = std::env::temp_dir().join(format!("krepis-smc-snapshot-{}.json", std::process::id()));
    Snapshot::capture(&explorer).save(&path).unwrap();
    let loaded = Snapshot::load(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded.config.model, MemoryModel::Ra);
    assert_eq!(loaded.frontier.len(), explorer.frontier().len());
    for state in &loaded.frontier {
        state.graph.check_invariants().unwrap();
    }
}

#[test]
fn test_exported_state_is_consistent_after_import() {
    let test = catalog::mp();
    let mut explorer = Explorer::new(CheckerConfig::default().keep_going());
    explorer.run(&mut LitmusInterpreter::new(&test)).unwrap();

    let json = export_state(explorer.state()).unwrap();
    let mut back = import_state(&json).unwrap();
    assert_eq!(back.graph.num_threads(), explorer.graph().num_threads());
    assert_eq!(back.choices.len(), explorer.state().choices.len());
    back.graph.check_invariants().unwrap();
    assert!(back.graph.is_consistent(CheckStrength::Step));
}

#[test]
fn test_missing_snapshot_file_is_an_error() {
    let path = std::env::temp_dir().join("krepis-smc-no-such-snapshot.json");
    assert!(Snapshot::load(&path).is_err());
}
