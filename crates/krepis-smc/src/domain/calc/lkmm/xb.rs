//! Executes-before

use crate::domain::calc::algebra;
use crate::domain::calc::{CalculationResult, Calculator, RelationId, RelationTable};
use crate::domain::graph::ExecutionGraph;

/// `xb = po-loc ∪ rf ∪ co ∪ fr ∪ pb`, must be acyclic
#[derive(Clone, Copy, Debug, Default)]
pub struct XbCalculator;

impl Calculator for XbCalculator {
    fn name(&self) -> &'static str {
        "xb"
    }

    fn init_calc(&self, _graph: &ExecutionGraph, relations: &mut RelationTable) {
        relations.global_mut(RelationId::Xb);
    }

    fn do_calc(&self, graph: &ExecutionGraph, relations: &mut RelationTable) -> CalculationResult {
        let xb = algebra::po_loc(graph)
            .union(&algebra::rf(graph))
            .union(&algebra::co(relations))
            .union(&algebra::fr(graph, relations))
            .union(&algebra::direct(relations, RelationId::Pb));
        let changed = algebra::store_global(relations, RelationId::Xb, &xb);
        let consistent = relations
            .global(RelationId::Xb)
            .map_or(true, |r| r.is_irreflexive());
        CalculationResult::new(changed, consistent)
    }

    fn box_clone(&self) -> Box<dyn Calculator> {
        Box::new(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calc::lkmm::tests::{fence, graph, load, store, X, Y};
    use crate::domain::config::CheckStrength;
    use crate::domain::graph::Event;

    #[test]
    fn test_store_buffering_without_fences_is_allowed() {
        let mut g = graph(2);
        store(&mut g, 1, X, 1);
        load(&mut g, 1, Y, Event::INIT);
        store(&mut g, 2, Y, 1);
        load(&mut g, 2, X, Event::INIT);
        assert!(g.is_consistent(CheckStrength::Full));
    }

    #[test]
    fn test_store_buffering_with_full_fences_is_forbidden() {
        let mut g = graph(2);
        store(&mut g, 1, X, 1);
        fence(&mut g, 1);
        load(&mut g, 1, Y, Event::INIT);
        store(&mut g, 2, Y, 1);
        fence(&mut g, 2);
        load(&mut g, 2, X, Event::INIT);
        assert!(!g.is_consistent(CheckStrength::Full));
        assert!(g.relations().global(RelationId::Pb).is_some());
    }

    #[test]
    fn test_read_after_own_store_sees_it() {
        let mut g = graph(1);
        let w = store(&mut g, 1, X, 1);
        let r = load(&mut g, 1, X, Event::INIT);
        assert!(!g.is_consistent(CheckStrength::Step));
        g.change_rf(r, Some(w)).unwrap();
        assert!(g.is_consistent(CheckStrength::Step));
    }
}
