//! Propagation order

use super::{po_rel, rfe, strong_fence};
use crate::domain::calc::algebra::{self, Pairs};
use crate::domain::calc::{CalculationResult, Calculator, RelationId, RelationTable};
use crate::domain::graph::ExecutionGraph;

/// `prop`, stored without its identity part
///
/// Consistency requires `co ∪ prop` to be acyclic.
#[derive(Clone, Copy, Debug, Default)]
pub struct PropCalculator;

impl PropCalculator {
    fn prop(graph: &ExecutionGraph, relations: &RelationTable) -> Pairs {
        let rfe = rfe(graph);
        let overwrite = algebra::co(relations)
            .union(&algebra::fr(graph, relations))
            .external();
        let cumul_fence = rfe.opt_seq(&strong_fence(graph, relations).union(&po_rel(graph)));

        // (cumul-fence* ; rfe?) minus identity
        let tail = cumul_fence.plus().seq_opt(&rfe).union(&rfe);
        overwrite
            .union(&tail)
            .union(&overwrite.seq(&tail))
            .filter(|a, b| a != b && !a.is_init())
    }
}

impl Calculator for PropCalculator {
    fn name(&self) -> &'static str {
        "prop"
    }

    fn init_calc(&self, _graph: &ExecutionGraph, relations: &mut RelationTable) {
        relations.global_mut(RelationId::Prop);
    }

    fn do_calc(&self, graph: &ExecutionGraph, relations: &mut RelationTable) -> CalculationResult {
        let prop = Self::prop(graph, relations);
        let consistent = prop.union(&algebra::co(relations)).is_acyclic();
        let changed = algebra::store_global(relations, RelationId::Prop, &prop);
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
    fn test_fre_then_fence_propagates() {
        // T1: Wx; mb; Ry    T2: Wy; mb; Rx=0
        let mut g = graph(2);
        let wx = store(&mut g, 1, X, 1);
        fence(&mut g, 1);
        let ry = load(&mut g, 1, Y, Event::INIT);
        let wy = store(&mut g, 2, Y, 1);
        fence(&mut g, 2);
        let rx = load(&mut g, 2, X, Event::INIT);

        let mut rel = RelationTable::new();
        g.coherence().init_calc(&g, &mut rel);
        let prop = PropCalculator::prop(&g, &rel);
        assert!(prop.contains(rx, wx), "fre");
        assert!(prop.contains(rx, ry), "fre ; mb");
        assert!(prop.contains(ry, wy));
        assert!(prop.iter().all(|(a, b)| a != b));

        // prop alone is not enough to forbid store buffering
        let res = PropCalculator.do_calc(&g, &mut rel);
        assert!(res.changed);
        assert!(res.consistent);
        assert!(!g.is_consistent(CheckStrength::Full), "pb closes the cycle");
    }
}
