//! Happens-before
//!
//! Materializes the happens-before views cached on every label as a
//! relation, so later calculators can compose with it.

use super::{CalculationResult, Calculator, RelationId, RelationTable};
use crate::domain::graph::{ExecutionGraph, VectorClock};

/// Happens-before from the label views
#[derive(Clone, Copy, Debug, Default)]
pub struct HbCalculator;

impl Calculator for HbCalculator {
    fn name(&self) -> &'static str {
        "hb"
    }

    fn init_calc(&self, graph: &ExecutionGraph, relations: &mut RelationTable) {
        let labels: Vec<_> = graph.labels().collect();
        let hb = relations.global_mut(RelationId::Hb);
        for b in &labels {
            hb.add_node(b.pos());
            for a in &labels {
                if a.pos() != b.pos() && b.hb().contains(a.pos()) {
                    hb.add_edge(a.pos(), b.pos());
                }
            }
        }
        hb.trans_closure();
    }

    fn do_calc(&self, _graph: &ExecutionGraph, relations: &mut RelationTable) -> CalculationResult {
        let consistent = relations
            .global(RelationId::Hb)
            .map_or(true, |hb| hb.is_irreflexive());
        CalculationResult::new(false, consistent)
    }

    fn box_clone(&self) -> Box<dyn Calculator> {
        Box::new(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{CoherenceKind, MemoryModel};
    use crate::domain::graph::{Event, EventLabel, LabelKind, MemOrdering};

    #[test]
    fn test_hb_follows_program_order() {
        let mut g = ExecutionGraph::new(MemoryModel::Rc11, CoherenceKind::DerivedOrder);
        let f = Event::new(0, 1);
        g.add_label(EventLabel::new(f, MemOrdering::SeqCst, LabelKind::Fence))
            .unwrap();

        let mut rel = RelationTable::new();
        HbCalculator.init_calc(&g, &mut rel);
        assert!(rel.related(RelationId::Hb, Event::INIT, f));
        assert!(!rel.related(RelationId::Hb, f, Event::INIT));
        assert!(HbCalculator.do_calc(&g, &mut rel).consistent);
    }
}
