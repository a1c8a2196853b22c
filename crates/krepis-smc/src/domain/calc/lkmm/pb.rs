//! Propagates-before

use super::strong_fence;
use crate::domain::calc::algebra;
use crate::domain::calc::{CalculationResult, Calculator, RelationId, RelationTable};
use crate::domain::graph::ExecutionGraph;

/// `pb = prop ; strong-fence ; ar*`, must be acyclic
#[derive(Clone, Copy, Debug, Default)]
pub struct PbCalculator;

impl Calculator for PbCalculator {
    fn name(&self) -> &'static str {
        "pb"
    }

    fn init_calc(&self, _graph: &ExecutionGraph, relations: &mut RelationTable) {
        relations.global_mut(RelationId::Pb);
    }

    fn do_calc(&self, graph: &ExecutionGraph, relations: &mut RelationTable) -> CalculationResult {
        let prop = algebra::direct(relations, RelationId::Prop);
        let ar = algebra::global(relations, RelationId::Ar);
        let pb = prop.opt_seq(&strong_fence(graph, relations)).seq_opt(&ar);
        let changed = algebra::store_global(relations, RelationId::Pb, &pb);
        let consistent = relations
            .global(RelationId::Pb)
            .map_or(true, |r| r.is_irreflexive());
        CalculationResult::new(changed, consistent)
    }

    fn box_clone(&self) -> Box<dyn Calculator> {
        Box::new(*self)
    }
}
