//! Strong fences

use super::{gp, mb};
use crate::domain::calc::algebra::{self, Pairs};
use crate::domain::calc::{CalculationResult, Calculator, RelationId, RelationTable};
use crate::domain::graph::ExecutionGraph;

/// `strong-fence = mb ∪ gp ∪ po ; rcu-order ; po`
#[derive(Clone, Copy, Debug, Default)]
pub struct StrongFenceCalculator;

impl Calculator for StrongFenceCalculator {
    fn name(&self) -> &'static str {
        "strong-fence"
    }

    fn init_calc(&self, _graph: &ExecutionGraph, relations: &mut RelationTable) {
        relations.global_mut(RelationId::StrongFence);
    }

    fn do_calc(&self, graph: &ExecutionGraph, relations: &mut RelationTable) -> CalculationResult {
        let po = algebra::po_filtered(graph, |_, _| true);
        let accesses = algebra::id(graph, |l| l.is_access());
        let rcu_fence: Pairs = accesses
            .seq(&po)
            .seq(&algebra::direct(relations, RelationId::RcuOrder))
            .seq(&po)
            .seq(&accesses);
        let fence = mb(graph).union(&gp(graph)).union(&rcu_fence);

        let changed = algebra::store_global(relations, RelationId::StrongFence, &fence);
        CalculationResult::new(changed, true)
    }

    fn box_clone(&self) -> Box<dyn Calculator> {
        Box::new(*self)
    }
}
