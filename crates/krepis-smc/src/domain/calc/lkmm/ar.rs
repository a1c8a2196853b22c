//! Acyclicity of the "happens-before" of the kernel model

use super::{ppo, rfe};
use crate::domain::calc::algebra;
use crate::domain::calc::{CalculationResult, Calculator, RelationId, RelationTable};
use crate::domain::graph::ExecutionGraph;

/// `ar = ppo ∪ rfe ∪ (prop ∩ int)`, must be acyclic
#[derive(Clone, Copy, Debug, Default)]
pub struct ArCalculator;

impl Calculator for ArCalculator {
    fn name(&self) -> &'static str {
        "ar"
    }

    fn init_calc(&self, _graph: &ExecutionGraph, relations: &mut RelationTable) {
        relations.global_mut(RelationId::Ar);
    }

    fn do_calc(&self, graph: &ExecutionGraph, relations: &mut RelationTable) -> CalculationResult {
        let prop_int = algebra::direct(relations, RelationId::Prop).internal();
        let ar = ppo(graph).union(&rfe(graph)).union(&prop_int);
        let changed = algebra::store_global(relations, RelationId::Ar, &ar);
        let consistent = relations
            .global(RelationId::Ar)
            .map_or(true, |r| r.is_irreflexive());
        CalculationResult::new(changed, consistent)
    }

    fn box_clone(&self) -> Box<dyn Calculator> {
        Box::new(*self)
    }
}
