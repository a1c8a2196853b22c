//! Sequentially consistent orders
//!
//! [`ScOrderCalculator`] checks `acyclic(po ∪ rf ∪ co ∪ fr)` for the SC
//! model. [`PscCalculator`] builds the partial SC order over SeqCst
//! accesses and fences of RC11:
//!
//! ```text
//! scb      = po ∪ po|≠loc ; hb ; po|≠loc ∪ hb|loc ∪ co ∪ fr
//! psc_base = ([Esc] ∪ [Fsc] ; hb?) ; scb ; ([Esc] ∪ hb? ; [Fsc])
//! psc_F    = [Fsc] ; (hb ∪ hb ; eco ; hb) ; [Fsc]
//! ```

use super::algebra::{self, Pairs};
use super::{CalculationResult, Calculator, RelationId, RelationTable};
use crate::domain::graph::{EventLabel, ExecutionGraph};

/// SC total order candidate
#[derive(Clone, Copy, Debug, Default)]
pub struct ScOrderCalculator;

impl Calculator for ScOrderCalculator {
    fn name(&self) -> &'static str {
        "sc-order"
    }

    fn init_calc(&self, _graph: &ExecutionGraph, relations: &mut RelationTable) {
        relations.global_mut(RelationId::ScOrder);
    }

    fn do_calc(&self, graph: &ExecutionGraph, relations: &mut RelationTable) -> CalculationResult {
        let order = algebra::po(graph)
            .union(&algebra::rf(graph))
            .union(&algebra::co(relations))
            .union(&algebra::fr(graph, relations));
        let changed = algebra::store_global(relations, RelationId::ScOrder, &order);
        let consistent = relations
            .global(RelationId::ScOrder)
            .map_or(true, |r| r.is_irreflexive());
        CalculationResult::new(changed, consistent)
    }

    fn box_clone(&self) -> Box<dyn Calculator> {
        Box::new(*self)
    }
}

/// Partial SC order (RC11)
#[derive(Clone, Copy, Debug, Default)]
pub struct PscCalculator;

fn same_loc(a: &EventLabel, b: &EventLabel) -> bool {
    a.addr().is_some() && a.addr() == b.addr()
}

impl PscCalculator {
    fn psc(graph: &ExecutionGraph, relations: &RelationTable) -> Pairs {
        let hb = algebra::global(relations, RelationId::Hb);
        let co = algebra::co(relations);
        let fr = algebra::fr(graph, relations);
        let rf = algebra::rf(graph);

        let po = algebra::po(graph);
        let po_nl = algebra::po_filtered(graph, |a, b| !same_loc(a, b));
        let hb_loc = hb.filter(|a, b| match (graph.get(a), graph.get(b)) {
            (Ok(a), Ok(b)) => same_loc(a, b),
            _ => false,
        });
        let scb = po
            .union(&po_nl.seq(&hb).seq(&po_nl))
            .union(&hb_loc)
            .union(&co)
            .union(&fr);

        let e_sc = algebra::id(graph, |l| l.is_sc() && l.is_access());
        let f_sc = algebra::id(graph, |l| l.is_sc() && l.is_fence());
        let left = e_sc.union(&f_sc.seq_opt(&hb));
        let right = e_sc.union(&hb.opt_seq(&f_sc));
        let psc_base = left.seq(&scb).seq(&right);

        let eco = rf.union(&co).union(&fr).union(&co.seq(&rf)).union(&fr.seq(&rf));
        let psc_f = f_sc
            .seq(&hb.union(&hb.seq(&eco).seq(&hb)))
            .seq(&f_sc);
        psc_base.union(&psc_f)
    }
}

impl Calculator for PscCalculator {
    fn name(&self) -> &'static str {
        "psc"
    }

    fn init_calc(&self, _graph: &ExecutionGraph, relations: &mut RelationTable) {
        relations.global_mut(RelationId::Psc);
    }

    fn do_calc(&self, graph: &ExecutionGraph, relations: &mut RelationTable) -> CalculationResult {
        if !graph.labels().any(EventLabel::is_sc) {
            return CalculationResult::unchanged();
        }
        let psc = Self::psc(graph, relations);
        let changed = algebra::store_global(relations, RelationId::Psc, &psc);
        let consistent = relations
            .global(RelationId::Psc)
            .map_or(true, |r| r.is_irreflexive());
        CalculationResult::new(changed, consistent)
    }

    fn box_clone(&self) -> Box<dyn Calculator> {
        Box::new(*self)
    }
}
