//! Fixpoint driver
//!
//! Initializes every calculator, then repeats monotone rounds in
//! registration order until no relation grows, stopping early on the first
//! inconsistency. The full check adds a combinatorial phase: every
//! location whose coherence is still partial is linearized, trying each
//! combination of linear extensions until one survives another monotone
//! pass.

use super::{RelationId, RelationTable};
use crate::domain::config::CheckStrength;
use crate::domain::graph::{Address, Event, ExecutionGraph};
use crate::domain::relation::Relation;
use tracing::{debug, trace};

/// Memoized verdicts, valid until the graph mutates
#[derive(Clone, Debug, Default)]
pub struct ConsistencyCache {
    step: Option<bool>,
    full: Option<bool>,
    evaluations: u64,
}

impl ConsistencyCache {
    /// Cached verdict for `strength`
    pub const fn get(&self, strength: CheckStrength) -> Option<bool> {
        match strength {
            CheckStrength::Step => self.step,
            CheckStrength::Full => self.full,
        }
    }

    /// Store a fresh verdict
    ///
    /// A full pass implies the step verdict; a failed step implies the full
    /// verdict.
    pub fn record(&mut self, strength: CheckStrength, verdict: bool) {
        self.evaluations += 1;
        match (strength, verdict) {
            (CheckStrength::Full, true) => {
                self.full = Some(true);
                self.step = Some(true);
            }
            (CheckStrength::Full, false) => self.full = Some(false),
            (CheckStrength::Step, false) => {
                self.step = Some(false);
                self.full = Some(false);
            }
            (CheckStrength::Step, true) => self.step = Some(true),
        }
    }

    /// Drop cached verdicts
    pub fn invalidate(&mut self) {
        self.step = None;
        self.full = None;
    }

    /// Verdicts actually computed so far
    pub const fn evaluations(&self) -> u64 {
        self.evaluations
    }
}

/// Initialize every calculator and run to fixpoint
pub fn run(graph: &ExecutionGraph, relations: &mut RelationTable, strength: CheckStrength) -> bool {
    relations.clear();
    for calc in graph.calculator_chain() {
        calc.init_calc(graph, relations);
    }
    if !monotone(graph, relations) {
        return false;
    }
    match strength {
        CheckStrength::Step => true,
        CheckStrength::Full => final_phase(graph, relations),
    }
}

/// Monotone rounds until nothing changes
pub fn monotone(graph: &ExecutionGraph, relations: &mut RelationTable) -> bool {
    let mut rounds = 0usize;
    loop {
        rounds += 1;
        let mut changed = false;
        for calc in graph.calculator_chain() {
            let result = calc.do_calc(graph, relations);
            if !result.consistent {
                trace!(calc = calc.name(), rounds, "inconsistent");
                return false;
            }
            changed |= result.changed;
        }
        if !changed {
            return true;
        }
    }
}

fn final_phase(graph: &ExecutionGraph, relations: &mut RelationTable) -> bool {
    let partial: Vec<(Address, Relation<Event>)> = relations
        .locations(RelationId::Co)
        .into_iter()
        .filter_map(|addr| {
            let co = relations.per_loc(RelationId::Co, addr)?;
            (!co.is_total()).then(|| (addr, co.clone()))
        })
        .collect();
    if partial.is_empty() {
        return true;
    }
    debug!(locations = partial.len(), "linearizing partial coherence");

    let saved = relations.clone();
    let candidates: Vec<&Relation<Event>> = partial.iter().map(|(_, co)| co).collect();
    let found = Relation::combine_all_topo_sort(&candidates, |sorts| {
        *relations = saved.clone();
        for ((addr, _), sort) in partial.iter().zip(sorts) {
            let co = relations.per_loc_mut(RelationId::Co, *addr);
            co.add_chain(sort);
            co.trans_closure();
        }
        monotone(graph, relations)
    });
    if !found {
        *relations = saved;
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_implications() {
        let mut c = ConsistencyCache::default();
        assert_eq!(c.get(CheckStrength::Step), None);

        c.record(CheckStrength::Full, true);
        assert_eq!(c.get(CheckStrength::Step), Some(true));

        c.invalidate();
        c.record(CheckStrength::Step, false);
        assert_eq!(c.get(CheckStrength::Full), Some(false));
        assert_eq!(c.evaluations(), 2);
    }
}
