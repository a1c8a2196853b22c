//! Writes-before coherence
//!
//! No order is stored. `wb(w1, w2)` holds when `w1` happens before `w2` or
//! before one of `w2`'s readers. Atomic updates glue their exclusive store
//! right after its source, so every chain of updates behaves as one block:
//! an edge into or out of any member is lifted to the whole chain.
//!
//! ```text
//!   a ──▶ s1          chain  s1 ─▶ u1 ─▶ u2
//!                     lifted a ──▶ s1,  u2 ──▶ b
//!   u1 ──▶ b
//! ```
//!
//! Two updates of the same source cannot both sit right after it; such a
//! location gets no limits and is reported inconsistent.

use super::{
    check_location, is_rmw_consumed, is_visible, rmw_source, CoherenceCalculator, StoreLists,
};
use crate::domain::calc::{CalculationResult, Calculator, RelationId, RelationTable};
use crate::domain::graph::{Address, DepView, Event, ExecutionGraph};
use crate::domain::relation::Relation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

/// Bounds of the atomic-update chain every store of a location belongs to
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RmwLimits {
    lower: BTreeMap<Event, Event>,
    upper: BTreeMap<Event, Event>,
}

impl RmwLimits {
    /// First store of the chain holding `store`
    pub fn lower(&self, store: Event) -> Event {
        self.lower.get(&store).copied().unwrap_or(store)
    }

    /// Last store of the chain holding `store`
    pub fn upper(&self, store: Event) -> Event {
        self.upper.get(&store).copied().unwrap_or(store)
    }

    /// `a` and `b` belong to the same chain
    pub fn same_chain(&self, a: Event, b: Event) -> bool {
        self.lower(a) == self.lower(b)
    }
}

/// Chain bounds of the initializer and `stores`
///
/// `None` when some store is the source of two exclusive stores.
pub fn rmw_limits(graph: &ExecutionGraph, stores: &[Event]) -> Option<RmwLimits> {
    let mut next: BTreeMap<Event, Event> = BTreeMap::new();
    let mut prev: BTreeMap<Event, Event> = BTreeMap::new();
    for &w in stores {
        let Some(src) = rmw_source(graph, w) else { continue };
        if !src.is_init() && !stores.contains(&src) {
            continue;
        }
        if next.insert(src, w).is_some() {
            return None;
        }
        prev.insert(w, src);
    }

    let walk = |map: &BTreeMap<Event, Event>, from: Event| {
        let mut at = from;
        for _ in 0..=stores.len() {
            match map.get(&at) {
                Some(&n) => at = n,
                None => return Some(at),
            }
        }
        None
    };
    let mut limits = RmwLimits::default();
    for s in std::iter::once(Event::INIT).chain(stores.iter().copied()) {
        limits.lower.insert(s, walk(&prev, s)?);
        limits.upper.insert(s, walk(&next, s)?);
    }
    Some(limits)
}

/// Coherence derived on demand from happens-before and reads-from
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedOrder {
    stores: StoreLists,
}

impl DerivedOrder {
    /// Closed writes-before relation of a location, grown from `seed`
    fn derive(
        &self,
        graph: &ExecutionGraph,
        addr: Address,
        seed: Option<&Relation<Event>>,
    ) -> Relation<Event> {
        let all = self.stores.with_init(addr);
        let stores = &all[1..];
        let mut rel = seed.cloned().unwrap_or_default();
        rel.add_node(Event::INIT);
        for &s in stores {
            rel.add_edge(Event::INIT, s);
        }

        for &w2 in stores {
            let mut observers = graph.readers(addr, w2);
            observers.push(w2);
            for &w1 in stores.iter().filter(|&&w1| w1 != w2) {
                if observers.iter().any(|&e| graph.hb_before(w1, e)) {
                    rel.add_edge(w1, w2);
                }
            }
            if let Some(src) = rmw_source(graph, w2) {
                rel.add_edge(src, w2);
            }
        }

        let Some(limits) = rmw_limits(graph, stores) else {
            rel.add_edge(Event::INIT, Event::INIT);
            rel.trans_closure();
            return rel;
        };
        loop {
            rel.trans_closure();
            let lifted: Vec<(Event, Event)> = rel
                .edges()
                .filter(|&(a, b)| !limits.same_chain(a, b))
                .map(|(a, b)| (limits.upper(a), limits.lower(b)))
                .filter(|&(a, b)| !rel.relation(a, b))
                .collect();
            if lifted.is_empty() {
                break;
            }
            for (a, b) in lifted {
                rel.add_edge(a, b);
            }
        }
        rel
    }
}

impl Calculator for DerivedOrder {
    fn name(&self) -> &'static str {
        "wb"
    }

    fn init_calc(&self, graph: &ExecutionGraph, relations: &mut RelationTable) {
        for addr in self.stores.locations() {
            *relations.per_loc_mut(RelationId::Co, addr) = self.derive(graph, addr, None);
        }
    }

    fn do_calc(&self, graph: &ExecutionGraph, relations: &mut RelationTable) -> CalculationResult {
        let mut changed = false;
        for addr in self.stores.locations() {
            let current = relations.per_loc(RelationId::Co, addr);
            let before = current.map_or(0, Relation::edge_count);
            let grown = self.derive(graph, addr, current);
            changed |= grown.edge_count() > before;
            *relations.per_loc_mut(RelationId::Co, addr) = grown;
        }
        let consistent = self
            .stores
            .locations()
            .into_iter()
            .all(|addr| check_location(graph, relations, addr));
        CalculationResult::new(changed, consistent)
    }

    fn remove_after(&mut self, view: &DepView) {
        self.stores.retain_view(view);
    }

    fn box_clone(&self) -> Box<dyn Calculator> {
        Box::new(self.clone())
    }
}

impl CoherenceCalculator for DerivedOrder {
    fn track_coherence_at_loc(&mut self, addr: Address) {
        self.stores.track(addr);
    }

    fn add_store_to_loc(&mut self, addr: Address, store: Event, _offset: usize) {
        let end = self.stores.get(addr).len();
        self.stores.insert_at(addr, store, end);
    }

    fn remove_store(&mut self, addr: Address, store: Event) {
        self.stores.remove(addr, store);
    }

    fn stores(&self, addr: Address) -> &[Event] {
        self.stores.get(addr)
    }

    fn locations(&self) -> Vec<Address> {
        self.stores.locations()
    }

    fn get_possible_placings(
        &self,
        _graph: &ExecutionGraph,
        addr: Address,
        store: Event,
    ) -> RangeInclusive<usize> {
        let end = self.stores.get(addr).iter().filter(|&&s| s != store).count();
        end..=end
    }

    fn get_coherent_stores(&self, graph: &ExecutionGraph, read: Event) -> Vec<Event> {
        let Ok(r) = graph.read(read) else {
            return Vec::new();
        };
        let addr = r.addr;
        let is_rmw = r.rmw.is_rmw();
        let wb = self.derive(graph, addr, None);
        let all = self.stores.with_init(addr);
        let visible: Vec<Event> = all
            .iter()
            .copied()
            .filter(|&s| is_visible(graph, addr, s, read))
            .collect();

        let candidates: Vec<Event> = all
            .iter()
            .copied()
            .filter(|&s| !graph.hb_before(read, s))
            .filter(|&s| !visible.iter().any(|&v| v != s && wb.relation(s, v)))
            .collect();

        let mut order = Relation::from_nodes(candidates.iter().copied());
        for &a in &candidates {
            for &b in &candidates {
                if a != b && wb.relation(a, b) {
                    order.add_edge(a, b);
                }
            }
        }
        let mut sorted = order.topo_sort().unwrap_or(candidates);
        sorted.reverse();
        let (fresh, consumed): (Vec<Event>, Vec<Event>) = sorted
            .into_iter()
            .partition(|&s| !(is_rmw && is_rmw_consumed(graph, addr, s, read)));
        fresh.into_iter().chain(consumed).collect()
    }

    fn is_co_maximal(&self, graph: &ExecutionGraph, addr: Address, store: Event) -> bool {
        let wb = self.derive(graph, addr, None);
        !self
            .stores
            .get(addr)
            .iter()
            .any(|&t| t != store && wb.relation(store, t))
    }

    fn co_before(&self, graph: &ExecutionGraph, addr: Address, a: Event, b: Event) -> bool {
        self.derive(graph, addr, None).relation(a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{CheckStrength, CoherenceKind, MemoryModel};
    use crate::domain::graph::{EventLabel, LabelKind, MemOrdering, ReadLabel, RmwKind, WriteLabel};

    const X: Address = Address(0x80);

    fn spawn(g: &mut ExecutionGraph, thread: usize) {
        let create = Event::new(0, g.thread_size(0));
        g.add_label(EventLabel::new(
            create,
            MemOrdering::Relaxed,
            LabelKind::ThreadCreate { child: thread },
        ))
        .unwrap();
        g.add_label(EventLabel::new(
            Event::thread_start(thread),
            MemOrdering::Relaxed,
            LabelKind::ThreadStart { create: Some(create) },
        ))
        .unwrap();
    }

    fn store(g: &mut ExecutionGraph, thread: usize, value: i64, exclusive: bool) -> Event {
        let pos = Event::new(thread, g.thread_size(thread));
        g.add_label(EventLabel::new(
            pos,
            MemOrdering::Relaxed,
            LabelKind::Write(WriteLabel::new(X, value, exclusive)),
        ))
        .unwrap();
        g.add_store_to_loc(X, pos, usize::MAX);
        pos
    }

    fn load(g: &mut ExecutionGraph, thread: usize, rmw: RmwKind, rf: Option<Event>) -> Event {
        let pos = Event::new(thread, g.thread_size(thread));
        let mut r = ReadLabel::new(X, rmw);
        r.rf = rf;
        g.add_label(EventLabel::new(pos, MemOrdering::Relaxed, LabelKind::Read(r)))
            .unwrap();
        pos
    }

    fn graph() -> ExecutionGraph {
        let mut g = ExecutionGraph::new(MemoryModel::Rc11, CoherenceKind::DerivedOrder);
        spawn(&mut g, 1);
        spawn(&mut g, 2);
        g
    }

    #[test]
    fn test_unordered_stores_are_both_candidates() {
        let mut g = graph();
        let a = store(&mut g, 1, 1, false);
        let b = store(&mut g, 2, 2, false);
        let r = load(&mut g, 2, RmwKind::None, None);

        let cands = g.coherent_stores(r);
        assert_eq!(cands.len(), 2, "{cands:?}");
        assert!(cands.contains(&a));
        assert!(cands.contains(&b));
        assert!(!g.co_before(X, a, b));
        assert!(!g.co_before(X, b, a));
    }

    #[test]
    fn test_reader_orders_stores() {
        let mut g = graph();
        let a = store(&mut g, 1, 1, false);
        let b = store(&mut g, 2, 2, false);
        // thread 1 read of b after its own store a: wb(a, b)
        load(&mut g, 1, RmwKind::None, Some(b));
        assert!(g.co_before(X, a, b));
        assert!(g.is_co_maximal(X, b));
        assert!(!g.is_co_maximal(X, a));
        assert!(g.is_consistent(CheckStrength::Full));
    }

    #[test]
    fn test_two_updates_of_one_source_are_inconsistent() {
        let mut g = graph();
        let r1 = load(&mut g, 1, RmwKind::FetchAdd { operand: 1 }, Some(Event::INIT));
        store(&mut g, 1, 1, true);
        assert!(g.is_consistent(CheckStrength::Step));

        let cands = {
            let r2 = load(&mut g, 2, RmwKind::FetchAdd { operand: 1 }, None);
            g.coherent_stores(r2)
        };
        assert_eq!(cands.last(), Some(&Event::INIT), "consumed source goes last");

        let r2 = Event::new(2, 1);
        g.change_rf(r2, Some(Event::INIT)).unwrap();
        store(&mut g, 2, 1, true);
        assert!(!g.is_consistent(CheckStrength::Step));
        assert_eq!(g.read(r1).unwrap().rf, Some(Event::INIT));
    }

    #[test]
    fn test_update_chain_moves_as_one_block() {
        let mut g = graph();
        let a = store(&mut g, 1, 5, false);
        load(&mut g, 2, RmwKind::FetchAdd { operand: 1 }, Some(Event::INIT));
        let u1 = store(&mut g, 2, 1, true);
        load(&mut g, 2, RmwKind::FetchAdd { operand: 1 }, Some(u1));
        let u2 = store(&mut g, 2, 2, true);

        let limits = rmw_limits(&g, g.stores(X)).unwrap();
        assert_eq!(limits.lower(u2), Event::INIT);
        assert_eq!(limits.upper(Event::INIT), u2);
        assert_eq!(limits.lower(a), a);
        assert_eq!(limits.upper(a), a);
        assert!(limits.same_chain(u1, u2));
        assert!(!limits.same_chain(a, u1));

        // the initializer precedes `a`, so the whole chain does
        assert!(g.co_before(X, u1, a));
        assert!(g.co_before(X, u2, a));
        assert!(!g.co_before(X, a, u1));
        assert!(g.is_co_maximal(X, a));
        assert!(g.is_consistent(CheckStrength::Full));
    }

    #[test]
    fn test_conflicting_updates_have_no_limits() {
        let mut g = graph();
        load(&mut g, 1, RmwKind::FetchAdd { operand: 1 }, Some(Event::INIT));
        let w1 = store(&mut g, 1, 1, true);
        load(&mut g, 2, RmwKind::FetchAdd { operand: 1 }, Some(Event::INIT));
        let w2 = store(&mut g, 2, 1, true);

        assert_eq!(rmw_limits(&g, g.stores(X)), None);
        assert!(!g.is_consistent(CheckStrength::Step));
        // the conflict does not invent an order between the two updates
        assert!(!g.co_before(X, w1, w2));
        assert!(!g.co_before(X, w2, w1));
    }

    #[test]
    fn test_placing_is_append_only() {
        let mut g = graph();
        let a = store(&mut g, 1, 1, false);
        let b = store(&mut g, 2, 1, false);
        assert_eq!(g.possible_placings(X, b), 1..=1);
        assert_eq!(g.stores(X), &[a, b]);
    }
}
