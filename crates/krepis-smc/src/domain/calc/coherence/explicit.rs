//! Explicit per-location coherence order
//!
//! Every location carries a total order of its stores, the initializer
//! implicitly first. Reads may observe any store between the last one they
//! already see and the first one that happens after them.
//!
//! When events can be added out of program order (dependency-tracking
//! graphs refill holes), an access may already have successors. The
//! out-of-order mode then also bounds candidates from above by stores
//! those successors read.

use super::{
    check_location, is_rmw_consumed, is_visible, rmw_source, CoherenceCalculator, StoreLists,
};
use crate::domain::calc::{CalculationResult, Calculator, RelationId, RelationTable};
use crate::domain::graph::{Address, DepView, Event, ExecutionGraph};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;

/// Coherence kept as one explicit total order per location
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplicitOrder {
    stores: StoreLists,
    #[serde(default)]
    out_of_order: bool,
}

impl ExplicitOrder {
    /// Order for graphs whose events may be added out of program order
    pub fn out_of_order() -> Self {
        Self {
            out_of_order: true,
            ..Self::default()
        }
    }

    /// Whether candidates are also bounded by stores read after the access
    #[inline]
    pub const fn is_out_of_order(&self) -> bool {
        self.out_of_order
    }

    /// Position in the order, initializer at 0 and the first store at 1
    fn rank(&self, addr: Address, e: Event) -> Option<usize> {
        if e.is_init() {
            return Some(0);
        }
        self.stores.get(addr).iter().position(|&s| s == e).map(|i| i + 1)
    }
}

impl Calculator for ExplicitOrder {
    fn name(&self) -> &'static str {
        "mo"
    }

    fn init_calc(&self, _graph: &ExecutionGraph, relations: &mut RelationTable) {
        for addr in self.stores.locations() {
            let co = relations.per_loc_mut(RelationId::Co, addr);
            co.add_node(Event::INIT);
            co.add_chain(&self.stores.with_init(addr));
            co.trans_closure();
        }
    }

    fn do_calc(&self, graph: &ExecutionGraph, relations: &mut RelationTable) -> CalculationResult {
        let consistent = self
            .stores
            .locations()
            .into_iter()
            .all(|addr| check_location(graph, relations, addr));
        CalculationResult::new(false, consistent)
    }

    fn remove_after(&mut self, view: &DepView) {
        self.stores.retain_view(view);
    }

    fn box_clone(&self) -> Box<dyn Calculator> {
        Box::new(self.clone())
    }
}

impl CoherenceCalculator for ExplicitOrder {
    fn track_coherence_at_loc(&mut self, addr: Address) {
        self.stores.track(addr);
    }

    fn add_store_to_loc(&mut self, addr: Address, store: Event, offset: usize) {
        self.stores.insert_at(addr, store, offset);
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
        graph: &ExecutionGraph,
        addr: Address,
        store: Event,
    ) -> RangeInclusive<usize> {
        let list: Vec<Event> = self
            .stores
            .get(addr)
            .iter()
            .copied()
            .filter(|&s| s != store)
            .collect();

        if let Some(src) = rmw_source(graph, store) {
            let after = if src.is_init() {
                0
            } else {
                list.iter().position(|&s| s == src).map_or(list.len(), |i| i + 1)
            };
            return after..=after;
        }

        let lo = list
            .iter()
            .rposition(|&s| is_visible(graph, addr, s, store))
            .map_or(0, |i| i + 1);
        let hi = if self.out_of_order {
            list.iter()
                .position(|&s| graph.hb_before(store, s) || read_after(graph, addr, s, store))
                .map_or(list.len(), |i| i.max(lo))
        } else {
            list.len()
        };
        lo..=hi
    }

    fn get_coherent_stores(&self, graph: &ExecutionGraph, read: Event) -> Vec<Event> {
        let Ok(r) = graph.read(read) else {
            return Vec::new();
        };
        let addr = r.addr;
        let is_rmw = r.rmw.is_rmw();
        let all = self.stores.with_init(addr);

        let lo = all
            .iter()
            .rposition(|&s| is_visible(graph, addr, s, read))
            .unwrap_or(0);
        let mut hi = all
            .iter()
            .skip(lo + 1)
            .position(|&s| graph.hb_before(read, s))
            .map_or(all.len(), |i| lo + 1 + i);
        if self.out_of_order {
            if let Some(i) = all[lo..hi].iter().position(|&s| read_after(graph, addr, s, read)) {
                hi = lo + i + 1;
            }
        }

        let (fresh, consumed): (Vec<Event>, Vec<Event>) = all[lo..hi]
            .iter()
            .rev()
            .partition(|&&s| !(is_rmw && is_rmw_consumed(graph, addr, s, read)));
        fresh.into_iter().chain(consumed).collect()
    }

    fn is_co_maximal(&self, _graph: &ExecutionGraph, addr: Address, store: Event) -> bool {
        match self.stores.get(addr).last() {
            Some(&last) => last == store,
            None => store.is_init(),
        }
    }

    fn co_before(&self, _graph: &ExecutionGraph, addr: Address, a: Event, b: Event) -> bool {
        match (self.rank(addr, a), self.rank(addr, b)) {
            (Some(x), Some(y)) => x < y,
            _ => false,
        }
    }
}

/// Some reader of `store` other than `e` happens after `e`
fn read_after(graph: &ExecutionGraph, addr: Address, store: Event, e: Event) -> bool {
    graph
        .readers(addr, store)
        .into_iter()
        .any(|r| r != e && graph.hb_before(e, r))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{CheckStrength, CoherenceKind, MemoryModel};
    use crate::domain::graph::{EventLabel, LabelKind, MemOrdering, ReadLabel, RmwKind, WriteLabel};

    const X: Address = Address(0x40);

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

    fn store(g: &mut ExecutionGraph, thread: usize, value: i64) -> Event {
        let pos = Event::new(thread, g.thread_size(thread));
        g.add_label(EventLabel::new(
            pos,
            MemOrdering::Relaxed,
            LabelKind::Write(WriteLabel::new(X, value, false)),
        ))
        .unwrap();
        pos
    }

    fn load(g: &mut ExecutionGraph, thread: usize) -> Event {
        let pos = Event::new(thread, g.thread_size(thread));
        g.add_label(EventLabel::new(
            pos,
            MemOrdering::Relaxed,
            LabelKind::Read(ReadLabel::new(X, RmwKind::None)),
        ))
        .unwrap();
        pos
    }

    fn graph_of(kind: CoherenceKind) -> ExecutionGraph {
        let mut g = ExecutionGraph::new(MemoryModel::Rc11, kind);
        spawn(&mut g, 1);
        spawn(&mut g, 2);
        g
    }

    fn graph() -> ExecutionGraph {
        graph_of(CoherenceKind::ExplicitOrder)
    }

    #[test]
    fn test_placings_after_visible_stores() {
        let mut g = graph();
        let a = store(&mut g, 1, 1);
        assert_eq!(g.possible_placings(X, a), 0..=0);
        g.add_store_to_loc(X, a, 0);

        let b = store(&mut g, 2, 2);
        assert_eq!(g.possible_placings(X, b), 0..=1);
        g.add_store_to_loc(X, b, 1);

        // same thread as `a`: must go after it
        let c = store(&mut g, 1, 3);
        assert_eq!(g.possible_placings(X, c), 1..=2);
    }

    #[test]
    fn test_coherent_stores_respect_po() {
        let mut g = graph();
        let a = store(&mut g, 1, 1);
        g.add_store_to_loc(X, a, 0);
        let b = store(&mut g, 2, 2);
        g.add_store_to_loc(X, b, 1);

        let r = load(&mut g, 2);
        assert_eq!(g.coherent_stores(r), vec![b]);

        let r1 = load(&mut g, 1);
        assert_eq!(g.coherent_stores(r1), vec![b, a]);
    }

    #[test]
    fn test_order_queries() {
        let mut g = graph();
        let a = store(&mut g, 1, 1);
        g.add_store_to_loc(X, a, 0);
        let b = store(&mut g, 2, 2);
        g.add_store_to_loc(X, b, 0);

        assert!(g.co_before(X, b, a));
        assert!(g.co_before(X, Event::INIT, b));
        assert!(!g.co_before(X, a, b));
        assert!(g.is_co_maximal(X, a));
        assert!(!g.is_co_maximal(X, b));
    }

    #[test]
    fn test_observing_overwritten_store_is_inconsistent() {
        let mut g = graph();
        let a = store(&mut g, 1, 1);
        g.add_store_to_loc(X, a, 0);
        let b = store(&mut g, 1, 2);
        g.add_store_to_loc(X, b, 1);
        let r = load(&mut g, 1);
        g.change_rf(r, Some(a)).unwrap();
        assert!(!g.is_consistent(CheckStrength::Step));

        g.change_rf(r, Some(b)).unwrap();
        assert!(g.is_consistent(CheckStrength::Full));
    }

    #[test]
    fn test_rmw_store_placed_after_source() {
        let mut g = graph();
        let a = store(&mut g, 2, 5);
        g.add_store_to_loc(X, a, 0);

        let r = Event::new(1, g.thread_size(1));
        let mut rl = ReadLabel::new(X, RmwKind::FetchAdd { operand: 1 });
        rl.rf = Some(Event::INIT);
        g.add_label(EventLabel::new(r, MemOrdering::Relaxed, LabelKind::Read(rl)))
            .unwrap();
        let w = Event::new(1, g.thread_size(1));
        g.add_label(EventLabel::new(
            w,
            MemOrdering::Relaxed,
            LabelKind::Write(WriteLabel::new(X, 1, true)),
        ))
        .unwrap();
        assert_eq!(g.possible_placings(X, w), 0..=0);

        g.add_store_to_loc(X, w, 0);
        assert!(g.is_consistent(CheckStrength::Step));

        g.move_store(X, w, 1);
        assert!(!g.is_consistent(CheckStrength::Step), "store between source and update");
    }

    /// Thread 2 stores `a` then `b`; thread 1 holds `first`, followed in
    /// program order by a read of `a`
    fn with_successor_reading_a(
        kind: CoherenceKind,
        first_is_read: bool,
    ) -> (ExecutionGraph, Event, Event, Event) {
        let mut g = graph_of(kind);
        let a = store(&mut g, 2, 1);
        g.add_store_to_loc(X, a, 0);
        let b = store(&mut g, 2, 2);
        g.add_store_to_loc(X, b, 1);
        let first = if first_is_read {
            load(&mut g, 1)
        } else {
            store(&mut g, 1, 3)
        };
        let later = load(&mut g, 1);
        g.change_rf(later, Some(a)).unwrap();
        (g, first, a, b)
    }

    #[test]
    fn test_out_of_order_reads_stop_at_store_read_later() {
        let (g, r, a, b) = with_successor_reading_a(CoherenceKind::ExplicitOrder, true);
        assert_eq!(g.coherent_stores(r), vec![b, a, Event::INIT]);

        let (g, r, a, _) = with_successor_reading_a(CoherenceKind::ExplicitOutOfOrder, true);
        assert_eq!(g.coherent_stores(r), vec![a, Event::INIT]);
    }

    #[test]
    fn test_out_of_order_placings_stop_before_store_read_later() {
        let (g, w, _, _) = with_successor_reading_a(CoherenceKind::ExplicitOrder, false);
        assert_eq!(g.possible_placings(X, w), 0..=2);

        let (g, w, _, _) = with_successor_reading_a(CoherenceKind::ExplicitOutOfOrder, false);
        assert_eq!(g.possible_placings(X, w), 0..=0);
    }
}
