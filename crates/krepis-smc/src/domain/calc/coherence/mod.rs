//! Coherence strategies
//!
//! Two ways of ordering the stores of each location:
//!
//! - [`ExplicitOrder`] keeps one total order per location. A new store is
//!   placed at one of its legal offsets and every other legal offset
//!   becomes a forward revisit.
//! - [`DerivedOrder`] keeps no order at all and computes writes-before on
//!   demand from happens-before and reads-from, treating each chain of
//!   atomic updates ([`RmwLimits`]) as one block. Orders it leaves open are
//!   linearized by the final phase of the full check.
//!
//! Both share the coherence axiom check in [`check_location`].

mod derived;
mod explicit;

pub use derived::{rmw_limits, DerivedOrder, RmwLimits};
pub use explicit::ExplicitOrder;

use super::{CalculationResult, Calculator, RelationId, RelationTable};
use crate::domain::config::CoherenceKind;
use crate::domain::graph::{Address, DepView, Event, ExecutionGraph, VectorClock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

/// Operations every coherence strategy offers to the revisit engine
pub trait CoherenceCalculator: Calculator {
    /// Start tracking a location
    fn track_coherence_at_loc(&mut self, addr: Address);

    /// Insert a store at `offset` (0 is right after the initializer)
    fn add_store_to_loc(&mut self, addr: Address, store: Event, offset: usize);

    /// Forget a store
    fn remove_store(&mut self, addr: Address, store: Event);

    /// Tracked stores of a location, initializer excluded
    fn stores(&self, addr: Address) -> &[Event];

    /// Tracked locations
    fn locations(&self) -> Vec<Address>;

    /// Offsets where `store` may be inserted
    fn get_possible_placings(
        &self,
        graph: &ExecutionGraph,
        addr: Address,
        store: Event,
    ) -> RangeInclusive<usize>;

    /// Stores a read may observe, co-maximal candidate first
    fn get_coherent_stores(&self, graph: &ExecutionGraph, read: Event) -> Vec<Event>;

    /// Reads a new store may backward-revisit
    fn get_coherent_revisits(&self, graph: &ExecutionGraph, write: Event) -> Vec<Event> {
        revisit_candidates(graph, write)
    }

    /// No store is coherence-after `store`
    fn is_co_maximal(&self, graph: &ExecutionGraph, addr: Address, store: Event) -> bool;

    /// `a` is coherence-before `b`
    fn co_before(&self, graph: &ExecutionGraph, addr: Address, a: Event, b: Event) -> bool;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store lists
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-location store sequences
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<(Address, Vec<Event>)>", into = "Vec<(Address, Vec<Event>)>")]
pub struct StoreLists {
    by_loc: BTreeMap<Address, Vec<Event>>,
}

impl From<Vec<(Address, Vec<Event>)>> for StoreLists {
    fn from(pairs: Vec<(Address, Vec<Event>)>) -> Self {
        Self {
            by_loc: pairs.into_iter().collect(),
        }
    }
}

impl From<StoreLists> for Vec<(Address, Vec<Event>)> {
    fn from(lists: StoreLists) -> Self {
        lists.by_loc.into_iter().collect()
    }
}

impl StoreLists {
    fn track(&mut self, addr: Address) {
        self.by_loc.entry(addr).or_default();
    }

    fn insert_at(&mut self, addr: Address, store: Event, offset: usize) {
        let list = self.by_loc.entry(addr).or_default();
        list.retain(|&s| s != store);
        let offset = offset.min(list.len());
        list.insert(offset, store);
    }

    fn remove(&mut self, addr: Address, store: Event) {
        if let Some(list) = self.by_loc.get_mut(&addr) {
            list.retain(|&s| s != store);
        }
    }

    fn get(&self, addr: Address) -> &[Event] {
        self.by_loc.get(&addr).map_or(&[], Vec::as_slice)
    }

    fn locations(&self) -> Vec<Address> {
        self.by_loc.keys().copied().collect()
    }

    fn retain_view(&mut self, view: &DepView) {
        for list in self.by_loc.values_mut() {
            list.retain(|&s| view.contains(s));
        }
    }

    /// Initializer followed by the tracked stores
    fn with_init(&self, addr: Address) -> Vec<Event> {
        std::iter::once(Event::INIT)
            .chain(self.get(addr).iter().copied())
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared queries
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `store` is observed by `e`: it happens before `e`, or one of its
/// readers (other than `e`) does
pub fn is_visible(graph: &ExecutionGraph, addr: Address, store: Event, e: Event) -> bool {
    if store == e {
        return false;
    }
    graph.hb_before(store, e)
        || graph
            .readers(addr, store)
            .into_iter()
            .any(|r| r != e && graph.hb_before(r, e))
}

/// `store` was already consumed by a completed atomic update other than `except`
pub fn is_rmw_consumed(graph: &ExecutionGraph, addr: Address, store: Event, except: Event) -> bool {
    graph
        .readers(addr, store)
        .into_iter()
        .any(|r| r != except && exclusive_write_of(graph, r).is_some())
}

/// Exclusive store completing the atomic update started by `read`
pub fn exclusive_write_of(graph: &ExecutionGraph, read: Event) -> Option<Event> {
    graph.read(read).ok().filter(|r| r.rmw.is_rmw())?;
    let next = read.next();
    graph
        .write(next)
        .ok()
        .filter(|w| w.exclusive)
        .map(|_| next)
}

/// Store whose value an exclusive write's atomic update read
pub fn rmw_source(graph: &ExecutionGraph, write: Event) -> Option<Event> {
    graph.write(write).ok().filter(|w| w.exclusive)?;
    let read = write.prev()?;
    graph.read(read).ok()?.rf
}

/// Reads of the store's location outside the store's revisit prefix
fn revisit_candidates(graph: &ExecutionGraph, write: Event) -> Vec<Event> {
    let Ok(w) = graph.write(write) else {
        return Vec::new();
    };
    let Ok(prefix) = graph.revisit_prefix(write) else {
        return Vec::new();
    };
    graph
        .reads_of(w.addr)
        .filter(|&r| !prefix.contains(r))
        .filter(|&r| graph.read(r).is_ok_and(|l| l.rf != Some(write)))
        .collect()
}

/// Coherence axiom for one location, given its (closed) coherence relation
///
/// Checks that no access observes a store coherence-after its own store,
/// that no read happens before the store it reads, and that nothing
/// intervenes between an atomic update's source and its exclusive store.
pub fn check_location(graph: &ExecutionGraph, relations: &RelationTable, addr: Address) -> bool {
    let Some(co) = relations.per_loc(RelationId::Co, addr) else {
        return true;
    };
    if !co.is_irreflexive() {
        return false;
    }
    let mut stores = vec![Event::INIT];
    stores.extend(graph.writes_to(addr));

    let accesses = graph
        .reads_of(addr)
        .chain(graph.writes_to(addr))
        .collect::<Vec<_>>();
    for e in accesses {
        let own = if graph.write(e).is_ok() {
            e
        } else {
            match graph.read(e).ok().and_then(|r| r.rf) {
                Some(w) => {
                    if graph.hb_before(e, w) && e != w {
                        return false;
                    }
                    w
                }
                None => continue,
            }
        };
        for &s in &stores {
            if s != own && co.relation(own, s) && is_visible(graph, addr, s, e) {
                return false;
            }
        }
    }

    for w in graph.writes_to(addr) {
        let Some(src) = rmw_source(graph, w) else { continue };
        let between = stores
            .iter()
            .any(|&s| s != w && s != src && co.relation(src, s) && co.relation(s, w));
        if between {
            return false;
        }
    }
    true
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Strategy selection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Coherence strategy owned by a graph
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CoherenceStrategy {
    /// Explicit per-location total order
    Explicit(ExplicitOrder),
    /// Writes-before derived on demand
    Derived(DerivedOrder),
}

impl CoherenceStrategy {
    /// Fresh strategy of the given kind
    pub fn new(kind: CoherenceKind) -> Self {
        match kind {
            CoherenceKind::ExplicitOrder => Self::Explicit(ExplicitOrder::default()),
            CoherenceKind::ExplicitOutOfOrder => Self::Explicit(ExplicitOrder::out_of_order()),
            CoherenceKind::DerivedOrder => Self::Derived(DerivedOrder::default()),
        }
    }

    /// Kind of this strategy
    pub const fn kind(&self) -> CoherenceKind {
        match self {
            Self::Explicit(c) if c.is_out_of_order() => CoherenceKind::ExplicitOutOfOrder,
            Self::Explicit(_) => CoherenceKind::ExplicitOrder,
            Self::Derived(_) => CoherenceKind::DerivedOrder,
        }
    }

    fn inner(&self) -> &dyn CoherenceCalculator {
        match self {
            Self::Explicit(c) => c,
            Self::Derived(c) => c,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn CoherenceCalculator {
        match self {
            Self::Explicit(c) => c,
            Self::Derived(c) => c,
        }
    }
}

impl Calculator for CoherenceStrategy {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn init_calc(&self, graph: &ExecutionGraph, relations: &mut RelationTable) {
        self.inner().init_calc(graph, relations);
    }

    fn do_calc(&self, graph: &ExecutionGraph, relations: &mut RelationTable) -> CalculationResult {
        self.inner().do_calc(graph, relations)
    }

    fn remove_after(&mut self, view: &DepView) {
        self.inner_mut().remove_after(view);
    }

    fn box_clone(&self) -> Box<dyn Calculator> {
        Box::new(self.clone())
    }
}

impl CoherenceCalculator for CoherenceStrategy {
    fn track_coherence_at_loc(&mut self, addr: Address) {
        self.inner_mut().track_coherence_at_loc(addr);
    }

    fn add_store_to_loc(&mut self, addr: Address, store: Event, offset: usize) {
        self.inner_mut().add_store_to_loc(addr, store, offset);
    }

    fn remove_store(&mut self, addr: Address, store: Event) {
        self.inner_mut().remove_store(addr, store);
    }

    fn stores(&self, addr: Address) -> &[Event] {
        self.inner().stores(addr)
    }

    fn locations(&self) -> Vec<Address> {
        self.inner().locations()
    }

    fn get_possible_placings(
        &self,
        graph: &ExecutionGraph,
        addr: Address,
        store: Event,
    ) -> RangeInclusive<usize> {
        self.inner().get_possible_placings(graph, addr, store)
    }

    fn get_coherent_stores(&self, graph: &ExecutionGraph, read: Event) -> Vec<Event> {
        self.inner().get_coherent_stores(graph, read)
    }

    fn get_coherent_revisits(&self, graph: &ExecutionGraph, write: Event) -> Vec<Event> {
        self.inner().get_coherent_revisits(graph, write)
    }

    fn is_co_maximal(&self, graph: &ExecutionGraph, addr: Address, store: Event) -> bool {
        self.inner().is_co_maximal(graph, addr, store)
    }

    fn co_before(&self, graph: &ExecutionGraph, addr: Address, a: Event, b: Event) -> bool {
        self.inner().co_before(graph, addr, a, b)
    }
}
