//! Calculators and the relation table
//!
//! # Overview
//!
//! A [`Calculator`] derives one relation over the execution graph. Every
//! memory model is a list of calculators in dependency order: later ones may
//! read relations that only earlier ones populate. The fixpoint driver in
//! [`fixpoint`] runs them until nothing changes.
//!
//! ```text
//! coherence ─▶ hb ─▶ [model chain ...] ─▶ final combinatorial phase
//! ```
//!
//! Calculators hold no per-graph state except the coherence strategy's
//! per-location store lists, which follow the graph through
//! [`Calculator::remove_after`].

pub mod algebra;
pub mod coherence;
pub mod fixpoint;
pub mod hb;
pub mod lkmm;
pub mod sc;

pub use coherence::{CoherenceCalculator, CoherenceStrategy, DerivedOrder, ExplicitOrder};
pub use fixpoint::ConsistencyCache;
pub use hb::HbCalculator;
pub use sc::{PscCalculator, ScOrderCalculator};

use crate::domain::config::MemoryModel;
use crate::domain::graph::{Address, DepView, Event, ExecutionGraph};
use crate::domain::relation::Relation;
use std::collections::BTreeMap;
use std::fmt;

/// Identifier of a relation slot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RelationId {
    /// Happens-before
    Hb,
    /// Coherence, per location
    Co,
    /// SC total-order candidate (po ∪ rf ∪ co ∪ fr)
    ScOrder,
    /// Partial SC order over SeqCst events
    Psc,
    /// Propagation
    Prop,
    /// Acyclic ordering
    Ar,
    /// Persists-before
    Pb,
    /// Grace-period link
    RcuLink,
    /// Grace-period ordering
    RcuOrder,
    /// Strong fence
    StrongFence,
    /// Extended coherence
    Xb,
}

/// A relation slot: whole graph or per address
#[derive(Clone, Debug)]
pub enum RelationSlot {
    /// One relation over all events
    Global(Relation<Event>),
    /// One relation per location
    PerLoc(BTreeMap<Address, Relation<Event>>),
}

/// Relations indexed by [`RelationId`]
#[derive(Clone, Debug, Default)]
pub struct RelationTable {
    slots: BTreeMap<RelationId, RelationSlot>,
}

impl RelationTable {
    /// Empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every relation
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Whole-graph relation, if computed
    pub fn global(&self, id: RelationId) -> Option<&Relation<Event>> {
        match self.slots.get(&id) {
            Some(RelationSlot::Global(r)) => Some(r),
            _ => None,
        }
    }

    /// Whole-graph relation, created empty on first use
    pub fn global_mut(&mut self, id: RelationId) -> &mut Relation<Event> {
        let slot = self
            .slots
            .entry(id)
            .or_insert_with(|| RelationSlot::Global(Relation::new()));
        if !matches!(slot, RelationSlot::Global(_)) {
            *slot = RelationSlot::Global(Relation::new());
        }
        match slot {
            RelationSlot::Global(r) => r,
            RelationSlot::PerLoc(_) => unreachable!("slot normalized above"),
        }
    }

    /// Replace a whole-graph relation. Returns whether its edge count grew.
    pub fn replace_global(&mut self, id: RelationId, rel: Relation<Event>) -> bool {
        let before = self.global(id).map_or(0, Relation::edge_count);
        let grew = rel.edge_count() > before;
        self.slots.insert(id, RelationSlot::Global(rel));
        grew
    }

    /// Per-location relation, if computed
    pub fn per_loc(&self, id: RelationId, addr: Address) -> Option<&Relation<Event>> {
        match self.slots.get(&id) {
            Some(RelationSlot::PerLoc(m)) => m.get(&addr),
            _ => None,
        }
    }

    /// Per-location relation, created empty on first use
    pub fn per_loc_mut(&mut self, id: RelationId, addr: Address) -> &mut Relation<Event> {
        let slot = self
            .slots
            .entry(id)
            .or_insert_with(|| RelationSlot::PerLoc(BTreeMap::new()));
        if !matches!(slot, RelationSlot::PerLoc(_)) {
            *slot = RelationSlot::PerLoc(BTreeMap::new());
        }
        match slot {
            RelationSlot::PerLoc(m) => m.entry(addr).or_default(),
            RelationSlot::Global(_) => unreachable!("slot normalized above"),
        }
    }

    /// Locations with a relation under `id`
    pub fn locations(&self, id: RelationId) -> Vec<Address> {
        match self.slots.get(&id) {
            Some(RelationSlot::PerLoc(m)) => m.keys().copied().collect(),
            _ => Vec::new(),
        }
    }

    /// `a` reaches `b` in the per-location relation
    pub fn per_loc_related(&self, id: RelationId, addr: Address, a: Event, b: Event) -> bool {
        self.per_loc(id, addr).is_some_and(|r| r.relation(a, b))
    }

    /// `a` reaches `b` in the whole-graph relation
    pub fn related(&self, id: RelationId, a: Event, b: Event) -> bool {
        self.global(id).is_some_and(|r| r.relation(a, b))
    }
}

/// Outcome of one monotone propagation round
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CalculationResult {
    /// Some edge was added
    pub changed: bool,
    /// The relation is still acyclic / the axiom holds
    pub consistent: bool,
}

impl CalculationResult {
    /// Build a result
    pub const fn new(changed: bool, consistent: bool) -> Self {
        Self { changed, consistent }
    }

    /// Nothing changed, still consistent
    pub const fn unchanged() -> Self {
        Self::new(false, true)
    }
}

/// Pluggable relation builder
pub trait Calculator: fmt::Debug + Send + Sync {
    /// Short name used in traces
    fn name(&self) -> &'static str;

    /// Rebuild the relation from scratch
    fn init_calc(&self, graph: &ExecutionGraph, relations: &mut RelationTable);

    /// One monotone round
    fn do_calc(&self, graph: &ExecutionGraph, relations: &mut RelationTable) -> CalculationResult;

    /// Drop any per-graph state not contained in `view`
    fn remove_after(&mut self, _view: &DepView) {}

    /// Factory used when the graph is deep-copied
    fn box_clone(&self) -> Box<dyn Calculator>;
}

impl Clone for Box<dyn Calculator> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Model-specific calculators in registration (dependency) order
///
/// The coherence strategy is owned separately by the graph and always
/// runs first.
pub fn calculators_for(model: MemoryModel) -> Vec<Box<dyn Calculator>> {
    let mut calcs: Vec<Box<dyn Calculator>> = vec![Box::new(HbCalculator)];
    match model {
        MemoryModel::Sc => calcs.push(Box::new(ScOrderCalculator)),
        MemoryModel::Ra => {}
        MemoryModel::Rc11 => calcs.push(Box::new(PscCalculator)),
        MemoryModel::Lkmm => calcs.extend(lkmm::chain()),
    }
    calcs
}
