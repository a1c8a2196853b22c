//! Execution snapshots
//!
//! An [`ExecutionState`] is everything needed to resume exploring one
//! subtree: the graph, the alternatives still pending in it, and the
//! decisions that led there. Snapshots are deep copies; nothing is shared
//! between a saved state and the live one.

use super::worklist::WorkList;
use crate::domain::config::{CoherenceKind, MemoryModel};
use crate::domain::graph::{Address, Event, ExecutionGraph, LabelKind};
use serde::{Deserialize, Serialize};

/// First heap address handed out
pub const HEAP_BASE: u64 = 0x1000_0000;

/// Bytes per allocated cell
pub const CELL_SIZE: u64 = 8;

/// Decision taken while building the current graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Choice {
    /// Read observes a store
    ReadsFrom {
        /// Read
        read: Event,
        /// Observed store
        rf: Event,
    },
    /// Store placed at an offset of its location's order
    Placement {
        /// Store
        store: Event,
        /// Offset (initializer excluded)
        offset: usize,
    },
    /// Backward revisit taken
    Revisit {
        /// Revisited read
        read: Event,
        /// Revisiting store
        write: Event,
    },
}

impl Choice {
    /// Event the decision is about
    pub const fn event(&self) -> Event {
        match self {
            Self::ReadsFrom { read, .. } | Self::Revisit { read, .. } => *read,
            Self::Placement { store, .. } => *store,
        }
    }
}

/// Bump allocator over the modeled heap
///
/// Fresh blocks start past every block the graph already holds, so
/// replayed allocations and new ones never overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocator {
    base: u64,
}

impl Default for Allocator {
    fn default() -> Self {
        Self { base: HEAP_BASE }
    }
}

impl Allocator {
    /// Address for the next new block
    pub fn allocate(&self, graph: &ExecutionGraph) -> Address {
        let end = graph
            .labels()
            .filter_map(|l| match l.kind() {
                LabelKind::Malloc { addr, size } => Some(addr.0 + (*size).max(1) * CELL_SIZE),
                _ => None,
            })
            .max()
            .unwrap_or(self.base)
            .max(self.base);
        Address(end)
    }

    /// Block containing `addr`, as `(base, malloc event)`
    pub fn block_of(graph: &ExecutionGraph, addr: Address) -> Option<(Address, Event)> {
        graph.labels().find_map(|l| match l.kind() {
            LabelKind::Malloc { addr: base, size } => {
                let end = base.0 + (*size).max(1) * CELL_SIZE;
                (base.0 <= addr.0 && addr.0 < end).then_some((*base, l.pos()))
            }
            _ => None,
        })
    }
}

/// Resumable exploration state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Current candidate execution
    pub graph: ExecutionGraph,
    /// Alternatives pending in this subtree
    pub worklist: WorkList,
    /// Decisions behind the current graph
    pub choices: Vec<Choice>,
    /// Heap allocator
    pub allocator: Allocator,
    /// Most recently added event
    pub last_event: Option<Event>,
}

impl ExecutionState {
    /// Fresh state holding only the initializer
    pub fn new(model: MemoryModel, coherence: CoherenceKind) -> Self {
        Self {
            graph: ExecutionGraph::new(model, coherence),
            worklist: WorkList::new(),
            choices: Vec::new(),
            allocator: Allocator::default(),
            last_event: None,
        }
    }

    /// Child state rooted at `graph`, with nothing pending yet
    pub fn child(&self, graph: ExecutionGraph, choice: Choice) -> Self {
        let mut choices: Vec<Choice> = self
            .choices
            .iter()
            .copied()
            .filter(|c| graph.contains(c.event()))
            .collect();
        choices.push(choice);
        Self {
            graph,
            worklist: WorkList::new(),
            choices,
            allocator: self.allocator,
            last_event: Some(choice.event()),
        }
    }

    /// Drop decisions about events no longer in the graph
    pub fn prune_choices(&mut self) {
        let graph = &self.graph;
        self.choices.retain(|c| graph.contains(c.event()));
    }

    /// Record a decision, replacing an older one about the same event
    pub fn record(&mut self, choice: Choice) {
        self.choices.retain(|c| c.event() != choice.event());
        self.choices.push(choice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::{EventLabel, MemOrdering};

    #[test]
    fn test_allocator_skips_existing_blocks() {
        let mut state = ExecutionState::new(MemoryModel::Rc11, CoherenceKind::DerivedOrder);
        let a = state.allocator.allocate(&state.graph);
        assert_eq!(a, Address(HEAP_BASE));

        state
            .graph
            .add_label(EventLabel::new(
                Event::new(0, 1),
                MemOrdering::NotAtomic,
                LabelKind::Malloc { addr: a, size: 2 },
            ))
            .unwrap();
        let b = state.allocator.allocate(&state.graph);
        assert_eq!(b, Address(HEAP_BASE + 2 * CELL_SIZE));

        assert_eq!(
            Allocator::block_of(&state.graph, Address(HEAP_BASE + CELL_SIZE)),
            Some((a, Event::new(0, 1)))
        );
        assert_eq!(Allocator::block_of(&state.graph, b), None);
    }

    #[test]
    fn test_record_replaces_choice_for_same_event() {
        let mut state = ExecutionState::new(MemoryModel::Rc11, CoherenceKind::DerivedOrder);
        let r = Event::new(1, 1);
        state.record(Choice::ReadsFrom { read: r, rf: Event::INIT });
        state.record(Choice::ReadsFrom { read: r, rf: Event::new(2, 1) });
        assert_eq!(state.choices.len(), 1);
        assert_eq!(state.choices[0], Choice::ReadsFrom { read: r, rf: Event::new(2, 1) });

        state.prune_choices();
        assert!(state.choices.is_empty(), "read is not in the graph");
    }
}
