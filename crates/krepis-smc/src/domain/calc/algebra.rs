//! Relational algebra over event pairs
//!
//! Model calculators are mostly written as compositions of the base
//! relations (po, rf, co, fr). [`Pairs`] keeps them as explicit edge sets,
//! and hands them to [`Relation`] only when reachability is needed.

use super::{RelationId, RelationTable};
use crate::domain::graph::{Event, EventLabel, ExecutionGraph};
use crate::domain::relation::Relation;
use std::collections::{BTreeMap, BTreeSet};

/// Finite binary relation as an explicit edge set
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pairs(BTreeSet<(Event, Event)>);

impl Pairs {
    /// Empty relation
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge
    pub fn insert(&mut self, a: Event, b: Event) -> bool {
        self.0.insert((a, b))
    }

    /// Edge present
    pub fn contains(&self, a: Event, b: Event) -> bool {
        self.0.contains(&(a, b))
    }

    /// Edges in order
    pub fn iter(&self) -> impl Iterator<Item = (Event, Event)> + '_ {
        self.0.iter().copied()
    }

    /// Edge count
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// No edges
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `self ∪ other`
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).copied().collect())
    }

    /// `self ∩ other`
    #[must_use]
    pub fn intersect(&self, other: &Self) -> Self {
        Self(self.0.intersection(&other.0).copied().collect())
    }

    /// Relational composition `self ; other`
    #[must_use]
    pub fn seq(&self, other: &Self) -> Self {
        let mut by_source: BTreeMap<Event, Vec<Event>> = BTreeMap::new();
        for (a, b) in other.iter() {
            by_source.entry(a).or_default().push(b);
        }
        let mut out = Self::new();
        for (a, mid) in self.iter() {
            for &c in by_source.get(&mid).into_iter().flatten() {
                out.insert(a, c);
            }
        }
        out
    }

    /// `self? ; other`, i.e. `other ∪ self ; other`
    #[must_use]
    pub fn opt_seq(&self, other: &Self) -> Self {
        other.union(&self.seq(other))
    }

    /// `self ; other?`
    #[must_use]
    pub fn seq_opt(&self, other: &Self) -> Self {
        self.union(&self.seq(other))
    }

    /// Transitive closure
    #[must_use]
    pub fn plus(&self) -> Self {
        let mut rel = self.to_relation();
        rel.trans_closure();
        let nodes = rel.nodes().to_vec();
        let mut out = Self::new();
        for &a in &nodes {
            for b in rel.reachable(a) {
                out.insert(a, b);
            }
        }
        out
    }

    /// `self ; r*`, i.e. `self ∪ self ; r+`
    #[must_use]
    pub fn seq_star(&self, r: &Self) -> Self {
        self.union(&self.seq(&r.plus()))
    }

    /// `r* ; self`
    #[must_use]
    pub fn star_seq(r: &Self, other: &Self) -> Self {
        other.union(&r.plus().seq(other))
    }

    /// Keep edges satisfying `pred`
    #[must_use]
    pub fn filter(&self, mut pred: impl FnMut(Event, Event) -> bool) -> Self {
        Self(self.0.iter().copied().filter(|&(a, b)| pred(a, b)).collect())
    }

    /// Edges between different threads
    #[must_use]
    pub fn external(&self) -> Self {
        self.filter(|a, b| a.thread != b.thread)
    }

    /// Edges inside one thread
    #[must_use]
    pub fn internal(&self) -> Self {
        self.filter(|a, b| a.thread == b.thread)
    }

    /// Reverse every edge
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self(self.0.iter().map(|&(a, b)| (b, a)).collect())
    }

    /// Same edges as a reachability relation (not yet closed)
    pub fn to_relation(&self) -> Relation<Event> {
        let mut rel = Relation::new();
        for (a, b) in self.iter() {
            rel.add_edge(a, b);
        }
        rel
    }

    /// No cycle
    pub fn is_acyclic(&self) -> bool {
        let mut rel = self.to_relation();
        rel.trans_closure();
        rel.is_irreflexive()
    }

    /// No `(e, e)` edge
    pub fn is_irreflexive(&self) -> bool {
        self.0.iter().all(|(a, b)| a != b)
    }
}

impl FromIterator<(Event, Event)> for Pairs {
    fn from_iter<I: IntoIterator<Item = (Event, Event)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl Extend<(Event, Event)> for Pairs {
    fn extend<I: IntoIterator<Item = (Event, Event)>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Base relations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Program order over non-hole labels (transitive)
pub fn po(graph: &ExecutionGraph) -> Pairs {
    po_filtered(graph, |_, _| true)
}

/// Program order restricted to pairs of labels satisfying `pred`
pub fn po_filtered(
    graph: &ExecutionGraph,
    mut pred: impl FnMut(&EventLabel, &EventLabel) -> bool,
) -> Pairs {
    let mut out = Pairs::new();
    for t in 0..graph.num_threads() {
        let labels: Vec<&EventLabel> = graph.thread(t).iter().filter(|l| !l.is_empty()).collect();
        for (i, a) in labels.iter().enumerate() {
            for b in &labels[i + 1..] {
                if pred(a, b) {
                    out.insert(a.pos(), b.pos());
                }
            }
        }
    }
    out
}

/// Program order between accesses of the same location
pub fn po_loc(graph: &ExecutionGraph) -> Pairs {
    po_filtered(graph, |a, b| a.addr().is_some() && a.addr() == b.addr())
}

/// Reads-from, store to read
pub fn rf(graph: &ExecutionGraph) -> Pairs {
    graph
        .labels()
        .filter_map(|l| l.as_read().and_then(|r| r.rf).map(|w| (w, l.pos())))
        .collect()
}

/// Coherence as computed so far (closed, all locations)
pub fn co(relations: &RelationTable) -> Pairs {
    let mut out = Pairs::new();
    for addr in relations.locations(RelationId::Co) {
        if let Some(rel) = relations.per_loc(RelationId::Co, addr) {
            for &a in rel.nodes() {
                out.extend(rel.reachable(a).map(|b| (a, b)));
            }
        }
    }
    out
}

/// From-reads: a read precedes every store co-after the one it observes
pub fn fr(graph: &ExecutionGraph, relations: &RelationTable) -> Pairs {
    let mut out = Pairs::new();
    for lab in graph.labels() {
        let Some(r) = lab.as_read() else { continue };
        let Some(w) = r.rf else { continue };
        if let Some(rel) = relations.per_loc(RelationId::Co, r.addr) {
            out.extend(rel.reachable(w).map(|s| (lab.pos(), s)));
        }
    }
    out
}

/// Identity on labels satisfying `pred`
pub fn id(graph: &ExecutionGraph, mut pred: impl FnMut(&EventLabel) -> bool) -> Pairs {
    graph
        .labels()
        .filter(|l| pred(l))
        .map(|l| (l.pos(), l.pos()))
        .collect()
}

/// Events of a relation table slot as pairs (closed)
pub fn global(relations: &RelationTable, slot: RelationId) -> Pairs {
    let mut out = Pairs::new();
    if let Some(rel) = relations.global(slot) {
        for &a in rel.nodes() {
            out.extend(rel.reachable(a).map(|b| (a, b)));
        }
    }
    out
}

/// Direct (unclosed) edges of a relation table slot
pub fn direct(relations: &RelationTable, slot: RelationId) -> Pairs {
    relations
        .global(slot)
        .map(|rel| rel.edges().collect())
        .unwrap_or_default()
}

/// Store a pair set in a whole-graph slot, closed; returns whether it grew
pub fn store_global(relations: &mut RelationTable, slot: RelationId, pairs: &Pairs) -> bool {
    let mut rel = pairs.to_relation();
    rel.trans_closure();
    relations.replace_global(slot, rel)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(t: usize, i: usize) -> Event {
        Event::new(t, i)
    }

    #[test]
    fn test_seq_composes() {
        let a: Pairs = [(e(1, 1), e(2, 1))].into_iter().collect();
        let b: Pairs = [(e(2, 1), e(3, 1)), (e(4, 1), e(5, 1))].into_iter().collect();
        let c = a.seq(&b);
        assert_eq!(c.len(), 1);
        assert!(c.contains(e(1, 1), e(3, 1)));
        assert_eq!(a.opt_seq(&b).len(), 3);
    }

    #[test]
    fn test_plus_and_acyclicity() {
        let mut p: Pairs = [(e(1, 1), e(1, 2)), (e(1, 2), e(1, 3))].into_iter().collect();
        assert!(p.plus().contains(e(1, 1), e(1, 3)));
        assert!(p.is_acyclic());
        p.insert(e(1, 3), e(1, 1));
        assert!(!p.is_acyclic());
    }

    #[test]
    fn test_external_internal_split() {
        let p: Pairs = [(e(1, 1), e(1, 2)), (e(1, 1), e(2, 1))].into_iter().collect();
        assert_eq!(p.external().len(), 1);
        assert_eq!(p.internal().len(), 1);
        assert!(p.inverse().contains(e(2, 1), e(1, 1)));
    }
}
