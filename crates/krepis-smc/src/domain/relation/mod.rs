//! Relation Engine
//!
//! # Overview
//!
//! A [`Relation`] is a labeled-node directed graph with a cached
//! transitive-closure bit matrix. Calculators use it to hold derived
//! orderings over events (happens-before, coherence, model relations).
//!
//! # Contract
//!
//! - Nodes are added on construction or incrementally; edges one at a time
//!   ([`Relation::add_edge`]) or as a cross product
//!   ([`Relation::add_edges_from_to`]).
//! - [`Relation::trans_closure`] recomputes full reachability. Reachability
//!   queries ([`Relation::relation`]) are only complete after a closure pass.
//! - [`Relation::is_irreflexive`] reports acyclicity of the closed relation.
//! - Traversals: [`Relation::dfs`] with four extension points,
//!   [`Relation::topo_sort`] (Kahn), [`Relation::all_topo_sort`] and
//!   [`Relation::combine_all_topo_sort`] (backtracking linear extensions).
//!
//! # Cost
//!
//! Closure is `O(n^3 / 64)`. Linear-extension enumeration is factorial in
//! the number of unordered pairs, so callers only hand it small node sets.

pub mod bitset;
pub mod dfs;
pub mod topo;

pub use bitset::{BitMatrix, BitSet};
pub use dfs::{DfsVisitor, EdgeKind};

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Node type bound for relations
pub trait Node: Copy + Eq + Hash + fmt::Debug {}

impl<T: Copy + Eq + Hash + fmt::Debug> Node for T {}

/// Directed graph over `T` with a reachability matrix
#[derive(Clone)]
pub struct Relation<T: Node> {
    nodes: Vec<T>,
    index: HashMap<T, usize>,
    succ: Vec<Vec<usize>>,
    matrix: BitMatrix,
    edges: usize,
    closed: bool,
}

impl<T: Node> Default for Relation<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Node> Relation<T> {
    /// Empty relation
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
            succ: Vec::new(),
            matrix: BitMatrix::default(),
            edges: 0,
            closed: true,
        }
    }

    /// Relation over a fixed node set, no edges
    pub fn from_nodes(nodes: impl IntoIterator<Item = T>) -> Self {
        let mut r = Self::new();
        for n in nodes {
            r.add_node(n);
        }
        r
    }

    /// Add a node if absent; returns its dense index
    pub fn add_node(&mut self, node: T) -> usize {
        if let Some(&i) = self.index.get(&node) {
            return i;
        }
        let i = self.nodes.len();
        self.nodes.push(node);
        self.index.insert(node, i);
        self.succ.push(Vec::new());
        self.matrix.grow();
        i
    }

    /// Whether `node` belongs to the node set
    #[inline]
    pub fn contains_node(&self, node: T) -> bool {
        self.index.contains_key(&node)
    }

    /// Node set in insertion order
    #[inline]
    pub fn nodes(&self) -> &[T] {
        &self.nodes
    }

    /// Number of nodes
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// No nodes
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of distinct direct edges
    #[inline]
    pub const fn edge_count(&self) -> usize {
        self.edges
    }

    /// Add `a -> b`, inserting missing nodes. Returns whether the edge is new.
    pub fn add_edge(&mut self, a: T, b: T) -> bool {
        let i = self.add_node(a);
        let j = self.add_node(b);
        if self.succ[i].contains(&j) {
            return false;
        }
        self.succ[i].push(j);
        self.matrix.set(i, j);
        self.edges += 1;
        self.closed = false;
        true
    }

    /// Add every edge of the cross product `froms x tos`
    pub fn add_edges_from_to(&mut self, froms: &[T], tos: &[T]) -> bool {
        let mut changed = false;
        for &a in froms {
            for &b in tos {
                changed |= self.add_edge(a, b);
            }
        }
        changed
    }

    /// Chain a sequence: `s[0] -> s[1] -> ... -> s[n-1]`
    pub fn add_chain(&mut self, seq: &[T]) -> bool {
        let mut changed = false;
        for w in seq.windows(2) {
            changed |= self.add_edge(w[0], w[1]);
        }
        changed
    }

    /// Direct edge present
    pub fn has_edge(&self, a: T, b: T) -> bool {
        match (self.index.get(&a), self.index.get(&b)) {
            (Some(&i), Some(&j)) => self.succ[i].contains(&j),
            _ => false,
        }
    }

    /// Direct successors of `a`
    pub fn successors(&self, a: T) -> impl Iterator<Item = T> + '_ {
        self.index
            .get(&a)
            .into_iter()
            .flat_map(move |&i| self.succ[i].iter().map(move |&j| self.nodes[j]))
    }

    /// Every direct edge
    pub fn edges(&self) -> impl Iterator<Item = (T, T)> + '_ {
        self.succ
            .iter()
            .enumerate()
            .flat_map(move |(i, s)| s.iter().map(move |&j| (self.nodes[i], self.nodes[j])))
    }

    /// Recompute the reachability matrix
    pub fn trans_closure(&mut self) {
        if !self.closed {
            self.matrix.close();
            self.closed = true;
        }
    }

    /// Whether the matrix reflects the current edge set
    #[inline]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// `a` reaches `b` (complete only after [`Self::trans_closure`])
    #[inline]
    pub fn relation(&self, a: T, b: T) -> bool {
        match (self.index.get(&a), self.index.get(&b)) {
            (Some(&i), Some(&j)) => self.matrix.get(i, j),
            _ => false,
        }
    }

    /// Nodes reachable from `a`
    pub fn reachable(&self, a: T) -> impl Iterator<Item = T> + '_ {
        self.index
            .get(&a)
            .into_iter()
            .flat_map(move |&i| self.matrix.row(i).iter().map(move |j| self.nodes[j]))
    }

    /// No node reaches itself
    pub fn is_irreflexive(&self) -> bool {
        debug_assert!(self.closed, "irreflexivity queried before closure");
        (0..self.nodes.len()).all(|i| !self.matrix.get(i, i))
    }

    /// Every pair of distinct nodes is ordered one way or the other
    pub fn is_total(&self) -> bool {
        let n = self.nodes.len();
        (0..n).all(|i| (i + 1..n).all(|j| self.matrix.get(i, j) || self.matrix.get(j, i)))
    }

    pub(crate) fn node_index(&self, node: T) -> Option<usize> {
        self.index.get(&node).copied()
    }

    pub(crate) fn succ_indices(&self, i: usize) -> &[usize] {
        &self.succ[i]
    }
}

impl<T: Node> fmt::Debug for Relation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("nodes", &self.nodes)
            .field("edges", &self.edges().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: u32) -> Relation<u32> {
        let mut r = Relation::from_nodes(0..n);
        for i in 1..n {
            r.add_edge(i - 1, i);
        }
        r
    }

    #[test]
    fn test_acyclic_closure_is_irreflexive() {
        let mut r = chain(5);
        r.trans_closure();
        assert!(r.is_irreflexive());
    }

    #[test]
    fn test_closure_is_transitive() {
        let mut r = Relation::new();
        r.add_edge('a', 'b');
        r.add_edge('b', 'c');
        r.add_edge('d', 'c');
        r.add_edge('c', 'e');
        r.trans_closure();
        let nodes = r.nodes().to_vec();
        for &a in &nodes {
            for &b in &nodes {
                for &c in &nodes {
                    if r.relation(a, b) && r.relation(b, c) {
                        assert!(r.relation(a, c), "{a}->{b}->{c} but not {a}->{c}");
                    }
                }
            }
        }
        assert!(r.relation('a', 'e'));
        assert!(!r.relation('a', 'd'));
    }

    #[test]
    fn test_cycle_detected() {
        let mut r = chain(3);
        r.add_edge(2, 0);
        r.trans_closure();
        assert!(!r.is_irreflexive());
    }

    #[test]
    fn test_edges_from_to_cross_product() {
        let mut r: Relation<u8> = Relation::new();
        assert!(r.add_edges_from_to(&[1, 2], &[3, 4]));
        assert_eq!(r.edge_count(), 4);
        assert!(!r.add_edges_from_to(&[1], &[3]));
        assert!(r.has_edge(2, 4));
        assert!(!r.has_edge(3, 1));
    }

    #[test]
    fn test_total_order_detection() {
        let mut r = chain(3);
        r.trans_closure();
        assert!(r.is_total());
        r.add_node(7);
        assert!(!r.is_total());
    }

    #[test]
    fn test_adding_edge_reopens_closure() {
        let mut r = chain(2);
        r.trans_closure();
        assert!(r.is_closed());
        r.add_edge(1, 2);
        assert!(!r.is_closed());
        r.trans_closure();
        assert!(r.relation(0, 2));
    }
}
