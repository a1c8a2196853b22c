//! Depth-first traversal with visitor callbacks
//!
//! Calculators that count nested scopes along paths (grace periods versus
//! read-side critical sections) hook into the four extension points of
//! [`DfsVisitor`] instead of re-implementing the traversal.

use super::{Node, Relation};

/// Classification of a non-tree edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Target is on the current DFS stack
    Back,
    /// Target already finished
    ForwardOrCross,
}

/// Extension points of [`Relation::dfs`]
///
/// Every callback has an empty default so visitors only implement what
/// they need.
pub trait DfsVisitor<T> {
    /// A node is discovered
    fn enter_node(&mut self, _node: T) {}

    /// `from -> to` discovered `to`
    fn tree_edge(&mut self, _from: T, _to: T) {}

    /// `from -> to` leads to an already discovered node
    fn atypical_edge(&mut self, _from: T, _to: T, _kind: EdgeKind) {}

    /// All successors of a node have been explored
    fn finish_node(&mut self, _node: T) {}
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

impl<T: Node> Relation<T> {
    /// Visit every node, starting new trees in node insertion order
    pub fn dfs<V: DfsVisitor<T>>(&self, visitor: &mut V) {
        let mut color = vec![Color::White; self.len()];
        for i in 0..self.len() {
            if color[i] == Color::White {
                self.dfs_visit(i, &mut color, visitor);
            }
        }
    }

    /// Visit the nodes reachable from `root` only
    pub fn dfs_from<V: DfsVisitor<T>>(&self, root: T, visitor: &mut V) {
        if let Some(i) = self.node_index(root) {
            let mut color = vec![Color::White; self.len()];
            self.dfs_visit(i, &mut color, visitor);
        }
    }

    fn dfs_visit<V: DfsVisitor<T>>(&self, i: usize, color: &mut [Color], visitor: &mut V) {
        let nodes = self.nodes();
        color[i] = Color::Gray;
        visitor.enter_node(nodes[i]);
        for &j in self.succ_indices(i) {
            match color[j] {
                Color::White => {
                    visitor.tree_edge(nodes[i], nodes[j]);
                    self.dfs_visit(j, color, visitor);
                }
                Color::Gray => visitor.atypical_edge(nodes[i], nodes[j], EdgeKind::Back),
                Color::Black => visitor.atypical_edge(nodes[i], nodes[j], EdgeKind::ForwardOrCross),
            }
        }
        color[i] = Color::Black;
        visitor.finish_node(nodes[i]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        entered: Vec<u8>,
        finished: Vec<u8>,
        tree: Vec<(u8, u8)>,
        back: Vec<(u8, u8)>,
        cross: Vec<(u8, u8)>,
    }

    impl DfsVisitor<u8> for Recorder {
        fn enter_node(&mut self, node: u8) {
            self.entered.push(node);
        }
        fn tree_edge(&mut self, from: u8, to: u8) {
            self.tree.push((from, to));
        }
        fn atypical_edge(&mut self, from: u8, to: u8, kind: EdgeKind) {
            match kind {
                EdgeKind::Back => self.back.push((from, to)),
                EdgeKind::ForwardOrCross => self.cross.push((from, to)),
            }
        }
        fn finish_node(&mut self, node: u8) {
            self.finished.push(node);
        }
    }

    #[test]
    fn test_dfs_classifies_edges() {
        let mut r = Relation::new();
        r.add_edge(0u8, 1);
        r.add_edge(1, 2);
        r.add_edge(2, 0);
        r.add_edge(0, 2);

        let mut rec = Recorder::default();
        r.dfs(&mut rec);

        assert_eq!(rec.entered, vec![0, 1, 2]);
        assert_eq!(rec.finished, vec![2, 1, 0]);
        assert_eq!(rec.tree, vec![(0, 1), (1, 2)]);
        assert_eq!(rec.back, vec![(2, 0)]);
        assert_eq!(rec.cross, vec![(0, 2)]);
    }

    #[test]
    fn test_dfs_from_only_reaches_subgraph() {
        let mut r = Relation::new();
        r.add_edge(0u8, 1);
        r.add_edge(2, 3);
        let mut rec = Recorder::default();
        r.dfs_from(2, &mut rec);
        assert_eq!(rec.entered, vec![2, 3]);
    }
}
