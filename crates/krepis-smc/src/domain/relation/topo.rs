//! Linear extensions
//!
//! [`Relation::topo_sort`] produces one extension with Kahn's algorithm.
//! [`Relation::all_topo_sort`] backtracks over every extension until a
//! predicate accepts one, and [`Relation::combine_all_topo_sort`] does the
//! same over the cross product of several independent relations.

use super::{Node, Relation};
use std::collections::BTreeSet;

type SortPredicate<'a, T> = dyn FnMut(&[T]) -> bool + 'a;
type CombinedPredicate<'a, T> = dyn FnMut(&[Vec<T>]) -> bool + 'a;

impl<T: Node> Relation<T> {
    /// One linear extension of the direct edges, `None` if they are cyclic
    ///
    /// Ready nodes are taken in insertion order, so the result is
    /// deterministic.
    pub fn topo_sort(&self) -> Option<Vec<T>> {
        let n = self.len();
        let mut indeg = self.in_degrees();
        let mut ready: BTreeSet<usize> = (0..n).filter(|&i| indeg[i] == 0).collect();
        let mut order = Vec::with_capacity(n);

        while let Some(i) = ready.pop_first() {
            order.push(self.nodes()[i]);
            for &j in self.succ_indices(i) {
                indeg[j] -= 1;
                if indeg[j] == 0 {
                    ready.insert(j);
                }
            }
        }
        (order.len() == n).then_some(order)
    }

    /// Enumerate linear extensions until `pred` accepts one
    ///
    /// Returns whether an accepted extension was found. A cyclic relation
    /// has no extension and returns `false` without calling `pred`.
    pub fn all_topo_sort(&self, mut pred: impl FnMut(&[T]) -> bool) -> bool {
        let n = self.len();
        let mut indeg = self.in_degrees();
        let mut used = vec![false; n];
        let mut order = Vec::with_capacity(n);
        self.all_topo_rec(&mut indeg, &mut used, &mut order, &mut pred)
    }

    /// Enumerate the cross product of the relations' extensions until
    /// `pred` accepts a combination (one extension per relation, in order)
    pub fn combine_all_topo_sort(
        relations: &[&Self],
        mut pred: impl FnMut(&[Vec<T>]) -> bool,
    ) -> bool {
        let mut acc = Vec::with_capacity(relations.len());
        combine_rec(relations, &mut acc, &mut pred)
    }

    fn in_degrees(&self) -> Vec<usize> {
        let mut indeg = vec![0; self.len()];
        for i in 0..self.len() {
            for &j in self.succ_indices(i) {
                indeg[j] += 1;
            }
        }
        indeg
    }

    fn all_topo_rec(
        &self,
        indeg: &mut [usize],
        used: &mut [bool],
        order: &mut Vec<usize>,
        pred: &mut SortPredicate<'_, T>,
    ) -> bool {
        if order.len() == self.len() {
            let sort: Vec<T> = order.iter().map(|&i| self.nodes()[i]).collect();
            return pred(&sort);
        }
        for i in 0..self.len() {
            if used[i] || indeg[i] != 0 {
                continue;
            }
            used[i] = true;
            order.push(i);
            for &j in self.succ_indices(i) {
                indeg[j] -= 1;
            }

            let found = self.all_topo_rec(indeg, used, order, pred);

            for &j in self.succ_indices(i) {
                indeg[j] += 1;
            }
            order.pop();
            used[i] = false;
            if found {
                return true;
            }
        }
        false
    }
}

fn combine_rec<T: Node>(
    relations: &[&Relation<T>],
    acc: &mut Vec<Vec<T>>,
    pred: &mut CombinedPredicate<'_, T>,
) -> bool {
    match relations.split_first() {
        None => pred(acc),
        Some((first, rest)) => first.all_topo_sort(|sort| {
            acc.push(sort.to_vec());
            let found = combine_rec(rest, acc, pred);
            acc.pop();
            found
        }),
    }
}
