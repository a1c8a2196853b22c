//! Vector Clock Views
//!
//! Views summarize causal prefixes of the execution graph. Every label
//! caches a few of them (happens-before, porf, pporf) when it is added.
//!
//! # Theory
//!
//! A view maps each thread to the largest included index. Membership is
//! downward closed: if `(t, i)` is in the view then so is `(t, j)` for all
//! `j <= i`. The dependency-tracking flavor relaxes this with explicit
//! holes: excluded indices below the maximum.
//!
//! ```text
//! View    [2, -, 4]        contains (0,0..=2) and (2,0..=4)
//! DepView [2, -, 4] h{2:1} contains (0,0..=2) and (2,{0,2,3,4})
//! ```
//!
//! # Implementation
//!
//! Both flavors implement [`VectorClock`] so revisit code can be written
//! once over either of them.

use super::event::Event;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Downward-closed set of events (modulo explicit holes)
pub trait VectorClock: Clone + fmt::Debug {
    /// Whether the event belongs to the set
    fn contains(&self, e: Event) -> bool;

    /// Largest included index of a thread
    fn max_index(&self, thread: usize) -> Option<usize>;

    /// Number of thread slots tracked
    fn num_threads(&self) -> usize;

    /// Include the whole program-order prefix of `e`
    fn set_max(&mut self, e: Event);

    /// Union with another clock of the same flavor
    fn update(&mut self, other: &Self);

    /// No event at all
    fn is_empty(&self) -> bool {
        (0..self.num_threads()).all(|t| self.max_index(t).is_none())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dense View
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Dense "prefix up to index per thread" clock
///
/// # Example
///
/// ```text
/// a:      [3, 1, -]
/// b:      [2, 5, 0]
/// a ∪ b:  [3, 5, 0]  (max of each position)
/// ```
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct View {
    max: Vec<Option<usize>>,
}

impl View {
    /// Empty view
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// View containing exactly the prefix of `e`
    pub fn of_prefix(e: Event) -> Self {
        let mut v = Self::new();
        v.set_max(e);
        v
    }

    /// Whether every event of `other` is in `self`
    pub fn includes(&self, other: &Self) -> bool {
        other.max.iter().enumerate().all(|(t, m)| match m {
            None => true,
            Some(i) => self.contains(Event::new(t, *i)),
        })
    }

    /// Drop everything after `e` in its thread
    pub fn truncate_after(&mut self, e: Event) {
        if let Some(slot) = self.max.get_mut(e.thread) {
            *slot = slot.map(|m| m.min(e.index));
        }
    }

    /// Iterate `(thread, max)` pairs for populated threads
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.max
            .iter()
            .enumerate()
            .filter_map(|(t, m)| m.map(|m| (t, m)))
    }

    fn ensure(&mut self, thread: usize) {
        if self.max.len() <= thread {
            self.max.resize(thread + 1, None);
        }
    }
}

impl VectorClock for View {
    #[inline]
    fn contains(&self, e: Event) -> bool {
        self.max
            .get(e.thread)
            .copied()
            .flatten()
            .is_some_and(|m| e.index <= m)
    }

    #[inline]
    fn max_index(&self, thread: usize) -> Option<usize> {
        self.max.get(thread).copied().flatten()
    }

    #[inline]
    fn num_threads(&self) -> usize {
        self.max.len()
    }

    fn set_max(&mut self, e: Event) {
        self.ensure(e.thread);
        let slot = &mut self.max[e.thread];
        *slot = Some(slot.map_or(e.index, |m| m.max(e.index)));
    }

    fn update(&mut self, other: &Self) {
        for (t, m) in other.iter() {
            self.set_max(Event::new(t, m));
        }
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "View[")?;
        for (i, m) in self.max.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match m {
                Some(m) => write!(f, "{m}")?,
                None => write!(f, "-")?,
            }
        }
        write!(f, "]")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// View with holes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Prefix clock with explicitly excluded indices
///
/// Used by dependency-tracking models: a write's pporf view only contains
/// the program-order predecessors it actually depends on, so a backward
/// revisit may keep a write while deleting some of its po-predecessors.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepView {
    view: View,
    holes: Vec<BTreeSet<usize>>,
}

impl DepView {
    /// Empty view
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Include exactly `e`, leaving any skipped indices as holes
    pub fn add(&mut self, e: Event) {
        self.ensure(e.thread);
        match self.view.max_index(e.thread) {
            Some(m) if e.index <= m => {
                self.holes[e.thread].remove(&e.index);
            }
            old => {
                let start = old.map_or(0, |m| m + 1);
                self.holes[e.thread].extend(start..e.index);
                self.view.set_max(e);
            }
        }
    }

    /// Exclude `e` while keeping the maximum of its thread
    pub fn add_hole(&mut self, e: Event) {
        if self.view.contains(e) {
            self.ensure(e.thread);
            self.holes[e.thread].insert(e.index);
        }
    }

    /// Re-include a previously excluded event
    pub fn remove_hole(&mut self, e: Event) {
        if let Some(h) = self.holes.get_mut(e.thread) {
            h.remove(&e.index);
        }
    }

    /// Holes recorded for a thread
    pub fn holes(&self, thread: usize) -> impl Iterator<Item = usize> + '_ {
        self.holes.get(thread).into_iter().flatten().copied()
    }

    /// Whether the view has no holes at all
    pub fn is_dense(&self) -> bool {
        self.holes.iter().all(BTreeSet::is_empty)
    }

    /// Dense part of the view (holes ignored)
    pub const fn as_view(&self) -> &View {
        &self.view
    }

    fn ensure(&mut self, thread: usize) {
        if self.holes.len() <= thread {
            self.holes.resize(thread + 1, BTreeSet::new());
        }
    }
}

impl From<View> for DepView {
    fn from(view: View) -> Self {
        let holes = vec![BTreeSet::new(); view.num_threads()];
        Self { view, holes }
    }
}

impl VectorClock for DepView {
    #[inline]
    fn contains(&self, e: Event) -> bool {
        self.view.contains(e) && !self.holes.get(e.thread).is_some_and(|h| h.contains(&e.index))
    }

    #[inline]
    fn max_index(&self, thread: usize) -> Option<usize> {
        self.view.max_index(thread)
    }

    #[inline]
    fn num_threads(&self) -> usize {
        self.view.num_threads()
    }

    fn set_max(&mut self, e: Event) {
        self.view.set_max(e);
        self.ensure(e.thread);
        self.holes[e.thread].retain(|&i| i > e.index);
    }

    fn update(&mut self, other: &Self) {
        let threads = self.num_threads().max(other.num_threads());
        let mut holes = vec![BTreeSet::new(); threads];
        for (t, slot) in holes.iter_mut().enumerate() {
            let candidates = self.holes(t).chain(other.holes(t));
            slot.extend(candidates.filter(|&i| {
                let e = Event::new(t, i);
                !self.contains(e) && !other.contains(e)
            }));
        }
        self.view.update(&other.view);
        self.holes = holes;
    }
}

impl fmt::Debug for DepView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Dep{:?}", self.view)?;
        if !self.is_dense() {
            write!(f, " holes{{")?;
            for (t, h) in self.holes.iter().enumerate().filter(|(_, h)| !h.is_empty()) {
                write!(f, " {t}:{h:?}")?;
            }
            write!(f, " }}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_contains_prefix() {
        let v = View::of_prefix(Event::new(1, 3));
        assert!(v.contains(Event::new(1, 0)));
        assert!(v.contains(Event::new(1, 3)));
        assert!(!v.contains(Event::new(1, 4)));
        assert!(!v.contains(Event::new(0, 0)));
    }

    #[test]
    fn test_view_update_is_union() {
        let mut a = View::new();
        a.set_max(Event::new(0, 3));
        a.set_max(Event::new(1, 1));
        let mut b = View::new();
        b.set_max(Event::new(0, 2));
        b.set_max(Event::new(1, 5));
        b.set_max(Event::new(2, 0));

        let before: Vec<Event> = [(0, 3), (1, 1)].iter().map(|&(t, i)| Event::new(t, i)).collect();
        a.update(&b);
        for e in before {
            assert!(a.contains(e), "update must never remove {e:?}");
        }
        assert_eq!(a.max_index(0), Some(3));
        assert_eq!(a.max_index(1), Some(5));
        assert_eq!(a.max_index(2), Some(0));
        assert!(a.includes(&b));
    }

    #[test]
    fn test_view_truncate() {
        let mut v = View::of_prefix(Event::new(0, 7));
        v.truncate_after(Event::new(0, 2));
        assert_eq!(v.max_index(0), Some(2));
    }

    #[test]
    fn test_dep_view_add_leaves_holes() {
        let mut d = DepView::new();
        d.add(Event::new(1, 0));
        d.add(Event::new(1, 3));
        assert!(d.contains(Event::new(1, 0)));
        assert!(!d.contains(Event::new(1, 1)));
        assert!(!d.contains(Event::new(1, 2)));
        assert!(d.contains(Event::new(1, 3)));
        d.add(Event::new(1, 2));
        assert!(d.contains(Event::new(1, 2)));
        assert!(!d.is_dense());
    }

    #[test]
    fn test_dep_view_union_fills_holes() {
        let mut a = DepView::new();
        a.add(Event::new(0, 0));
        a.add(Event::new(0, 4));
        let mut b = DepView::new();
        b.set_max(Event::new(0, 2));

        a.update(&b);
        for i in 0..=2 {
            assert!(a.contains(Event::new(0, i)));
        }
        assert!(!a.contains(Event::new(0, 3)));
        assert!(a.contains(Event::new(0, 4)));
    }

    #[test]
    fn test_dep_view_set_max_clears_holes() {
        let mut d = DepView::new();
        d.add(Event::new(2, 5));
        assert!(!d.contains(Event::new(2, 1)));
        d.set_max(Event::new(2, 3));
        assert!(d.contains(Event::new(2, 1)));
        assert!(!d.contains(Event::new(2, 4)));
        assert!(d.contains(Event::new(2, 5)));
    }

    #[test]
    fn test_dep_view_hole_roundtrip() {
        let mut d: DepView = View::of_prefix(Event::new(0, 4)).into();
        d.add_hole(Event::new(0, 2));
        assert!(!d.contains(Event::new(0, 2)));
        d.remove_hole(Event::new(0, 2));
        assert!(d.contains(Event::new(0, 2)));
        assert!(d.is_dense());
    }
}
