//! Execution Graph
//!
//! # Overview
//!
//! The graph records one candidate execution: per-thread sequences of
//! labels, reads-from edges with their inverse readers lists, and a
//! coherence strategy ordering the stores of every location.
//!
//! # Contract
//!
//! - Index 0 of every live thread is its start sentinel; `(0, 0)` doubles
//!   as the initializing write of every location (value 0).
//! - Stamps are unique and strictly increasing with insertion. Every read
//!   is stamped after the store it reads, so a cut at any stamp keeps the
//!   source of every surviving read.
//! - For every write, its readers list is exactly the set of reads whose
//!   reads-from edge points at it.
//! - Every mutation entry point marks the cached consistency verdict stale.
//!
//! # Restriction
//!
//! ```text
//! before:  T1: B  R(x)@3  W(y)@7          T2: B  W(x)@5
//! cut @5:  T1: B  R(x)@3                  T2: B  W(x)@5
//! ```
//!
//! Dependency-tracking graphs may keep a label while deleting one of its
//! program-order predecessors; the deleted slot becomes an empty hole that
//! a later step refills.

use super::event::{Address, Event, MemOrdering, Stamp, Value};
use super::label::{EventLabel, LabelKind, LabelViews, ReadLabel, WriteLabel};
use super::view::{DepView, VectorClock, View};
use crate::domain::calc::fixpoint::{self, ConsistencyCache};
use crate::domain::calc::{
    calculators_for, Calculator, CoherenceCalculator, CoherenceStrategy, RelationTable,
};
use crate::domain::config::{CheckStrength, CoherenceKind, MemoryModel};
use crate::domain::error::GraphError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::ops::RangeInclusive;
use tracing::trace;

/// One candidate execution
#[derive(Clone, Serialize, Deserialize)]
pub struct ExecutionGraph {
    threads: Vec<Vec<EventLabel>>,
    next_stamp: Stamp,
    model: MemoryModel,
    coherence: CoherenceStrategy,
    #[serde(skip)]
    calculators: Vec<Box<dyn Calculator>>,
    #[serde(skip)]
    relations: RelationTable,
    #[serde(skip)]
    cache: ConsistencyCache,
}

impl ExecutionGraph {
    /// Graph containing only the initializer
    ///
    /// Dependency-tracking models refill holes, so an explicit order runs
    /// in its out-of-order mode there.
    pub fn new(model: MemoryModel, coherence: CoherenceKind) -> Self {
        let coherence = match coherence {
            CoherenceKind::ExplicitOrder if model.tracks_dependencies() => {
                CoherenceKind::ExplicitOutOfOrder
            }
            kind => kind,
        };
        let mut init = EventLabel::new(
            Event::INIT,
            MemOrdering::Relaxed,
            LabelKind::ThreadStart { create: None },
        );
        let mut pporf = DepView::new();
        pporf.add(Event::INIT);
        *init.views_mut() = LabelViews {
            hb: View::of_prefix(Event::INIT),
            porf: View::of_prefix(Event::INIT),
            pporf,
        };
        Self {
            threads: vec![vec![init]],
            next_stamp: Stamp(1),
            model,
            coherence: CoherenceStrategy::new(coherence),
            calculators: calculators_for(model),
            relations: RelationTable::default(),
            cache: ConsistencyCache::default(),
        }
    }

    /// Rebuild the calculator chain (needed after deserialization)
    pub fn install_calculators(&mut self) {
        self.calculators = calculators_for(self.model);
        self.invalidate();
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Queries
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Memory model
    #[inline]
    pub const fn model(&self) -> MemoryModel {
        self.model
    }

    /// Coherence strategy in use
    #[inline]
    pub const fn coherence(&self) -> &CoherenceStrategy {
        &self.coherence
    }

    /// Stamp the next added label will receive
    #[inline]
    pub const fn next_stamp(&self) -> Stamp {
        self.next_stamp
    }

    /// Number of thread slots (including unused ones)
    #[inline]
    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    /// Number of slots in a thread, holes included
    pub fn thread_size(&self, thread: usize) -> usize {
        self.threads.get(thread).map_or(0, Vec::len)
    }

    /// Labels of a thread in program order, holes included
    pub fn thread(&self, thread: usize) -> &[EventLabel] {
        self.threads.get(thread).map_or(&[], Vec::as_slice)
    }

    /// Label at `e`, holes included
    pub fn label(&self, e: Event) -> Option<&EventLabel> {
        self.threads.get(e.thread)?.get(e.index)
    }

    /// Non-hole label at `e`
    pub fn get(&self, e: Event) -> Result<&EventLabel, GraphError> {
        self.label(e)
            .filter(|l| !l.is_empty())
            .ok_or(GraphError::NoSuchEvent(e))
    }

    /// A non-hole label lives at `e`
    pub fn contains(&self, e: Event) -> bool {
        self.get(e).is_ok()
    }

    /// Every non-hole label
    pub fn labels(&self) -> impl Iterator<Item = &EventLabel> + '_ {
        self.threads.iter().flatten().filter(|l| !l.is_empty())
    }

    /// Every non-hole label in insertion order
    pub fn labels_by_stamp(&self) -> Vec<&EventLabel> {
        let mut labels: Vec<&EventLabel> = self.labels().collect();
        labels.sort_by_key(|l| l.stamp());
        labels
    }

    /// Last non-hole label of a thread
    pub fn last_label(&self, thread: usize) -> Option<&EventLabel> {
        self.thread(thread).iter().rev().find(|l| !l.is_empty())
    }

    /// Read payload at `e`
    pub fn read(&self, e: Event) -> Result<&ReadLabel, GraphError> {
        self.get(e)?.as_read().ok_or(GraphError::NotARead(e))
    }

    /// Write payload at `e`
    pub fn write(&self, e: Event) -> Result<&WriteLabel, GraphError> {
        self.get(e)?.as_write().ok_or(GraphError::NotAWrite(e))
    }

    /// `e` is the initializer or a write
    pub fn is_store(&self, e: Event) -> bool {
        e.is_init() || self.write(e).is_ok()
    }

    /// Value written by a store (0 for the initializer)
    pub fn store_value(&self, e: Event) -> Option<Value> {
        if e.is_init() {
            return Some(0);
        }
        self.write(e).ok().map(|w| w.value)
    }

    /// Value a read observes
    pub fn read_value(&self, r: Event) -> Option<Value> {
        self.read(r).ok()?.rf.and_then(|w| self.store_value(w))
    }

    /// Reads observing `store` at `addr`
    ///
    /// The initializer has no readers list of its own; its readers are
    /// found by scanning.
    pub fn readers(&self, addr: Address, store: Event) -> Vec<Event> {
        if store.is_init() {
            return self
                .reads_of(addr)
                .filter(|&r| self.read(r).is_ok_and(|l| l.rf == Some(Event::INIT)))
                .collect();
        }
        self.write(store)
            .map(|w| w.readers.clone())
            .unwrap_or_default()
    }

    /// Reads of a location
    pub fn reads_of(&self, addr: Address) -> impl Iterator<Item = Event> + '_ {
        self.labels()
            .filter(move |l| l.as_read().is_some_and(|r| r.addr == addr))
            .map(EventLabel::pos)
    }

    /// Writes of a location in graph order (initializer excluded)
    pub fn writes_to(&self, addr: Address) -> impl Iterator<Item = Event> + '_ {
        self.labels()
            .filter(move |l| l.as_write().is_some_and(|w| w.addr == addr))
            .map(EventLabel::pos)
    }

    /// Every accessed location
    pub fn locations(&self) -> Vec<Address> {
        let mut locs: Vec<Address> = self.labels().filter_map(EventLabel::addr).collect();
        locs.sort_unstable();
        locs.dedup();
        locs
    }

    /// `a` happens before `b` (reflexive)
    pub fn hb_before(&self, a: Event, b: Event) -> bool {
        self.get(b).is_ok_and(|l| l.hb().contains(a))
    }

    /// `a` is in the porf prefix of `b` (reflexive)
    pub fn porf_before(&self, a: Event, b: Event) -> bool {
        self.get(b).is_ok_and(|l| l.porf().contains(a))
    }

    /// Prefix a backward revisit by `e` must keep
    ///
    /// Dependency-tracking models use the pporf view (with holes);
    /// the others use porf.
    pub fn revisit_prefix(&self, e: Event) -> Result<DepView, GraphError> {
        let lab = self.get(e)?;
        Ok(if self.model.tracks_dependencies() {
            lab.pporf().clone()
        } else {
            DepView::from(lab.porf().clone())
        })
    }

    /// Dense view of every label with stamp at most `stamp`
    pub fn view_from_stamp(&self, stamp: Stamp) -> View {
        let mut v = View::new();
        for l in self.labels().filter(|l| l.stamp() <= stamp) {
            v.set_max(l.pos());
        }
        v
    }

    /// Exact set of labels with stamp at most `stamp`, with holes
    pub fn dep_view_from_stamp(&self, stamp: Stamp) -> DepView {
        let mut v = DepView::new();
        for l in self.labels().filter(|l| l.stamp() <= stamp) {
            v.add(l.pos());
        }
        v
    }

    /// Stores of a location as tracked by the coherence strategy
    pub fn stores(&self, addr: Address) -> &[Event] {
        self.coherence.stores(addr)
    }

    /// Stores a read may observe, co-maximal first
    pub fn coherent_stores(&self, read: Event) -> Vec<Event> {
        self.coherence.get_coherent_stores(self, read)
    }

    /// Reads a new store may backward-revisit
    pub fn coherent_revisits(&self, write: Event) -> Vec<Event> {
        self.coherence.get_coherent_revisits(self, write)
    }

    /// Offsets where a store may be placed in the explicit order
    pub fn possible_placings(&self, addr: Address, store: Event) -> RangeInclusive<usize> {
        self.coherence.get_possible_placings(self, addr, store)
    }

    /// No store is coherence-after `store`
    pub fn is_co_maximal(&self, addr: Address, store: Event) -> bool {
        self.coherence.is_co_maximal(self, addr, store)
    }

    /// `a` is coherence-before `b`
    pub fn co_before(&self, addr: Address, a: Event, b: Event) -> bool {
        self.coherence.co_before(self, addr, a, b)
    }

    /// Relations from the last consistency check
    pub const fn relations(&self) -> &RelationTable {
        &self.relations
    }

    /// Calculators in registration order, coherence first
    pub fn calculator_chain(&self) -> impl Iterator<Item = &dyn Calculator> + '_ {
        std::iter::once(&self.coherence as &dyn Calculator)
            .chain(self.calculators.iter().map(|c| &**c))
    }

    /// Number of fixpoint runs actually performed (cache misses)
    pub const fn consistency_evaluations(&self) -> u64 {
        self.cache.evaluations()
    }

    /// The last label of every started thread is its finish
    pub fn all_threads_finished(&self) -> bool {
        self.threads.iter().enumerate().all(|(t, labels)| {
            labels.is_empty()
                || self
                    .last_label(t)
                    .is_some_and(|l| matches!(l.kind(), LabelKind::ThreadFinish { .. }))
        })
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Consistency
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Run the calculator fixpoint, memoized until the next mutation
    pub fn is_consistent(&mut self, strength: CheckStrength) -> bool {
        if let Some(verdict) = self.cache.get(strength) {
            return verdict;
        }
        if self.calculators.is_empty() {
            self.calculators = calculators_for(self.model);
        }
        let mut relations = std::mem::take(&mut self.relations);
        let verdict = fixpoint::run(self, &mut relations, strength);
        self.relations = relations;
        self.cache.record(strength, verdict);
        trace!(?strength, verdict, "consistency check");
        verdict
    }

    fn invalidate(&mut self) {
        self.cache.invalidate();
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Mutation
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Insert a label at its position (next index or an empty hole)
    ///
    /// Assigns the stamp, wires readers and join back-pointers, and
    /// computes the label's views. Store placement in the coherence
    /// order is a separate step ([`Self::add_store_to_loc`]).
    pub fn add_label(&mut self, mut label: EventLabel) -> Result<Event, GraphError> {
        let pos = label.pos();
        self.check_back_pointers(&label)?;
        label.set_stamp(self.next_stamp);
        if let Some(w) = label.as_write_mut() {
            w.readers.clear();
        }
        let fills_hole = pos.index < self.thread_size(pos.thread);
        self.place(label)?;
        self.next_stamp = self.next_stamp.next();
        self.wire_back_pointers(pos)?;
        if fills_hole {
            self.recalc_all_views()?;
        } else {
            self.recalc_views(pos)?;
        }
        self.invalidate();
        Ok(pos)
    }

    /// Point a read at a different store (or none)
    pub fn change_rf(&mut self, read: Event, rf: Option<Event>) -> Result<(), GraphError> {
        let addr = self.read(read)?.addr;
        if let Some(w) = rf {
            self.check_store(read, addr, w)?;
        }
        let old = self.read(read)?.rf;
        if let Some(w) = old.filter(|w| !w.is_init()) {
            if let Ok(wl) = self.write_mut(w) {
                wl.readers.retain(|&r| r != read);
            }
        }
        self.read_mut(read)?.rf = rf;
        if let Some(w) = rf.filter(|w| !w.is_init()) {
            self.write_mut(w)?.readers.push(read);
        }
        let is_last = self.last_label(read.thread).is_some_and(|l| l.pos() == read);
        if is_last {
            self.recalc_views(read)?;
        } else {
            self.recalc_all_views()?;
        }
        self.invalidate();
        Ok(())
    }

    /// Record whether a read or write took the co-maximal choice
    pub fn set_added_max(&mut self, e: Event, added_max: bool) -> Result<(), GraphError> {
        let lab = self.get_mut(e)?;
        if let Some(r) = lab.as_read_mut() {
            r.added_max = added_max;
        } else if let Some(w) = lab.as_write_mut() {
            w.added_max = added_max;
        } else {
            return Err(GraphError::NotARead(e));
        }
        self.invalidate();
        Ok(())
    }

    /// Mark a read as (not) eligible for backward revisits
    pub fn set_revisitable(&mut self, e: Event, revisitable: bool) -> Result<(), GraphError> {
        self.read_mut(e)?.revisitable = revisitable;
        self.invalidate();
        Ok(())
    }

    /// Place a store at `offset` in its location's order
    pub fn add_store_to_loc(&mut self, addr: Address, store: Event, offset: usize) {
        self.coherence.track_coherence_at_loc(addr);
        self.coherence.add_store_to_loc(addr, store, offset);
        self.invalidate();
    }

    /// Move an already placed store to another offset
    pub fn move_store(&mut self, addr: Address, store: Event, offset: usize) {
        self.coherence.remove_store(addr, store);
        self.coherence.add_store_to_loc(addr, store, offset);
        self.invalidate();
    }

    /// Remove the last label of a thread (used to unblock it)
    pub fn remove_last(&mut self, thread: usize) -> Result<EventLabel, GraphError> {
        let last = self
            .last_label(thread)
            .ok_or(GraphError::MissingThreadStart(thread))?;
        if let Some(&reader) = last.as_write().and_then(|w| w.readers.first()) {
            return Err(GraphError::ReadersMismatch { write: last.pos(), read: reader });
        }
        let labels = &mut self.threads[thread];
        let mut lab = EventLabel::empty(Event::thread_start(thread));
        while let Some(popped) = labels.pop() {
            if !popped.is_empty() {
                lab = popped;
                break;
            }
        }
        while labels.last().is_some_and(EventLabel::is_empty) {
            labels.pop();
        }
        let pos = lab.pos();
        match lab.kind() {
            LabelKind::Read(r) => {
                if let Some(w) = r.rf.filter(|w| !w.is_init()) {
                    self.write_mut(w)?.readers.retain(|&x| x != pos);
                }
            }
            LabelKind::Write(w) => self.coherence.remove_store(w.addr, pos),
            LabelKind::ThreadJoin { finish: Some(f), .. } => {
                if let LabelKind::ThreadFinish { joiner } = self.get_mut(*f)?.kind_mut() {
                    *joiner = None;
                }
            }
            _ => {}
        }
        self.invalidate();
        Ok(lab)
    }

    /// Keep only labels with stamp at most `stamp`
    pub fn cut_to_stamp(&mut self, stamp: Stamp) -> Result<(), GraphError> {
        let keep = self.dep_view_from_stamp(stamp);
        self.restrict(&keep)
    }

    /// Deep copy restricted to `view`
    pub fn copy_to_view(&self, view: &DepView) -> Result<Self, GraphError> {
        let mut g = self.clone();
        g.restrict(view)?;
        Ok(g)
    }

    /// Renumber stamps densely, preserving their relative order
    pub fn compress_stamps(&mut self) {
        let order: Vec<Event> = self
            .labels_by_stamp()
            .into_iter()
            .map(EventLabel::pos)
            .collect();
        let mut next = Stamp(0);
        for e in order {
            if let Ok(l) = self.get_mut(e) {
                l.set_stamp(next);
                next = next.next();
            }
        }
        self.next_stamp = next;
        self.invalidate();
    }

    /// Give `pos` the newest stamp, then renumber densely
    ///
    /// A backward-revisited read must come after the store it now reads.
    pub fn move_to_end(&mut self, pos: Event) -> Result<(), GraphError> {
        let stamp = self.next_stamp;
        self.get_mut(pos)?.set_stamp(stamp);
        self.next_stamp = stamp.next();
        self.compress_stamps();
        Ok(())
    }

    /// Recompute the cached views of one label from its predecessors
    pub fn recalc_views(&mut self, pos: Event) -> Result<(), GraphError> {
        let (views, msg) = self.compute_views(pos)?;
        let lab = self.get_mut(pos)?;
        *lab.views_mut() = views;
        if let (Some(w), Some(msg)) = (lab.as_write_mut(), msg) {
            w.msg = msg;
        }
        self.invalidate();
        Ok(())
    }

    /// Recompute every label's views until none changes
    ///
    /// Needed whenever a label gains or changes a predecessor that some
    /// program-order successor already depends on.
    pub fn recalc_all_views(&mut self) -> Result<(), GraphError> {
        let order: Vec<Event> = self
            .labels_by_stamp()
            .into_iter()
            .map(EventLabel::pos)
            .collect();
        for _ in 0..=order.len() {
            let mut changed = false;
            for &pos in &order {
                let (views, msg) = self.compute_views(pos)?;
                let lab = self.get_mut(pos)?;
                if *lab.views() != views {
                    *lab.views_mut() = views;
                    changed = true;
                }
                if let (Some(w), Some(msg)) = (lab.as_write_mut(), msg) {
                    if w.msg != msg {
                        w.msg = msg;
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        self.invalidate();
        Ok(())
    }

    /// Verify the structural invariants
    pub fn check_invariants(&self) -> Result<(), GraphError> {
        let mut stamps: BTreeMap<Stamp, Event> = BTreeMap::new();
        for (t, labels) in self.threads.iter().enumerate() {
            if labels.is_empty() {
                continue;
            }
            if !matches!(labels[0].kind(), LabelKind::ThreadStart { .. }) {
                return Err(GraphError::MissingThreadStart(t));
            }
            for (i, lab) in labels.iter().enumerate() {
                let slot = Event::new(t, i);
                if lab.pos() != slot {
                    return Err(GraphError::PositionMismatch { slot, claimed: lab.pos() });
                }
                if lab.is_empty() {
                    continue;
                }
                if let Some(first) = stamps.insert(lab.stamp(), slot) {
                    return Err(GraphError::DuplicateStamp {
                        stamp: lab.stamp().0,
                        first,
                        second: slot,
                    });
                }
                self.check_label_links(lab)?;
            }
        }
        for addr in self.coherence.locations() {
            for &s in self.stores(addr) {
                if self.write(s).map(|w| w.addr) != Ok(addr) {
                    return Err(GraphError::NotAWrite(s));
                }
            }
        }
        Ok(())
    }

    fn check_label_links(&self, lab: &EventLabel) -> Result<(), GraphError> {
        let pos = lab.pos();
        match lab.kind() {
            LabelKind::Read(r) => {
                if let Some(w) = r.rf {
                    self.check_store(pos, r.addr, w)?;
                    if !w.is_init() && !self.write(w)?.readers.contains(&pos) {
                        return Err(GraphError::ReadersMismatch { write: w, read: pos });
                    }
                    if self.get(w)?.stamp() >= lab.stamp() {
                        return Err(GraphError::StampOrder { later: w, earlier: pos });
                    }
                }
            }
            LabelKind::Write(w) => {
                for &r in &w.readers {
                    if self.read(r).map(|l| l.rf) != Ok(Some(pos)) {
                        return Err(GraphError::ReadersMismatch { write: pos, read: r });
                    }
                }
            }
            LabelKind::ThreadJoin { finish: Some(f), .. } => {
                let ok = matches!(
                    self.get(*f)?.kind(),
                    LabelKind::ThreadFinish { joiner: Some(j) } if *j == pos
                );
                if !ok {
                    return Err(GraphError::JoinMismatch { join: pos, finish: *f });
                }
            }
            LabelKind::ThreadFinish { joiner: Some(j) } => {
                let ok = matches!(
                    self.get(*j)?.kind(),
                    LabelKind::ThreadJoin { finish: Some(f), .. } if *f == pos
                );
                if !ok {
                    return Err(GraphError::JoinMismatch { join: *j, finish: pos });
                }
            }
            _ => {}
        }
        Ok(())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Internals
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    fn get_mut(&mut self, e: Event) -> Result<&mut EventLabel, GraphError> {
        self.threads
            .get_mut(e.thread)
            .and_then(|t| t.get_mut(e.index))
            .filter(|l| !l.is_empty())
            .ok_or(GraphError::NoSuchEvent(e))
    }

    fn read_mut(&mut self, e: Event) -> Result<&mut ReadLabel, GraphError> {
        self.get_mut(e)?.as_read_mut().ok_or(GraphError::NotARead(e))
    }

    fn write_mut(&mut self, e: Event) -> Result<&mut WriteLabel, GraphError> {
        self.get_mut(e)?.as_write_mut().ok_or(GraphError::NotAWrite(e))
    }

    fn check_store(&self, read: Event, addr: Address, w: Event) -> Result<(), GraphError> {
        let ok = w.is_init() || self.write(w).is_ok_and(|wl| wl.addr == addr);
        if ok {
            Ok(())
        } else {
            Err(GraphError::DanglingRf { read, write: w })
        }
    }

    fn check_back_pointers(&self, label: &EventLabel) -> Result<(), GraphError> {
        let pos = label.pos();
        match label.kind() {
            LabelKind::Read(r) => {
                if let Some(w) = r.rf {
                    self.check_store(pos, r.addr, w)?;
                }
            }
            LabelKind::ThreadStart { create: Some(c) } => {
                if !matches!(self.get(*c)?.kind(), LabelKind::ThreadCreate { .. }) {
                    return Err(GraphError::NoSuchEvent(*c));
                }
            }
            LabelKind::ThreadJoin { finish: Some(f), .. } => {
                if !matches!(self.get(*f)?.kind(), LabelKind::ThreadFinish { joiner: None }) {
                    return Err(GraphError::JoinMismatch { join: pos, finish: *f });
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn place(&mut self, label: EventLabel) -> Result<(), GraphError> {
        let pos = label.pos();
        let is_start = matches!(label.kind(), LabelKind::ThreadStart { .. });
        if is_start != (pos.index == 0) {
            return Err(GraphError::InvalidInsertion(pos));
        }
        if self.threads.len() <= pos.thread {
            self.threads.resize_with(pos.thread + 1, Vec::new);
        }
        let labels = &mut self.threads[pos.thread];
        if pos.index > 0 && labels.is_empty() {
            return Err(GraphError::MissingThreadStart(pos.thread));
        }
        match labels.len().cmp(&pos.index) {
            std::cmp::Ordering::Equal => labels.push(label),
            std::cmp::Ordering::Greater if labels[pos.index].is_empty() => {
                labels[pos.index] = label;
            }
            _ => return Err(GraphError::InvalidInsertion(pos)),
        }
        Ok(())
    }

    fn wire_back_pointers(&mut self, pos: Event) -> Result<(), GraphError> {
        match self.get(pos)?.kind().clone() {
            LabelKind::Read(r) => {
                if let Some(w) = r.rf.filter(|w| !w.is_init()) {
                    let wl = self.write_mut(w)?;
                    if !wl.readers.contains(&pos) {
                        wl.readers.push(pos);
                    }
                }
            }
            LabelKind::ThreadJoin { finish: Some(f), .. } => {
                if let LabelKind::ThreadFinish { joiner } = self.get_mut(f)?.kind_mut() {
                    *joiner = Some(pos);
                }
            }
            LabelKind::ThreadFinish { joiner: Some(j) } => {
                if !self.contains(j) {
                    if let LabelKind::ThreadFinish { joiner } = self.get_mut(pos)?.kind_mut() {
                        *joiner = None;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn restrict(&mut self, keep: &DepView) -> Result<(), GraphError> {
        for (t, labels) in self.threads.iter_mut().enumerate() {
            let kept_len = labels
                .iter()
                .rposition(|l| !l.is_empty() && keep.contains(Event::new(t, l.pos().index)))
                .map_or(0, |i| i + 1);
            labels.truncate(kept_len);
            for lab in labels.iter_mut() {
                if !lab.is_empty() && !keep.contains(lab.pos()) {
                    *lab = EventLabel::empty(lab.pos());
                }
            }
        }
        while self.threads.last().is_some_and(Vec::is_empty) {
            self.threads.pop();
        }

        let present: HashSet<Event> = self.labels().map(EventLabel::pos).collect();
        for lab in self.threads.iter_mut().flatten() {
            let pos = lab.pos();
            match lab.kind_mut() {
                LabelKind::Write(w) => w.readers.retain(|r| present.contains(r)),
                LabelKind::Read(r) => {
                    if let Some(w) = r.rf.filter(|w| !w.is_init() && !present.contains(w)) {
                        return Err(GraphError::DanglingRf { read: pos, write: w });
                    }
                }
                LabelKind::ThreadFinish { joiner } => {
                    if joiner.is_some_and(|j| !present.contains(&j)) {
                        *joiner = None;
                    }
                }
                LabelKind::ThreadJoin { finish: Some(f), .. } => {
                    if !present.contains(f) {
                        return Err(GraphError::JoinMismatch { join: pos, finish: *f });
                    }
                }
                LabelKind::ThreadStart { create: Some(c) } => {
                    if !present.contains(c) {
                        return Err(GraphError::NoSuchEvent(*c));
                    }
                }
                _ => {}
            }
        }

        self.coherence.remove_after(keep);
        for c in &mut self.calculators {
            c.remove_after(keep);
        }
        if !keep.is_dense() {
            self.recalc_all_views()?;
        }
        self.invalidate();
        Ok(())
    }

    fn po_prev(&self, pos: Event) -> Option<&EventLabel> {
        self.thread(pos.thread)
            .get(..pos.index)?
            .iter()
            .rev()
            .find(|l| !l.is_empty())
    }

    fn po_before(&self, pos: Event) -> impl DoubleEndedIterator<Item = &EventLabel> + '_ {
        let labels = self.thread(pos.thread);
        labels[..pos.index.min(labels.len())]
            .iter()
            .filter(|l| !l.is_empty())
    }

    fn acquires(&self, lab: &EventLabel) -> bool {
        lab.ordering().is_acquire()
            || (self.model.upgrades_to_release_acquire()
                && (lab.as_read().is_some() || lab.is_fence()))
    }

    fn releases(&self, lab: &EventLabel) -> bool {
        lab.ordering().is_release()
            || (self.model.upgrades_to_release_acquire()
                && (lab.as_write().is_some() || lab.is_fence()))
    }

    /// View a store hands to acquiring readers
    fn message_of(&self, store: Event) -> Result<View, GraphError> {
        let lab = self.get(store)?;
        Ok(match lab.as_write() {
            Some(w) => w.msg.clone(),
            None => lab.hb().clone(),
        })
    }

    fn compute_views(&self, pos: Event) -> Result<(LabelViews, Option<View>), GraphError> {
        let lab = self.get(pos)?;
        let prev = self.po_prev(pos);
        let mut hb = prev.map_or_else(View::new, |p| p.hb().clone());
        let mut porf = prev.map_or_else(View::new, |p| p.porf().clone());
        hb.set_max(pos);
        porf.set_max(pos);
        let mut msg = None;

        match lab.kind() {
            LabelKind::ThreadStart { create: Some(c) } => {
                let c = self.get(*c)?;
                hb.update(c.hb());
                porf.update(c.porf());
            }
            LabelKind::ThreadJoin { finish: Some(f), .. } => {
                let f = self.get(*f)?;
                hb.update(f.hb());
                porf.update(f.porf());
            }
            LabelKind::Read(r) => {
                if let Some(w) = r.rf {
                    porf.update(self.get(w)?.porf());
                    if self.acquires(lab) {
                        hb.update(&self.message_of(w)?);
                    }
                }
            }
            LabelKind::Fence if self.acquires(lab) => {
                for earlier in self.po_before(pos) {
                    if let Some(w) = earlier.as_read().and_then(|r| r.rf) {
                        hb.update(&self.message_of(w)?);
                    }
                }
            }
            LabelKind::Write(w) => {
                let mut m = if self.releases(lab) {
                    hb.clone()
                } else {
                    self.po_before(pos)
                        .rev()
                        .find(|l| l.is_fence() && self.releases(l))
                        .map_or_else(View::new, |f| f.hb().clone())
                };
                if w.exclusive {
                    let rf = prev.and_then(EventLabel::as_read).and_then(|r| r.rf);
                    if let Some(rf) = rf {
                        m.update(&self.message_of(rf)?);
                    }
                }
                msg = Some(m);
            }
            _ => {}
        }

        let pporf = if self.model.tracks_dependencies() {
            self.compute_pporf(lab, prev)?
        } else {
            DepView::from(porf.clone())
        };
        Ok((LabelViews { hb, porf, pporf }, msg))
    }

    /// Preserved-program-order prefix: explicit dependencies, reads-from,
    /// and ordering imposed by barriers and release semantics
    fn compute_pporf(
        &self,
        lab: &EventLabel,
        prev: Option<&EventLabel>,
    ) -> Result<DepView, GraphError> {
        let pos = lab.pos();
        let mut v = DepView::new();
        v.add(Event::thread_start(pos.thread));
        v.add(pos);
        for &d in lab.deps() {
            v.update(self.get(d)?.pporf());
        }
        match lab.kind() {
            LabelKind::Read(r) => {
                if let Some(w) = r.rf {
                    v.update(self.get(w)?.pporf());
                }
            }
            LabelKind::ThreadStart { create: Some(c) } => v.update(self.get(*c)?.pporf()),
            LabelKind::ThreadJoin { finish: Some(f), .. } => v.update(self.get(*f)?.pporf()),
            _ => {}
        }

        let exclusive = lab.as_write().is_some_and(|w| w.exclusive);
        let ordered_after_all = self.releases(lab) || !lab.is_access() || exclusive;
        if ordered_after_all {
            if let Some(p) = prev {
                v.update(p.pporf());
            }
        } else if let Some(b) = self.po_before(pos).rev().find(|l| self.is_barrier(l)) {
            v.update(b.pporf());
        }
        Ok(v)
    }

    fn is_barrier(&self, lab: &EventLabel) -> bool {
        match lab.kind() {
            LabelKind::Read(_) => self.acquires(lab),
            LabelKind::Write(_) | LabelKind::Empty | LabelKind::Block(_) => false,
            LabelKind::Malloc { .. } | LabelKind::Free { .. } => false,
            _ => true,
        }
    }
}

impl fmt::Debug for ExecutionGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ExecutionGraph ({}, {:?})", self.model, self.coherence.kind())?;
        for (t, labels) in self.threads.iter().enumerate() {
            if labels.is_empty() {
                continue;
            }
            writeln!(f, "  thread {t}:")?;
            for lab in labels {
                writeln!(f, "    {lab:?}")?;
            }
        }
        for addr in self.coherence.locations() {
            writeln!(f, "  co {addr:?}: {:?}", self.stores(addr))?;
        }
        Ok(())
    }
}
