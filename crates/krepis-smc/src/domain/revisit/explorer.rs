//! Revisit-based exploration
//!
//! The explorer owns one live [`ExecutionState`] plus a stack of parents
//! waiting for their remaining alternatives. One execution runs as
//! follows:
//!
//! ```text
//! reset interpreter ──▶ schedule_next ──▶ interp.step ──▶ handler
//!        ▲                   │                              │
//!        │                   ▼ (no runnable thread)         ▼
//!   backtrack ◀──────── finish_execution         replay or add a label,
//!   (pop work item)     (full check, findings)   push alternatives
//! ```
//!
//! # Alternatives
//!
//! - A new read takes its co-maximal consistent store; every later
//!   candidate becomes a forward revisit in the read's bucket.
//! - A new store takes its co-maximal placing; the other legal placings
//!   become forward revisits and every read it may revisit becomes a
//!   backward revisit, both in the store's bucket.
//! - A backward revisit keeps the prefix up to the read plus the causal
//!   prefix of the store, so it is only taken when everything it deletes
//!   was added maximally.
//!
//! # Replay
//!
//! Every execution restarts the interpreter. A handler called at a position
//! the graph already records validates the instruction and returns the
//! recorded value; only positions past the recorded prefix (or holes)
//! grow the graph.

use super::detect::{default_detectors, ErrorDetector, GraphQuery};
use super::interpreter::Interpreter;
use super::state::{Choice, ExecutionState};
use super::worklist::{BackwardRevisit, ForwardRevisit, Revisit};
use crate::domain::calc::coherence::{exclusive_write_of, is_rmw_consumed, rmw_source};
use crate::domain::config::{CheckStrength, CheckerConfig};
use crate::domain::error::{CheckerError, GraphError};
use crate::domain::graph::{
    Address, BlockKind, DepView, Event, EventLabel, ExecutionGraph, LabelKind, MemOrdering,
    ReadLabel, RmwKind, Value, VectorClock, WriteLabel,
};
use crate::domain::report::{ExplorationStats, Finding, VerificationResult, Warning};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Receiver for subtrees explored elsewhere
///
/// Before the explorer descends into a backward revisit it offers the
/// child state here. An accepted state is explored by someone else; a
/// refused one comes back and is explored locally.
pub trait SubtreeSink: Send + Sync {
    /// Take over a subtree, or hand it back
    fn offer(&self, state: ExecutionState) -> Option<ExecutionState>;

    /// Some worker asked everyone to stop
    fn should_halt(&self) -> bool;

    /// Ask every worker to stop
    fn signal_halt(&self);
}

/// What the cursor of a thread points at
enum Slot {
    /// Recorded label matching the issued instruction
    Recorded(Event),
    /// Recorded block; the thread stays blocked
    Blocked,
    /// Nothing recorded (past the end or a hole)
    Fresh(Event),
}

/// Outcome of applying one work item
enum Applied {
    /// A new execution is ready to run
    Explore,
    /// Nothing to run; keep popping
    Skip,
}

/// Stateless model checker driving one interpreter
pub struct Explorer {
    config: CheckerConfig,
    state: ExecutionState,
    stack: Vec<ExecutionState>,
    cursors: Vec<usize>,
    abandoned: bool,
    halted: bool,
    resume_pending: bool,
    pending: Vec<Finding>,
    result: VerificationResult,
    detectors: Vec<Box<dyn ErrorDetector>>,
    sink: Option<Arc<dyn SubtreeSink>>,
}

impl Explorer {
    /// Explorer starting from the empty program
    pub fn new(config: CheckerConfig) -> Self {
        let state = ExecutionState::new(config.model, config.coherence);
        Self::from_state(config, state)
    }

    /// Explorer for the subtree rooted at `state`
    ///
    /// The state's graph is run as the first execution.
    pub fn from_state(config: CheckerConfig, state: ExecutionState) -> Self {
        let detectors = default_detectors(config.check_races);
        Self {
            config,
            state,
            stack: Vec::new(),
            cursors: Vec::new(),
            abandoned: false,
            halted: false,
            resume_pending: false,
            pending: Vec::new(),
            result: VerificationResult::default(),
            detectors,
            sink: None,
        }
    }

    /// Continue a search interrupted after an execution
    ///
    /// `frontier` is what [`Self::frontier`] returned: saved parents first,
    /// the live state last. Its last execution was already reported, so the
    /// search resumes with the next alternative.
    pub fn resume(config: CheckerConfig, mut frontier: Vec<ExecutionState>) -> Self {
        let state = frontier
            .pop()
            .unwrap_or_else(|| ExecutionState::new(config.model, config.coherence));
        let mut explorer = Self::from_state(config, state);
        explorer.stack = frontier;
        explorer.resume_pending = true;
        explorer
    }

    /// Hand backward-revisit subtrees to `sink`
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn SubtreeSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run an extra detector on every consistent execution
    #[must_use]
    pub fn with_detector(mut self, detector: Box<dyn ErrorDetector>) -> Self {
        self.detectors.push(detector);
        self
    }

    /// Configuration in use
    pub const fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Current candidate execution
    pub const fn graph(&self) -> &ExecutionGraph {
        &self.state.graph
    }

    /// Live state
    pub const fn state(&self) -> &ExecutionState {
        &self.state
    }

    /// Findings and counters so far
    pub const fn result(&self) -> &VerificationResult {
        &self.result
    }

    /// Exploration counters so far
    pub const fn stats(&self) -> &ExplorationStats {
        &self.result.stats
    }

    /// Saved parents and the live state, enough to resume the search
    pub fn frontier(&self) -> Vec<ExecutionState> {
        let mut out = self.stack.clone();
        out.push(self.state.clone());
        out
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Search loop
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Explore every execution reachable from the current state
    pub fn run(&mut self, interp: &mut dyn Interpreter) -> Result<VerificationResult, CheckerError> {
        info!(
            model = %self.config.model,
            coherence = %self.config.coherence,
            threads = interp.thread_count(),
            "exploration started"
        );
        let mut more = if self.resume_pending {
            self.resume_pending = false;
            self.backtrack()?
        } else {
            true
        };
        while more {
            self.run_execution(interp)?;
            self.finish_execution(&*interp)?;
            more = !self.halted && self.backtrack()?;
        }
        let stats = self.result.stats;
        info!(
            complete = stats.complete,
            blocked = stats.blocked,
            inconsistent = stats.inconsistent,
            findings = self.result.findings.len(),
            "exploration finished"
        );
        Ok(self.result.clone())
    }

    fn run_execution(&mut self, interp: &mut dyn Interpreter) -> Result<(), CheckerError> {
        interp.reset();
        self.cursors = vec![0; self.state.graph.num_threads().max(1)];
        self.cursors[0] = 1;
        self.abandoned = false;
        self.pending.clear();
        trace!(choices = self.state.choices.len(), "execution started");

        while !self.abandoned {
            let Some(thread) = self.schedule_next() else { break };
            interp.step(thread, self)?;
        }
        Ok(())
    }

    /// Thread to step next
    ///
    /// Recorded labels are replayed in stamp order first; afterwards the
    /// lowest-numbered runnable thread goes.
    pub fn schedule_next(&self) -> Option<usize> {
        let graph = &self.state.graph;
        let runnable: Vec<usize> = (0..self.cursors.len())
            .filter(|&t| self.is_runnable(t))
            .collect();
        runnable
            .iter()
            .filter_map(|&t| {
                graph
                    .label(Event::new(t, self.cursors[t]))
                    .filter(|l| !l.is_empty())
                    .map(|l| (l.stamp(), t))
            })
            .min()
            .map(|(_, t)| t)
            .or_else(|| runnable.first().copied())
    }

    /// Position the next instruction of `thread` lands at
    ///
    /// Interpreters use it to remember which event produced a value, so
    /// later instructions can name it as a dependency.
    pub fn next_event(&self, thread: usize) -> Option<Event> {
        self.position(thread).ok()
    }

    fn is_runnable(&self, thread: usize) -> bool {
        let cursor = self.cursors.get(thread).copied().unwrap_or(0);
        if cursor == 0 {
            return false;
        }
        let last = self.state.graph.label(Event::new(thread, cursor - 1));
        !last.is_some_and(|l| l.is_block() || matches!(l.kind(), LabelKind::ThreadFinish { .. }))
    }

    fn finish_execution(&mut self, interp: &dyn Interpreter) -> Result<(), CheckerError> {
        if self.abandoned || !self.state.graph.is_consistent(CheckStrength::Full) {
            self.result.stats.inconsistent += 1;
            debug!(abandoned = self.abandoned, "execution discarded");
            return Ok(());
        }

        let before = self.result.findings.len();
        let infeasible = self
            .state
            .graph
            .labels()
            .any(|l| matches!(l.kind(), LabelKind::Block(BlockKind::Assume)));

        if self.state.graph.all_threads_finished() {
            self.result.stats.complete += 1;
            *self.result.outcomes.entry(interp.outcome()).or_default() += 1;
            debug!(outcome = %interp.outcome(), "execution complete");
        } else {
            self.result.stats.blocked += 1;
            debug!(infeasible, "execution blocked");
            if let Some(threads) = self.deadlocked_threads() {
                self.result.add_finding(Finding::Deadlock { threads });
            }
        }

        if !infeasible {
            for finding in std::mem::take(&mut self.pending) {
                self.result.add_finding(finding);
            }
            let query = GraphQuery::new(&self.state.graph);
            for detector in &self.detectors {
                for finding in detector.check(query) {
                    trace!(detector = detector.name(), %finding, "detector fired");
                    self.result.add_finding(finding);
                }
            }
        }

        let found = self.result.findings.len() - before;
        for finding in &self.result.findings[before..] {
            warn!(kind = finding.kind(), %finding, "finding");
        }
        if found > 0 && self.config.halt_on_error {
            info!("halting on first error");
            self.halted = true;
            if let Some(sink) = &self.sink {
                sink.signal_halt();
            }
        }
        Ok(())
    }

    /// Unfinished threads, when every one of them waits on a join or on a
    /// lock whose latest store holds it
    fn deadlocked_threads(&self) -> Option<Vec<usize>> {
        let graph = &self.state.graph;
        let mut stuck = Vec::new();
        let mut on_lock = false;
        for t in 0..graph.num_threads() {
            let Some(last) = graph.last_label(t) else { continue };
            match last.kind() {
                LabelKind::ThreadFinish { .. } => continue,
                LabelKind::Block(BlockKind::Join { .. }) => {}
                LabelKind::Block(BlockKind::Lock { addr }) => {
                    let latest = graph
                        .stores(*addr)
                        .iter()
                        .copied()
                        .find(|&s| graph.is_co_maximal(*addr, s))
                        .unwrap_or(Event::INIT);
                    if graph.store_value(latest) != Some(1) {
                        return None;
                    }
                    on_lock = true;
                }
                _ => return None,
            }
            stuck.push(t);
        }
        (on_lock && !stuck.is_empty()).then_some(stuck)
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Backtracking
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Prepare the next execution; `false` once the search is exhausted
    fn backtrack(&mut self) -> Result<bool, CheckerError> {
        loop {
            if self.halted || self.sink.as_ref().is_some_and(|s| s.should_halt()) {
                return Ok(false);
            }
            let Some((stamp, item)) = self.state.worklist.pop() else {
                match self.stack.pop() {
                    Some(parent) => {
                        trace!(depth = self.stack.len(), "subtree exhausted");
                        self.state = parent;
                        continue;
                    }
                    None => return Ok(false),
                }
            };

            self.state.graph.cut_to_stamp(stamp)?;
            self.state.worklist.truncate_after(stamp);
            self.state.prune_choices();

            let applied = match item {
                Revisit::Forward(ForwardRevisit::Read { pos, rf }) => self.revisit_read(pos, rf)?,
                Revisit::Forward(ForwardRevisit::Placement { pos, offset }) => {
                    self.revisit_placement(pos, offset)?
                }
                Revisit::Backward(br) => self.revisit_backward(br)?,
            };
            if matches!(applied, Applied::Explore) {
                return Ok(true);
            }
        }
    }

    fn revisit_read(&mut self, read: Event, rf: Event) -> Result<Applied, CheckerError> {
        debug!(%read, %rf, "forward revisit");
        let graph = &mut self.state.graph;
        graph.change_rf(read, Some(rf))?;
        graph.set_added_max(read, false)?;
        self.state.record(Choice::ReadsFrom { read, rf });
        self.state.last_event = Some(read);
        self.result.stats.forward_revisits += 1;
        Ok(self.step_verdict())
    }

    fn revisit_placement(&mut self, store: Event, offset: usize) -> Result<Applied, CheckerError> {
        debug!(%store, offset, "placement revisit");
        let addr = self.state.graph.write(store)?.addr;
        self.state.graph.move_store(addr, store, offset);
        self.state.graph.set_added_max(store, false)?;
        self.state.record(Choice::Placement { store, offset });
        self.state.last_event = Some(store);
        self.result.stats.forward_revisits += 1;
        self.push_backward_revisits(store)?;
        Ok(self.step_verdict())
    }

    fn revisit_backward(&mut self, br: BackwardRevisit) -> Result<Applied, CheckerError> {
        let BackwardRevisit { read, write } = br;
        debug!(%read, %write, depth = self.stack.len(), "backward revisit");
        let parent = &self.state.graph;
        let addr = parent.read(read)?.addr;
        let read_stamp = parent.get(read)?.stamp();
        let keep = self.revisit_view(read_stamp, &parent.revisit_prefix(write)?);

        let mut child = parent.copy_to_view(&keep)?;
        child.change_rf(read, Some(write))?;
        child.move_to_end(read)?;
        if cfg!(debug_assertions) {
            child.check_invariants()?;
        }
        let max = child.is_co_maximal(addr, write);
        child.set_added_max(read, max)?;
        let prefix = child.revisit_prefix(write)?;
        let settled: Vec<Event> = child
            .labels()
            .filter(|l| l.as_read().is_some() && prefix.contains(l.pos()))
            .map(EventLabel::pos)
            .collect();
        for r in settled {
            child.set_revisitable(r, false)?;
        }
        self.result.stats.backward_revisits += 1;

        if !child.is_consistent(CheckStrength::Step) {
            self.result.stats.inconsistent += 1;
            return Ok(Applied::Skip);
        }

        let mut next = self.state.child(child, Choice::Revisit { read, write });
        if let Some(sink) = &self.sink {
            match sink.offer(next) {
                None => {
                    trace!(%read, %write, "subtree handed off");
                    return Ok(Applied::Skip);
                }
                Some(refused) => next = refused,
            }
        }
        let parent = std::mem::replace(&mut self.state, next);
        self.stack.push(parent);
        self.result.stats.max_stack_depth = self.result.stats.max_stack_depth.max(self.stack.len());
        Ok(Applied::Explore)
    }

    fn step_verdict(&mut self) -> Applied {
        if self.state.graph.is_consistent(CheckStrength::Step) {
            Applied::Explore
        } else {
            self.result.stats.inconsistent += 1;
            Applied::Skip
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Alternatives
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Events a backward revisit keeps: the prefix up to the read plus the
    /// store's revisit prefix
    fn revisit_view(&self, read_stamp: crate::domain::graph::Stamp, prefix: &DepView) -> DepView {
        let graph = &self.state.graph;
        let mut keep = if graph.model().tracks_dependencies() {
            graph.dep_view_from_stamp(read_stamp)
        } else {
            DepView::from(graph.view_from_stamp(read_stamp))
        };
        keep.update(prefix);
        keep
    }

    /// Choose a store for a fresh read; `false` when none is consistent
    fn visit_read(&mut self, read: Event) -> Result<bool, CheckerError> {
        let candidates = self.state.graph.coherent_stores(read);
        let stamp = self.state.graph.get(read)?.stamp();
        let mut chosen = None;
        for (i, &rf) in candidates.iter().enumerate() {
            if chosen.is_some() {
                self.state
                    .worklist
                    .push(stamp, Revisit::Forward(ForwardRevisit::Read { pos: read, rf }));
                continue;
            }
            self.state.graph.change_rf(read, Some(rf))?;
            self.state.graph.set_added_max(read, i == 0)?;
            if self.state.graph.is_consistent(CheckStrength::Step) {
                chosen = Some(rf);
            }
        }
        match chosen {
            Some(rf) => {
                trace!(%read, %rf, alternatives = candidates.len() - 1, "read placed");
                self.state.record(Choice::ReadsFrom { read, rf });
                Ok(true)
            }
            None => {
                self.abandon(read, "no consistent store to read from");
                Ok(false)
            }
        }
    }

    /// Place a fresh store and queue what it may revisit; `false` when the
    /// execution is abandoned
    fn visit_write(&mut self, write: Event) -> Result<bool, CheckerError> {
        let graph = &self.state.graph;
        let (addr, exclusive) = {
            let w = graph.write(write)?;
            (w.addr, w.exclusive)
        };
        let stamp = graph.get(write)?.stamp();
        let placings = graph.possible_placings(addr, write);
        let (lo, hi) = (*placings.start(), *placings.end());
        let offset = if exclusive { lo } else { hi };
        let explicit = graph.coherence().kind().is_explicit();

        self.state.graph.add_store_to_loc(addr, write, offset);
        if explicit {
            self.state.record(Choice::Placement { store: write, offset });
            if !exclusive {
                for alt in lo..hi {
                    self.state.worklist.push(
                        stamp,
                        Revisit::Forward(ForwardRevisit::Placement { pos: write, offset: alt }),
                    );
                }
            }
        }

        if let Some(rival) = self.rival_update(addr, write) {
            if self.is_maximal_extension(rival, write)? {
                self.state
                    .worklist
                    .push(stamp, Revisit::Backward(BackwardRevisit { read: rival, write }));
            }
            self.abandon(write, "atomic update source already consumed");
            return Ok(false);
        }

        self.push_backward_revisits(write)?;
        Ok(self.check_step(write))
    }

    /// Completed atomic update that already consumed the source of the
    /// exclusive store `write`
    fn rival_update(&self, addr: Address, write: Event) -> Option<Event> {
        let graph = &self.state.graph;
        let own = write.prev()?;
        let src = rmw_source(graph, write)?;
        if !is_rmw_consumed(graph, addr, src, own) {
            return None;
        }
        graph
            .readers(addr, src)
            .into_iter()
            .find(|&r| r != own && exclusive_write_of(graph, r).is_some())
    }

    fn push_backward_revisits(&mut self, write: Event) -> Result<(), CheckerError> {
        let stamp = self.state.graph.get(write)?.stamp();
        for read in self.state.graph.coherent_revisits(write) {
            if self.is_maximal_extension(read, write)? {
                trace!(%read, %write, "backward revisit queued");
                self.state
                    .worklist
                    .push(stamp, Revisit::Backward(BackwardRevisit { read, write }));
            }
        }
        Ok(())
    }

    /// Whether revisiting `read` with `write` deletes only maximally added
    /// events, so every graph is produced by exactly one revisit
    fn is_maximal_extension(&self, read: Event, write: Event) -> Result<bool, CheckerError> {
        let graph = &self.state.graph;
        let r = graph.read(read)?;
        if !r.revisitable || !r.added_max {
            return Ok(false);
        }
        let addr = r.addr;
        let read_stamp = graph.get(read)?.stamp();
        if read_stamp >= graph.get(write)?.stamp() {
            return Ok(false);
        }
        let prefix = graph.revisit_prefix(write)?;
        if prefix.contains(read) {
            return Ok(false);
        }
        let keep = self.revisit_view(read_stamp, &prefix);
        let kept = |e: Event| e.is_init() || keep.contains(e);

        if r.rmw.is_rmw() {
            let taken = graph.readers(addr, write).into_iter().any(|o| {
                o != read && kept(o) && exclusive_write_of(graph, o).is_some_and(|w| kept(w))
            });
            if taken {
                return Ok(false);
            }
        }

        // coherence as it stands once `read` observes `write`
        let mut after = graph.clone();
        after.change_rf(read, Some(write))?;
        let survives = |loc: Address, store: Event| {
            after
                .stores(loc)
                .iter()
                .copied()
                .filter(|&s| s != store && (s == write || kept(s)))
                .any(|s| after.co_before(loc, store, s))
        };
        for lab in graph.labels() {
            if lab.stamp() <= read_stamp || kept(lab.pos()) {
                continue;
            }
            match lab.kind() {
                LabelKind::Read(d) => {
                    if !d.added_max || d.rf.is_some_and(|rf| survives(d.addr, rf)) {
                        return Ok(false);
                    }
                }
                LabelKind::Write(d) => {
                    if !d.added_max || survives(d.addr, lab.pos()) {
                        return Ok(false);
                    }
                }
                _ => {}
            }
        }

        let dangling = graph
            .labels()
            .filter(|l| l.pos() != read && kept(l.pos()))
            .filter_map(|l| l.as_read().and_then(|r| r.rf))
            .any(|rf| !kept(rf));
        if dangling {
            return Ok(false);
        }

        let exclusive = graph.write(write)?.exclusive;
        if graph.coherence().kind().is_explicit() && !exclusive {
            let stores = graph.stores(addr);
            let succ = stores
                .iter()
                .position(|&s| s == write)
                .and_then(|i| stores.get(i + 1));
            if succ.is_some_and(|&s| !kept(s)) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn check_step(&mut self, pos: Event) -> bool {
        let ok = self.state.graph.is_consistent(CheckStrength::Step);
        if !ok {
            self.abandon(pos, "inconsistent after step");
        }
        ok
    }

    fn abandon(&mut self, pos: Event, reason: &'static str) {
        trace!(%pos, reason, "execution abandoned");
        self.abandoned = true;
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Replay plumbing
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    fn position(&self, thread: usize) -> Result<Event, CheckerError> {
        self.cursors
            .get(thread)
            .copied()
            .filter(|&c| c > 0)
            .map(|c| Event::new(thread, c))
            .ok_or(CheckerError::UnknownThread(thread))
    }

    fn slot(
        &mut self,
        thread: usize,
        ordering: MemOrdering,
        kind: &LabelKind,
    ) -> Result<Slot, CheckerError> {
        let pos = self.position(thread)?;
        let Some(lab) = self.state.graph.label(pos).filter(|l| !l.is_empty()) else {
            return Ok(Slot::Fresh(pos));
        };
        if lab.is_block() {
            self.cursors[thread] += 1;
            return Ok(Slot::Blocked);
        }
        if !same_instruction(lab, ordering, kind) {
            return Err(CheckerError::ReplayMismatch {
                pos,
                recorded: format!("{:?}", lab.kind()),
                issued: format!("{kind:?}"),
            });
        }
        self.cursors[thread] += 1;
        Ok(Slot::Recorded(pos))
    }

    /// Add a fresh label, or block the thread when it hit the event bound
    fn add(&mut self, label: EventLabel) -> Result<Option<Event>, CheckerError> {
        let pos = label.pos();
        if pos.index >= self.config.max_thread_events {
            let warning = Warning::GraphBound {
                thread: pos.thread,
                events: pos.index,
            };
            warn!(%warning, "graph bound reached");
            self.result.add_warning(warning);
            self.put_block(pos, BlockKind::Bound)?;
            return Ok(None);
        }
        self.state.graph.add_label(label)?;
        self.cursors[pos.thread] = pos.index + 1;
        self.state.last_event = Some(pos);
        trace!(%pos, "event added");
        Ok(Some(pos))
    }

    fn put_block(&mut self, pos: Event, kind: BlockKind) -> Result<(), CheckerError> {
        self.state
            .graph
            .add_label(EventLabel::new(pos, MemOrdering::NotAtomic, LabelKind::Block(kind)))?;
        self.cursors[pos.thread] = pos.index + 1;
        debug!(thread = pos.thread, ?kind, "thread blocked");
        Ok(())
    }

    fn block_thread(&mut self, thread: usize, kind: BlockKind) -> Result<(), CheckerError> {
        let pos = self.position(thread)?;
        match self.state.graph.label(pos).filter(|l| !l.is_empty()) {
            Some(lab) if lab.is_block() => {
                self.cursors[thread] += 1;
                Ok(())
            }
            Some(lab) => Err(CheckerError::ReplayMismatch {
                pos,
                recorded: format!("{:?}", lab.kind()),
                issued: format!("{:?}", LabelKind::Block(kind)),
            }),
            None => self.put_block(pos, kind),
        }
    }

    fn recorded_value(&self, read: Event) -> Result<Value, CheckerError> {
        self.state
            .graph
            .read_value(read)
            .ok_or_else(|| GraphError::MissingRf(read).into())
    }

    /// Non-memory event: replay it or add it and check the step
    fn plain_event(
        &mut self,
        thread: usize,
        ordering: MemOrdering,
        kind: LabelKind,
    ) -> Result<Option<Event>, CheckerError> {
        match self.slot(thread, ordering, &kind)? {
            Slot::Blocked => Ok(None),
            Slot::Recorded(pos) => Ok(Some(pos)),
            Slot::Fresh(pos) => {
                let Some(pos) = self.add(EventLabel::new(pos, ordering, kind))? else {
                    return Ok(None);
                };
                Ok(self.check_step(pos).then_some(pos))
            }
        }
    }

    fn read_access(
        &mut self,
        thread: usize,
        addr: Address,
        ordering: MemOrdering,
        rmw: RmwKind,
        deps: Vec<Event>,
    ) -> Result<Option<(Event, Value)>, CheckerError> {
        let kind = LabelKind::Read(ReadLabel::new(addr, rmw));
        match self.slot(thread, ordering, &kind)? {
            Slot::Blocked => Ok(None),
            Slot::Recorded(pos) => Ok(Some((pos, self.recorded_value(pos)?))),
            Slot::Fresh(pos) => {
                let label = EventLabel::new(pos, ordering, kind).with_deps(deps);
                let Some(pos) = self.add(label)? else {
                    return Ok(None);
                };
                if !self.visit_read(pos)? {
                    return Ok(None);
                }
                Ok(Some((pos, self.recorded_value(pos)?)))
            }
        }
    }

    fn write_access(
        &mut self,
        thread: usize,
        addr: Address,
        value: Value,
        ordering: MemOrdering,
        exclusive: bool,
        deps: Vec<Event>,
    ) -> Result<Option<Event>, CheckerError> {
        let kind = LabelKind::Write(WriteLabel::new(addr, value, exclusive));
        match self.slot(thread, ordering, &kind)? {
            Slot::Blocked => Ok(None),
            Slot::Recorded(pos) => Ok(Some(pos)),
            Slot::Fresh(pos) => {
                let label = EventLabel::new(pos, ordering, kind).with_deps(deps);
                let Some(pos) = self.add(label)? else {
                    return Ok(None);
                };
                Ok(self.visit_write(pos)?.then_some(pos))
            }
        }
    }

    fn update(
        &mut self,
        thread: usize,
        addr: Address,
        rmw: RmwKind,
        ordering: MemOrdering,
        deps: Vec<Event>,
    ) -> Result<Option<Value>, CheckerError> {
        let (load_ord, store_ord) = split_rmw(ordering);
        let Some((read, old)) = self.read_access(thread, addr, load_ord, rmw, deps)? else {
            return Ok(None);
        };
        if let Some(new) = rmw.exclusive_store(old) {
            if self
                .write_access(thread, addr, new, store_ord, true, vec![read])?
                .is_none()
            {
                return Ok(None);
            }
        }
        Ok(Some(old))
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Interpreter handlers
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //
    // Every handler returns `Ok(None)` when the thread cannot continue: it
    // blocked, or the execution was abandoned. `deps` lists the earlier
    // events of the same thread the instruction depends on.

    /// Load from `addr`
    pub fn load(
        &mut self,
        thread: usize,
        addr: Address,
        ordering: MemOrdering,
        deps: Vec<Event>,
    ) -> Result<Option<Value>, CheckerError> {
        Ok(self
            .read_access(thread, addr, ordering, RmwKind::None, deps)?
            .map(|(_, v)| v))
    }

    /// Store `value` to `addr`
    pub fn store(
        &mut self,
        thread: usize,
        addr: Address,
        value: Value,
        ordering: MemOrdering,
        deps: Vec<Event>,
    ) -> Result<Option<()>, CheckerError> {
        Ok(self
            .write_access(thread, addr, value, ordering, false, deps)?
            .map(|_| ()))
    }

    /// Atomic fetch-and-add; returns the old value
    pub fn fetch_add(
        &mut self,
        thread: usize,
        addr: Address,
        operand: Value,
        ordering: MemOrdering,
        deps: Vec<Event>,
    ) -> Result<Option<Value>, CheckerError> {
        self.update(thread, addr, RmwKind::FetchAdd { operand }, ordering, deps)
    }

    /// Atomic compare-and-swap; returns the old value
    pub fn compare_exchange(
        &mut self,
        thread: usize,
        addr: Address,
        expected: Value,
        desired: Value,
        ordering: MemOrdering,
        deps: Vec<Event>,
    ) -> Result<Option<Value>, CheckerError> {
        let rmw = RmwKind::CompareExchange { expected, desired };
        self.update(thread, addr, rmw, ordering, deps)
    }

    /// Memory fence
    pub fn fence(&mut self, thread: usize, ordering: MemOrdering) -> Result<Option<()>, CheckerError> {
        Ok(self.plain_event(thread, ordering, LabelKind::Fence)?.map(|_| ()))
    }

    /// Acquire the mutex at `addr`
    pub fn lock(&mut self, thread: usize, addr: Address) -> Result<Option<()>, CheckerError> {
        let Some((read, value)) =
            self.read_access(thread, addr, MemOrdering::Acquire, RmwKind::Lock, Vec::new())?
        else {
            return Ok(None);
        };
        match RmwKind::Lock.exclusive_store(value) {
            Some(held) => Ok(self
                .write_access(thread, addr, held, MemOrdering::Relaxed, true, vec![read])?
                .map(|_| ())),
            None => {
                self.block_thread(thread, BlockKind::Lock { addr })?;
                Ok(None)
            }
        }
    }

    /// Release the mutex at `addr`
    pub fn unlock(&mut self, thread: usize, addr: Address) -> Result<Option<()>, CheckerError> {
        self.store(thread, addr, 0, MemOrdering::Release, Vec::new())
    }

    /// Enter an RCU read-side critical section
    pub fn rcu_lock(&mut self, thread: usize) -> Result<Option<()>, CheckerError> {
        Ok(self
            .plain_event(thread, MemOrdering::Relaxed, LabelKind::RcuLock)?
            .map(|_| ()))
    }

    /// Leave an RCU read-side critical section
    pub fn rcu_unlock(&mut self, thread: usize) -> Result<Option<()>, CheckerError> {
        Ok(self
            .plain_event(thread, MemOrdering::Relaxed, LabelKind::RcuUnlock)?
            .map(|_| ()))
    }

    /// Wait for an RCU grace period
    pub fn sync_rcu(&mut self, thread: usize) -> Result<Option<()>, CheckerError> {
        Ok(self
            .plain_event(thread, MemOrdering::Relaxed, LabelKind::RcuSync)?
            .map(|_| ()))
    }

    /// Allocate `size` cells; returns the block's base address
    pub fn malloc(&mut self, thread: usize, size: u64) -> Result<Option<Address>, CheckerError> {
        let expected = LabelKind::Malloc {
            addr: Address(0),
            size,
        };
        match self.slot(thread, MemOrdering::NotAtomic, &expected)? {
            Slot::Blocked => Ok(None),
            Slot::Recorded(pos) => match self.state.graph.get(pos)?.kind() {
                LabelKind::Malloc { addr, .. } => Ok(Some(*addr)),
                _ => Err(GraphError::NoSuchEvent(pos).into()),
            },
            Slot::Fresh(pos) => {
                let addr = self.state.allocator.allocate(&self.state.graph);
                let kind = LabelKind::Malloc { addr, size };
                let Some(pos) = self.add(EventLabel::new(pos, MemOrdering::NotAtomic, kind))? else {
                    return Ok(None);
                };
                Ok(self.check_step(pos).then_some(addr))
            }
        }
    }

    /// Free the block based at `addr`
    pub fn free(&mut self, thread: usize, addr: Address) -> Result<Option<()>, CheckerError> {
        Ok(self
            .plain_event(thread, MemOrdering::NotAtomic, LabelKind::Free { addr })?
            .map(|_| ()))
    }

    /// Spawn a thread; returns the child's id
    pub fn spawn(&mut self, thread: usize) -> Result<Option<usize>, CheckerError> {
        let pos = self.position(thread)?;
        let child = match self.state.graph.label(pos).map(EventLabel::kind) {
            Some(LabelKind::ThreadCreate { child }) => *child,
            _ => {
                // slot `bound` is past both the graph and the cursors, so always free
                let bound = self.state.graph.num_threads().max(self.cursors.len());
                (1..=bound)
                    .find(|&t| {
                        self.state.graph.thread_size(t) == 0
                            && self.cursors.get(t).copied().unwrap_or(0) == 0
                    })
                    .ok_or(CheckerError::UnknownThread(bound))?
            }
        };
        let kind = LabelKind::ThreadCreate { child };
        let Some(create) = self.plain_event(thread, MemOrdering::Relaxed, kind)? else {
            return Ok(None);
        };
        let start = Event::thread_start(child);
        if !self.state.graph.contains(start) {
            self.state.graph.add_label(EventLabel::new(
                start,
                MemOrdering::Relaxed,
                LabelKind::ThreadStart { create: Some(create) },
            ))?;
        }
        if self.cursors.len() <= child {
            self.cursors.resize(child + 1, 0);
        }
        self.cursors[child] = 1;
        trace!(parent = thread, child, "thread spawned");
        Ok(Some(child))
    }

    /// Wait for `child` to finish
    pub fn join(&mut self, thread: usize, child: usize) -> Result<Option<()>, CheckerError> {
        let kind = LabelKind::ThreadJoin { child, finish: None };
        match self.slot(thread, MemOrdering::Relaxed, &kind)? {
            Slot::Blocked => Ok(None),
            Slot::Recorded(_) => Ok(Some(())),
            Slot::Fresh(pos) => {
                let finish = self.state.graph.last_label(child).filter(|l| {
                    matches!(l.kind(), LabelKind::ThreadFinish { joiner: None })
                });
                let Some(finish) = finish.map(EventLabel::pos) else {
                    self.put_block(pos, BlockKind::Join { child })?;
                    return Ok(None);
                };
                let kind = LabelKind::ThreadJoin {
                    child,
                    finish: Some(finish),
                };
                let Some(pos) = self.add(EventLabel::new(pos, MemOrdering::Relaxed, kind))? else {
                    return Ok(None);
                };
                Ok(self.check_step(pos).then_some(()))
            }
        }
    }

    /// End the thread, waking a joiner blocked on it
    pub fn finish(&mut self, thread: usize) -> Result<Option<()>, CheckerError> {
        let kind = LabelKind::ThreadFinish { joiner: None };
        match self.slot(thread, MemOrdering::Relaxed, &kind)? {
            Slot::Blocked => Ok(None),
            Slot::Recorded(_) => Ok(Some(())),
            Slot::Fresh(pos) => {
                if self
                    .add(EventLabel::new(pos, MemOrdering::Relaxed, kind))?
                    .is_none()
                {
                    return Ok(None);
                }
                let joiner = (0..self.state.graph.num_threads()).find(|&t| {
                    self.state.graph.last_label(t).is_some_and(|l| {
                        matches!(l.kind(), LabelKind::Block(BlockKind::Join { child }) if *child == thread)
                    })
                });
                if let Some(t) = joiner {
                    self.state.graph.remove_last(t)?;
                    if let Some(c) = self.cursors.get_mut(t) {
                        *c = self.state.graph.thread_size(t);
                    }
                    trace!(thread = t, child = thread, "joiner woken");
                }
                Ok(self.check_step(pos).then_some(()))
            }
        }
    }

    /// Discard executions where `cond` fails
    pub fn assume(&mut self, thread: usize, cond: bool) -> Result<Option<()>, CheckerError> {
        self.position(thread)?;
        if cond {
            return Ok(Some(()));
        }
        self.block_thread(thread, BlockKind::Assume)?;
        Ok(None)
    }

    /// Report an assertion failure when `cond` fails
    ///
    /// The finding is committed only if the execution turns out consistent.
    pub fn assert(&mut self, thread: usize, cond: bool, message: &str) -> Result<(), CheckerError> {
        self.position(thread)?;
        if !cond {
            self.pending.push(Finding::AssertionViolation {
                thread,
                message: message.to_owned(),
            });
        }
        Ok(())
    }
}

/// Whether a recorded label is what the interpreter issued again
fn same_instruction(recorded: &EventLabel, ordering: MemOrdering, issued: &LabelKind) -> bool {
    if recorded.ordering() != ordering {
        return false;
    }
    match (recorded.kind(), issued) {
        (LabelKind::Read(a), LabelKind::Read(b)) => a.addr == b.addr && a.rmw == b.rmw,
        (LabelKind::Write(a), LabelKind::Write(b)) => {
            a.addr == b.addr && a.value == b.value && a.exclusive == b.exclusive
        }
        (LabelKind::ThreadCreate { child: a }, LabelKind::ThreadCreate { child: b })
        | (LabelKind::ThreadJoin { child: a, .. }, LabelKind::ThreadJoin { child: b, .. }) => a == b,
        (LabelKind::Malloc { size: a, .. }, LabelKind::Malloc { size: b, .. }) => a == b,
        (LabelKind::Free { addr: a }, LabelKind::Free { addr: b }) => a == b,
        (a, b) => std::mem::discriminant(a) == std::mem::discriminant(b),
    }
}

/// Orderings of the load and store halves of an atomic update
const fn split_rmw(ordering: MemOrdering) -> (MemOrdering, MemOrdering) {
    match ordering {
        MemOrdering::AcqRel => (MemOrdering::Acquire, MemOrdering::Release),
        MemOrdering::Acquire => (MemOrdering::Acquire, MemOrdering::Relaxed),
        MemOrdering::Release => (MemOrdering::Relaxed, MemOrdering::Release),
        other => (other, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{CoherenceKind, MemoryModel};
    use crate::domain::report::Outcome;

    const X: Address = Address(0x10);
    const Y: Address = Address(0x18);

    /// Store buffering: T1 writes x then reads y, T2 the reverse
    #[derive(Default)]
    struct StoreBuffering {
        pc: [usize; 3],
        children: Vec<usize>,
        regs: [Value; 2],
    }

    impl Interpreter for StoreBuffering {
        fn reset(&mut self) {
            *self = Self::default();
        }

        fn thread_count(&self) -> usize {
            3
        }

        fn step(&mut self, thread: usize, ex: &mut Explorer) -> Result<(), CheckerError> {
            let slot = if thread == 0 {
                0
            } else {
                1 + self.children.iter().position(|&c| c == thread).unwrap()
            };
            let pc = self.pc[slot];
            let done = match (slot, pc) {
                (0, 0 | 1) => ex.spawn(0)?.map(|c| self.children.push(c)).is_some(),
                (0, 2 | 3) => ex.join(0, self.children[pc - 2])?.is_some(),
                (1, 0) => ex.store(thread, X, 1, MemOrdering::Relaxed, vec![])?.is_some(),
                (2, 0) => ex.store(thread, Y, 1, MemOrdering::Relaxed, vec![])?.is_some(),
                (1, 1) => ex
                    .load(thread, Y, MemOrdering::Relaxed, vec![])?
                    .map(|v| self.regs[0] = v)
                    .is_some(),
                (2, 1) => ex
                    .load(thread, X, MemOrdering::Relaxed, vec![])?
                    .map(|v| self.regs[1] = v)
                    .is_some(),
                _ => ex.finish(thread)?.is_some(),
            };
            if done {
                self.pc[slot] += 1;
            }
            Ok(())
        }

        fn outcome(&self) -> Outcome {
            Outcome::from_pairs([("r0", self.regs[0]), ("r1", self.regs[1])])
        }
    }

    /// One thread storing forever
    struct Spinner {
        spawned: Option<usize>,
    }

    impl Interpreter for Spinner {
        fn reset(&mut self) {
            self.spawned = None;
        }

        fn thread_count(&self) -> usize {
            2
        }

        fn step(&mut self, thread: usize, ex: &mut Explorer) -> Result<(), CheckerError> {
            if thread == 0 {
                match self.spawned {
                    None => self.spawned = ex.spawn(0)?,
                    Some(c) => {
                        ex.join(0, c)?;
                    }
                }
            } else {
                ex.store(thread, X, 1, MemOrdering::Relaxed, vec![])?;
            }
            Ok(())
        }

        fn outcome(&self) -> Outcome {
            Outcome::default()
        }
    }

    fn explore(config: CheckerConfig) -> VerificationResult {
        let mut ex = Explorer::new(config);
        ex.run(&mut StoreBuffering::default()).unwrap()
    }

    #[test]
    fn test_store_buffering_rc11() {
        let result = explore(CheckerConfig::default().keep_going());
        assert_eq!(result.stats.complete, 4);
        assert_eq!(result.outcomes.len(), 4);
        assert!(result.allows(&Outcome::from_pairs([("r0", 0), ("r1", 0)])));
        assert!(result.is_clean());
    }

    #[test]
    fn test_store_buffering_sc_forbids_both_zero() {
        let result = explore(CheckerConfig::default().with_model(MemoryModel::Sc));
        assert_eq!(result.stats.complete, 3);
        assert!(!result.allows(&Outcome::from_pairs([("r0", 0), ("r1", 0)])));
    }

    #[test]
    fn test_store_buffering_explicit_order() {
        let config = CheckerConfig::default().with_coherence(CoherenceKind::ExplicitOrder);
        let result = explore(config);
        assert_eq!(result.stats.complete, 4);
        assert!(result.stats.backward_revisits > 0);
    }

    #[test]
    fn test_graph_bound_blocks_thread() {
        let config = CheckerConfig::default().with_max_thread_events(4);
        let mut ex = Explorer::new(config);
        let result = ex.run(&mut Spinner { spawned: None }).unwrap();
        assert_eq!(
            result.warnings,
            vec![Warning::GraphBound { thread: 1, events: 4 }]
        );
        assert_eq!(result.stats.complete, 0);
        assert_eq!(result.stats.blocked, 1);
    }

    #[test]
    fn test_frontier_ends_with_live_state() {
        let mut ex = Explorer::new(CheckerConfig::default());
        ex.run(&mut StoreBuffering::default()).unwrap();
        let frontier = ex.frontier();
        assert!(!frontier.is_empty());
        assert!(frontier.iter().all(|s| s.worklist.is_empty()));

        let mut resumed = Explorer::resume(CheckerConfig::default(), frontier);
        let rest = resumed.run(&mut StoreBuffering::default()).unwrap();
        assert_eq!(rest.stats.complete, 0, "nothing left after an exhausted search");
    }

    #[test]
    fn test_unknown_thread_is_an_error() {
        let mut ex = Explorer::new(CheckerConfig::default());
        ex.cursors = vec![1];
        assert_eq!(ex.load(3, X, MemOrdering::Relaxed, vec![]), Err(CheckerError::UnknownThread(3)));
    }

    #[test]
    fn test_spawn_takes_first_free_slot() {
        let mut ex = Explorer::new(CheckerConfig::default());
        ex.cursors = vec![1];
        assert_eq!(ex.spawn(0), Ok(Some(1)));
        assert_eq!(ex.spawn(0), Ok(Some(2)));
        assert_eq!(ex.cursors, vec![3, 1, 1]);
        assert!(ex.state.graph.contains(Event::thread_start(2)));
    }

    #[test]
    fn test_split_rmw_orderings() {
        assert_eq!(
            split_rmw(MemOrdering::AcqRel),
            (MemOrdering::Acquire, MemOrdering::Release)
        );
        assert_eq!(
            split_rmw(MemOrdering::SeqCst),
            (MemOrdering::SeqCst, MemOrdering::SeqCst)
        );
    }
}
