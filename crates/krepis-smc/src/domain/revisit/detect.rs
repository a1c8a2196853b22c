//! Error detectors
//!
//! Detectors see an execution only through [`GraphQuery`], the read-only
//! surface the exploration core exposes: cached happens-before views and
//! the coherence strategy's candidate sets. They run once per execution
//! that passed the full consistency check.

use super::state::Allocator;
use crate::domain::graph::{Address, Event, EventLabel, ExecutionGraph, LabelKind, MemOrdering, View};
use crate::domain::report::Finding;
use std::fmt;
use std::ops::RangeInclusive;

/// Read-only view of a graph for detectors
#[derive(Clone, Copy)]
pub struct GraphQuery<'a> {
    graph: &'a ExecutionGraph,
}

impl<'a> GraphQuery<'a> {
    /// Wrap a graph
    pub const fn new(graph: &'a ExecutionGraph) -> Self {
        Self { graph }
    }

    /// Every label, holes excluded
    pub fn labels(&self) -> impl Iterator<Item = &'a EventLabel> + 'a {
        self.graph.labels()
    }

    /// Label at `e`
    pub fn label(&self, e: Event) -> Option<&'a EventLabel> {
        self.graph.get(e).ok()
    }

    /// Happens-before view of `e`
    pub fn hb_view(&self, e: Event) -> Option<&'a View> {
        self.label(e).map(EventLabel::hb)
    }

    /// `a` strictly happens before `b`
    pub fn is_hb_before(&self, a: Event, b: Event) -> bool {
        a != b && self.graph.hb_before(a, b)
    }

    /// Stores `read` may observe, co-maximal first
    pub fn coherent_stores(&self, read: Event) -> Vec<Event> {
        self.graph.coherent_stores(read)
    }

    /// Reads `write` may backward-revisit
    pub fn coherent_revisits(&self, write: Event) -> Vec<Event> {
        self.graph.coherent_revisits(write)
    }

    /// Offsets `store` may take in its location's order
    pub fn coherent_placings(&self, addr: Address, store: Event) -> RangeInclusive<usize> {
        self.graph.possible_placings(addr, store)
    }

    /// Allocation block containing `addr`
    pub fn block_of(&self, addr: Address) -> Option<(Address, Event)> {
        Allocator::block_of(self.graph, addr)
    }
}

/// Checks one consistent execution for a class of bugs
pub trait ErrorDetector: fmt::Debug + Send + Sync {
    /// Detector name for logs
    fn name(&self) -> &'static str;

    /// Findings in this execution
    fn check(&self, graph: GraphQuery<'_>) -> Vec<Finding>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Data races
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Conflicting accesses from different threads, unordered by
/// happens-before, at least one of them non-atomic
#[derive(Debug, Clone, Copy, Default)]
pub struct RaceDetector;

impl ErrorDetector for RaceDetector {
    fn name(&self) -> &'static str {
        "race"
    }

    fn check(&self, graph: GraphQuery<'_>) -> Vec<Finding> {
        let mut accesses: Vec<&EventLabel> = graph.labels().filter(|l| l.is_access()).collect();
        accesses.sort_by_key(|l| l.stamp());

        let mut out = Vec::new();
        for (k, b) in accesses.iter().enumerate() {
            for a in &accesses[..k] {
                if a.pos().thread == b.pos().thread || a.addr() != b.addr() {
                    continue;
                }
                let writes = a.as_write().is_some() || b.as_write().is_some();
                let plain = a.ordering() == MemOrdering::NotAtomic
                    || b.ordering() == MemOrdering::NotAtomic;
                if !writes || !plain {
                    continue;
                }
                if graph.is_hb_before(a.pos(), b.pos()) || graph.is_hb_before(b.pos(), a.pos()) {
                    continue;
                }
                if let Some(addr) = a.addr() {
                    out.push(Finding::DataRace {
                        addr,
                        first: a.pos(),
                        second: b.pos(),
                    });
                }
            }
        }
        out
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Heap safety
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Use-after-free, double free and invalid free
#[derive(Debug, Clone, Copy, Default)]
pub struct MemorySafetyDetector;

impl ErrorDetector for MemorySafetyDetector {
    fn name(&self) -> &'static str {
        "memory-safety"
    }

    fn check(&self, graph: GraphQuery<'_>) -> Vec<Finding> {
        let mut frees: Vec<(&EventLabel, Address)> = graph
            .labels()
            .filter_map(|l| match l.kind() {
                LabelKind::Free { addr } => Some((l, *addr)),
                _ => None,
            })
            .collect();
        frees.sort_by_key(|(l, _)| l.stamp());

        let mut out = Vec::new();
        let mut valid: Vec<(Event, Address)> = Vec::new();
        for &(f, addr) in &frees {
            let is_base = graph
                .block_of(addr)
                .is_some_and(|(base, malloc)| base == addr && graph.is_hb_before(malloc, f.pos()));
            if !is_base {
                out.push(Finding::InvalidFree { addr, free: f.pos() });
                continue;
            }
            if let Some(&(first, _)) = valid.iter().find(|(_, a)| *a == addr) {
                out.push(Finding::DoubleFree {
                    addr,
                    first,
                    second: f.pos(),
                });
                continue;
            }
            valid.push((f.pos(), addr));
        }

        for access in graph.labels().filter(|l| l.is_access()) {
            let Some(addr) = access.addr() else { continue };
            let Some((base, _)) = graph.block_of(addr) else { continue };
            for &(free, freed) in &valid {
                if freed == base && !graph.is_hb_before(access.pos(), free) {
                    out.push(Finding::UseAfterFree {
                        addr,
                        access: access.pos(),
                        free,
                    });
                }
            }
        }
        out
    }
}

/// Detectors enabled for a configuration
pub fn default_detectors(check_races: bool) -> Vec<Box<dyn ErrorDetector>> {
    let mut out: Vec<Box<dyn ErrorDetector>> = vec![Box::new(MemorySafetyDetector)];
    if check_races {
        out.push(Box::new(RaceDetector));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{CoherenceKind, MemoryModel};
    use crate::domain::graph::{ReadLabel, RmwKind, WriteLabel};
    use crate::domain::revisit::state::HEAP_BASE;

    const X: Address = Address(0x10);

    fn graph(threads: usize) -> ExecutionGraph {
        let mut g = ExecutionGraph::new(MemoryModel::Rc11, CoherenceKind::DerivedOrder);
        for t in 1..=threads {
            let create = Event::new(0, g.thread_size(0));
            g.add_label(EventLabel::new(
                create,
                MemOrdering::Relaxed,
                LabelKind::ThreadCreate { child: t },
            ))
            .unwrap();
            g.add_label(EventLabel::new(
                Event::thread_start(t),
                MemOrdering::Relaxed,
                LabelKind::ThreadStart { create: Some(create) },
            ))
            .unwrap();
        }
        g
    }

    fn push(g: &mut ExecutionGraph, t: usize, ord: MemOrdering, kind: LabelKind) -> Event {
        let pos = Event::new(t, g.thread_size(t));
        g.add_label(EventLabel::new(pos, ord, kind)).unwrap();
        pos
    }

    fn store(g: &mut ExecutionGraph, t: usize, addr: Address, ord: MemOrdering) -> Event {
        let w = push(g, t, ord, LabelKind::Write(WriteLabel::new(addr, 1, false)));
        g.add_store_to_loc(addr, w, usize::MAX);
        w
    }

    fn load(g: &mut ExecutionGraph, t: usize, addr: Address, rf: Event, ord: MemOrdering) -> Event {
        let mut r = ReadLabel::new(addr, RmwKind::None);
        r.rf = Some(rf);
        push(g, t, ord, LabelKind::Read(r))
    }

    #[test]
    fn test_plain_conflict_is_a_race() {
        let mut g = graph(2);
        let w = store(&mut g, 1, X, MemOrdering::NotAtomic);
        let r = load(&mut g, 2, X, Event::INIT, MemOrdering::Relaxed);
        let found = RaceDetector.check(GraphQuery::new(&g));
        assert_eq!(
            found,
            vec![Finding::DataRace {
                addr: X,
                first: w,
                second: r
            }]
        );
    }

    #[test]
    fn test_atomic_or_ordered_accesses_do_not_race() {
        let mut g = graph(2);
        store(&mut g, 1, X, MemOrdering::Relaxed);
        load(&mut g, 2, X, Event::INIT, MemOrdering::Relaxed);
        assert!(RaceDetector.check(GraphQuery::new(&g)).is_empty());

        let mut g = graph(2);
        let w = store(&mut g, 1, X, MemOrdering::NotAtomic);
        let flag = Address(0x20);
        let f = store(&mut g, 1, flag, MemOrdering::Release);
        load(&mut g, 2, flag, f, MemOrdering::Acquire);
        load(&mut g, 2, X, w, MemOrdering::NotAtomic);
        assert!(RaceDetector.check(GraphQuery::new(&g)).is_empty());
    }

    #[test]
    fn test_heap_findings() {
        let mut g = graph(0);
        let base = Address(HEAP_BASE);
        // thread creation orders the malloc before both threads
        let m = push(
            &mut g,
            0,
            MemOrdering::NotAtomic,
            LabelKind::Malloc { addr: base, size: 1 },
        );
        for t in 1..=2 {
            let create = Event::new(0, g.thread_size(0));
            g.add_label(EventLabel::new(
                create,
                MemOrdering::Relaxed,
                LabelKind::ThreadCreate { child: t },
            ))
            .unwrap();
            g.add_label(EventLabel::new(
                Event::thread_start(t),
                MemOrdering::Relaxed,
                LabelKind::ThreadStart { create: Some(create) },
            ))
            .unwrap();
        }
        assert!(g.hb_before(m, Event::thread_start(2)));

        let f1 = push(&mut g, 1, MemOrdering::NotAtomic, LabelKind::Free { addr: base });
        let w = store(&mut g, 2, base, MemOrdering::NotAtomic);
        let f2 = push(&mut g, 2, MemOrdering::NotAtomic, LabelKind::Free { addr: base });
        let bad = push(
            &mut g,
            2,
            MemOrdering::NotAtomic,
            LabelKind::Free { addr: Address(0x30) },
        );

        let found = MemorySafetyDetector.check(GraphQuery::new(&g));
        assert!(found.contains(&Finding::DoubleFree {
            addr: base,
            first: f1,
            second: f2
        }));
        assert!(found.contains(&Finding::UseAfterFree {
            addr: base,
            access: w,
            free: f1
        }));
        assert!(found.contains(&Finding::InvalidFree {
            addr: Address(0x30),
            free: bad
        }));
        assert!(
            !found.contains(&Finding::UseAfterFree {
                addr: base,
                access: w,
                free: f2
            }),
            "store is po-before its own free"
        );
    }

    #[test]
    fn test_default_detectors() {
        let names: Vec<_> = default_detectors(true).iter().map(|d| d.name()).collect();
        assert_eq!(names, vec!["memory-safety", "race"]);
        assert_eq!(default_detectors(false).len(), 1);
    }
}
