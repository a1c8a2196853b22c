//! Read-copy-update ordering
//!
//! Grace periods (`synchronize_rcu`) and read-side critical sections
//! (outermost `rcu_read_lock` .. `rcu_read_unlock`) are segments. A
//! critical section is entered at its unlock and left at its lock, so a
//! path through segments reads as
//!
//! ```text
//!   GP ──rcu-link──▶ [U ... L] ──rcu-link──▶ GP ...
//! ```
//!
//! A cycle of segments linked by `rcu-link` that holds at least as many
//! grace periods as critical sections is forbidden. The same counting,
//! applied to open paths, yields the `rcu-order` pairs feeding
//! strong fences.

use crate::domain::calc::algebra::{self, Pairs};
use crate::domain::calc::{CalculationResult, Calculator, RelationId, RelationTable};
use crate::domain::graph::{Event, ExecutionGraph, LabelKind};
use crate::domain::relation::{DfsVisitor, EdgeKind, Relation};
use std::collections::{BTreeSet, VecDeque};

/// `rcu-link = po? ; ar* ; pb* ; prop? ; po`
#[derive(Clone, Copy, Debug, Default)]
pub struct RcuLinkCalculator;

impl Calculator for RcuLinkCalculator {
    fn name(&self) -> &'static str {
        "rcu-link"
    }

    fn init_calc(&self, _graph: &ExecutionGraph, relations: &mut RelationTable) {
        relations.global_mut(RelationId::RcuLink);
    }

    fn do_calc(&self, graph: &ExecutionGraph, relations: &mut RelationTable) -> CalculationResult {
        if segments(graph).is_empty() {
            return CalculationResult::unchanged();
        }
        let po = algebra::po(graph);
        let prop = algebra::direct(relations, RelationId::Prop);
        let pb = algebra::global(relations, RelationId::Pb);
        let ar = algebra::global(relations, RelationId::Ar);

        let link = po.opt_seq(&ar.opt_seq(&pb.opt_seq(&prop.opt_seq(&po))));
        let changed = algebra::store_global(relations, RelationId::RcuLink, &link);
        CalculationResult::new(changed, true)
    }

    fn box_clone(&self) -> Box<dyn Calculator> {
        Box::new(*self)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Segments
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegmentKind {
    GracePeriod,
    CriticalSection,
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    kind: SegmentKind,
    /// Where a path enters the segment
    entry: Event,
    /// Where a path leaves the segment
    exit: Event,
}

impl Segment {
    const fn weight(&self) -> i64 {
        match self.kind {
            SegmentKind::GracePeriod => 1,
            SegmentKind::CriticalSection => -1,
        }
    }
}

/// Grace periods and closed outermost critical sections
fn segments(graph: &ExecutionGraph) -> Vec<Segment> {
    let mut out = Vec::new();
    for t in 0..graph.num_threads() {
        let mut depth = 0usize;
        let mut opened = None;
        for lab in graph.thread(t) {
            match lab.kind() {
                LabelKind::RcuSync => out.push(Segment {
                    kind: SegmentKind::GracePeriod,
                    entry: lab.pos(),
                    exit: lab.pos(),
                }),
                LabelKind::RcuLock => {
                    if depth == 0 {
                        opened = Some(lab.pos());
                    }
                    depth += 1;
                }
                LabelKind::RcuUnlock if depth > 0 => {
                    depth -= 1;
                    if depth == 0 {
                        if let Some(lock) = opened.take() {
                            out.push(Segment {
                                kind: SegmentKind::CriticalSection,
                                entry: lab.pos(),
                                exit: lock,
                            });
                        }
                    }
                }
                _ => {}
            }
        }
    }
    out
}

/// Segment graph: `a -> b` when `rcu-link(exit(a), entry(b))`
fn segment_graph(segs: &[Segment], link: &Relation<Event>) -> Relation<usize> {
    let mut rel = Relation::from_nodes(0..segs.len());
    for (i, a) in segs.iter().enumerate() {
        for (j, b) in segs.iter().enumerate() {
            if link.has_edge(a.exit, b.entry) {
                rel.add_edge(i, j);
            }
        }
    }
    rel
}

/// Counts grace periods minus critical sections along the DFS stack and
/// flags a back edge closing a cycle that is not outnumbered by
/// critical sections
struct ScopeCounter<'a> {
    segs: &'a [Segment],
    /// Node and running weight including it
    stack: Vec<(usize, i64)>,
    forbidden: bool,
}

impl DfsVisitor<usize> for ScopeCounter<'_> {
    fn enter_node(&mut self, node: usize) {
        let before = self.stack.last().map_or(0, |&(_, w)| w);
        self.stack.push((node, before + self.segs[node].weight()));
    }

    fn atypical_edge(&mut self, _from: usize, to: usize, kind: EdgeKind) {
        if kind != EdgeKind::Back {
            return;
        }
        let Some(top) = self.stack.last().map(|&(_, w)| w) else {
            return;
        };
        if let Some(k) = self.stack.iter().position(|&(n, _)| n == to) {
            let below = if k == 0 { 0 } else { self.stack[k - 1].1 };
            if top - below >= 0 {
                self.forbidden = true;
            }
        }
    }

    fn finish_node(&mut self, _node: usize) {
        self.stack.pop();
    }
}

/// Segment chains with at least as many grace periods as critical sections
fn rcu_order(segs: &[Segment], graph: &Relation<usize>) -> Pairs {
    let bound = i64::try_from(segs.len()).unwrap_or(i64::MAX);
    let mut out = Pairs::new();
    for (start, seg) in segs.iter().enumerate() {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([(start, seg.weight())]);
        while let Some((node, balance)) = queue.pop_front() {
            if !seen.insert((node, balance)) {
                continue;
            }
            if balance >= 0 {
                out.insert(seg.entry, segs[node].exit);
            }
            for next in graph.successors(node) {
                let b = balance + segs[next].weight();
                if b.abs() <= bound {
                    queue.push_back((next, b));
                }
            }
        }
    }
    out
}

/// `rcu-order` and the RCU axiom
#[derive(Clone, Copy, Debug, Default)]
pub struct RcuOrderCalculator;

impl Calculator for RcuOrderCalculator {
    fn name(&self) -> &'static str {
        "rcu"
    }

    fn init_calc(&self, _graph: &ExecutionGraph, relations: &mut RelationTable) {
        relations.global_mut(RelationId::RcuOrder);
    }

    fn do_calc(&self, graph: &ExecutionGraph, relations: &mut RelationTable) -> CalculationResult {
        let segs = segments(graph);
        if segs.is_empty() {
            return CalculationResult::unchanged();
        }
        let Some(link) = relations.global(RelationId::RcuLink) else {
            return CalculationResult::unchanged();
        };
        let seg_graph = segment_graph(&segs, link);

        let mut counter = ScopeCounter {
            segs: &segs,
            stack: Vec::new(),
            forbidden: false,
        };
        for root in 0..segs.len() {
            seg_graph.dfs_from(root, &mut counter);
        }

        let order = rcu_order(&segs, &seg_graph);
        let changed = algebra::store_global(relations, RelationId::RcuOrder, &order);
        CalculationResult::new(changed, !counter.forbidden)
    }

    fn box_clone(&self) -> Box<dyn Calculator> {
        Box::new(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calc::lkmm::tests::{graph, load, push, store, X, Y};
    use crate::domain::config::CheckStrength;
    use crate::domain::graph::MemOrdering;

    fn sync(g: &mut ExecutionGraph, t: usize) -> Event {
        push(g, t, MemOrdering::Relaxed, LabelKind::RcuSync)
    }

    fn lock(g: &mut ExecutionGraph, t: usize) -> Event {
        push(g, t, MemOrdering::Relaxed, LabelKind::RcuLock)
    }

    fn unlock(g: &mut ExecutionGraph, t: usize) -> Event {
        push(g, t, MemOrdering::Relaxed, LabelKind::RcuUnlock)
    }

    #[test]
    fn test_nested_sections_form_one_segment() {
        let mut g = graph(1);
        let l = lock(&mut g, 1);
        lock(&mut g, 1);
        unlock(&mut g, 1);
        let u = unlock(&mut g, 1);
        lock(&mut g, 1);
        let s = sync(&mut g, 1);

        let segs = segments(&g);
        assert_eq!(segs.len(), 2, "unclosed section is skipped");
        let cs = segs
            .iter()
            .find(|s| s.kind == SegmentKind::CriticalSection)
            .unwrap();
        assert_eq!((cs.entry, cs.exit), (u, l));
        assert!(segs.iter().any(|seg| seg.entry == s && seg.exit == s));
    }

    fn rcu_mp(r1_sees_y: bool, r2_sees_x: bool) -> ExecutionGraph {
        // T1: Wx=1; sync; Wy=1    T2: lock; r1 = Ry; r2 = Rx; unlock
        let mut g = graph(2);
        let wx = store(&mut g, 1, X, 1);
        sync(&mut g, 1);
        let wy = store(&mut g, 1, Y, 1);
        lock(&mut g, 2);
        load(&mut g, 2, Y, if r1_sees_y { wy } else { Event::INIT });
        load(&mut g, 2, X, if r2_sees_x { wx } else { Event::INIT });
        unlock(&mut g, 2);
        g
    }

    #[test]
    fn test_grace_period_forbids_stale_read_in_section() {
        let mut g = rcu_mp(true, false);
        assert!(!g.is_consistent(CheckStrength::Full));
    }

    #[test]
    fn test_grace_period_allows_ordered_outcomes() {
        for (a, b) in [(false, false), (false, true), (true, true)] {
            let mut g = rcu_mp(a, b);
            assert!(g.is_consistent(CheckStrength::Full), "r1={a} r2={b}");
        }
    }

    #[test]
    fn test_scope_counter_ignores_section_only_cycles() {
        let segs = [
            Segment {
                kind: SegmentKind::CriticalSection,
                entry: Event::new(1, 2),
                exit: Event::new(1, 1),
            },
            Segment {
                kind: SegmentKind::GracePeriod,
                entry: Event::new(2, 1),
                exit: Event::new(2, 1),
            },
        ];
        let mut rel = Relation::from_nodes(0..2);
        rel.add_edge(0, 0);
        let mut counter = ScopeCounter {
            segs: &segs,
            stack: Vec::new(),
            forbidden: false,
        };
        rel.dfs_from(0, &mut counter);
        assert!(!counter.forbidden);

        rel.add_edge(0, 1);
        rel.add_edge(1, 0);
        rel.dfs_from(0, &mut counter);
        assert!(counter.forbidden);
    }
}
