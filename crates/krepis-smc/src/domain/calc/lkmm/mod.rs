//! Linux-kernel memory model
//!
//! The model is a chain of mutually dependent relations. Each link is its
//! own [`Calculator`] and reads the links computed before it from the
//! [`RelationTable`]; the fixpoint driver re-runs the chain until nothing
//! grows, so the cyclic dependency `pb → rcu-link → rcu-order →
//! strong-fence → pb` settles on its own.
//!
//! ```text
//! prop          (coe ∪ fre)? ; cumul-fence* ; rfe?
//! ar            ppo ∪ rfe ∪ (prop ∩ int)
//! pb            prop ; strong-fence ; ar*
//! rcu-link      po? ; ar* ; pb* ; prop? ; po
//! rcu-order     grace periods outnumbering critical sections
//! strong-fence  mb ∪ gp ∪ po ; rcu-order ; po
//! xb            po-loc ∪ rf ∪ co ∪ fr ∪ pb
//! ```
//!
//! Only memory accesses take part in the ordering relations; RCU events
//! appear only as the endpoints `rcu-link` is anchored on.

mod ar;
mod fence;
mod pb;
mod prop;
mod rcu;
mod xb;

pub use ar::ArCalculator;
pub use fence::StrongFenceCalculator;
pub use pb::PbCalculator;
pub use prop::PropCalculator;
pub use rcu::{RcuLinkCalculator, RcuOrderCalculator};
pub use xb::XbCalculator;

use super::algebra::{self, Pairs};
use super::{Calculator, RelationId, RelationTable};
use crate::domain::graph::{EventLabel, ExecutionGraph, LabelKind, VectorClock};

/// The LKMM calculators in dependency order
pub fn chain() -> Vec<Box<dyn Calculator>> {
    vec![
        Box::new(PropCalculator),
        Box::new(ArCalculator),
        Box::new(PbCalculator),
        Box::new(RcuLinkCalculator),
        Box::new(RcuOrderCalculator),
        Box::new(StrongFenceCalculator),
        Box::new(XbCalculator),
    ]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared base relations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Accesses on both sides of a po-later barrier matching `barrier`
fn across(graph: &ExecutionGraph, mut barrier: impl FnMut(&EventLabel) -> bool) -> Pairs {
    let mut out = Pairs::new();
    for t in 0..graph.num_threads() {
        let labels: Vec<&EventLabel> = graph.thread(t).iter().filter(|l| !l.is_empty()).collect();
        for (k, f) in labels.iter().enumerate() {
            if !barrier(f) {
                continue;
            }
            for a in labels[..k].iter().filter(|l| l.is_access()) {
                for b in labels[k + 1..].iter().filter(|l| l.is_access()) {
                    out.insert(a.pos(), b.pos());
                }
            }
        }
    }
    out
}

/// `po ; [F_mb] ; po` over accesses
pub(crate) fn mb(graph: &ExecutionGraph) -> Pairs {
    across(graph, |l| l.is_fence() && l.ordering().is_sc())
}

/// `po ; [sync_rcu] ; po` over accesses
pub(crate) fn gp(graph: &ExecutionGraph) -> Pairs {
    across(graph, |l| matches!(l.kind(), LabelKind::RcuSync))
}

/// Accesses po-before a release store
pub(crate) fn po_rel(graph: &ExecutionGraph) -> Pairs {
    algebra::po_filtered(graph, |a, b| {
        a.is_access() && b.as_write().is_some() && b.ordering().is_release()
    })
}

/// Preserved program order, read off the pporf views
pub(crate) fn ppo(graph: &ExecutionGraph) -> Pairs {
    algebra::po_filtered(graph, |a, b| {
        a.is_access() && b.is_access() && b.pporf().contains(a.pos())
    })
}

/// Plain barriers plus the strong fences derived so far
pub(crate) fn strong_fence(graph: &ExecutionGraph, relations: &RelationTable) -> Pairs {
    mb(graph)
        .union(&gp(graph))
        .union(&algebra::direct(relations, RelationId::StrongFence))
}

/// Reads-from between threads
pub(crate) fn rfe(graph: &ExecutionGraph) -> Pairs {
    algebra::rf(graph).external().filter(|w, _| !w.is_init())
}
