//! Pending alternatives
//!
//! Every choice the explorer makes eagerly leaves its alternatives here,
//! bucketed by the stamp of the event whose addition created them. The
//! newest bucket is always drained first, so popping an item only ever
//! needs the graph cut back to that bucket's stamp.
//!
//! ```text
//!   stamp 3: [Read{r@3, w1}]
//!   stamp 7: [Placement{w@7, 0}, Backward{r@3 <- w@7}]   <- pop from here
//! ```

use crate::domain::graph::{Event, Stamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Alternative that changes an existing event without deleting anything
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForwardRevisit {
    /// Let the read observe another store
    Read {
        /// Revisited read
        pos: Event,
        /// Store to read from
        rf: Event,
    },
    /// Move a store to another offset of its location's explicit order
    Placement {
        /// Placed store
        pos: Event,
        /// Offset in the order (initializer excluded)
        offset: usize,
    },
}

impl ForwardRevisit {
    /// Event whose choice changes
    pub const fn pos(&self) -> Event {
        match self {
            Self::Read { pos, .. } | Self::Placement { pos, .. } => *pos,
        }
    }
}

/// Let an older read observe a newer store, deleting what the read's
/// old value caused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackwardRevisit {
    /// Revisited read
    pub read: Event,
    /// Revisiting store
    pub write: Event,
}

/// One pending alternative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Revisit {
    /// Change an event in place
    Forward(ForwardRevisit),
    /// Rewire a read to a later store
    Backward(BackwardRevisit),
}

/// Stamp-bucketed stack of alternatives
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<(Stamp, Vec<Revisit>)>", into = "Vec<(Stamp, Vec<Revisit>)>")]
pub struct WorkList {
    buckets: BTreeMap<Stamp, Vec<Revisit>>,
}

impl WorkList {
    /// Empty work list
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an alternative created by the event stamped `stamp`
    pub fn push(&mut self, stamp: Stamp, item: Revisit) {
        self.buckets.entry(stamp).or_default().push(item);
    }

    /// Last item of the newest bucket
    pub fn pop(&mut self) -> Option<(Stamp, Revisit)> {
        let mut entry = self.buckets.last_entry()?;
        let stamp = *entry.key();
        let item = entry.get_mut().pop();
        if entry.get().is_empty() {
            entry.remove();
        }
        item.map(|item| (stamp, item))
    }

    /// Nothing pending
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Number of pending alternatives
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Drop every bucket newer than `stamp`
    pub fn truncate_after(&mut self, stamp: Stamp) {
        self.buckets.split_off(&stamp.next());
    }
}

impl From<Vec<(Stamp, Vec<Revisit>)>> for WorkList {
    fn from(pairs: Vec<(Stamp, Vec<Revisit>)>) -> Self {
        Self {
            buckets: pairs.into_iter().filter(|(_, v)| !v.is_empty()).collect(),
        }
    }
}

impl From<WorkList> for Vec<(Stamp, Vec<Revisit>)> {
    fn from(list: WorkList) -> Self {
        list.buckets.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(i: usize) -> Revisit {
        Revisit::Forward(ForwardRevisit::Read {
            pos: Event::new(1, i),
            rf: Event::INIT,
        })
    }

    #[test]
    fn test_pop_drains_newest_bucket_last_first() {
        let mut wl = WorkList::new();
        wl.push(Stamp(3), read(1));
        wl.push(Stamp(7), read(2));
        wl.push(Stamp(7), read(3));
        assert_eq!(wl.len(), 3);

        assert_eq!(wl.pop(), Some((Stamp(7), read(3))));
        assert_eq!(wl.pop(), Some((Stamp(7), read(2))));
        assert_eq!(wl.pop(), Some((Stamp(3), read(1))));
        assert_eq!(wl.pop(), None);
        assert!(wl.is_empty());
    }

    #[test]
    fn test_truncate_keeps_older_buckets() {
        let mut wl = WorkList::new();
        wl.push(Stamp(2), read(1));
        wl.push(Stamp(5), read(2));
        wl.push(Stamp(6), read(3));
        wl.truncate_after(Stamp(5));
        assert_eq!(wl.len(), 2);
        assert_eq!(wl.pop(), Some((Stamp(5), read(2))));
    }

    #[test]
    fn test_forward_revisit_position() {
        let p = ForwardRevisit::Placement {
            pos: Event::new(2, 3),
            offset: 0,
        };
        assert_eq!(p.pos(), Event::new(2, 3));
    }
}
