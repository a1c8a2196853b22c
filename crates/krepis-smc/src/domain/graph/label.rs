//! Event labels
//!
//! A closed tagged variant: common header fields live on [`EventLabel`],
//! per-kind payload on [`LabelKind`]. Back-pointers between reads and writes
//! are plain [`Event`] positions into the graph's per-thread arenas.

use super::event::{Address, Event, MemOrdering, Stamp, Value};
use super::view::{DepView, View};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cached causal prefixes of a label
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelViews {
    /// Happens-before prefix (includes the label itself)
    pub hb: View,
    /// Program order ∪ reads-from prefix
    pub porf: View,
    /// Preserved program order ∪ reads-from prefix, with holes
    pub pporf: DepView,
}

/// Atomic-update flavor of a read
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RmwKind {
    /// Plain load
    None,
    /// Fetch-and-add: the paired store writes `read + operand`
    FetchAdd {
        /// Added value
        operand: Value,
    },
    /// Compare-and-swap: the paired store exists only on success
    CompareExchange {
        /// Value that makes the exchange succeed
        expected: Value,
        /// Value stored on success
        desired: Value,
    },
    /// Mutex acquisition, a compare-and-swap from 0 to 1
    Lock,
}

impl RmwKind {
    /// Whether a read of `value` is followed by an exclusive store, and
    /// which value that store writes
    pub const fn exclusive_store(self, value: Value) -> Option<Value> {
        match self {
            Self::None => None,
            Self::FetchAdd { operand } => Some(value.wrapping_add(operand)),
            Self::CompareExchange { expected, desired } => {
                if value == expected {
                    Some(desired)
                } else {
                    None
                }
            }
            Self::Lock => {
                if value == 0 {
                    Some(1)
                } else {
                    None
                }
            }
        }
    }

    /// Whether the read belongs to an atomic update at all
    pub const fn is_rmw(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Load payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadLabel {
    /// Accessed location
    pub addr: Address,
    /// Write this read observes
    pub rf: Option<Event>,
    /// Atomic-update flavor
    pub rmw: RmwKind,
    /// Took the co-maximal choice when added
    pub added_max: bool,
    /// May still be backward-revisited
    pub revisitable: bool,
}

impl ReadLabel {
    /// Fresh read with no reads-from edge yet
    pub const fn new(addr: Address, rmw: RmwKind) -> Self {
        Self {
            addr,
            rf: None,
            rmw,
            added_max: true,
            revisitable: true,
        }
    }
}

/// Store payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteLabel {
    /// Accessed location
    pub addr: Address,
    /// Written value
    pub value: Value,
    /// Second half of an atomic update
    pub exclusive: bool,
    /// Every read whose reads-from edge points here
    pub readers: Vec<Event>,
    /// Placed co-maximally when added
    pub added_max: bool,
    /// Release message carried to acquiring readers
    pub msg: View,
}

impl WriteLabel {
    /// Fresh store without readers
    pub fn new(addr: Address, value: Value, exclusive: bool) -> Self {
        Self {
            addr,
            value,
            exclusive,
            readers: Vec::new(),
            added_max: true,
            msg: View::new(),
        }
    }
}

/// Why a thread cannot make progress
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockKind {
    /// Waiting for a child thread to finish
    Join {
        /// Awaited thread
        child: usize,
    },
    /// Mutex observed as held
    Lock {
        /// Mutex location
        addr: Address,
    },
    /// `assume` failed; the execution is discarded
    Assume,
    /// Thread exceeded the graph-size bound
    Bound,
}

/// Kind-specific payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelKind {
    /// Hole left by a restriction in a dependency-tracking graph
    Empty,
    /// Thread start sentinel, index 0 of every thread
    ThreadStart {
        /// Spawning create event (`None` for the main thread)
        create: Option<Event>,
    },
    /// Spawns a child thread
    ThreadCreate {
        /// Child thread id
        child: usize,
    },
    /// Waits for a child thread
    ThreadJoin {
        /// Child thread id
        child: usize,
        /// Child's finish event, once joined
        finish: Option<Event>,
    },
    /// Last event of a thread
    ThreadFinish {
        /// Join that observed this finish
        joiner: Option<Event>,
    },
    /// Load, possibly the first half of an atomic update
    Read(ReadLabel),
    /// Store, possibly the second half of an atomic update
    Write(WriteLabel),
    /// Memory fence
    Fence,
    /// Heap allocation
    Malloc {
        /// Base address
        addr: Address,
        /// Size in cells
        size: u64,
    },
    /// Heap deallocation
    Free {
        /// Base address
        addr: Address,
    },
    /// RCU read-side critical section entry
    RcuLock,
    /// RCU read-side critical section exit
    RcuUnlock,
    /// RCU grace period
    RcuSync,
    /// Thread cannot proceed
    Block(BlockKind),
}

/// Node of the execution graph
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLabel {
    pos: Event,
    stamp: Stamp,
    ordering: MemOrdering,
    deps: Vec<Event>,
    views: LabelViews,
    kind: LabelKind,
}

impl EventLabel {
    /// New label at `pos`; stamp and views are assigned by the graph
    pub fn new(pos: Event, ordering: MemOrdering, kind: LabelKind) -> Self {
        Self {
            pos,
            stamp: Stamp::default(),
            ordering,
            deps: Vec::new(),
            views: LabelViews::default(),
            kind,
        }
    }

    /// Placeholder for a deleted slot
    pub fn empty(pos: Event) -> Self {
        Self::new(pos, MemOrdering::NotAtomic, LabelKind::Empty)
    }

    /// Attach data/address dependencies on earlier events of the same thread
    #[must_use]
    pub fn with_deps(mut self, deps: Vec<Event>) -> Self {
        self.deps = deps;
        self
    }

    /// Position
    #[inline]
    pub const fn pos(&self) -> Event {
        self.pos
    }

    /// Insertion stamp
    #[inline]
    pub const fn stamp(&self) -> Stamp {
        self.stamp
    }

    pub(crate) fn set_stamp(&mut self, stamp: Stamp) {
        self.stamp = stamp;
    }

    /// Ordering strength
    #[inline]
    pub const fn ordering(&self) -> MemOrdering {
        self.ordering
    }

    pub(crate) fn set_ordering(&mut self, ordering: MemOrdering) {
        self.ordering = ordering;
    }

    /// Explicit dependencies
    #[inline]
    pub fn deps(&self) -> &[Event] {
        &self.deps
    }

    /// Payload
    #[inline]
    pub const fn kind(&self) -> &LabelKind {
        &self.kind
    }

    pub(crate) fn kind_mut(&mut self) -> &mut LabelKind {
        &mut self.kind
    }

    /// Cached views
    #[inline]
    pub const fn views(&self) -> &LabelViews {
        &self.views
    }

    pub(crate) fn views_mut(&mut self) -> &mut LabelViews {
        &mut self.views
    }

    /// Happens-before view
    #[inline]
    pub const fn hb(&self) -> &View {
        &self.views.hb
    }

    /// Porf view
    #[inline]
    pub const fn porf(&self) -> &View {
        &self.views.porf
    }

    /// Pporf view
    #[inline]
    pub const fn pporf(&self) -> &DepView {
        &self.views.pporf
    }

    /// Hole
    #[inline]
    pub const fn is_empty(&self) -> bool {
        matches!(self.kind, LabelKind::Empty)
    }

    /// Block label
    #[inline]
    pub const fn is_block(&self) -> bool {
        matches!(self.kind, LabelKind::Block(_))
    }

    /// Read payload
    pub const fn as_read(&self) -> Option<&ReadLabel> {
        match &self.kind {
            LabelKind::Read(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn as_read_mut(&mut self) -> Option<&mut ReadLabel> {
        match &mut self.kind {
            LabelKind::Read(r) => Some(r),
            _ => None,
        }
    }

    /// Write payload
    pub const fn as_write(&self) -> Option<&WriteLabel> {
        match &self.kind {
            LabelKind::Write(w) => Some(w),
            _ => None,
        }
    }

    pub(crate) fn as_write_mut(&mut self) -> Option<&mut WriteLabel> {
        match &mut self.kind {
            LabelKind::Write(w) => Some(w),
            _ => None,
        }
    }

    /// Location of a memory access
    pub const fn addr(&self) -> Option<Address> {
        match &self.kind {
            LabelKind::Read(r) => Some(r.addr),
            LabelKind::Write(w) => Some(w.addr),
            _ => None,
        }
    }

    /// Read or write
    pub const fn is_access(&self) -> bool {
        matches!(self.kind, LabelKind::Read(_) | LabelKind::Write(_))
    }

    /// Fence of any strength
    pub const fn is_fence(&self) -> bool {
        matches!(self.kind, LabelKind::Fence)
    }

    /// Sequentially consistent access or fence
    pub const fn is_sc(&self) -> bool {
        self.ordering.is_sc() && (self.is_access() || self.is_fence())
    }
}

impl fmt::Debug for EventLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{:?} ", self.pos, self.stamp)?;
        match &self.kind {
            LabelKind::Empty => write!(f, "<hole>"),
            LabelKind::ThreadStart { .. } => write!(f, "B"),
            LabelKind::ThreadCreate { child } => write!(f, "TC[{child}]"),
            LabelKind::ThreadJoin { child, .. } => write!(f, "TJ[{child}]"),
            LabelKind::ThreadFinish { .. } => write!(f, "E"),
            LabelKind::Read(r) => write!(f, "R{:?} {:?} rf={:?}", self.ordering, r.addr, r.rf),
            LabelKind::Write(w) => write!(f, "W{:?} {:?} = {}", self.ordering, w.addr, w.value),
            LabelKind::Fence => write!(f, "F{:?}", self.ordering),
            LabelKind::Malloc { addr, size } => write!(f, "MALLOC {addr:?}+{size}"),
            LabelKind::Free { addr } => write!(f, "FREE {addr:?}"),
            LabelKind::RcuLock => write!(f, "RCU_LOCK"),
            LabelKind::RcuUnlock => write!(f, "RCU_UNLOCK"),
            LabelKind::RcuSync => write!(f, "SYNC_RCU"),
            LabelKind::Block(b) => write!(f, "BLOCK {b:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rmw_exclusive_store() {
        assert_eq!(RmwKind::None.exclusive_store(3), None);
        assert_eq!(RmwKind::FetchAdd { operand: 2 }.exclusive_store(3), Some(5));
        let cas = RmwKind::CompareExchange { expected: 1, desired: 9 };
        assert_eq!(cas.exclusive_store(1), Some(9));
        assert_eq!(cas.exclusive_store(0), None);
        assert_eq!(RmwKind::Lock.exclusive_store(0), Some(1));
        assert_eq!(RmwKind::Lock.exclusive_store(1), None);
    }

    #[test]
    fn test_label_accessors() {
        let pos = Event::new(1, 1);
        let lab = EventLabel::new(
            pos,
            MemOrdering::Acquire,
            LabelKind::Read(ReadLabel::new(Address(8), RmwKind::None)),
        );
        assert_eq!(lab.pos(), pos);
        assert_eq!(lab.addr(), Some(Address(8)));
        assert!(lab.as_read().is_some());
        assert!(lab.as_write().is_none());
        assert!(!lab.is_sc());
        assert!(EventLabel::empty(pos).is_empty());
    }
}
