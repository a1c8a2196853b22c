//! Event identifiers and the scalar vocabulary shared by every label
//!
//! An [`Event`] is a position `(thread, index)` in per-thread program order.
//! Events are totally ordered inside a thread and unordered across threads
//! except through the relations derived by the calculators.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Value carried by memory accesses
pub type Value = i64;

/// Position of a label in per-thread program order
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Event {
    /// Thread identifier (0 is the main thread)
    pub thread: usize,
    /// Index inside the thread (0 is the thread-start sentinel)
    pub index: usize,
}

impl Event {
    /// The main thread's start event, which doubles as the initializing
    /// write of every location.
    pub const INIT: Self = Self { thread: 0, index: 0 };

    /// Create a new event position
    #[inline]
    pub const fn new(thread: usize, index: usize) -> Self {
        Self { thread, index }
    }

    /// Whether this is the initializer
    #[inline]
    pub const fn is_init(self) -> bool {
        self.thread == 0 && self.index == 0
    }

    /// Program-order predecessor, `None` for a thread-start sentinel
    #[inline]
    pub const fn prev(self) -> Option<Self> {
        if self.index == 0 {
            None
        } else {
            Some(Self::new(self.thread, self.index - 1))
        }
    }

    /// Program-order successor
    #[inline]
    pub const fn next(self) -> Self {
        Self::new(self.thread, self.index + 1)
    }

    /// First event of a thread
    #[inline]
    pub const fn thread_start(thread: usize) -> Self {
        Self::new(thread, 0)
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_init() {
            write!(f, "INIT")
        } else {
            write!(f, "({}, {})", self.thread, self.index)
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Insertion-order counter attached to every label
///
/// Stamps are unique and strictly increasing with insertion. They break
/// ties between revisits and bound which events a backward revisit may
/// delete.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Stamp(pub u32);

impl Stamp {
    /// Stamp following this one
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Debug for Stamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Simulated memory address
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub u64);

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Ordering strength of an access or fence
///
/// The derived `Ord` follows the strength lattice closely enough for the
/// `is_*` helpers; `Acquire` and `Release` are incomparable in the C11
/// sense and are never compared directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum MemOrdering {
    /// Plain, racy access
    NotAtomic,
    /// Atomic without synchronization
    #[default]
    Relaxed,
    /// Acquire side of a synchronization
    Acquire,
    /// Release side of a synchronization
    Release,
    /// Both acquire and release
    AcqRel,
    /// Sequentially consistent
    SeqCst,
}

impl MemOrdering {
    /// At least acquire
    #[inline]
    pub const fn is_acquire(self) -> bool {
        matches!(self, Self::Acquire | Self::AcqRel | Self::SeqCst)
    }

    /// At least release
    #[inline]
    pub const fn is_release(self) -> bool {
        matches!(self, Self::Release | Self::AcqRel | Self::SeqCst)
    }

    /// Sequentially consistent
    #[inline]
    pub const fn is_sc(self) -> bool {
        matches!(self, Self::SeqCst)
    }

    /// Any atomic ordering
    #[inline]
    pub const fn is_atomic(self) -> bool {
        !matches!(self, Self::NotAtomic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ordering() {
        let a = Event::new(1, 2);
        let b = Event::new(1, 3);
        let c = Event::new(2, 0);
        assert!(a < b);
        assert!(b < c);
        assert_eq!(a.next(), b);
        assert_eq!(b.prev(), Some(a));
        assert_eq!(c.prev(), None);
    }

    #[test]
    fn test_init_event() {
        assert!(Event::INIT.is_init());
        assert!(!Event::thread_start(1).is_init());
        assert_eq!(format!("{:?}", Event::INIT), "INIT");
        assert_eq!(format!("{:?}", Event::new(2, 5)), "(2, 5)");
    }

    #[test]
    fn test_ordering_strength() {
        assert!(MemOrdering::SeqCst.is_acquire());
        assert!(MemOrdering::SeqCst.is_release());
        assert!(MemOrdering::AcqRel.is_release());
        assert!(!MemOrdering::Acquire.is_release());
        assert!(!MemOrdering::Relaxed.is_acquire());
        assert!(!MemOrdering::NotAtomic.is_atomic());
    }
}
