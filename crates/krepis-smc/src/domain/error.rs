//! Error Types
//!
//! Only structural problems are errors. An inconsistent candidate execution
//! is a backtracking signal (`is_consistent` returns `false`), and
//! verification findings are data collected in the report.

use super::graph::Event;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Graph Invariant Violations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Broken execution-graph invariant
///
/// Any of these means the engine itself is wrong; continuing would
/// silently produce wrong verdicts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// Position outside the current per-thread bounds
    #[error("no event at {0}")]
    NoSuchEvent(Event),

    /// Thread slot without its start sentinel
    #[error("thread {0} has no start event")]
    MissingThreadStart(usize),

    /// Label stored at the wrong slot
    #[error("label at {slot} claims position {claimed}")]
    PositionMismatch {
        /// Slot holding the label
        slot: Event,
        /// Position recorded in the label
        claimed: Event,
    },

    /// Operation expected a read
    #[error("{0} is not a read")]
    NotARead(Event),

    /// Operation expected a write
    #[error("{0} is not a write")]
    NotAWrite(Event),

    /// Read stamped before the store it reads
    #[error("{earlier} reads from {later}, which carries a later stamp")]
    StampOrder {
        /// Store with the later stamp
        later: Event,
        /// Read with the earlier stamp
        earlier: Event,
    },

    /// Reads-from edge to a missing or non-write label
    #[error("read {read} reads from {write}, which is not a write in the graph")]
    DanglingRf {
        /// Reader
        read: Event,
        /// Missing writer
        write: Event,
    },

    /// Readers list disagrees with a reads-from edge
    #[error("readers list of {write} disagrees with reads-from of {read}")]
    ReadersMismatch {
        /// Writer
        write: Event,
        /// Reader present on one side only
        read: Event,
    },

    /// Join/finish back-pointers disagree
    #[error("join {join} and finish {finish} disagree")]
    JoinMismatch {
        /// Join event
        join: Event,
        /// Finish event
        finish: Event,
    },

    /// Two labels share a stamp
    #[error("stamp {stamp} used by both {first} and {second}")]
    DuplicateStamp {
        /// Shared stamp value
        stamp: u32,
        /// First holder
        first: Event,
        /// Second holder
        second: Event,
    },

    /// Read replayed before it was given a store to read from
    #[error("read {0} has no reads-from edge")]
    MissingRf(Event),

    /// Label added at a slot that is neither the next index nor a hole
    #[error("cannot add a label at {0}")]
    InvalidInsertion(Event),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Checker Errors
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fatal errors surfaced by the exploration loop
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CheckerError {
    /// Graph invariant violation
    #[error("graph invariant violated: {0}")]
    Graph(#[from] GraphError),

    /// Interpreter replayed a different instruction than the graph records
    #[error("replay mismatch at {pos}: graph has {recorded}, interpreter issued {issued}")]
    ReplayMismatch {
        /// Position being replayed
        pos: Event,
        /// Recorded label kind
        recorded: String,
        /// Kind the interpreter asked for
        issued: String,
    },

    /// Interpreter stepped a thread the graph does not know
    #[error("unknown thread {0}")]
    UnknownThread(usize),

    /// Program names a shared variable it never declared
    #[error("unknown variable {0}")]
    UnknownVariable(String),

    /// Snapshot could not be encoded or decoded
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl From<serde_json::Error> for CheckerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Snapshot(err.to_string())
    }
}
