//! Execution graph
//!
//! Per-thread arenas of [`EventLabel`]s addressed by [`Event`] positions,
//! with cached views and the coherence strategy that orders stores.

pub mod event;
pub mod execution_graph;
pub mod label;
pub mod view;

pub use event::{Address, Event, MemOrdering, Stamp, Value};
pub use execution_graph::ExecutionGraph;
pub use label::{BlockKind, EventLabel, LabelKind, LabelViews, ReadLabel, RmwKind, WriteLabel};
pub use view::{DepView, VectorClock, View};
