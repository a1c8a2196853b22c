//! Domain Layer
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Domain Layer                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  Relation Engine            Execution Graph                 │
//! │  ├─ Relation (closure)      ├─ EventLabel / Event / Stamp   │
//! │  ├─ DFS, cycle checks       ├─ View / DepView               │
//! │  └─ topological sorts       └─ ExecutionGraph               │
//! │                                                             │
//! │  Calculators                Revisit Engine                  │
//! │  ├─ coherence (MO / WB)     ├─ Explorer                     │
//! │  ├─ hb, psc, sc order       ├─ WorkList / ExecutionState    │
//! │  ├─ LKMM chain              ├─ Interpreter port             │
//! │  └─ fixpoint driver         └─ error detectors              │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nothing in this layer spawns threads or touches the filesystem; the
//! worker pool and snapshot files live in `infrastructure`.

pub mod calc;
pub mod config;
pub mod error;
pub mod graph;
pub mod relation;
pub mod report;
pub mod revisit;

pub use config::{CheckStrength, CheckerConfig, CoherenceKind, MemoryModel};
pub use error::{CheckerError, GraphError};
pub use graph::{
    Address, BlockKind, DepView, Event, EventLabel, ExecutionGraph, LabelKind, MemOrdering,
    ReadLabel, RmwKind, Stamp, Value, View, WriteLabel,
};
pub use relation::Relation;
pub use report::{ExplorationStats, Finding, Outcome, VerificationResult, Warning};
pub use revisit::{ExecutionState, Explorer, Interpreter, SubtreeSink};
