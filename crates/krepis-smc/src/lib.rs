//! Krepis Stateless Model Checker
//!
//! # Overview
//!
//! `krepis-smc` explores every execution of a small concurrent program under
//! a weak memory model. Executions are kept as graphs of events; a read may
//! observe any store the model allows, and alternative choices are explored
//! by revisiting the graph instead of re-running a full interleaving search.
//!
//! # Trinity Architecture
//!
//! This crate follows the Trinity Architecture pattern:
//!
//! - **Domain**: relation engine, execution graphs, calculators and the
//!   revisit-based explorer
//! - **Infrastructure**: JSON snapshots and the parallel worker pool
//! - **Adapters**: the litmus front end driving the interpreter port
//!
//! # Memory Models
//!
//! - `sc`: sequential consistency
//! - `ra`: release/acquire
//! - `rc11`: repaired C11 with a partial SC order
//! - `lkmm`: Linux-kernel style, dependency tracking and RCU
//!
//! Every model runs with either coherence strategy: an explicit per-location
//! store order (`mo`) or writes-before derived on demand (`wb`).
//!
//! # Usage
//!
//! ```rust
//! use krepis_smc::adapters::{catalog, verify};
//! use krepis_smc::{CheckerConfig, MemoryModel, Outcome};
//!
//! let sb = catalog::sb();
//! let weak = Outcome::from_pairs([("0:r0", 0), ("1:r0", 0)]);
//!
//! let rc11 = verify(&sb, &CheckerConfig::default()).unwrap();
//! assert!(rc11.allows(&weak));
//!
//! let sc = verify(&sb, &CheckerConfig::default().with_model(MemoryModel::Sc)).unwrap();
//! assert!(!sc.allows(&weak));
//! ```
//!
//! # Feature Flags
//!
//! - `parallel` (default): worker pool exploring backward-revisit subtrees
//!   on separate threads

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

// Trinity Architecture Layers
pub mod domain;
pub mod infrastructure;
pub mod adapters;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Re-export Primary Types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

// Configuration and errors
pub use domain::{CheckStrength, CheckerConfig, CheckerError, CoherenceKind, GraphError, MemoryModel};

// Execution graphs
pub use domain::{
    Address,
    BlockKind,
    DepView,
    Event,
    EventLabel,
    ExecutionGraph,
    LabelKind,
    MemOrdering,
    ReadLabel,
    Relation,
    RmwKind,
    Stamp,
    Value,
    View,
    WriteLabel,
};

// Exploration
pub use domain::{ExecutionState, Explorer, Interpreter, SubtreeSink};

// Results
pub use domain::{ExplorationStats, Finding, Outcome, VerificationResult, Warning};

// Snapshots and the worker pool
pub use infrastructure::{export_state, import_state, Snapshot};
#[cfg(feature = "parallel")]
pub use infrastructure::WorkerPool;

// Litmus front end
pub use adapters::{LitmusInterpreter, LitmusTest};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
