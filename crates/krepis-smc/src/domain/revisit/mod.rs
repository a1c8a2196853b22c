//! Revisit Engine
//!
//! # Overview
//!
//! Exploration keeps exactly one candidate execution alive. Choices made
//! while the interpreter grows it leave their alternatives in a bucketed
//! [`WorkList`]; once the execution ends the explorer pops the newest
//! alternative, restricts the graph to what that alternative keeps, and
//! replays the program against it.
//!
//! ```text
//!              ┌──────────────┐ step ┌─────────────┐ handler ┌──────────────┐
//!  Interpreter │ litmus, user │─────▶│  Explorer   │────────▶│ExecutionGraph│
//!              └──────────────┘      └─────────────┘         └──────────────┘
//!                                      │    ▲  pop
//!                       push revisits  ▼    │
//!                                    ┌─────────────┐  offer  ┌──────────────┐
//!                                    │  WorkList   │         │ SubtreeSink  │
//!                                    └─────────────┘         └──────────────┘
//! ```
//!
//! # Components
//!
//! - [`worklist`]: pending forward and backward revisits by stamp
//! - [`state`]: resumable execution snapshots and the heap allocator
//! - [`interpreter`]: the port a program under test implements
//! - [`detect`]: bug detectors run on every consistent execution
//! - [`explorer`]: the search loop and interpreter handlers

pub mod detect;
pub mod explorer;
pub mod interpreter;
pub mod state;
pub mod worklist;

pub use detect::{default_detectors, ErrorDetector, GraphQuery, MemorySafetyDetector, RaceDetector};
pub use explorer::{Explorer, SubtreeSink};
pub use interpreter::Interpreter;
pub use state::{Allocator, Choice, ExecutionState, CELL_SIZE, HEAP_BASE};
pub use worklist::{BackwardRevisit, ForwardRevisit, Revisit, WorkList};
