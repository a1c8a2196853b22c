//! Infrastructure Layer - External Technology Stack
//!
//! Concrete pieces that depend on the host: JSON snapshots of a search on
//! disk and the thread pool that explores subtrees in parallel.
//!
//! # Responsibilities
//! - Serialization/deserialization of execution states
//! - Worker threads (`parallel` feature)

#[cfg(feature = "parallel")]
pub mod pool;
pub mod snapshot;

#[cfg(feature = "parallel")]
pub use pool::WorkerPool;
pub use snapshot::{export_state, import_state, Snapshot};
